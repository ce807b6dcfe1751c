//! # Stores, Paths, and Bindings
//!
//! Crispy keeps application state in one nested tree per scope and lets many
//! independent consumers read and write single fields of it by dotted path.
//! There are four main pieces:
//!
//! - [`Value`] / [`Path`]: the tree and the addresses into it.
//! - [`Store`]: the live tree of one scope, plus its listeners.
//! - [`StoreContext`]: creates scopes and hands out bindings.
//! - [`ExternalSync`]: the scheduler contract bindings report to.
//!
//! ## Reading and writing
//!
//! ```rust
//! use crispy_core::*;
//!
//! let ctx = StoreContext::new(Value::map([
//!     ("user", Value::map([("name", Value::from("Ada")), ("visits", Value::from(0))])),
//! ]));
//!
//! ctx.provide(|| {
//!     let (visits, set_visits) = ctx.use_store("user.visits").unwrap();
//!     assert_eq!(visits, Some(Value::Int(0)));
//!
//!     set_visits.set(1).unwrap();
//!     assert_eq!(ctx.store().unwrap().get(&store_path!(user.visits)), Some(Value::Int(1)));
//! });
//! ```
//!
//! Writes never create structure: writing `user.address.city` fails with
//! [`StoreError::PathNotInitialized`] unless `user.address` already exists.
//! Declare every branch you intend to write in the initial state (use
//! `Value::Null` for "not loaded yet" leaves).
//!
//! ## Change notification
//!
//! Every successful write notifies every listener of the scope, whether or
//! not the value changed and whichever path it touched. Deciding whether a
//! consumer has to recompute is the scheduler's job: it re‑reads the
//! consumer's slice and compares it with what the consumer last saw.
//! [`Consumer`] is a small scheduler that does exactly that:
//!
//! ```rust
//! use crispy_core::*;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let ctx = StoreContext::new(Value::map([("a", 0), ("b", 0)]));
//! ctx.provide(|| {
//!     let renders = Rc::new(Cell::new(0));
//!     let view = {
//!         let (ctx, renders) = (ctx.clone(), renders.clone());
//!         Consumer::mount(move || {
//!             let _a = ctx.use_store_state("a").unwrap();
//!             renders.set(renders.get() + 1);
//!         })
//!     };
//!
//!     ctx.use_store_updater("b").unwrap().set(1).unwrap(); // `a` unchanged
//!     ctx.use_store_updater("a").unwrap().set(1).unwrap();
//!     assert_eq!(renders.get(), 2);
//!     view.unmount();
//! });
//! ```
//!
//! ## Scopes
//!
//! Each `provide` call (or each [`StoreScope`] from `create_scope`) owns its
//! own tree and listeners. Scopes never see each other's writes, and nested
//! providers of the same context shadow outer ones.

pub mod context;
pub mod error;
pub mod host;
pub mod locals;
pub mod path;
pub mod prelude;
pub mod registry;
pub mod scope;
pub mod store;
pub mod sync;
pub mod value;

pub use context::*;
pub use error::*;
pub use host::*;
pub use locals::{ContextId, LocalsSnapshot};
pub use path::*;
pub use registry::{Listener, ListenerKey, Registry, Unsubscribe};
pub use scope::*;
pub use store::*;
pub use sync::*;
pub use value::*;
