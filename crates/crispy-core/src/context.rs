//! # Store contexts and bindings
//!
//! A [`StoreContext`] is created once per store *shape* with its initial
//! state. It hands out scopes and the three bindings consumers use:
//!
//! - `use_store_state(path)`: read‑only slice, tracked by the ambient
//!   scheduler.
//! - `use_store_updater(path)`: a [`Setter`] for the slice.
//! - `use_store(path)`: both, as a `(value, setter)` pair.
//!
//! ```rust
//! use crispy_core::*;
//!
//! let ctx = StoreContext::new(Value::map([
//!     ("todo", Value::map([("title", Value::from("write docs")), ("done", Value::from(false))])),
//! ]));
//! let done: TypedPath<bool> = ctx.path("todo.done").unwrap();
//!
//! ctx.provide(|| -> Result<()> {
//!     let (is_done, set_done) = ctx.use_store(&done)?;
//!     assert!(!is_done);
//!     set_done.set(true)?;
//!     assert_eq!(ctx.store()?.get(done.path()), Some(Value::Bool(true)));
//!     Ok(())
//! })
//! .unwrap();
//! ```
//!
//! Each `provide` call is an independent scope with its own tree and
//! listeners; calling a binding outside of any scope of the context fails
//! with [`StoreError::ScopeNotFound`].

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::{Result, StoreError};
use crate::locals::{ContextId, LocalKey, local, with_local};
use crate::path::{Path, TypedPath, check_shape, resolve_read};
use crate::scope::Scope;
use crate::store::{Setter, Store};
use crate::sync::{SnapshotFn, SubscribeFn, use_sync_external_store};
use crate::value::{FromValue, Value};

thread_local! {
    static NEXT_CONTEXT_ID: Cell<ContextId> = const { Cell::new(1) };
}

#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Shown in log lines and by the inspector.
    pub label: String,
    /// Check string paths against the initial state's shape.
    pub validate_paths: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            label: "store".to_string(),
            validate_paths: false,
        }
    }
}

impl StoreOptions {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn validate_paths(mut self, validate: bool) -> Self {
        self.validate_paths = validate;
        self
    }
}

#[derive(Clone)]
pub struct StoreContext(Rc<ContextInner>);

struct ContextInner {
    id: ContextId,
    initial: Rc<Value>,
    options: StoreOptions,
}

impl StoreContext {
    pub fn new(initial_state: impl Into<Value>) -> Self {
        Self::with_options(initial_state, StoreOptions::default())
    }

    pub fn with_options(initial_state: impl Into<Value>, options: StoreOptions) -> Self {
        let id = NEXT_CONTEXT_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            id
        });
        Self(Rc::new(ContextInner {
            id,
            initial: Rc::new(initial_state.into()),
            options,
        }))
    }

    pub fn id(&self) -> ContextId {
        self.0.id
    }

    pub fn initial(&self) -> &Value {
        &self.0.initial
    }

    pub fn options(&self) -> &StoreOptions {
        &self.0.options
    }

    /// A fresh scope seeded from the initial state. Enter it with
    /// [`StoreScope::enter`], release it with [`StoreScope::dispose`].
    pub fn create_scope(&self) -> StoreScope {
        let store = Store::with_label(self.0.initial.clone(), self.0.options.label.as_str());
        let scope = Scope::new();
        scope.add_disposer({
            let store = store.clone();
            move || {
                log::debug!("[{}#{}] scope disposed", store.label(), store.id());
                store.clear_listeners();
            }
        });
        StoreScope {
            context: self.0.id,
            store,
            scope,
        }
    }

    /// Runs `content` inside a new scope that lives exactly as long as the call.
    pub fn provide<R>(&self, content: impl FnOnce() -> R) -> R {
        let scope = self.create_scope();
        let result = scope.enter(content);
        scope.dispose();
        result
    }

    /// Re-enters a long-lived scope from [`create_scope`](Self::create_scope).
    pub fn provide_scope<R>(&self, scope: &StoreScope, content: impl FnOnce() -> R) -> R {
        if scope.context != self.0.id {
            log::warn!("[{}] entering a scope of another context", self.0.options.label);
        }
        scope.enter(content)
    }

    /// Builds a typed path that is known to exist in the initial state's shape.
    ///
    /// A slot that already holds a non-null value must convert to `T`.
    pub fn path<T: FromValue>(&self, raw: &str) -> Result<TypedPath<T>> {
        let path = Path::parse(raw)?;
        check_shape(&self.0.initial, &path)?;
        if let Some(slot) = resolve_read(&self.0.initial, &path)
            && !slot.is_null()
            && T::from_value(slot).is_none()
        {
            return Err(StoreError::TypeMismatch {
                path: path.to_string(),
                expected: T::EXPECTED,
            });
        }
        Ok(TypedPath::from(path))
    }

    /// The store of the innermost active scope of this context.
    pub fn store(&self) -> Result<Store> {
        local::<Store>(LocalKey::Store(self.0.id)).ok_or_else(|| StoreError::ScopeNotFound {
            context: self.0.options.label.clone(),
        })
    }

    /// Read binding: the slice's current value, tracked by the ambient scheduler.
    pub fn use_store_state<P: StorePath>(&self, path: P) -> Result<P::Output> {
        let store = self.store()?;
        let resolved = path.to_path(self)?;

        let subscribe: SubscribeFn = {
            let store = store.clone();
            Rc::new(move |listener| store.subscribe(listener))
        };
        let get_snapshot: SnapshotFn = {
            let path = resolved.clone();
            Rc::new(move || store.get(&path))
        };
        let get_server_snapshot: SnapshotFn = {
            let initial = self.0.initial.clone();
            let path = resolved.clone();
            Rc::new(move || resolve_read(&initial, &path).cloned())
        };

        let value = use_sync_external_store(subscribe, get_snapshot, get_server_snapshot);
        path.convert(&resolved, value)
    }

    /// Write binding; typed paths give a setter that only accepts their type.
    pub fn use_store_updater<P: StorePath>(&self, path: P) -> Result<Setter<P::Input>> {
        let store = self.store()?;
        Ok(Setter::new(store, path.to_path(self)?))
    }

    pub fn use_store<P: StorePath + Copy>(
        &self,
        path: P,
    ) -> Result<(P::Output, Setter<P::Input>)> {
        Ok((self.use_store_state(path)?, self.use_store_updater(path)?))
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("id", &self.0.id)
            .field("label", &self.0.options.label)
            .finish()
    }
}

/// One provider instance: a store plus the scope that owns its lifetime.
#[derive(Clone)]
pub struct StoreScope {
    context: ContextId,
    store: Store,
    scope: Scope,
}

impl StoreScope {
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Lifetime scope; consumers mounted inside `enter` become its children.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Makes this scope's store visible to bindings of its context while `content` runs.
    pub fn enter<R>(&self, content: impl FnOnce() -> R) -> R {
        with_local(
            LocalKey::Store(self.context),
            Rc::new(self.store.clone()),
            || self.scope.run(content),
        )
    }

    /// Disposes child scopes and drops every listener of the store.
    pub fn dispose(self) {
        self.scope.dispose();
    }
}

/// Anything a binding accepts as a path.
///
/// Untyped paths (`&str`, `&Path`) produce `Option<Value>` and accept any
/// value; a `&TypedPath<T>` produces and accepts `T`, where an absent slot
/// reads as `null`.
pub trait StorePath {
    type Output;
    type Input: Into<Value>;

    fn to_path(&self, ctx: &StoreContext) -> Result<Path>;

    fn convert(&self, path: &Path, value: Option<Value>) -> Result<Self::Output>;
}

fn validated(ctx: &StoreContext, path: Path) -> Result<Path> {
    if ctx.0.options.validate_paths {
        check_shape(&ctx.0.initial, &path)?;
    }
    Ok(path)
}

impl StorePath for &str {
    type Output = Option<Value>;
    type Input = Value;

    fn to_path(&self, ctx: &StoreContext) -> Result<Path> {
        validated(ctx, Path::parse(self)?)
    }

    fn convert(&self, _: &Path, value: Option<Value>) -> Result<Self::Output> {
        Ok(value)
    }
}

impl StorePath for &Path {
    type Output = Option<Value>;
    type Input = Value;

    fn to_path(&self, ctx: &StoreContext) -> Result<Path> {
        validated(ctx, (*self).clone())
    }

    fn convert(&self, _: &Path, value: Option<Value>) -> Result<Self::Output> {
        Ok(value)
    }
}

impl<T: FromValue + Into<Value>> StorePath for &TypedPath<T> {
    type Output = T;
    type Input = T;

    fn to_path(&self, ctx: &StoreContext) -> Result<Path> {
        validated(ctx, self.path().clone())
    }

    fn convert(&self, path: &Path, value: Option<Value>) -> Result<T> {
        T::from_value(value.as_ref().unwrap_or(&Value::Null)).ok_or_else(|| {
            StoreError::TypeMismatch {
                path: path.to_string(),
                expected: T::EXPECTED,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ServerRender, with_external_sync};

    fn ctx() -> StoreContext {
        StoreContext::new(Value::map([
            ("a", Value::map([("b", 1)])),
            ("maybe", Value::Null),
        ]))
    }

    #[test]
    fn bindings_outside_scope_fail() {
        let ctx = ctx();
        assert!(matches!(
            ctx.use_store_state("a.b"),
            Err(StoreError::ScopeNotFound { .. })
        ));
        assert!(matches!(
            ctx.use_store_updater("a.b"),
            Err(StoreError::ScopeNotFound { .. })
        ));
        assert!(ctx.use_store("a.b").is_err());
    }

    #[test]
    fn other_context_scope_does_not_count() {
        let a = ctx();
        let b = ctx();
        b.provide(|| {
            assert!(matches!(
                a.use_store_state("a.b"),
                Err(StoreError::ScopeNotFound { .. })
            ));
        });
    }

    #[test]
    fn read_binding_without_scheduler_reads_live_state() {
        let ctx = ctx();
        ctx.provide(|| {
            ctx.use_store_updater("a.b").unwrap().set(2).unwrap();
            assert_eq!(ctx.use_store_state("a.b").unwrap(), Some(Value::Int(2)));
            let (current, _) = ctx.use_store("a.b").unwrap();
            assert_eq!(current, Some(Value::Int(2)));
        });
    }

    #[test]
    fn server_render_reads_initial_state() {
        let ctx = ctx();
        ctx.provide(|| {
            ctx.use_store_updater("a.b").unwrap().set(2).unwrap();
            let initial = with_external_sync(Rc::new(ServerRender), || ctx.use_store_state("a.b"));
            assert_eq!(initial.unwrap(), Some(Value::Int(1)));
            assert_eq!(ctx.store().unwrap().listener_count(), 0);
        });
    }

    #[test]
    fn typed_path_builder_checks_shape() {
        let ctx = ctx();
        assert!(ctx.path::<i64>("a.b").is_ok());
        assert!(ctx.path::<Value>("maybe.deep.key").is_ok());
        assert!(matches!(
            ctx.path::<i64>("a.c"),
            Err(StoreError::UnknownPath { .. })
        ));
        assert!(matches!(
            ctx.path::<i64>("a..b"),
            Err(StoreError::InvalidPath { .. })
        ));
        assert_eq!(
            ctx.path::<String>("a.b").unwrap_err(),
            StoreError::TypeMismatch {
                path: "a.b".into(),
                expected: "string"
            }
        );
        // A null slot has no type yet.
        assert!(ctx.path::<String>("maybe").is_ok());
    }

    #[test]
    fn typed_updater_writes_its_own_type() {
        let ctx = ctx();
        let b: TypedPath<i64> = ctx.path("a.b").unwrap();
        ctx.provide(|| {
            let (current, set_b) = ctx.use_store(&b).unwrap();
            assert_eq!(current, 1);
            set_b.set(7).unwrap();
            set_b.update(|v| v.and_then(Value::as_i64).unwrap_or(0) * 2).unwrap();
            assert_eq!(ctx.use_store_state(&b), Ok(14));
        });
    }

    #[test]
    fn typed_read_reports_mismatch() {
        let ctx = ctx();
        // Built unchecked, so the mismatch only shows up on read.
        let as_text: TypedPath<String> = TypedPath::parse("a.b").unwrap();
        let maybe: TypedPath<Option<i64>> = ctx.path("maybe").unwrap();
        ctx.provide(|| {
            assert_eq!(
                ctx.use_store_state(&as_text),
                Err(StoreError::TypeMismatch {
                    path: "a.b".into(),
                    expected: "string"
                })
            );
            assert_eq!(ctx.use_store_state(&maybe), Ok(None));
        });
    }

    #[test]
    fn validate_paths_option_rejects_unknown_string_paths() {
        let ctx = StoreContext::with_options(
            Value::map([("a", 1)]),
            StoreOptions::default().label("strict").validate_paths(true),
        );
        ctx.provide(|| {
            assert!(matches!(
                ctx.use_store_updater("b"),
                Err(StoreError::UnknownPath { .. })
            ));
            assert!(ctx.use_store_updater("a").is_ok());
        });
    }

    #[test]
    fn nested_provider_shadows_outer() {
        let ctx = ctx();
        ctx.provide(|| {
            let outer = ctx.store().unwrap();
            ctx.provide(|| {
                let inner = ctx.store().unwrap();
                assert!(!inner.ptr_eq(&outer));
            });
            assert!(ctx.store().unwrap().ptr_eq(&outer));
        });
    }

    #[test]
    fn provide_scope_reenters_long_lived_scope() {
        let ctx = ctx();
        let scope = ctx.create_scope();
        ctx.provide_scope(&scope, || ctx.use_store_updater("a.b").unwrap().set(5).unwrap());
        let seen = ctx.provide_scope(&scope, || ctx.use_store_state("a.b").unwrap());
        assert_eq!(seen, Some(Value::Int(5)));
        assert!(ctx.store().is_err());
        scope.dispose();
    }

    #[test]
    fn disposing_scope_drops_listeners() {
        let ctx = ctx();
        let scope = ctx.create_scope();
        let _u = scope.store().subscribe_fn(|| {});
        assert_eq!(scope.store().listener_count(), 1);
        let store = scope.store().clone();
        scope.dispose();
        assert_eq!(store.listener_count(), 0);
    }
}
