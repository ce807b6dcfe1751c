//! # Stores
//!
//! A [`Store`] is the object every consumer inside one scope talks to. It
//! holds the live tree and the listener registry, and offers three
//! operations:
//!
//! - `get(path)`: read a slice of the live tree.
//! - `make_setter(path)`: a [`Setter`] that writes the slice and then
//!   notifies *every* listener of the store.
//! - `subscribe(listener)`: register a listener; returns an [`Unsubscribe`].
//!
//! ```rust
//! use crispy_core::*;
//! use std::rc::Rc;
//!
//! let store = Store::new(Rc::new(Value::map([("a", Value::map([("b", 1)]))])));
//! let path = Path::parse("a.b").unwrap();
//!
//! let unsubscribe = store.subscribe_fn(|| log::info!("changed"));
//! store.make_setter(path.clone()).set(2).unwrap();
//! assert_eq!(store.get(&path), Some(Value::Int(2)));
//! unsubscribe.run();
//! ```
//!
//! Fan‑out is scope‑wide: a write to `a.b` also wakes a listener that only
//! cares about `c`. Consumers filter by comparing snapshots (see
//! [`ExternalSync`](crate::ExternalSync)).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::error::Result;
use crate::path::{Path, resolve_read, resolve_write};
use crate::registry::{Listener, Registry, Unsubscribe, notify_all};
use crate::value::Value;

thread_local! {
    static NEXT_STORE_ID: Cell<u64> = const { Cell::new(1) };
}

pub type StoreId = u64;

#[derive(Clone)]
pub struct Store(Rc<StoreInner>);

struct StoreInner {
    id: StoreId,
    label: Rc<str>,
    initial: Rc<Value>,
    tree: RefCell<Value>,
    registry: RefCell<Registry>,
}

impl Store {
    pub fn new(initial: Rc<Value>) -> Self {
        Self::with_label(initial, "store")
    }

    /// Seeds the live tree with a copy of `initial`; `initial` itself is never written.
    pub fn with_label(initial: Rc<Value>, label: impl Into<Rc<str>>) -> Self {
        let id = NEXT_STORE_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            id
        });
        let label = label.into();
        log::debug!("[{label}#{id}] store created");
        Self(Rc::new(StoreInner {
            id,
            label,
            tree: RefCell::new((*initial).clone()),
            initial,
            registry: RefCell::new(Registry::new()),
        }))
    }

    pub fn id(&self) -> StoreId {
        self.0.id
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn initial(&self) -> &Value {
        &self.0.initial
    }

    pub fn get(&self, path: &Path) -> Option<Value> {
        self.read(path, |v| v.cloned())
    }

    /// Borrowing read; `f` must not write to this store.
    pub fn read<R>(&self, path: &Path, f: impl FnOnce(Option<&Value>) -> R) -> R {
        log::trace!("[{}#{}] get {path}", self.0.label, self.0.id);
        let tree = self.0.tree.borrow();
        f(resolve_read(&tree, path))
    }

    pub fn make_setter(&self, path: Path) -> Setter {
        Setter::new(self.clone(), path)
    }

    pub fn subscribe(&self, listener: Listener) -> Unsubscribe {
        let key = self.0.registry.borrow_mut().add(listener);
        log::debug!(
            "[{}#{}] subscribed ({} listeners)",
            self.0.label,
            self.0.id,
            self.listener_count()
        );
        let weak: Weak<StoreInner> = Rc::downgrade(&self.0);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade()
                && inner.registry.borrow_mut().remove(key)
            {
                log::debug!("[{}#{}] unsubscribed", inner.label, inner.id);
            }
        })
    }

    pub fn subscribe_fn(&self, f: impl Fn() + 'static) -> Unsubscribe {
        self.subscribe(Rc::new(f))
    }

    pub fn listener_count(&self) -> usize {
        self.0.registry.borrow().len()
    }

    /// Copy of the whole live tree.
    pub fn snapshot(&self) -> Value {
        self.0.tree.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn write(&self, path: &Path, value: Value) -> Result<()> {
        let written = resolve_write(&mut self.0.tree.borrow_mut(), path, value);
        if let Err(e) = &written {
            log::warn!("[{}#{}] write rejected: {e}", self.0.label, self.0.id);
            return written;
        }
        let called = notify_all(&self.0.registry);
        log::trace!(
            "[{}#{}] set {path}, notified {called} listeners",
            self.0.label,
            self.0.id
        );
        Ok(())
    }

    pub(crate) fn clear_listeners(&self) {
        self.0.registry.borrow_mut().clear();
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.0.id)
            .field("label", &self.0.label)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Writes one path of a store. Cloning is cheap.
///
/// `T` is the type accepted by `set`. Untyped paths give a `Setter<Value>`;
/// a `TypedPath<T>` gives a `Setter<T>`, so only `T` can land in its slot.
///
/// ```compile_fail
/// use crispy_core::*;
///
/// let ctx = StoreContext::new(Value::map([("n", 1)]));
/// let n: TypedPath<i64> = ctx.path("n").unwrap();
/// ctx.provide(|| ctx.use_store_updater(&n).unwrap().set("not a number"));
/// ```
pub struct Setter<T = Value> {
    store: Store,
    path: Path,
    _ty: PhantomData<fn(T)>,
}

impl<T: Into<Value>> Setter<T> {
    pub(crate) fn new(store: Store, path: Path) -> Self {
        Self {
            store,
            path,
            _ty: PhantomData,
        }
    }

    /// Assigns `value` and notifies every listener of the store, whether or
    /// not the value changed.
    pub fn set(&self, value: impl Into<T>) -> Result<()> {
        let value: T = value.into();
        self.store.write(&self.path, value.into())
    }

    /// Functional update from the current value (`None` when absent).
    pub fn update(&self, f: impl FnOnce(Option<&Value>) -> T) -> Result<()> {
        let next = self.store.read(&self.path, f);
        self.store.write(&self.path, next.into())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            path: self.path.clone(),
            _ty: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Setter({} @ {:?})", self.path, self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;

    fn store(initial: Value) -> Store {
        Store::new(Rc::new(initial))
    }

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    fn ab() -> Value {
        Value::map([("a", Value::map([("b", 1)]))])
    }

    #[test]
    fn initial_snapshot_is_never_written() {
        let initial = Rc::new(ab());
        let s = Store::new(initial.clone());
        s.make_setter(p("a.b")).set(9).unwrap();
        assert_eq!(s.get(&p("a.b")), Some(Value::Int(9)));
        assert_eq!(*initial, ab());
        assert_eq!(s.initial(), &ab());
    }

    #[test]
    fn update_sees_current_value() {
        let s = store(ab());
        let set = s.make_setter(p("a.b"));
        set.update(|v| Value::Int(v.and_then(Value::as_i64).unwrap_or(0) + 10))
            .unwrap();
        assert_eq!(s.get(&p("a.b")), Some(Value::Int(11)));
    }

    #[test]
    fn failed_write_does_not_notify() {
        let s = store(Value::map([("a", Value::Null)]));
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let _u = s.subscribe_fn(move || h.set(h.get() + 1));

        let err = s.make_setter(p("a.b")).set(5).unwrap_err();
        assert!(matches!(err, StoreError::PathNotInitialized { .. }));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn unsubscribe_after_store_dropped_is_harmless() {
        let s = store(ab());
        let u = s.subscribe_fn(|| {});
        drop(s);
        u.run();
        u.run();
    }

    #[test]
    fn listener_can_write_reentrantly() {
        let s = store(Value::map([("n", 0), ("echo", 0)]));
        let s2 = s.clone();
        let _u = s.subscribe_fn(move || {
            let n = s2.get(&p("n"));
            if s2.get(&p("echo")) != n {
                s2.make_setter(p("echo")).set(n.unwrap_or_default()).unwrap();
            }
        });
        s.make_setter(p("n")).set(3).unwrap();
        assert_eq!(s.get(&p("echo")), Some(Value::Int(3)));
    }
}
