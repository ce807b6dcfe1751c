use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use slotmap::SlotMap;

slotmap::new_key_type! {
    struct ChildKey;
}

thread_local! {
    static CURRENT_SCOPE: RefCell<Option<Weak<ScopeInner>>> = const { RefCell::new(None) };
}

/// Lifetime of a provider or a consumer. Collects cleanups and child scopes,
/// and runs them on `dispose` (children first).
///
/// A disposed child leaves its parent, so short-lived children (one per
/// render, say) do not pile up under a long-lived parent.
pub struct Scope {
    inner: Rc<ScopeInner>,
}

struct ScopeInner {
    disposers: RefCell<Vec<Box<dyn FnOnce()>>>,
    children: RefCell<SlotMap<ChildKey, Scope>>,
    parent: Option<(Weak<ScopeInner>, ChildKey)>,
    disposed: Cell<bool>,
}

impl ScopeInner {
    fn new(parent: Option<(Weak<ScopeInner>, ChildKey)>) -> Rc<Self> {
        Rc::new(Self {
            disposers: RefCell::new(Vec::new()),
            children: RefCell::new(SlotMap::with_key()),
            parent,
            disposed: Cell::new(false),
        })
    }

    fn run_disposers(&self) {
        let disposers = std::mem::take(&mut *self.disposers.borrow_mut());
        for disposer in disposers {
            disposer();
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            inner: ScopeInner::new(None),
        }
    }

    /// Runs `f` with this scope as the current one.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        // Restores the previous scope on unwind too.
        struct Restore(Option<Weak<ScopeInner>>);
        impl Drop for Restore {
            fn drop(&mut self) {
                let prev = self.0.take();
                CURRENT_SCOPE.with(|current| *current.borrow_mut() = prev);
            }
        }

        let prev = CURRENT_SCOPE.with(|current| {
            current
                .borrow_mut()
                .replace(Rc::downgrade(&self.inner))
        });
        let _restore = Restore(prev);
        f()
    }

    /// On an already disposed scope the disposer runs immediately.
    pub fn add_disposer(&self, disposer: impl FnOnce() + 'static) {
        if self.inner.disposed.get() {
            disposer();
            return;
        }
        self.inner.disposers.borrow_mut().push(Box::new(disposer));
    }

    /// A child of a disposed scope starts out disposed.
    pub fn child(&self) -> Scope {
        let parent = Rc::downgrade(&self.inner);
        let child = {
            let mut children = self.inner.children.borrow_mut();
            let key = children.insert_with_key(|key| Scope {
                inner: ScopeInner::new(Some((parent, key))),
            });
            children[key].clone()
        };
        if self.inner.disposed.get() {
            child.clone().dispose();
        }
        child
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Disposing twice is a no-op the second time.
    pub fn dispose(self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        if let Some((parent, key)) = &self.inner.parent
            && let Some(parent) = parent.upgrade()
        {
            parent.children.borrow_mut().remove(*key);
        }

        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        for (_, child) in children {
            child.dispose();
        }
        self.inner.run_disposers();
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Clone for Scope {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub fn current_scope() -> Option<Scope> {
    CURRENT_SCOPE.with(|current| {
        current
            .borrow()
            .as_ref()
            .and_then(|weak| weak.upgrade().map(|inner| Scope { inner }))
    })
}

// Last handle gone without `dispose`: children are only released, own
// disposers still run.
impl Drop for ScopeInner {
    fn drop(&mut self) {
        if !self.disposed.replace(true) {
            self.run_disposers();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn dispose_runs_children_first_and_once() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let parent = Scope::new();
        let child = parent.child();

        let o = order.clone();
        parent.add_disposer(move || o.borrow_mut().push("parent"));
        let o = order.clone();
        child.add_disposer(move || o.borrow_mut().push("child"));

        parent.clone().dispose();
        parent.dispose();
        assert_eq!(*order.borrow(), ["child", "parent"]);
    }

    #[test]
    fn run_installs_and_restores_current_scope() {
        assert!(current_scope().is_none());
        let outer = Scope::new();
        let inner = Scope::new();
        outer.run(|| {
            assert!(current_scope().is_some_and(|s| s.ptr_eq(&outer)));
            inner.run(|| assert!(current_scope().is_some_and(|s| s.ptr_eq(&inner))));
            assert!(current_scope().is_some_and(|s| s.ptr_eq(&outer)));
        });
        assert!(current_scope().is_none());
    }

    #[test]
    fn disposed_child_leaves_parent() {
        let parent = Scope::new();
        for _ in 0..4 {
            parent.child().dispose();
        }
        let kept = parent.child();
        assert_eq!(parent.child_count(), 1);

        parent.clone().dispose();
        assert!(kept.is_disposed());
        assert_eq!(parent.child_count(), 0);
    }

    #[test]
    fn late_disposer_runs_immediately() {
        let scope = Scope::new();
        scope.clone().dispose();
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        scope.add_disposer(move || r.set(true));
        assert!(ran.get());
        assert!(scope.child().is_disposed());
    }

    #[test]
    fn dropping_last_handle_runs_disposers() {
        let ran = Rc::new(Cell::new(false));
        {
            let scope = Scope::new();
            let r = ran.clone();
            scope.add_disposer(move || r.set(true));
        }
        assert!(ran.get());
    }
}
