use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use slotmap::SlotMap;
use smallvec::SmallVec;

slotmap::new_key_type! {
    pub struct ListenerKey;
}

/// "Something may have changed, re-evaluate your slice."
pub type Listener = Rc<dyn Fn()>;

/// Set of listeners, keyed by `Rc` identity.
#[derive(Default)]
pub struct Registry {
    listeners: SlotMap<ListenerKey, Listener>,
    by_identity: HashMap<*const (), ListenerKey>,
}

fn identity(listener: &Listener) -> *const () {
    Rc::as_ptr(listener) as *const ()
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adding a listener that is already registered returns its existing key.
    pub fn add(&mut self, listener: Listener) -> ListenerKey {
        let id = identity(&listener);
        if let Some(&key) = self.by_identity.get(&id) {
            return key;
        }
        let key = self.listeners.insert(listener);
        self.by_identity.insert(id, key);
        key
    }

    /// Returns whether the key was present. Removing twice is fine.
    pub fn remove(&mut self, key: ListenerKey) -> bool {
        match self.listeners.remove(key) {
            Some(listener) => {
                self.by_identity.remove(&identity(&listener));
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: ListenerKey) -> bool {
        self.listeners.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
        self.by_identity.clear();
    }

    fn snapshot(&self) -> SmallVec<[(ListenerKey, Listener); 8]> {
        self.listeners
            .iter()
            .map(|(k, l)| (k, l.clone()))
            .collect()
    }
}

/// Invokes every registered listener once.
///
/// The set is snapshotted first and the registry is not borrowed while a
/// listener runs, so listeners may (un)subscribe or write re-entrantly.
/// Listeners added during the pass are not called by it; listeners removed
/// during the pass are skipped if they have not run yet.
pub fn notify_all(registry: &RefCell<Registry>) -> usize {
    let snapshot = registry.borrow().snapshot();
    let mut called = 0;
    for (key, listener) in snapshot {
        if registry.borrow().contains(key) {
            listener();
            called += 1;
        }
    }
    called
}

/// Handle returned by `subscribe`; removes the listener when run.
#[derive(Clone)]
pub struct Unsubscribe(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    /// Runs at most once (safe to call multiple times).
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }

    pub fn is_done(&self) -> bool {
        self.0.borrow().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, Listener) {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        (hits, Rc::new(move || h.set(h.get() + 1)))
    }

    #[test]
    fn duplicate_add_is_idempotent() {
        let mut reg = Registry::new();
        let (hits, l) = counter();
        let k1 = reg.add(l.clone());
        let k2 = reg.add(l);
        assert_eq!(k1, k2);
        assert_eq!(reg.len(), 1);

        let reg = RefCell::new(reg);
        notify_all(&reg);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn removed_listener_can_be_added_again() {
        let mut reg = Registry::new();
        let (_, l) = counter();
        let first = reg.add(l.clone());
        reg.remove(first);
        let second = reg.add(l.clone());
        assert_ne!(first, second);
        assert_eq!(reg.add(l), second);
        assert_eq!(reg.len(), 1);

        reg.clear();
        let (_, other) = counter();
        reg.add(other);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut reg = Registry::new();
        let (_, l) = counter();
        let k = reg.add(l);
        assert!(reg.remove(k));
        assert!(!reg.remove(k));
        assert!(reg.is_empty());
    }

    #[test]
    fn listener_removed_mid_pass_is_skipped() {
        let reg = Rc::new(RefCell::new(Registry::new()));
        let doomed: Rc<RefCell<Vec<ListenerKey>>> = Rc::default();

        // Registered first, so it runs before the listeners it removes.
        let remover: Listener = {
            let (r, doomed) = (reg.clone(), doomed.clone());
            Rc::new(move || {
                for key in doomed.borrow().iter() {
                    r.borrow_mut().remove(*key);
                }
            })
        };
        reg.borrow_mut().add(remover);

        let (hits_a, a) = counter();
        let (hits_b, b) = counter();
        let ka = reg.borrow_mut().add(a);
        let kb = reg.borrow_mut().add(b);
        doomed.borrow_mut().extend([ka, kb]);

        assert_eq!(notify_all(&reg), 1);
        assert_eq!(hits_a.get() + hits_b.get(), 0);
        assert_eq!(reg.borrow().len(), 1);
    }

    #[test]
    fn listener_added_mid_pass_waits_for_next_pass() {
        let reg = Rc::new(RefCell::new(Registry::new()));
        let (late_hits, late) = counter();
        let r = reg.clone();
        let adder: Listener = Rc::new(move || {
            r.borrow_mut().add(late.clone());
        });
        reg.borrow_mut().add(adder);

        notify_all(&reg);
        assert_eq!(late_hits.get(), 0);
        notify_all(&reg);
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn unsubscribe_runs_once() {
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        let u = Unsubscribe::new(move || r.set(r.get() + 1));
        let u2 = u.clone();
        u.run();
        u2.run();
        assert_eq!(runs.get(), 1);
        assert!(u.is_done());
    }
}
