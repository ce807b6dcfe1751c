//! # Ambient locals
//!
//! Stores and the active scheduler are found by nested code through a
//! thread‑local stack of frames, the same way the closest enclosing provider
//! wins in a component tree:
//!
//! ```rust
//! use crispy_core::*;
//!
//! let ctx = StoreContext::new(Value::map([("n", 1)]));
//! ctx.provide(|| {
//!     // every binding of `ctx` called here resolves to this provider's store
//!     assert_eq!(ctx.use_store_state("n").unwrap(), Some(Value::Int(1)));
//! });
//! ```
//!
//! Frames are popped on unwind as well, so a panicking consumer never leaves
//! a stale store behind.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Identifies one `StoreContext`.
pub type ContextId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum LocalKey {
    Store(ContextId),
    ExternalSync,
}

type Frame = HashMap<LocalKey, Rc<dyn Any>>;

thread_local! {
    static LOCALS_STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

fn with_frame<R>(frame: Frame, f: impl FnOnce() -> R) -> R {
    // Non-panicking frame guard (ensures pop on unwind)
    struct Guard;
    impl Drop for Guard {
        fn drop(&mut self) {
            LOCALS_STACK.with(|st| {
                st.borrow_mut().pop();
            });
        }
    }

    LOCALS_STACK.with(|st| st.borrow_mut().push(frame));
    let _guard = Guard;
    f()
}

/// Pushes a frame holding `value` under `key`, runs `f`, pops the frame.
pub(crate) fn with_local<R>(key: LocalKey, value: Rc<dyn Any>, f: impl FnOnce() -> R) -> R {
    let mut frame = HashMap::new();
    frame.insert(key, value);
    with_frame(frame, f)
}

/// Innermost value stored under `key`, cloned out of the stack.
pub(crate) fn local<T: Clone + 'static>(key: LocalKey) -> Option<T> {
    LOCALS_STACK.with(|st| {
        for frame in st.borrow().iter().rev() {
            if let Some(v) = frame.get(&key)
                && let Some(t) = (**v).downcast_ref::<T>()
            {
                return Some(t.clone());
            }
        }
        None
    })
}

#[cfg(test)]
fn depth() -> usize {
    LOCALS_STACK.with(|st| st.borrow().len())
}

/// The stores visible at the point of capture, for code that runs later
/// (a consumer re-rendering on a change) but must see the same providers.
#[derive(Clone, Default)]
pub struct LocalsSnapshot(Frame);

impl LocalsSnapshot {
    /// Innermost providers win. The ambient scheduler is not captured.
    pub fn capture() -> Self {
        LOCALS_STACK.with(|st| {
            let mut merged = Frame::new();
            for frame in st.borrow().iter() {
                for (key, value) in frame {
                    if matches!(key, LocalKey::Store(_)) {
                        merged.insert(*key, value.clone());
                    }
                }
            }
            Self(merged)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        with_frame(self.0.clone(), f)
    }
}
