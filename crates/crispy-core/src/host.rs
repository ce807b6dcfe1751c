//! # Reference consumer host
//!
//! A small scheduler for code that is not running under a UI framework (and
//! for tests). A [`Consumer`] owns a render closure; while it renders, it is
//! the ambient [`ExternalSync`], so every read binding it calls becomes a
//! tracked slot:
//!
//! ```rust
//! use crispy_core::*;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let ctx = StoreContext::new(Value::map([("count", 0), ("other", 0)]));
//! let scope = ctx.create_scope();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let consumer = scope.enter(|| {
//!     let (ctx, seen) = (ctx.clone(), seen.clone());
//!     Consumer::mount(move || {
//!         let count = ctx.use_store_state("count").unwrap();
//!         seen.borrow_mut().push(count);
//!     })
//! });
//!
//! let set_count = scope.enter(|| ctx.use_store_updater("count")).unwrap();
//! let set_other = scope.enter(|| ctx.use_store_updater("other")).unwrap();
//! set_count.set(1).unwrap();
//! set_other.set(5).unwrap(); // notified, but `count` did not change: no re-render
//!
//! assert_eq!(*seen.borrow(), [Some(Value::Int(0)), Some(Value::Int(1))]);
//! consumer.unmount();
//! ```
//!
//! Slots are positional (the Nth `track` call of a render is slot N), so the
//! bindings a consumer calls should not change between renders.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::locals::LocalsSnapshot;
use crate::registry::Listener;
use crate::scope::{Scope, current_scope};
use crate::sync::{ExternalSync, SnapshotFn, SubscribeFn, with_external_sync};
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct ConsumerOptions {
    pub label: String,
    /// Re-renders allowed in one flush before the host gives up.
    pub max_render_passes: usize,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            label: "consumer".to_string(),
            max_render_passes: 16,
        }
    }
}

impl ConsumerOptions {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn max_render_passes(mut self, passes: usize) -> Self {
        self.max_render_passes = passes.max(1);
        self
    }
}

#[derive(Clone)]
pub struct Consumer(Rc<ConsumerInner>);

struct ConsumerInner {
    options: ConsumerOptions,
    scope: Scope,
    /// Child of `scope` for the latest render; consumers mounted while
    /// rendering live in it and go away with the next render.
    render_scope: RefCell<Option<Scope>>,
    /// Providers visible at mount; re-entered on every render.
    locals: LocalsSnapshot,
    render: RefCell<Option<Box<dyn FnMut()>>>,
    slots: RefCell<Vec<Rc<Slot>>>,
    cursor: Cell<usize>,
    rendering: Cell<bool>,
    dirty: Cell<bool>,
    mounted: Cell<bool>,
    renders: Cell<u64>,
}

struct Slot {
    last: RefCell<Option<Value>>,
    get_snapshot: RefCell<SnapshotFn>,
}

impl Consumer {
    pub fn mount(render: impl FnMut() + 'static) -> Consumer {
        Self::mount_with(ConsumerOptions::default(), render)
    }

    /// Renders once immediately. The stores visible here stay visible to later
    /// renders. Mounted inside another scope, the consumer's scope becomes a
    /// child of it and is unmounted along with it; mounted from another
    /// consumer's render, it lasts until that consumer renders again.
    pub fn mount_with(options: ConsumerOptions, render: impl FnMut() + 'static) -> Consumer {
        let scope = match current_scope() {
            Some(parent) => parent.child(),
            None => Scope::new(),
        };
        let consumer = Consumer(Rc::new(ConsumerInner {
            options,
            scope,
            render_scope: RefCell::new(None),
            locals: LocalsSnapshot::capture(),
            render: RefCell::new(Some(Box::new(render))),
            slots: RefCell::new(Vec::new()),
            cursor: Cell::new(0),
            rendering: Cell::new(false),
            dirty: Cell::new(false),
            mounted: Cell::new(true),
            renders: Cell::new(0),
        }));

        let weak: Weak<ConsumerInner> = Rc::downgrade(&consumer.0);
        consumer.0.scope.add_disposer(move || {
            if let Some(inner) = weak.upgrade() {
                inner.mounted.set(false);
            }
        });

        log::debug!("[{}] mounted", consumer.0.options.label);
        consumer.flush();
        consumer
    }

    /// Unsubscribes every slot; the render closure never runs again.
    pub fn unmount(&self) {
        if !self.0.mounted.get() {
            return;
        }
        self.0.scope.clone().dispose();
        self.0.slots.borrow_mut().clear();
        // Dropped lazily when a render is in progress.
        if let Ok(mut render) = self.0.render.try_borrow_mut() {
            render.take();
        }
        log::debug!("[{}] unmounted", self.0.options.label);
    }

    pub fn is_mounted(&self) -> bool {
        self.0.mounted.get()
    }

    pub fn render_count(&self) -> u64 {
        self.0.renders.get()
    }

    /// Re-renders regardless of snapshots.
    pub fn rerender(&self) {
        self.0.dirty.set(true);
        self.flush();
    }

    fn flush(&self) {
        let inner = &self.0;
        if inner.rendering.get() {
            // Picked up by the running loop.
            inner.dirty.set(true);
            return;
        }
        // Reset on unwind too, so a panicking render does not wedge the consumer.
        struct Settle<'a>(&'a ConsumerInner);
        impl Drop for Settle<'_> {
            fn drop(&mut self) {
                self.0.rendering.set(false);
            }
        }

        inner.rendering.set(true);
        let _settle = Settle(inner);
        let mut passes = 0;
        loop {
            inner.dirty.set(false);
            if !inner.mounted.get() {
                break;
            }
            self.render_once();
            passes += 1;
            if !inner.dirty.get() {
                break;
            }
            if passes >= inner.options.max_render_passes {
                log::warn!(
                    "[{}] still dirty after {passes} render passes; giving up until the next change",
                    inner.options.label
                );
                inner.dirty.set(false);
                break;
            }
        }
    }

    fn render_once(&self) {
        // Hands the closure back once the render is over, unwinding or not.
        struct Restore<'a> {
            inner: &'a ConsumerInner,
            render: Option<Box<dyn FnMut()>>,
        }
        impl Drop for Restore<'_> {
            fn drop(&mut self) {
                if self.inner.mounted.get() {
                    *self.inner.render.borrow_mut() = self.render.take();
                }
            }
        }

        let inner: &ConsumerInner = &self.0;
        let render = inner.render.borrow_mut().take();
        let mut restore = Restore { inner, render };
        let Some(render) = restore.render.as_mut() else {
            return;
        };

        let previous = inner.render_scope.borrow_mut().take();
        if let Some(previous) = previous {
            previous.dispose();
        }
        let render_scope = inner.scope.child();
        *inner.render_scope.borrow_mut() = Some(render_scope.clone());

        inner.cursor.set(0);
        let sync: Rc<dyn ExternalSync> = Rc::new(self.clone());
        inner
            .locals
            .enter(|| render_scope.run(|| with_external_sync(sync, render)));
        inner.renders.set(inner.renders.get() + 1);
        log::trace!("[{}] render #{}", inner.options.label, inner.renders.get());
    }

    fn on_change(inner: &Rc<ConsumerInner>, slot: &Slot) {
        let get = slot.get_snapshot.borrow().clone();
        let next = get();
        if *slot.last.borrow() == next {
            return;
        }
        inner.dirty.set(true);
        Consumer(inner.clone()).flush();
    }
}

impl ExternalSync for Consumer {
    fn track(
        &self,
        subscribe: SubscribeFn,
        get_snapshot: SnapshotFn,
        _get_server_snapshot: SnapshotFn,
    ) -> Option<Value> {
        let inner = &self.0;
        let index = inner.cursor.get();
        inner.cursor.set(index + 1);

        let value = get_snapshot();
        let existing = inner.slots.borrow().get(index).cloned();
        if let Some(slot) = existing {
            *slot.get_snapshot.borrow_mut() = get_snapshot;
            *slot.last.borrow_mut() = value.clone();
            return value;
        }

        let slot = Rc::new(Slot {
            last: RefCell::new(value.clone()),
            get_snapshot: RefCell::new(get_snapshot),
        });
        let listener: Listener = {
            let consumer = Rc::downgrade(inner);
            let slot = Rc::downgrade(&slot);
            Rc::new(move || {
                if let (Some(consumer), Some(slot)) = (consumer.upgrade(), slot.upgrade()) {
                    Consumer::on_change(&consumer, &slot);
                }
            })
        };
        let unsubscribe = subscribe(listener);
        inner.scope.add_disposer(move || unsubscribe.run());
        inner.slots.borrow_mut().push(slot);
        value
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("label", &self.0.options.label)
            .field("mounted", &self.0.mounted.get())
            .field("renders", &self.0.renders.get())
            .finish()
    }
}
