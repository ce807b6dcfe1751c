//! # Scheduler contract
//!
//! Read bindings do not re-run consumers themselves. They hand an
//! [`ExternalSync`] implementation (the host's scheduler) two things:
//!
//! - a subscribe function: register a zero‑argument change listener, get an
//!   [`Unsubscribe`] back;
//! - a snapshot getter: read the slice the consumer cares about from the live
//!   store.
//!
//! On every change notification the scheduler re‑reads the snapshot and
//! decides, by its own equality check, whether the consumer has to run
//! again. A third getter, the *server snapshot*, reads from the initial state
//! and is used when rendering happens before any subscription can exist
//! (install [`ServerRender`] for that).
//!
//! With no scheduler installed, [`use_sync_external_store`] reads the live
//! snapshot once and subscribes to nothing.

use std::rc::Rc;

use crate::locals::{LocalKey, local, with_local};
use crate::registry::{Listener, Unsubscribe};
use crate::value::Value;

pub type SubscribeFn = Rc<dyn Fn(Listener) -> Unsubscribe>;
pub type SnapshotFn = Rc<dyn Fn() -> Option<Value>>;

pub trait ExternalSync {
    /// Starts (or keeps) tracking a source and returns its current snapshot.
    fn track(
        &self,
        subscribe: SubscribeFn,
        get_snapshot: SnapshotFn,
        get_server_snapshot: SnapshotFn,
    ) -> Option<Value>;
}

/// Renders without subscribing; every read yields the server snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerRender;

impl ExternalSync for ServerRender {
    fn track(&self, _: SubscribeFn, _: SnapshotFn, get_server_snapshot: SnapshotFn) -> Option<Value> {
        get_server_snapshot()
    }
}

/// Installs `sync` as the ambient scheduler while `f` runs.
pub fn with_external_sync<R>(sync: Rc<dyn ExternalSync>, f: impl FnOnce() -> R) -> R {
    with_local(LocalKey::ExternalSync, Rc::new(sync), f)
}

pub fn current_external_sync() -> Option<Rc<dyn ExternalSync>> {
    local::<Rc<dyn ExternalSync>>(LocalKey::ExternalSync)
}

/// Tracks a source through the ambient scheduler. Without one, returns the
/// live snapshot untracked.
pub fn use_sync_external_store(
    subscribe: SubscribeFn,
    get_snapshot: SnapshotFn,
    get_server_snapshot: SnapshotFn,
) -> Option<Value> {
    match current_external_sync() {
        Some(sync) => sync.track(subscribe, get_snapshot, get_server_snapshot),
        None => get_snapshot(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct LiveOnly {
        tracked: Cell<u32>,
    }

    impl ExternalSync for LiveOnly {
        fn track(&self, _: SubscribeFn, get_snapshot: SnapshotFn, _: SnapshotFn) -> Option<Value> {
            self.tracked.set(self.tracked.get() + 1);
            get_snapshot()
        }
    }

    fn getters() -> (SubscribeFn, SnapshotFn, SnapshotFn) {
        (
            Rc::new(|_| Unsubscribe::new(|| {})),
            Rc::new(|| Some(Value::from("live"))),
            Rc::new(|| Some(Value::from("initial"))),
        )
    }

    #[test]
    fn without_scheduler_reads_live_snapshot() {
        let (sub, live, server) = getters();
        assert_eq!(use_sync_external_store(sub, live, server), Some(Value::from("live")));
    }

    #[test]
    fn server_render_reads_server_snapshot() {
        let (sub, live, server) = getters();
        let got = with_external_sync(Rc::new(ServerRender), || {
            use_sync_external_store(sub, live, server)
        });
        assert_eq!(got, Some(Value::from("initial")));
    }

    #[test]
    fn ambient_scheduler_is_used() {
        let sync = Rc::new(LiveOnly {
            tracked: Cell::new(0),
        });
        let (sub, live, server) = getters();
        let got = with_external_sync(sync.clone(), || use_sync_external_store(sub, live, server));
        assert_eq!(got, Some(Value::from("live")));
        assert_eq!(sync.tracked.get(), 1);
        assert!(current_external_sync().is_none());
    }
}
