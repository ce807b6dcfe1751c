use std::cell::RefCell;
use std::rc::Rc;

use web_time::Instant;

use crispy_core::{Path, Store, Unsubscribe, Value};

/// Write statistics for one store, fed by its change notifications.
pub struct Hud {
    notifications: u64,
    last_change: Option<Instant>,
    rate_smooth: f32,
    pub last_tree: Option<Value>,
}

impl Default for Hud {
    fn default() -> Self {
        Self::new()
    }
}

impl Hud {
    pub fn new() -> Self {
        Self {
            notifications: 0,
            last_change: None,
            rate_smooth: 0.0,
            last_tree: None,
        }
    }

    pub fn notifications(&self) -> u64 {
        self.notifications
    }

    /// Smoothed notifications per second.
    pub fn rate(&self) -> f32 {
        self.rate_smooth
    }

    fn record(&mut self, tree: Value) {
        self.notifications += 1;
        let now = Instant::now();
        if let Some(prev) = self.last_change.replace(now) {
            let dt = (now - prev).as_secs_f32();
            if dt > 0.0 {
                let rate = 1.0 / dt;
                // simple EMA
                let a = 0.2;
                self.rate_smooth = if self.rate_smooth == 0.0 {
                    rate
                } else {
                    (1.0 - a) * self.rate_smooth + a * rate
                };
            }
        }
        self.last_tree = Some(tree);
    }
}

/// Watches a store from the outside, like any other listener.
pub struct Inspector {
    store: Store,
    hud: Rc<RefCell<Hud>>,
    unsubscribe: Option<Unsubscribe>,
}

impl Inspector {
    pub fn attach(store: &Store) -> Self {
        let hud = Rc::new(RefCell::new(Hud::new()));
        let unsubscribe = {
            let (hud, watched) = (hud.clone(), store.clone());
            store.subscribe_fn(move || hud.borrow_mut().record(watched.snapshot()))
        };
        log::debug!("inspector attached to {:?}", store);
        Self {
            store: store.clone(),
            hud,
            unsubscribe: Some(unsubscribe),
        }
    }

    pub fn detach(&mut self) {
        if let Some(u) = self.unsubscribe.take() {
            u.run();
            log::debug!("inspector detached from {:?}", self.store);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.unsubscribe.is_some()
    }

    pub fn notifications(&self) -> u64 {
        self.hud.borrow().notifications()
    }

    pub fn last_tree(&self) -> Option<Value> {
        self.hud.borrow().last_tree.clone()
    }

    /// Current value at `path` in the live tree.
    pub fn peek(&self, path: &str) -> Option<Value> {
        Path::parse(path).ok().and_then(|p| self.store.get(&p))
    }

    pub fn overlay_lines(&self) -> Vec<String> {
        let hud = self.hud.borrow();
        let mut lines = vec![
            format!("store: {}#{}", self.store.label(), self.store.id()),
            format!("listeners: {}", self.store.listener_count()),
            format!("notifications: {}", hud.notifications()),
        ];
        if hud.rate() > 0.0 {
            lines.push(format!("rate: {:.1}/s", hud.rate()));
        }
        if let Some(tree) = &hud.last_tree {
            lines.push(format!("tree: {tree:?}"));
        }
        lines
    }
}

impl Drop for Inspector {
    fn drop(&mut self) {
        self.detach();
    }
}
