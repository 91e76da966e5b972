/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::{FrameCallbackSource, FrameClock, FrameClockPrefs, VsyncEvent, VsyncObserver};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ObserverId(u64);

/// Input observers are notified before render observers. Only render observers
/// care about refresh rate changes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObserverKind {
    Input,
    Render,
}

type ObserverList = Vec<(ObserverId, Arc<dyn VsyncObserver>)>;

#[derive(Default)]
struct Observers {
    input: ObserverList,
    render: ObserverList,
    next_id: u64,
    observing: bool,
}

impl Observers {
    fn is_empty(&self) -> bool {
        self.input.is_empty() && self.render.is_empty()
    }
}

#[derive(Default)]
struct SharedObservers(Mutex<Observers>);

impl VsyncObserver for SharedObservers {
    fn on_vsync(&self, event: &VsyncEvent) {
        let observers: Vec<_> = {
            let observers = self.0.lock();
            observers
                .input
                .iter()
                .chain(observers.render.iter())
                .map(|(_, observer)| observer.clone())
                .collect()
        };
        for observer in observers {
            observer.on_vsync(event);
        }
    }
}

/// Shares one [`FrameClock`] between any number of observers. The clock observes
/// for as long as at least one observer is registered.
pub struct VsyncDispatcher {
    clock: Arc<FrameClock>,
    observers: Arc<SharedObservers>,
}

impl VsyncDispatcher {
    pub fn new(source: Arc<dyn FrameCallbackSource>, prefs: &FrameClockPrefs) -> VsyncDispatcher {
        let observers = Arc::new(SharedObservers::default());
        let clock = FrameClock::new(source, observers.clone(), prefs);
        VsyncDispatcher { clock, observers }
    }

    pub fn register_observer(
        &self,
        observer: Arc<dyn VsyncObserver>,
        kind: ObserverKind,
    ) -> ObserverId {
        let mut observers = self.observers.0.lock();
        let id = ObserverId(observers.next_id);
        observers.next_id += 1;
        match kind {
            ObserverKind::Input => observers.input.push((id, observer)),
            ObserverKind::Render => observers.render.push((id, observer)),
        }
        self.update_observing(&mut observers);
        id
    }

    /// Returns `false` if no observer is registered under `id`.
    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.0.lock();
        let before = observers.input.len() + observers.render.len();
        observers.input.retain(|(observer_id, _)| *observer_id != id);
        observers.render.retain(|(observer_id, _)| *observer_id != id);
        let removed = observers.input.len() + observers.render.len() != before;
        if removed {
            self.update_observing(&mut observers);
        }
        removed
    }

    pub fn notify_refresh_rate_changed(&self) {
        let render_observers: Vec<_> = self
            .observers
            .0
            .lock()
            .render
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in render_observers {
            observer.on_refresh_rate_changed();
        }
    }

    pub fn is_observing(&self) -> bool {
        self.observers.0.lock().observing
    }

    /// The clock driving this dispatcher.
    pub fn clock(&self) -> &Arc<FrameClock> {
        &self.clock
    }

    fn update_observing(&self, observers: &mut Observers) {
        let should_observe = !observers.is_empty();
        if should_observe != observers.observing {
            observers.observing = self.clock.observe(should_observe);
            debug!("Vsync observation is now {}", observers.observing);
        }
    }
}

impl Drop for VsyncDispatcher {
    fn drop(&mut self) {
        let mut observers = self.observers.0.lock();
        observers.input.clear();
        observers.render.clear();
        self.update_observing(&mut observers);
    }
}
