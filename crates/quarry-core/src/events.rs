//! Lifecycle events and observer hubs
//!
//! Observers return an [`Outcome`]; a `Veto` from a `before*` observer
//! cancels the operation. Vetoes from `after*` observers only stop the
//! remaining observers for that notification.

use crate::errors::{QuarryError, Result};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    AfterInitialize,
    AfterFind,
    BeforeSave,
    AfterSave,
    BeforeCreate,
    AfterCreate,
    BeforeDestroy,
    AfterDestroy,
    /// Another instance saved the row this synchronized instance mirrors
    SynchronizedSave,
    /// Another instance destroyed the row this synchronized instance mirrors
    SynchronizedDestroy,
}

impl LifecycleEvent {
    /// The eight lifecycle events, in pipeline order
    pub const LIFECYCLE: [LifecycleEvent; 8] = [
        LifecycleEvent::AfterInitialize,
        LifecycleEvent::AfterFind,
        LifecycleEvent::BeforeSave,
        LifecycleEvent::AfterSave,
        LifecycleEvent::BeforeCreate,
        LifecycleEvent::AfterCreate,
        LifecycleEvent::BeforeDestroy,
        LifecycleEvent::AfterDestroy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::AfterInitialize => "afterInitialize",
            LifecycleEvent::AfterFind => "afterFind",
            LifecycleEvent::BeforeSave => "beforeSave",
            LifecycleEvent::AfterSave => "afterSave",
            LifecycleEvent::BeforeCreate => "beforeCreate",
            LifecycleEvent::AfterCreate => "afterCreate",
            LifecycleEvent::BeforeDestroy => "beforeDestroy",
            LifecycleEvent::AfterDestroy => "afterDestroy",
            LifecycleEvent::SynchronizedSave => "synchronization:afterSave",
            LifecycleEvent::SynchronizedDestroy => "synchronization:afterDestroy",
        }
    }

    pub fn is_before(&self) -> bool {
        matches!(
            self,
            LifecycleEvent::BeforeSave | LifecycleEvent::BeforeCreate | LifecycleEvent::BeforeDestroy
        )
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LifecycleEvent {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        LifecycleEvent::LIFECYCLE
            .iter()
            .chain([
                LifecycleEvent::SynchronizedSave,
                LifecycleEvent::SynchronizedDestroy,
            ].iter())
            .find(|event| event.name() == s)
            .copied()
            .ok_or_else(|| QuarryError::invalid_input(format!("unknown lifecycle event '{}'", s)))
    }
}

/// Result of one observer call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Veto,
}

impl Outcome {
    pub fn is_veto(&self) -> bool {
        *self == Outcome::Veto
    }
}

impl From<bool> for Outcome {
    fn from(proceed: bool) -> Self {
        if proceed {
            Outcome::Continue
        } else {
            Outcome::Veto
        }
    }
}

/// Handle returned by `observe`, used to stop observing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub type Observer<T> = Rc<dyn Fn(&T) -> Result<Outcome>>;

struct Entry<T> {
    id: ObserverId,
    event: LifecycleEvent,
    once: bool,
    observer: Observer<T>,
}

/// Ordered observer registry for one subject type
pub struct EventHub<T> {
    entries: RefCell<Vec<Entry<T>>>,
    next_id: Cell<u64>,
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }
}

impl<T> EventHub<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe<F>(&self, event: LifecycleEvent, observer: F) -> ObserverId
    where
        F: Fn(&T) -> Result<Outcome> + 'static,
    {
        self.push(event, false, Rc::new(observer))
    }

    /// Observe a single notification; the observer is removed before it runs
    pub fn observe_once<F>(&self, event: LifecycleEvent, observer: F) -> ObserverId
    where
        F: Fn(&T) -> Result<Outcome> + 'static,
    {
        self.push(event, true, Rc::new(observer))
    }

    fn push(&self, event: LifecycleEvent, once: bool, observer: Observer<T>) -> ObserverId {
        let id = ObserverId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push(Entry {
            id,
            event,
            once,
            observer,
        });
        id
    }

    /// Remove one observer, or every observer of `event` when `id` is `None`.
    /// Returns how many were removed.
    pub fn stop_observing(&self, event: LifecycleEvent, id: Option<ObserverId>) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|e| !(e.event == event && id.map_or(true, |id| e.id == id)));
        before - entries.len()
    }

    pub fn observer_count(&self, event: LifecycleEvent) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.event == event)
            .count()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    fn is_registered(&self, id: ObserverId) -> bool {
        self.entries.borrow().iter().any(|e| e.id == id)
    }

    /// Call observers of `event` in registration order, stopping at the first veto
    pub fn notify(&self, event: LifecycleEvent, subject: &T) -> Result<Outcome> {
        let pending: Vec<(ObserverId, bool, Observer<T>)> = self
            .entries
            .borrow()
            .iter()
            .filter(|e| e.event == event)
            .map(|e| (e.id, e.once, e.observer.clone()))
            .collect();

        for (id, once, observer) in pending {
            // an earlier observer may have removed this one
            if !self.is_registered(id) {
                continue;
            }
            if once {
                self.stop_observing(event, Some(id));
            }
            if observer(subject)?.is_veto() {
                return Ok(Outcome::Veto);
            }
        }
        Ok(Outcome::Continue)
    }
}
