#![forbid(unsafe_code)]

//! Start/end bracketing of structural node changes.
//!
//! Before a bulk mutation the notebook calls
//! [`NodeChangeObserver::on_changed_start`] with the affected node ids; after
//! it, [`NodeChangeObserver::on_changed_end`] with the same ids. Observers use
//! the pair to snapshot identity-keyed state (selection, expansion, scroll
//! anchor) and reapply it once positions have been recomputed.
//!
//! Observers are held weakly and notified in registration order. An observer
//! that is already mutably borrowed (the change was triggered from inside
//! one of its own handlers) is skipped for that notification.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::node::NodeId;
use crate::notebook::Notebook;

/// Receives bracketing notifications for structural changes.
pub trait NodeChangeObserver {
    /// The listed nodes are about to change. Positions are still valid.
    fn on_changed_start(&mut self, notebook: &Notebook, nodes: &[NodeId]);

    /// The listed nodes changed. Some may no longer exist.
    fn on_changed_end(&mut self, notebook: &Notebook, nodes: &[NodeId]);
}

/// Id-only change notification published on [`Notebook::changes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeChange {
    Start(Vec<NodeId>),
    End(Vec<NodeId>),
}

/// Which half of the bracket is being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Start,
    End,
}

type ObserverRef = Weak<RefCell<dyn NodeChangeObserver>>;

/// Weakly held observers in registration order.
#[derive(Default)]
pub(crate) struct ObserverList {
    observers: RefCell<Vec<ObserverRef>>,
}

impl fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("len", &self.observers.borrow().len())
            .finish()
    }
}

impl ObserverList {
    pub(crate) fn add(&self, observer: ObserverRef) {
        self.observers.borrow_mut().push(observer);
    }

    pub(crate) fn live_count(&self) -> usize {
        self.observers
            .borrow()
            .iter()
            .filter(|o| o.strong_count() > 0)
            .count()
    }

    /// Deliver one phase to every live observer.
    pub(crate) fn notify(&self, notebook: &Notebook, nodes: &[NodeId], phase: Phase) {
        let live: Vec<Rc<RefCell<dyn NodeChangeObserver>>> = {
            let mut observers = self.observers.borrow_mut();
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };

        for observer in live {
            let Ok(mut observer) = observer.try_borrow_mut() else {
                warn!(?phase, "node change observer busy; skipped");
                continue;
            };
            match phase {
                Phase::Start => observer.on_changed_start(notebook, nodes),
                Phase::End => observer.on_changed_end(notebook, nodes),
            }
        }
    }
}

/// Register an observer held as `Rc<RefCell<T>>`.
///
/// Only a weak reference is stored; the caller's `Rc` keeps it alive.
pub fn observe<T: NodeChangeObserver + 'static>(notebook: &Notebook, observer: &Rc<RefCell<T>>) {
    let shared: Rc<RefCell<dyn NodeChangeObserver>> = observer.clone();
    notebook.add_observer(Rc::downgrade(&shared));
}
