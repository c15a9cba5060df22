#![forbid(unsafe_code)]

//! Synchronous observer registration.
//!
//! # Design
//!
//! A [`Signal<E>`] is a list of handlers for events of type `E`. Handlers run
//! on the emitting thread, in registration order, before `emit` returns.
//! There is no queue: the whole application runs on one event loop.
//!
//! Handlers are stored as `Weak` references and kept alive by the
//! [`Subscription`] guard returned from [`Signal::subscribe`]. Dropping the
//! guard unsubscribes; the dead entry is pruned on the next emit.
//!
//! # Re-entrancy
//!
//! `emit` snapshots the live handlers before calling any of them, so a
//! handler may subscribe new handlers or emit on the same signal. Handlers
//! subscribed during an emit are first called on the following emit.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type HandlerRc<E> = Rc<dyn Fn(&E)>;
type HandlerWeak<E> = Weak<dyn Fn(&E)>;

/// An ordered, same-thread event broadcaster.
///
/// Cloning a `Signal` yields a second handle to the same handler list.
pub struct Signal<E> {
    handlers: Rc<RefCell<Vec<HandlerWeak<E>>>>,
}

impl<E> Clone for Signal<E> {
    fn clone(&self) -> Self {
        Self {
            handlers: Rc::clone(&self.handlers),
        }
    }
}

impl<E> Default for Signal<E> {
    fn default() -> Self {
        Self {
            handlers: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<E> fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscriber_count", &self.handlers.borrow().len())
            .finish()
    }
}

impl<E: 'static> Signal<E> {
    /// Create a signal with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. It stays registered while the returned guard lives.
    pub fn subscribe(&self, handler: impl Fn(&E) + 'static) -> Subscription {
        let strong: HandlerRc<E> = Rc::new(handler);
        self.handlers.borrow_mut().push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Register a handler that only sees events matching `filter`.
    ///
    /// This is how callers listen for a single event kind.
    pub fn subscribe_filtered(
        &self,
        filter: impl Fn(&E) -> bool + 'static,
        handler: impl Fn(&E) + 'static,
    ) -> Subscription {
        self.subscribe(move |event| {
            if filter(event) {
                handler(event);
            }
        })
    }

    /// Deliver `event` to every live handler, in registration order.
    ///
    /// Returns the number of handlers called.
    pub fn emit(&self, event: &E) -> usize {
        let live: Vec<HandlerRc<E>> = {
            let mut handlers = self.handlers.borrow_mut();
            handlers.retain(|w| w.strong_count() > 0);
            handlers.iter().filter_map(Weak::upgrade).collect()
        };
        for handler in &live {
            handler(event);
        }
        live.len()
    }

    /// Number of registered handlers, including dead ones not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// True when no live handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers
            .borrow()
            .iter()
            .all(|w| w.strong_count() == 0)
    }
}

/// RAII guard for a [`Signal`] handler.
///
/// Dropping it makes the handler unreachable; the signal forgets the entry
/// on its next emit.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    _guard: Box<dyn std::any::Any>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
