// Observer - Per-component subscriber lists
// Replaces event-emitter inheritance with owned listener lists

use std::cell::RefCell;
use std::rc::Rc;

type Handler<E> = Rc<RefCell<dyn FnMut(&E)>>;

/// Token returned by [`Observers::subscribe`]; pass back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

/// A list of event handlers owned by one component.
///
/// Cheap to clone (handlers are shared). `emit` snapshots the handler list
/// before invoking anything, so a handler may re-enter the emitting
/// component: subscribe, unsubscribe, stop it, change its interval.
pub struct Observers<E> {
    inner: Rc<RefCell<ObserverList<E>>>,
}

struct ObserverList<E> {
    handlers: Vec<(u64, Handler<E>)>,
    next_id: u64,
}

impl<E> Clone for Observers<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObserverList {
                handlers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Register a handler; it stays registered until unsubscribed.
    pub fn subscribe(&self, handler: impl FnMut(&E) + 'static) -> Subscription {
        let mut list = self.inner.borrow_mut();
        let id = list.next_id;
        list.next_id += 1;
        list.handlers.push((id, Rc::new(RefCell::new(handler))));
        Subscription(id)
    }

    /// Remove a previously registered handler. Unknown tokens are ignored.
    pub fn unsubscribe(&self, subscription: Subscription) {
        self.inner
            .borrow_mut()
            .handlers
            .retain(|(id, _)| *id != subscription.0);
    }

    /// Invoke every registered handler with the event.
    pub fn emit(&self, event: &E) {
        // Snapshot so handlers can mutate the list re-entrantly
        let snapshot: Vec<Handler<E>> = self
            .inner
            .borrow()
            .handlers
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in snapshot {
            (handler.borrow_mut())(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
