use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// An ordered collection of distinct subscribers. Identity is pointer identity of the shared
///  reference, so the same handler can not be registered twice while two equal but separate
///  handler instances can.
pub struct HandlerSet<T: ?Sized> {
    handlers: Vec<Arc<T>>,
}

impl <T: ?Sized> Default for HandlerSet<T> {
    fn default() -> Self {
        HandlerSet { handlers: Vec::new() }
    }
}

impl <T: ?Sized> Debug for HandlerSet<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandlerSet{{{} handlers}}", self.handlers.len())
    }
}

impl <T: ?Sized> HandlerSet<T> {
    pub fn new() -> HandlerSet<T> {
        Default::default()
    }

    /// returns false if the handler was registered already
    pub fn add(&mut self, handler: Arc<T>) -> bool {
        if self.contains(&handler) {
            return false;
        }
        self.handlers.push(handler);
        true
    }

    /// returns false if the handler was not registered
    pub fn remove(&mut self, handler: &Arc<T>) -> bool {
        let len_before = self.handlers.len();
        self.handlers.retain(|h| !Arc::ptr_eq(h, handler));
        self.handlers.len() != len_before
    }

    pub fn contains(&self, handler: &Arc<T>) -> bool {
        self.handlers.iter()
            .any(|h| Arc::ptr_eq(h, handler))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// calls the callback for every handler in registration order
    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        for h in &self.handlers {
            f(h.as_ref());
        }
    }

    /// a snapshot of the current handlers, for notifying them without holding a borrow of the set
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.handlers.clone()
    }
}
