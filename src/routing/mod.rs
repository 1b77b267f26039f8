use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace};

use crate::error::RoutingError;
use crate::handler::MessageHandler;
use crate::health::LinkHealth;
use crate::message::NetworkMessage;

struct RoutingTable<const N: usize> {
    handlers: [Option<Arc<dyn MessageHandler>>; N],
    default_handler: Option<Arc<dyn MessageHandler>>,
}

/// Flat dispatch by a message's routing type: one handler slot per routing type below `N`,
///  plus a default handler for routing types without a bound slot.
///
/// Messages with a routing type of `N` or above are unroutable, regardless of the default
///  handler. Unroutable messages are dropped and counted.
pub struct RoutingHandler<const N: usize = 32> {
    table: RwLock<RoutingTable<N>>,
    unroutable: AtomicU64,
    health: Option<Arc<LinkHealth>>,
}

impl <const N: usize> Default for RoutingHandler<N> {
    fn default() -> Self {
        RoutingHandler {
            table: RwLock::new(RoutingTable {
                handlers: std::array::from_fn(|_| None),
                default_handler: None,
            }),
            unroutable: AtomicU64::new(0),
            health: None,
        }
    }
}

impl <const N: usize> RoutingHandler<N> {
    pub const TABLE_SIZE: usize = N;

    pub fn new() -> RoutingHandler<N> {
        Default::default()
    }

    /// unroutable messages are additionally reported to the link's health counters
    pub fn with_health(health: Arc<LinkHealth>) -> RoutingHandler<N> {
        RoutingHandler {
            health: Some(health),
            ..Default::default()
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RoutingTable<N>> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RoutingTable<N>> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot_index(routing_type: u16) -> Result<usize, RoutingError> {
        let idx = routing_type as usize;
        if idx >= N {
            return Err(RoutingError::OutOfRange { routing_type, table_size: N });
        }
        Ok(idx)
    }

    /// binds (or with `None` unbinds) the handler for a routing type, returning the previous one
    pub fn set_message_handler(&self, routing_type: u16, handler: Option<Arc<dyn MessageHandler>>) -> Result<Option<Arc<dyn MessageHandler>>, RoutingError> {
        let idx = Self::slot_index(routing_type)?;
        debug!(routing_type, bound = handler.is_some(), "setting routing handler");
        Ok(std::mem::replace(&mut self.write().handlers[idx], handler))
    }

    pub fn get_message_handler(&self, routing_type: u16) -> Result<Option<Arc<dyn MessageHandler>>, RoutingError> {
        let idx = Self::slot_index(routing_type)?;
        Ok(self.read().handlers[idx].clone())
    }

    /// Sets the default handler, returning the previous one so that it can be restored later.
    pub fn set_default_handler(&self, handler: Option<Arc<dyn MessageHandler>>) -> Option<Arc<dyn MessageHandler>> {
        debug!(bound = handler.is_some(), "setting default routing handler");
        std::mem::replace(&mut self.write().default_handler, handler)
    }

    pub fn default_handler(&self) -> Option<Arc<dyn MessageHandler>> {
        self.read().default_handler.clone()
    }

    /// clears all slots. The default handler stays in place.
    pub fn remove_all(&self) {
        debug!("removing all routing handlers");
        let mut table = self.write();
        for slot in table.handlers.iter_mut() {
            *slot = None;
        }
    }

    pub fn unroutable_count(&self) -> u64 {
        self.unroutable.load(Ordering::Relaxed)
    }

    fn handler_for(&self, routing_type: u16) -> Option<Arc<dyn MessageHandler>> {
        let idx = Self::slot_index(routing_type).ok()?;
        let table = self.read();
        table.handlers[idx].as_ref()
            .or(table.default_handler.as_ref())
            .cloned()
    }
}

impl <const N: usize> MessageHandler for RoutingHandler<N> {
    fn handle_message(&self, msg: &NetworkMessage) -> bool {
        let routing_type = msg.routing_type();
        match self.handler_for(routing_type) {
            Some(handler) => {
                trace!(routing_type, ?msg, "routing message");
                handler.handle_message(msg)
            }
            None => {
                debug!(routing_type, ?msg, "unroutable message");
                self.unroutable.fetch_add(1, Ordering::Relaxed);
                if let Some(health) = &self.health {
                    health.unroutable();
                }
                false
            }
        }
    }
}
