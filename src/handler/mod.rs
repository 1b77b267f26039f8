mod handler_set;

pub use handler_set::HandlerSet;

#[cfg(test)] use mockall::automock;

use crate::message::NetworkMessage;

/// Application-facing contract for consuming messages. Handlers are shared (`Arc`) between
///  several dispatch points - a [HandlerSet], a [crate::dispatch::DispatchManager], a
///  [crate::routing::RoutingHandler] - so they take `&self` and use interior mutability for
///  any state they keep.
#[cfg_attr(test, automock)]
pub trait MessageHandler: Send + Sync + 'static {
    /// returns true if the handler took the message, false if it was not interested
    fn handle_message(&self, msg: &NetworkMessage) -> bool;
}
