//! Hierarchical dispatch: messages are delivered to targets in a tree (e.g. one subtree per
//!  simulation object), and the outcome of resolving a message's [DispatchSignature] to a
//!  target is cached so that the tree is traversed only once per signature.
//!
//! The cache is only correct as long as the tree's shape does not change. Every mutation of
//!  the tree must be followed by [DispatchManager::invalidate_cache] before the next dispatch.

mod manager;
mod tree;
mod typed_target;

pub use manager::DispatchManager;
pub use tree::NodeId;
pub use typed_target::{TypedTarget, TypedTargetBuilder};

#[cfg(test)] use mockall::automock;

use crate::message::NetworkMessage;
use crate::peer::PeerId;
use crate::record::RecordTypeId;

/// The parts of a message that determine where it is dispatched. Two messages with the same
///  signature always go to the same target, which is what makes caching possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchSignature {
    pub record_type: RecordTypeId,
    pub source: PeerId,
    pub dispatch_key: Option<u64>,
}

impl DispatchSignature {
    pub fn of(msg: &NetworkMessage) -> DispatchSignature {
        DispatchSignature {
            record_type: msg.record_type(),
            source: msg.source,
            dispatch_key: msg.dispatch_key(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// this target handles the message
    Handle,
    /// offer the message to this target's children
    Forward,
    /// neither this target nor any of its children is interested
    Reject,
}

/// A node in the dispatch tree.
///
/// `accepts` must depend on nothing but the signature: its result is cached. It is called
///  while the dispatch manager is locked and must not call back into the manager.
#[cfg_attr(test, automock)]
pub trait DispatchTarget: Send + Sync + 'static {
    fn accepts(&self, signature: &DispatchSignature) -> Acceptance;

    fn handle_message(&self, msg: &NetworkMessage) -> bool;
}
