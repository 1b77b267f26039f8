use std::fmt::{Debug, Formatter};

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::dispatch::{Acceptance, DispatchSignature, DispatchTarget};
use crate::message::NetworkMessage;
use crate::peer::PeerId;
use crate::record::{Record, RecordTypeId};

type MessageCallback = Box<dyn Fn(&NetworkMessage) -> bool + Send + Sync>;

/// A dispatch target with an explicit table of per-record-type callbacks, optionally
///  restricted to a dispatch key (e.g. a simulation object's id) and / or a source peer.
///
/// A matching signature is handled if there is a callback for its record type, and forwarded
///  to the target's children otherwise. Non-matching signatures are rejected.
pub struct TypedTarget {
    key: Option<u64>,
    source: Option<PeerId>,
    callbacks: FxHashMap<RecordTypeId, MessageCallback>,
}

impl Debug for TypedTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut record_types = self.callbacks.keys().collect::<Vec<_>>();
        record_types.sort();
        write!(f, "TypedTarget{{key:{:?} source:{:?} {:?}}}", self.key, self.source, record_types)
    }
}

impl TypedTarget {
    pub fn builder() -> TypedTargetBuilder {
        TypedTargetBuilder {
            key: None,
            source: None,
            callbacks: FxHashMap::default(),
        }
    }

    fn matches(&self, signature: &DispatchSignature) -> bool {
        if self.key.is_some() && self.key != signature.dispatch_key {
            return false;
        }
        if self.source.is_some() && self.source != Some(signature.source) {
            return false;
        }
        true
    }
}

impl DispatchTarget for TypedTarget {
    fn accepts(&self, signature: &DispatchSignature) -> Acceptance {
        if !self.matches(signature) {
            return Acceptance::Reject;
        }
        if self.callbacks.contains_key(&signature.record_type) {
            Acceptance::Handle
        }
        else {
            Acceptance::Forward
        }
    }

    fn handle_message(&self, msg: &NetworkMessage) -> bool {
        match self.callbacks.get(&msg.record_type()) {
            Some(callback) => callback(msg),
            None => {
                trace!(?msg, "no callback for record type");
                false
            }
        }
    }
}

pub struct TypedTargetBuilder {
    key: Option<u64>,
    source: Option<PeerId>,
    callbacks: FxHashMap<RecordTypeId, MessageCallback>,
}

impl TypedTargetBuilder {
    /// restrict the target to messages with this dispatch key, `None` matching any key
    pub fn key(mut self, key: Option<u64>) -> Self {
        self.key = key;
        self
    }

    /// restrict the target to messages from this peer, `None` matching any peer
    pub fn source(mut self, source: Option<PeerId>) -> Self {
        self.source = source;
        self
    }

    /// Registers the callback for a record type, replacing a previously registered callback
    ///  for the same type.
    pub fn on<R: Record>(mut self, callback: impl Fn(&NetworkMessage, &R) -> bool + Send + Sync + 'static) -> Self {
        self.callbacks.insert(R::TYPE_ID, Box::new(move |msg| {
            match msg.payload_as::<R>() {
                Some(record) => callback(msg, record),
                None => false,
            }
        }));
        self
    }

    pub fn build(self) -> TypedTarget {
        TypedTarget {
            key: self.key,
            source: self.source,
            callbacks: self.callbacks,
        }
    }
}
