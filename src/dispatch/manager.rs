use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::dispatch::tree::DispatchTree;
use crate::dispatch::{DispatchSignature, DispatchTarget, NodeId};
use crate::handler::MessageHandler;
use crate::message::NetworkMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheEntry {
    Found(NodeId),
    NoHandler,
}

struct Inner {
    tree: DispatchTree,
    cache: FxHashMap<DispatchSignature, CacheEntry>,
    /// incremented on every change to the tree's shape
    tree_generation: u64,
    /// the tree generation the cache's entries were resolved against
    cache_generation: u64,
}

/// Delivers messages to the matching target of a dispatch tree, caching the resolution per
///  [DispatchSignature].
///
/// The manager is shared as a [MessageHandler], so all operations take `&self`. Targets'
///  `handle_message` is called without holding the manager's lock.
pub struct DispatchManager {
    inner: Mutex<Inner>,
    traversal_count: AtomicU64,
}

impl Default for DispatchManager {
    fn default() -> Self {
        DispatchManager {
            inner: Mutex::new(Inner {
                tree: DispatchTree::new(),
                cache: FxHashMap::default(),
                tree_generation: 0,
                cache_generation: 0,
            }),
            traversal_count: AtomicU64::new(0),
        }
    }
}

impl DispatchManager {
    pub fn new() -> DispatchManager {
        Default::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root(&self) -> NodeId {
        self.inner().tree.root()
    }

    /// number of targets in the tree
    pub fn len(&self) -> usize {
        self.inner().tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.inner().tree.contains(node)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner().tree.children(node)
    }

    /// Adds a target as the last child of `parent`. The cache must be invalidated before the
    ///  next dispatch.
    pub fn add_target(&self, parent: NodeId, target: Arc<dyn DispatchTarget>) -> anyhow::Result<NodeId> {
        let mut inner = self.inner();
        let id = inner.tree.insert(parent, target)?;
        inner.tree_generation += 1;
        debug!(?parent, node = ?id, "added dispatch target");
        Ok(id)
    }

    /// Removes a target and its entire subtree, returning the number of removed targets. The
    ///  cache must be invalidated before the next dispatch.
    pub fn remove_target(&self, node: NodeId) -> anyhow::Result<usize> {
        let mut inner = self.inner();
        let num_removed = inner.tree.remove(node)?;
        inner.tree_generation += 1;
        debug!(?node, num_removed, "removed dispatch target");
        Ok(num_removed)
    }

    /// Moves a target with its subtree below a different parent. Moving a target into its own
    ///  subtree is rejected. The cache must be invalidated before the next dispatch.
    pub fn reparent(&self, node: NodeId, new_parent: NodeId) -> anyhow::Result<()> {
        let mut inner = self.inner();
        inner.tree.reparent(node, new_parent)?;
        inner.tree_generation += 1;
        debug!(?node, ?new_parent, "moved dispatch target");
        Ok(())
    }

    pub fn invalidate_cache(&self) {
        let mut inner = self.inner();
        debug!("invalidating dispatch cache with {} entries", inner.cache.len());
        inner.cache.clear();
        inner.cache_generation = inner.tree_generation;
    }

    pub fn cached_entries(&self) -> usize {
        self.inner().cache.len()
    }

    /// number of tree traversals so far, i.e. dispatches that were not served from the cache
    pub fn traversal_count(&self) -> u64 {
        self.traversal_count.load(Ordering::Relaxed)
    }

    /// Delivers a message to the target its signature resolves to, returning false if there
    ///  is none (or if the target did not take it).
    pub fn dispatch(&self, msg: &NetworkMessage) -> bool {
        let signature = DispatchSignature::of(msg);

        let target = {
            let mut inner = self.inner();
            debug_assert!(
                inner.cache.is_empty() || inner.cache_generation == inner.tree_generation,
                "dispatch tree was modified without invalidating the dispatch cache"
            );

            let cached = inner.cache.get(&signature).copied();
            match cached {
                Some(CacheEntry::NoHandler) => {
                    trace!(?signature, "cached: no handler");
                    None
                }
                Some(CacheEntry::Found(node)) => {
                    let target = inner.tree.target(node);
                    if target.is_some() {
                        trace!(?signature, ?node, "cached: handler found");
                        target
                    }
                    else {
                        debug!(?signature, ?node, "cached dispatch target does not exist any more - resolving again");
                        inner.cache.remove(&signature);
                        self.resolve(&mut inner, signature)
                    }
                }
                None => self.resolve(&mut inner, signature),
            }
        };

        match target {
            Some(target) => target.handle_message(msg),
            None => false,
        }
    }

    fn resolve(&self, inner: &mut Inner, signature: DispatchSignature) -> Option<Arc<dyn DispatchTarget>> {
        self.traversal_count.fetch_add(1, Ordering::Relaxed);

        if inner.cache.is_empty() {
            inner.cache_generation = inner.tree_generation;
        }

        match inner.tree.resolve(&signature) {
            Some(node) => {
                trace!(?signature, ?node, "resolved dispatch target");
                inner.cache.insert(signature, CacheEntry::Found(node));
                inner.tree.target(node)
            }
            None => {
                debug!(?signature, "no dispatch target for message");
                inner.cache.insert(signature, CacheEntry::NoHandler);
                None
            }
        }
    }
}

impl MessageHandler for DispatchManager {
    fn handle_message(&self, msg: &NetworkMessage) -> bool {
        self.dispatch(msg)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Acceptance, MockDispatchTarget, TypedTarget};
    use crate::peer::PeerId;
    use crate::test_util::{ChatRecord, PingRecord, PositionRecord};
    use crate::wire::Priority;

    fn position(object_id: u32) -> NetworkMessage {
        NetworkMessage::new(PeerId(2), PeerId(1), Priority::RealtimeHigh, PositionRecord::new(object_id, [0.0; 3]))
    }

    fn ping() -> NetworkMessage {
        NetworkMessage::new(PeerId(2), PeerId(1), Priority::RealtimeLow, PingRecord { seq: 1 })
    }

    #[test]
    fn test_cache_hit_skips_traversal() {
        let manager = DispatchManager::new();

        let mut target = MockDispatchTarget::new();
        target.expect_accepts()
            .times(1)
            .return_const(Acceptance::Handle);
        target.expect_handle_message()
            .times(2)
            .returning(|_| true);
        manager.add_target(manager.root(), Arc::new(target)).unwrap();
        manager.invalidate_cache();

        assert!(manager.dispatch(&ping()));
        assert_eq!(manager.traversal_count(), 1);
        assert_eq!(manager.cached_entries(), 1);

        assert!(manager.dispatch(&ping()));
        assert_eq!(manager.traversal_count(), 1);
    }

    #[test]
    fn test_cached_no_handler() {
        let manager = DispatchManager::new();

        let mut target = MockDispatchTarget::new();
        target.expect_accepts()
            .times(1)
            .return_const(Acceptance::Reject);
        target.expect_handle_message().never();
        manager.add_target(manager.root(), Arc::new(target)).unwrap();
        manager.invalidate_cache();

        assert!(!manager.dispatch(&ping()));
        assert!(!manager.dispatch(&ping()));
        assert_eq!(manager.traversal_count(), 1);
        assert_eq!(manager.cached_entries(), 1);
    }

    #[test]
    fn test_invalidate_after_mutation_finds_new_handler() {
        let manager = DispatchManager::new();
        assert!(!manager.dispatch(&position(5)));

        let handled = Arc::new(AtomicU64::new(0));
        let handled_2 = handled.clone();
        let target = TypedTarget::builder()
            .key(Some(5))
            .on::<PositionRecord>(move |_, _| {
                handled_2.fetch_add(1, Ordering::Relaxed);
                true
            })
            .build();
        manager.add_target(manager.root(), Arc::new(target)).unwrap();
        manager.invalidate_cache();

        assert!(manager.dispatch(&position(5)));
        assert_eq!(handled.load(Ordering::Relaxed), 1);
        assert_eq!(manager.traversal_count(), 2);
    }

    #[test]
    fn test_object_subtrees() {
        let manager = DispatchManager::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        for object_id in [1, 2, 3] {
            let object = TypedTarget::builder()
                .key(Some(object_id))
                .build();
            let object_node = manager.add_target(manager.root(), Arc::new(object)).unwrap();

            let received = received.clone();
            let component = TypedTarget::builder()
                .on::<PositionRecord>(move |_, rec| {
                    received.lock().unwrap().push((object_id, rec.object_id));
                    true
                })
                .build();
            manager.add_target(object_node, Arc::new(component)).unwrap();
        }
        manager.invalidate_cache();

        assert!(manager.dispatch(&position(2)));
        assert!(manager.dispatch(&position(3)));
        assert!(!manager.dispatch(&position(4)));
        assert!(!manager.dispatch(&ping()));

        assert_eq!(*received.lock().unwrap(), vec![(2, 2), (3, 3)]);
        assert_eq!(manager.cached_entries(), 4);
    }

    #[test]
    fn test_removed_target_is_not_dispatched_to() {
        let manager = DispatchManager::new();
        let node = manager.add_target(manager.root(), Arc::new(TypedTarget::builder()
            .on::<ChatRecord>(|_, _| true)
            .build()
        )).unwrap();
        manager.invalidate_cache();

        let chat = NetworkMessage::new(PeerId(2), PeerId(1), Priority::Reliable, ChatRecord::new("hi"));
        assert!(manager.dispatch(&chat));

        assert_eq!(manager.remove_target(node).unwrap(), 1);
        manager.invalidate_cache();
        assert_eq!(manager.cached_entries(), 0);
        assert!(!manager.dispatch(&chat));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_reparent_changes_routing() {
        let manager = DispatchManager::new();
        let root = manager.root();
        let blocked = manager.add_target(root, Arc::new(TypedTarget::builder().key(Some(99)).build())).unwrap();
        let handler = manager.add_target(blocked, Arc::new(TypedTarget::builder()
            .on::<PositionRecord>(|_, _| true)
            .build()
        )).unwrap();
        manager.invalidate_cache();

        assert!(!manager.dispatch(&position(1)));

        manager.reparent(handler, root).unwrap();
        manager.invalidate_cache();
        assert!(manager.dispatch(&position(1)));

        assert!(manager.reparent(blocked, handler).is_ok());
        assert!(manager.reparent(handler, blocked).is_err(), "cycle");
    }

    #[test]
    fn test_mutation_without_invalidation_on_empty_cache() {
        let manager = DispatchManager::new();
        manager.add_target(manager.root(), Arc::new(TypedTarget::builder()
            .on::<PingRecord>(|_, _| true)
            .build()
        )).unwrap();

        assert!(manager.dispatch(&ping()));
        assert!(manager.dispatch(&ping()));
        assert_eq!(manager.traversal_count(), 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "without invalidating")]
    fn test_stale_cache_is_detected() {
        let manager = DispatchManager::new();
        assert!(!manager.dispatch(&ping()));

        manager.add_target(manager.root(), Arc::new(TypedTarget::builder()
            .on::<PingRecord>(|_, _| true)
            .build()
        )).unwrap();
        manager.dispatch(&ping());
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_stale_cached_target_falls_back_to_traversal() {
        let manager = DispatchManager::new();
        let node = manager.add_target(manager.root(), Arc::new(TypedTarget::builder()
            .on::<PingRecord>(|_, _| true)
            .build()
        )).unwrap();
        manager.invalidate_cache();

        assert!(manager.dispatch(&ping()));
        assert_eq!(manager.traversal_count(), 1);

        manager.remove_target(node).unwrap();
        assert!(!manager.dispatch(&ping()));
        assert_eq!(manager.traversal_count(), 2);
        assert_eq!(manager.cached_entries(), 1);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_reused_slot_is_not_hit_through_stale_node_id() {
        fn counting_target(counter: &Arc<AtomicU64>) -> Arc<TypedTarget> {
            let counter = counter.clone();
            Arc::new(TypedTarget::builder()
                .on::<PingRecord>(move |_, _| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    true
                })
                .build())
        }

        let manager = DispatchManager::new();
        let old_count = Arc::new(AtomicU64::new(0));
        let new_count = Arc::new(AtomicU64::new(0));

        let old_node = manager.add_target(manager.root(), counting_target(&old_count)).unwrap();
        manager.invalidate_cache();
        assert!(manager.dispatch(&ping()));

        manager.remove_target(old_node).unwrap();
        let new_node = manager.add_target(manager.root(), counting_target(&new_count)).unwrap();
        assert_eq!(format!("{:?}", old_node), "N1.0");
        assert_eq!(format!("{:?}", new_node), "N1.1");
        assert!(!manager.contains(old_node));

        assert!(manager.dispatch(&ping()));
        assert_eq!(old_count.load(Ordering::Relaxed), 1);
        assert_eq!(new_count.load(Ordering::Relaxed), 1);
        assert_eq!(manager.traversal_count(), 2);
    }

    #[test]
    fn test_as_message_handler() {
        let manager = Arc::new(DispatchManager::new());
        manager.add_target(manager.root(), Arc::new(TypedTarget::builder()
            .on::<PingRecord>(|msg, rec| msg.source == PeerId(2) && rec.seq == 1)
            .build()
        )).unwrap();
        manager.invalidate_cache();

        let handler: Arc<dyn MessageHandler> = manager.clone();
        assert!(handler.handle_message(&ping()));
    }
}
