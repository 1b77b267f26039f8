use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use anyhow::{anyhow, bail};

use crate::dispatch::{Acceptance, DispatchSignature, DispatchTarget};

/// Stable handle of a node in the dispatch tree. Slots of removed nodes are reused, and the
///  generation distinguishes a reused slot from the node that was removed from it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}.{}", self.index, self.generation)
    }
}

struct Node {
    /// `None` for the root, which forwards everything
    target: Option<Arc<dyn DispatchTarget>>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-based tree of dispatch targets
pub(super) struct DispatchTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl DispatchTree {
    pub fn new() -> DispatchTree {
        DispatchTree {
            slots: vec![Slot {
                generation: 0,
                node: Some(Node {
                    target: None,
                    parent: None,
                    children: Vec::new(),
                }),
            }],
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId { index: 0, generation: 0 }
    }

    /// number of targets, not counting the root
    pub fn len(&self) -> usize {
        self.len
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn target(&self, id: NodeId) -> Option<Arc<dyn DispatchTarget>> {
        self.node(id)
            .and_then(|node| node.target.clone())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)
            .and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn insert(&mut self, parent: NodeId, target: Arc<dyn DispatchTarget>) -> anyhow::Result<NodeId> {
        if !self.contains(parent) {
            bail!("parent node {:?} does not exist", parent);
        }

        let node = Node {
            target: Some(target),
            parent: Some(parent),
            children: Vec::new(),
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId { index, generation: slot.generation }
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .map_err(|_| anyhow!("dispatch tree is full"))?;
                self.slots.push(Slot { generation: 0, node: Some(node) });
                NodeId { index, generation: 0 }
            }
        };

        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.push(id);
        }
        self.len += 1;
        Ok(id)
    }

    /// removes a node and all its descendants, returning the number of removed nodes
    pub fn remove(&mut self, id: NodeId) -> anyhow::Result<usize> {
        if id == self.root() {
            bail!("the root node can not be removed");
        }
        let parent = self.node(id)
            .ok_or_else(|| anyhow!("node {:?} does not exist", id))?
            .parent;

        if let Some(parent_node) = parent.and_then(|p| self.node_mut(p)) {
            parent_node.children.retain(|&c| c != id);
        }

        let mut num_removed = 0;
        let mut to_remove = vec![id];
        while let Some(cur) = to_remove.pop() {
            let slot = &mut self.slots[cur.index as usize];
            if let Some(node) = slot.node.take() {
                to_remove.extend(node.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(cur.index);
                num_removed += 1;
            }
        }

        self.len -= num_removed;
        Ok(num_removed)
    }

    /// true if `ancestor` is `id` itself or one of its ancestors
    pub fn is_in_subtree(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.parent(c);
        }
        false
    }

    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> anyhow::Result<()> {
        if id == self.root() {
            bail!("the root node can not be moved");
        }
        let old_parent = self.parent(id)
            .ok_or_else(|| anyhow!("node {:?} does not exist", id))?;
        if !self.contains(new_parent) {
            bail!("new parent {:?} does not exist", new_parent);
        }
        if self.is_in_subtree(new_parent, id) {
            bail!("moving {:?} below {:?} would create a cycle", id, new_parent);
        }

        if let Some(n) = self.node_mut(old_parent) {
            n.children.retain(|&c| c != id);
        }
        if let Some(n) = self.node_mut(new_parent) {
            n.children.push(id);
        }
        if let Some(n) = self.node_mut(id) {
            n.parent = Some(new_parent);
        }
        Ok(())
    }

    /// Depth-first search for the first target that handles the signature. Children are
    ///  offered the message in the order they were added.
    pub fn resolve(&self, signature: &DispatchSignature) -> Option<NodeId> {
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };

            let acceptance = match &node.target {
                Some(target) => target.accepts(signature),
                None => Acceptance::Forward,
            };

            match acceptance {
                Acceptance::Handle => return Some(id),
                Acceptance::Forward => stack.extend(node.children.iter().rev().copied()),
                Acceptance::Reject => {}
            }
        }
        None
    }
}
