// Node Bag - Exclusive ownership of the graph nodes a voice creates

use crate::graph::{AudioGraph, NodeId, NodeKind};

/// Nodes owned by one voice, released exactly once on dispose
#[derive(Debug, Default)]
pub struct NodeBag {
    nodes: Vec<NodeId>,
    disposed: bool,
}

impl NodeBag {
    pub fn new() -> Self {
        NodeBag::default()
    }

    /// Create a node and take ownership of it
    pub fn create(&mut self, graph: &mut dyn AudioGraph, kind: NodeKind) -> NodeId {
        let id = graph.create_node(kind);
        self.push(id);
        id
    }

    /// Take ownership of a node created elsewhere
    pub fn push(&mut self, id: NodeId) {
        if !self.nodes.contains(&id) {
            self.nodes.push(id);
        }
    }

    /// Dispose a single owned node (used when rebuilding part of a voice)
    pub fn release(&mut self, graph: &mut dyn AudioGraph, id: NodeId) -> bool {
        let Some(position) = self.nodes.iter().position(|n| *n == id) else {
            return false;
        };
        self.nodes.remove(position);
        graph.dispose_node(id)
    }

    /// Dispose every owned node; later calls do nothing
    ///
    /// Returns how many nodes were released by this call.
    pub fn dispose(&mut self, graph: &mut dyn AudioGraph) -> usize {
        if self.disposed {
            return 0;
        }
        self.disposed = true;
        self.nodes
            .drain(..)
            .filter(|id| graph.dispose_node(*id))
            .count()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
