/*! Intraprocedural control-flow graphs.
 *
 * One graph per function or script. Nodes wrap the originating statement and
 * keep its change tag so analyses can ask whether a block was inserted or
 * removed; edges carry the branch label and, for conditional edges, the
 * condition expression that guards them.
 */

use crate::ast::{ChangeTag, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CfgNodeId(pub u32);

impl std::fmt::Display for CfgNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cfg{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CfgEdgeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CfgNodeKind {
    Entry,
    Exit,
    Statement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgNode {
    pub id: CfgNodeId,
    pub kind: CfgNodeKind,
    /// Originating statement, absent for the synthetic exit node.
    pub statement: Option<NodeId>,
    pub change: ChangeTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeLabel {
    True,
    False,
    Fallthrough,
    Exception,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgEdge {
    pub id: CfgEdgeId,
    pub from: CfgNodeId,
    pub to: CfgNodeId,
    pub label: EdgeLabel,
    /// The condition guarding this edge, for `True`/`False` edges.
    pub condition: Option<NodeId>,
    /// True for loop back-edges.
    pub back_edge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cfg {
    /// The function or script node this graph was built from.
    pub owner: NodeId,
    nodes: Vec<CfgNode>,
    edges: Vec<CfgEdge>,
    entry: CfgNodeId,
    exit: CfgNodeId,
    out_edges: Vec<Vec<CfgEdgeId>>,
    in_edges: Vec<Vec<CfgEdgeId>>,
}

impl Cfg {
    pub fn new(owner: NodeId, owner_change: ChangeTag) -> Self {
        let mut cfg = Self {
            owner,
            nodes: Vec::new(),
            edges: Vec::new(),
            entry: CfgNodeId(0),
            exit: CfgNodeId(0),
            out_edges: Vec::new(),
            in_edges: Vec::new(),
        };
        cfg.entry = cfg.add_node(CfgNodeKind::Entry, Some(owner), owner_change);
        cfg.exit = cfg.add_node(CfgNodeKind::Exit, None, ChangeTag::Unchanged);
        cfg
    }

    pub fn add_node(
        &mut self,
        kind: CfgNodeKind,
        statement: Option<NodeId>,
        change: ChangeTag,
    ) -> CfgNodeId {
        let id = CfgNodeId(self.nodes.len() as u32);
        self.nodes.push(CfgNode {
            id,
            kind,
            statement,
            change,
        });
        self.out_edges.push(Vec::new());
        self.in_edges.push(Vec::new());
        id
    }

    pub fn add_edge(
        &mut self,
        from: CfgNodeId,
        to: CfgNodeId,
        label: EdgeLabel,
        condition: Option<NodeId>,
    ) -> CfgEdgeId {
        self.add_edge_full(from, to, label, condition, false)
    }

    pub fn add_back_edge(
        &mut self,
        from: CfgNodeId,
        to: CfgNodeId,
        label: EdgeLabel,
        condition: Option<NodeId>,
    ) -> CfgEdgeId {
        self.add_edge_full(from, to, label, condition, true)
    }

    fn add_edge_full(
        &mut self,
        from: CfgNodeId,
        to: CfgNodeId,
        label: EdgeLabel,
        condition: Option<NodeId>,
        back_edge: bool,
    ) -> CfgEdgeId {
        let id = CfgEdgeId(self.edges.len() as u32);
        self.edges.push(CfgEdge {
            id,
            from,
            to,
            label,
            condition,
            back_edge,
        });
        self.out_edges[from.0 as usize].push(id);
        self.in_edges[to.0 as usize].push(id);
        id
    }

    pub fn entry(&self) -> CfgNodeId {
        self.entry
    }

    pub fn exit(&self) -> CfgNodeId {
        self.exit
    }

    pub fn is_exit(&self, id: CfgNodeId) -> bool {
        id == self.exit
    }

    pub fn node(&self, id: CfgNodeId) -> &CfgNode {
        &self.nodes[id.0 as usize]
    }

    pub fn edge(&self, id: CfgEdgeId) -> &CfgEdge {
        &self.edges[id.0 as usize]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CfgNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &CfgEdge> {
        self.edges.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn out_edges(&self, id: CfgNodeId) -> &[CfgEdgeId] {
        &self.out_edges[id.0 as usize]
    }

    pub fn in_edges(&self, id: CfgNodeId) -> &[CfgEdgeId] {
        &self.in_edges[id.0 as usize]
    }

    pub fn successors(&self, id: CfgNodeId) -> Vec<CfgNodeId> {
        self.out_edges(id)
            .iter()
            .map(|&e| self.edge(e).to)
            .collect()
    }

    pub fn predecessors(&self, id: CfgNodeId) -> Vec<CfgNodeId> {
        self.in_edges(id)
            .iter()
            .map(|&e| self.edge(e).from)
            .collect()
    }

    /// Nodes reachable from the entry. Lowering keeps a node for every
    /// statement, so dead code after an unconditional `return` or `throw`
    /// still has a node but is absent from this set.
    pub fn reachable_nodes(&self) -> HashSet<CfgNodeId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(self.entry);

        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                for succ in self.successors(current) {
                    queue.push_back(succ);
                }
            }
        }

        visited
    }

    /// First statement node wrapping `statement`, if one exists.
    pub fn node_for_statement(&self, statement: NodeId) -> Option<CfgNodeId> {
        self.nodes
            .iter()
            .find(|node| node.statement == Some(statement))
            .map(|node| node.id)
    }
}
