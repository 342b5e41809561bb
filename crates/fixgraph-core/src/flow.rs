/*! Generic intraprocedural dataflow.
 *
 * The engine runs a forward worklist fixed-point over one CFG. Analyses
 * plug in through [`FlowAnalysis`]: they pick a lattice element type and
 * supply the transfer functions; the engine owns the iteration order, the
 * join points and the termination bound. Per-edge visit counters cap how
 * often any edge is re-processed, so analyses whose elements never stop
 * growing still terminate (with an approximate result past the bound).
 */

use crate::ast::SyntaxTree;
use crate::cfg::{Cfg, CfgEdgeId, CfgNodeId};
use crate::scope::{ScopeId, ScopeTree};
use std::collections::{HashMap, VecDeque};
use tracing::trace;

/// A join-semilattice element. `join` folds another element into `self`;
/// the engine detects convergence through `PartialEq`.
pub trait Lattice: Clone + PartialEq {
    fn join(&mut self, other: &Self);
}

/// Everything a transfer function may consult, borrowed for the duration of
/// one engine run.
pub struct FlowContext<'a> {
    pub tree: &'a SyntaxTree,
    pub scopes: &'a ScopeTree,
    /// The scope whose CFG is being analyzed.
    pub scope: ScopeId,
    pub cfg: &'a Cfg,
}

/// One dataflow analysis over one CFG.
pub trait FlowAnalysis {
    type Element: Lattice;

    /// The element injected at the CFG entry node.
    fn entry_value(&self, cx: &FlowContext) -> Self::Element;

    /// Applied when flow passes through a node.
    fn transfer_node(&self, cx: &FlowContext, node: CfgNodeId, element: &mut Self::Element);

    /// Applied when flow traverses an edge, after the source node's
    /// transfer. Edge conditions are available through the CFG.
    fn transfer_edge(&self, cx: &FlowContext, edge: CfgEdgeId, element: &mut Self::Element);
}

#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// How many times a single edge may be taken off the worklist before
    /// the engine stops re-processing it.
    pub max_edge_visits: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_edge_visits: 20,
        }
    }
}

/// The element reaching each node at the fixed point, joined over all
/// processed incoming edges.
#[derive(Debug, Clone)]
pub struct FlowResults<E> {
    values: HashMap<CfgNodeId, E>,
    /// True when some edge hit the visit bound and the result is an
    /// approximation.
    pub bounded: bool,
}

impl<E> FlowResults<E> {
    /// The element at `node`, or `None` when the node was never reached.
    pub fn value_at(&self, node: CfgNodeId) -> Option<&E> {
        self.values.get(&node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CfgNodeId, &E)> {
        self.values.iter().map(|(&id, e)| (id, e))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlowEngine {
    config: FlowConfig,
}

impl FlowEngine {
    pub fn new(config: FlowConfig) -> Self {
        Self { config }
    }

    /// Runs `analysis` over `cx.cfg` to a fixed point.
    pub fn run<A: FlowAnalysis>(&self, analysis: &A, cx: &FlowContext) -> FlowResults<A::Element> {
        let cfg = cx.cfg;
        let mut values: HashMap<CfgNodeId, A::Element> = HashMap::new();
        values.insert(cfg.entry(), analysis.entry_value(cx));

        let mut visits: Vec<u32> = vec![0; cfg.edge_count()];
        let mut bounded = false;
        let mut worklist: VecDeque<CfgEdgeId> =
            cfg.out_edges(cfg.entry()).iter().copied().collect();

        while let Some(edge_id) = worklist.pop_front() {
            let visit = &mut visits[edge_id.0 as usize];
            if *visit >= self.config.max_edge_visits {
                bounded = true;
                trace!(edge = edge_id.0, "edge visit bound reached");
                continue;
            }
            *visit += 1;

            let edge = cfg.edge(edge_id);
            // Only edges whose source already carries a value are enqueued.
            let mut element = values[&edge.from].clone();
            analysis.transfer_node(cx, edge.from, &mut element);
            analysis.transfer_edge(cx, edge_id, &mut element);

            let changed = match values.get_mut(&edge.to) {
                Some(existing) => {
                    let before = existing.clone();
                    existing.join(&element);
                    *existing != before
                }
                None => {
                    values.insert(edge.to, element);
                    true
                }
            };

            if changed {
                for &out in cfg.out_edges(edge.to) {
                    worklist.push_back(out);
                }
            }
        }

        FlowResults { values, bounded }
    }
}
