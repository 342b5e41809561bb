/*! Unified interface for mining bug-repair patterns.
 *
 * Single import for everything you need: preparing change-annotated syntax
 * trees, running differential pattern analyses over file pairs, and the
 * built-in patterns. Batteries-included entry point for mining workflows.
 */

pub use fixgraph_core as core;
pub use fixgraph_patterns as patterns;

pub use fixgraph_core::{
    alert::Alert,
    ast::{ChangeTag, NodeId, NodeKind, SyntaxTree},
    cfg::Cfg,
    diff::{analyze_batch, analyze_pair, BatchReport, FilePair, PatternAnalysis, Version},
    flow::{FlowAnalysis, FlowConfig, FlowEngine, Lattice},
    meta::AnalysisMetaInformation,
    scope::{ScopeKind, ScopeTree},
};

pub use fixgraph_patterns::{CallbackErrorAnalysis, GlobalToLocalAnalysis};
