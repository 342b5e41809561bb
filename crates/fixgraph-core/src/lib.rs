/*! Core framework for mining recurring bug-repair patterns.
 *
 * A repair is a pair of file versions: the buggy source and the repaired
 * destination. This crate takes change-annotated syntax trees for both
 * versions (produced by an external parser and tree differencer), resolves
 * lexical scopes, lowers each function to a control-flow graph, runs
 * fixed-point dataflow over the graphs, and hands matched result sets to a
 * pattern analysis that decides whether the change looks like a known
 * repair.
 */

pub mod alert;
pub mod ast;
pub mod cfg;
pub mod diff;
pub mod flow;
pub mod lower;
pub mod meta;
pub mod scope;

pub use alert::Alert;
pub use ast::{AstNode, BinaryOp, ChangeTag, LiteralValue, NodeId, NodeKind, SyntaxTree};
pub use cfg::{Cfg, CfgEdge, CfgEdgeId, CfgNode, CfgNodeId, CfgNodeKind, EdgeLabel};
pub use diff::{analyze_batch, analyze_pair, BatchReport, FilePair, PairFailure, PatternAnalysis, Version, VersionContext};
pub use flow::{FlowAnalysis, FlowConfig, FlowContext, FlowEngine, FlowResults, Lattice};
pub use lower::build_cfgs;
pub use meta::AnalysisMetaInformation;
pub use scope::{Scope, ScopeId, ScopeKind, ScopeTree};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Malformed tree: {0}")]
    MalformedTree(String),

    #[error("Unresolved reference to `{name}` where a declaration was required")]
    UnresolvedScope { name: String },

    #[error("`{statement}` statement outside of a loop or switch")]
    NoEnclosingLoop { statement: String },

    #[error("No control-flow graph for scope `{identity}`")]
    MissingCfg { identity: String },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
