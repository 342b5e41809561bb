/*! Callback error-handling repairs.
 *
 * Node-style callbacks receive the error as their first parameter, and a
 * common repair is adding the missing `if (err) ...` guard. The analysis
 * tracks error-named parameters through each function's CFG, marks one
 * checked when a branch condition tests it, and records at every callback
 * invocation site whether the error was checked on the path reaching the
 * call. An alert fires when the repaired version protects a call site the
 * buggy version left unprotected.
 */

use crate::special_type::condition_checks;
use fixgraph_core::ast::{NodeId, NodeKind};
use fixgraph_core::cfg::{CfgEdgeId, CfgNodeId, CfgNodeKind};
use fixgraph_core::diff::{PatternAnalysis, Version, VersionContext};
use fixgraph_core::flow::{FlowAnalysis, FlowConfig, FlowContext, FlowEngine, Lattice};
use fixgraph_core::meta::AnalysisMetaInformation;
use fixgraph_core::{Alert, Result};
use std::collections::BTreeSet;

fn is_error_name(name: &str) -> bool {
    ["e", "err", "error"]
        .iter()
        .any(|candidate| name.eq_ignore_ascii_case(candidate))
}

/// Per-path state. `unchecked`/`checked` track the error parameters flowing
/// through the function; the call-site sets record what held when a callback
/// invocation was reached on some path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallbackErrorElement {
    pub unchecked: BTreeSet<String>,
    pub checked: BTreeSet<String>,
    /// Error parameters checked on a path reaching a callback invocation.
    pub protected_calls: BTreeSet<String>,
    /// Error parameters still unchecked on a path reaching a callback
    /// invocation.
    pub unprotected_calls: BTreeSet<String>,
}

impl Lattice for CallbackErrorElement {
    fn join(&mut self, other: &Self) {
        self.unchecked.extend(other.unchecked.iter().cloned());
        self.checked.extend(other.checked.iter().cloned());
        self.protected_calls
            .extend(other.protected_calls.iter().cloned());
        self.unprotected_calls
            .extend(other.unprotected_calls.iter().cloned());
    }
}

/// True when the statement invokes one of the function's parameters, i.e.
/// contains a call whose callee is a parameter name.
fn invokes_parameter(cx: &FlowContext, statement: NodeId) -> bool {
    let owner = cx.scopes.scope(cx.scope).owner;
    let NodeKind::Function { params, .. } = cx.tree.kind(owner) else {
        return false;
    };
    let param_names: BTreeSet<&str> = params
        .iter()
        .filter_map(|&param| cx.tree.name_text(param))
        .collect();

    let mut stack = vec![statement];
    while let Some(node) = stack.pop() {
        if let NodeKind::Call { callee, .. } = cx.tree.kind(node) {
            if let Some(text) = cx.tree.name_text(*callee) {
                if param_names.contains(text) {
                    return true;
                }
            }
        }
        stack.extend(cx.tree.children(node));
    }
    false
}

struct CallbackErrorFlow;

impl FlowAnalysis for CallbackErrorFlow {
    type Element = CallbackErrorElement;

    fn entry_value(&self, cx: &FlowContext) -> CallbackErrorElement {
        let owner = cx.scopes.scope(cx.scope).owner;
        let mut element = CallbackErrorElement::default();
        if let NodeKind::Function { params, .. } = cx.tree.kind(owner) {
            for &param in params {
                if let Some(text) = cx.tree.name_text(param) {
                    if is_error_name(text) {
                        element.unchecked.insert(text.to_string());
                    }
                }
            }
        }
        element
    }

    fn transfer_node(&self, cx: &FlowContext, node: CfgNodeId, element: &mut Self::Element) {
        let node = cx.cfg.node(node);
        // The entry node wraps the whole function; only statement nodes are
        // call sites.
        if node.kind != CfgNodeKind::Statement {
            return;
        }
        let Some(statement) = node.statement else {
            return;
        };
        if !invokes_parameter(cx, statement) {
            return;
        }
        let checked: Vec<String> = element.checked.iter().cloned().collect();
        let unchecked: Vec<String> = element.unchecked.iter().cloned().collect();
        element.protected_calls.extend(checked);
        element.unprotected_calls.extend(unchecked);
    }

    fn transfer_edge(&self, cx: &FlowContext, edge: CfgEdgeId, element: &mut Self::Element) {
        let Some(condition) = cx.cfg.edge(edge).condition else {
            return;
        };
        let tested: Vec<String> = element
            .unchecked
            .iter()
            .filter(|name| condition_checks(cx.tree, condition, name))
            .cloned()
            .collect();
        for name in tested {
            element.unchecked.remove(&name);
            element.checked.insert(name);
        }
    }
}

/// What one version established about one function.
#[derive(Debug, Clone)]
pub struct FunctionRecord {
    /// The owning function or script node, in its own tree.
    pub node: NodeId,
    /// Paired source node, when the differencer mapped this function.
    pub mapped: Option<NodeId>,
    pub label: String,
    /// Error parameters checked at every recorded callback invocation.
    pub protected: BTreeSet<String>,
    /// Error parameters reaching some callback invocation unchecked.
    pub unprotected: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct CallbackErrorFacts {
    saw_source: bool,
    source: Vec<FunctionRecord>,
    destination: Vec<FunctionRecord>,
}

impl CallbackErrorFacts {
    /// The source-version record this destination function corresponds to:
    /// the node mapping when the differencer provides one, the function
    /// label otherwise.
    fn matched_source(&self, record: &FunctionRecord) -> Option<&FunctionRecord> {
        record
            .mapped
            .and_then(|mapped| self.source.iter().find(|s| s.node == mapped))
            .or_else(|| self.source.iter().find(|s| s.label == record.label))
    }
}

pub struct CallbackErrorAnalysis {
    engine: FlowEngine,
}

impl CallbackErrorAnalysis {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            engine: FlowEngine::new(config),
        }
    }
}

impl Default for CallbackErrorAnalysis {
    fn default() -> Self {
        Self::new(FlowConfig::default())
    }
}

impl PatternAnalysis for CallbackErrorAnalysis {
    type Facts = CallbackErrorFacts;

    fn analyze_version(
        &self,
        version: Version,
        cx: &VersionContext,
        _meta: &AnalysisMetaInformation,
        facts: &mut CallbackErrorFacts,
    ) -> Result<()> {
        if version == Version::Source {
            facts.saw_source = true;
        }

        for scope_id in cx.scope_preorder() {
            let results = cx.run_flow(&self.engine, &CallbackErrorFlow, scope_id)?;
            let owner = cx.scopes.scope(scope_id).owner;
            let cfg = cx.cfg_for(owner)?;

            // The exit value joins all paths. Functions that never reach the
            // exit (infinite loops) fall back to joining every node value.
            let at_exit = match results.value_at(cfg.exit()) {
                Some(element) => element.clone(),
                None => {
                    let mut joined = CallbackErrorElement::default();
                    for (_, element) in results.iter() {
                        joined.join(element);
                    }
                    joined
                }
            };

            let label = cx.function_label(scope_id);
            tracing::debug!(
                function = %label,
                protected = at_exit.protected_calls.len(),
                unprotected = at_exit.unprotected_calls.len(),
                "callback invocation facts at exit"
            );
            // Every function is recorded, even without error parameters, so
            // synthesis can tell a function absent from the source apart
            // from one present without facts.
            let record = FunctionRecord {
                node: owner,
                mapped: cx.tree.mapped(owner),
                label,
                protected: at_exit.protected_calls,
                unprotected: at_exit.unprotected_calls,
            };
            match version {
                Version::Source => facts.source.push(record),
                Version::Destination => facts.destination.push(record),
            }
        }
        Ok(())
    }

    fn synthesize(&self, facts: &CallbackErrorFacts, meta: &AnalysisMetaInformation) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for dst in &facts.destination {
            let matched = facts.matched_source(dst);
            // A function with no source counterpart carries no repair to
            // compare against, unless we only ever saw the destination.
            if facts.saw_source && matched.is_none() {
                continue;
            }
            for name in dst.protected.difference(&dst.unprotected) {
                let checked_before = matched.map_or(false, |src| {
                    src.protected.contains(name) && !src.unprotected.contains(name)
                });
                if checked_before {
                    continue;
                }
                alerts.push(Alert::new(
                    meta.clone(),
                    "CB",
                    "ERROR_CHECK_ADDED",
                    dst.label.clone(),
                    format!(
                        "error parameter `{}` is now checked before the callback runs",
                        name
                    ),
                    format!(
                        "the repaired version of `{}` branches on `{}` before invoking the callback; the buggy version never did",
                        dst.label, name
                    ),
                ));
            }
        }
        alerts
    }
}
