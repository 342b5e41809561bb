/*! Differential orchestration.
 *
 * A pattern analysis runs over the buggy and repaired versions of one file,
 * accumulates whatever facts it needs from each side, and then synthesizes
 * alerts by comparing the two fact sets. The source version is optional: a
 * pattern that only inspects the repaired version runs the same way with
 * the source step skipped.
 */

use crate::alert::Alert;
use crate::ast::{NodeId, SyntaxTree};
use crate::cfg::Cfg;
use crate::flow::{FlowAnalysis, FlowContext, FlowEngine, FlowResults};
use crate::lower::build_cfgs;
use crate::meta::AnalysisMetaInformation;
use crate::scope::{ScopeId, ScopeTree};
use crate::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Which side of the pair a version belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// The buggy version, before the repair.
    Source,
    /// The repaired version.
    Destination,
}

/// One version of a file, fully prepared for analysis: scope tree resolved
/// and one CFG per function and script.
pub struct VersionContext<'a> {
    pub tree: &'a SyntaxTree,
    pub scopes: ScopeTree,
    pub cfgs: Vec<Cfg>,
}

impl<'a> VersionContext<'a> {
    pub fn prepare(tree: &'a SyntaxTree) -> Result<Self> {
        let root = tree
            .root()
            .ok_or_else(|| AnalysisError::MalformedTree("tree has no root".to_string()))?;
        let scopes = ScopeTree::resolve(tree, root)?;
        let cfgs = build_cfgs(tree)?;
        Ok(Self { tree, scopes, cfgs })
    }

    /// The CFG owned by the given script or function node.
    pub fn cfg_for(&self, owner: NodeId) -> Result<&Cfg> {
        self.cfgs
            .iter()
            .find(|cfg| cfg.owner == owner)
            .ok_or_else(|| AnalysisError::MissingCfg {
                identity: owner.to_string(),
            })
    }

    /// Runs a dataflow analysis over the CFG of one scope.
    pub fn run_flow<A: FlowAnalysis>(
        &self,
        engine: &FlowEngine,
        analysis: &A,
        scope: ScopeId,
    ) -> Result<FlowResults<A::Element>> {
        let owner = self.scopes.scope(scope).owner;
        let cfg = self.cfg_for(owner)?;
        let cx = FlowContext {
            tree: self.tree,
            scopes: &self.scopes,
            scope,
            cfg,
        };
        Ok(engine.run(analysis, &cx))
    }

    /// Human-readable label for the function a scope belongs to. Top-level
    /// code reports as `~script`, anonymous functions fall back to the
    /// scope identity.
    pub fn function_label(&self, scope: ScopeId) -> String {
        let scope = self.scopes.scope(scope);
        if scope.parent.is_none() {
            return "~script".to_string();
        }
        match self.tree.function_name(scope.owner) {
            Some(name) => name.to_string(),
            None => scope.identity.clone(),
        }
    }

    /// Scopes in preorder, parents before children.
    pub fn scope_preorder(&self) -> Vec<ScopeId> {
        self.scopes.preorder()
    }
}

/// The two versions of one changed file, plus provenance.
pub struct FilePair {
    pub meta: AnalysisMetaInformation,
    /// Absent when the file was created by the repair commit.
    pub source: Option<SyntaxTree>,
    pub destination: SyntaxTree,
}

/// One repair pattern, run differentially over a file pair.
pub trait PatternAnalysis {
    /// Facts accumulated across both versions.
    type Facts: Default;

    /// Inspects one version and folds findings into `facts`.
    fn analyze_version(
        &self,
        version: Version,
        cx: &VersionContext,
        meta: &AnalysisMetaInformation,
        facts: &mut Self::Facts,
    ) -> Result<()>;

    /// Compares the accumulated facts and produces alerts.
    fn synthesize(&self, facts: &Self::Facts, meta: &AnalysisMetaInformation) -> Vec<Alert>;
}

fn is_minified(path: &str) -> bool {
    path.ends_with(".min.js")
}

/// Runs one pattern over one file pair and returns its alerts, deduplicated
/// in first-occurrence order. Minified builds are skipped outright.
pub fn analyze_pair<P: PatternAnalysis>(pattern: &P, pair: &FilePair) -> Result<Vec<Alert>> {
    if is_minified(&pair.meta.buggy_file) || is_minified(&pair.meta.repaired_file) {
        debug!(file = %pair.meta.repaired_file, "skipping minified file");
        return Ok(Vec::new());
    }

    let mut facts = P::Facts::default();

    if let Some(source) = &pair.source {
        let cx = VersionContext::prepare(source)?;
        pattern.analyze_version(Version::Source, &cx, &pair.meta, &mut facts)?;
    }

    let cx = VersionContext::prepare(&pair.destination)?;
    pattern.analyze_version(Version::Destination, &cx, &pair.meta, &mut facts)?;

    let mut seen = HashSet::new();
    let alerts = pattern
        .synthesize(&facts, &pair.meta)
        .into_iter()
        .filter(|alert| seen.insert(alert.clone()))
        .collect();
    Ok(alerts)
}

/// A pair the batch driver could not analyze.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairFailure {
    pub project_id: String,
    pub repaired_file: String,
    pub error: String,
}

/// Outcome of a batch run: every alert produced, plus the pairs that failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub alerts: Vec<Alert>,
    pub failures: Vec<PairFailure>,
}

impl BatchReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs one pattern over many file pairs. A malformed pair is recorded and
/// skipped; it never aborts the batch.
pub fn analyze_batch<P: PatternAnalysis>(pattern: &P, pairs: &[FilePair]) -> BatchReport {
    let mut report = BatchReport::default();

    for pair in pairs {
        match analyze_pair(pattern, pair) {
            Ok(mut alerts) => report.alerts.append(&mut alerts),
            Err(err) => {
                warn!(
                    project = %pair.meta.project_id,
                    file = %pair.meta.repaired_file,
                    error = %err,
                    "skipping file pair"
                );
                report.failures.push(PairFailure {
                    project_id: pair.meta.project_id.clone(),
                    repaired_file: pair.meta.repaired_file.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    report
}
