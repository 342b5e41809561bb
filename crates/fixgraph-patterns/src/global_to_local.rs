/*! Accidental-global repairs.
 *
 * Assigning to an undeclared name creates a global. The usual repair
 * declares the variable, so the analysis collects the globals of the buggy
 * version and the freshly inserted declarations of the repaired version;
 * a name appearing in both is a global that became local.
 */

use fixgraph_core::ast::ChangeTag;
use fixgraph_core::diff::{PatternAnalysis, Version, VersionContext};
use fixgraph_core::meta::AnalysisMetaInformation;
use fixgraph_core::{Alert, Result};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct GlobalToLocalFacts {
    /// Names the buggy version leaked into the global scope.
    source_globals: BTreeSet<String>,
    /// Declarations the repair inserted, per function label.
    inserted_declarations: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Default)]
pub struct GlobalToLocalAnalysis;

impl PatternAnalysis for GlobalToLocalAnalysis {
    type Facts = GlobalToLocalFacts;

    fn analyze_version(
        &self,
        version: Version,
        cx: &VersionContext,
        _meta: &AnalysisMetaInformation,
        facts: &mut GlobalToLocalFacts,
    ) -> Result<()> {
        match version {
            Version::Source => {
                let root = cx.scopes.scope(cx.scopes.root());
                facts
                    .source_globals
                    .extend(root.globals.keys().cloned());
            }
            Version::Destination => {
                for scope_id in cx.scope_preorder() {
                    let scope = cx.scopes.scope(scope_id);
                    let inserted: BTreeSet<String> = scope
                        .variables
                        .iter()
                        .filter(|(_, &decl)| cx.tree.change(decl) == ChangeTag::Inserted)
                        .map(|(name, _)| name.clone())
                        .collect();
                    if inserted.is_empty() {
                        continue;
                    }
                    facts
                        .inserted_declarations
                        .entry(cx.function_label(scope_id))
                        .or_default()
                        .extend(inserted);
                }
            }
        }
        Ok(())
    }

    fn synthesize(&self, facts: &GlobalToLocalFacts, meta: &AnalysisMetaInformation) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for (label, names) in &facts.inserted_declarations {
            for name in names.intersection(&facts.source_globals) {
                alerts.push(Alert::new(
                    meta.clone(),
                    "GTL",
                    "NEW_LOCAL",
                    label.clone(),
                    format!("`{}` was an accidental global and is now declared", name),
                    format!(
                        "the buggy version assigned `{}` without a declaration; the repair declares it in `{}`",
                        name, label
                    ),
                ));
            }
        }
        alerts
    }
}
