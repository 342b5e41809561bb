use crate::meta::AnalysisMetaInformation;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// One detected instance of a repair pattern.
///
/// Two alerts are considered the same detection when they agree on pattern
/// kind, subkind and enclosing function; source positions are deliberately
/// left out of the identity so the same repair reported from slightly
/// different statements deduplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub meta: AnalysisMetaInformation,
    /// Pattern type, e.g. `CB` for callback error handling.
    pub kind: String,
    /// Pattern subtype within the kind.
    pub subkind: String,
    /// Name of the enclosing function, or `~script` for top-level code.
    pub function_name: String,
    pub description: String,
    pub explanation: String,
}

impl Alert {
    pub fn new(
        meta: AnalysisMetaInformation,
        kind: impl Into<String>,
        subkind: impl Into<String>,
        function_name: impl Into<String>,
        description: impl Into<String>,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            meta,
            kind: kind.into(),
            subkind: subkind.into(),
            function_name: function_name.into(),
            description: description.into(),
            explanation: explanation.into(),
        }
    }

    pub fn identifier(&self) -> String {
        format!("{}_{}", self.kind, self.subkind)
    }
}

impl PartialEq for Alert {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.subkind == other.subkind
            && self.function_name == other.function_name
    }
}

impl Eq for Alert {}

impl Hash for Alert {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.subkind.hash(state);
        self.function_name.hash(state);
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{} in {}", self.kind, self.subkind, self.function_name)
    }
}
