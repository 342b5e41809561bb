use serde::{Deserialize, Serialize};

/// Read-only context for one file-pair analysis: where the two versions came
/// from. Threaded through the pipeline and copied into produced alerts; the
/// core never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisMetaInformation {
    /// Identifier for the project or repository under analysis.
    pub project_id: String,
    /// Path to the file version where the bug is present.
    pub buggy_file: String,
    /// Path to the file version where the bug is repaired.
    pub repaired_file: String,
    pub buggy_commit_id: String,
    pub repaired_commit_id: String,
}

impl AnalysisMetaInformation {
    pub fn new(
        project_id: impl Into<String>,
        buggy_file: impl Into<String>,
        repaired_file: impl Into<String>,
        buggy_commit_id: impl Into<String>,
        repaired_commit_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            buggy_file: buggy_file.into(),
            repaired_file: repaired_file.into(),
            buggy_commit_id: buggy_commit_id.into(),
            repaired_commit_id: repaired_commit_id.into(),
        }
    }
}
