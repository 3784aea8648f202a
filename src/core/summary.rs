use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUnit {
    pub domain_id: String,
    pub domain_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding_type: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSummary {
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
    /// Artifacts attached to newly created containers; the only count bounded by
    /// `max_artifacts`.
    pub artifacts: u64,
    #[serde(default)]
    pub artifacts_merged: u64,
    pub domains_available: u64,
    pub domains_scanned: u64,
    pub limit_reached: bool,
    #[serde(default)]
    pub skipped: Vec<SkippedUnit>,
    pub message: String,
}

impl PollSummary {
    /// True when some finding failed or some domain or type was skipped.
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty() || self.failed > 0
    }
}
