use serde::{Deserialize, Serialize};
use std::fmt;

const MEDIUM_FLOOR: f64 = 33.33;
const HIGH_FLOOR: f64 = 66.66;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Buckets a 0..=100 risk score. Each tier excludes its lower bound and includes its upper bound.
    pub fn from_score(score: f64) -> Self {
        if score > HIGH_FLOOR {
            Severity::High
        } else if score > MEDIUM_FLOOR {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
