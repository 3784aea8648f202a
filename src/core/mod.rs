mod case;
mod domain;
mod finding;
mod severity;
mod summary;

pub use case::{ArtifactPayload, ContainerPayload};
pub use domain::Domain;
pub use finding::{
    Finding, FindingParseError, FindingShape, Principal, PrincipalRole, Props, Relationship,
};
pub use severity::Severity;
pub use summary::{PollSummary, SkippedUnit};
