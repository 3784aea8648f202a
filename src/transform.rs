use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::api::{ApiError, BloodHoundClient, Transport};
use crate::core::{ArtifactPayload, ContainerPayload, Finding, PrincipalRole, Severity};

const LARGE_DEFAULT_PREFIX: &str = "LargeDefault";
const LARGE_DEFAULT_GROUPS_PREFIX: &str = "LargeDefaultGroups";

/// Risk score in 0..=100 derived from the record's fractional percentages.
pub fn severity(finding: &Finding) -> f64 {
    let fraction = if finding.names_generic_principal()
        || finding.finding_type.starts_with(LARGE_DEFAULT_GROUPS_PREFIX)
    {
        finding.impact_percentage
    } else {
        finding.exposure_percentage
    };
    fraction.unwrap_or(0.0) * 100.0
}

pub fn bucket(score: f64) -> Severity {
    Severity::from_score(score)
}

pub fn principal_label(role: PrincipalRole, finding_type: &str) -> &'static str {
    let large_default = finding_type.starts_with(LARGE_DEFAULT_PREFIX);
    match role {
        PrincipalRole::Generic if large_default => "Group",
        PrincipalRole::Generic => "Non Tier Zero Principal",
        PrincipalRole::To if large_default => "Principal",
        PrincipalRole::To => "Tier Zero Principal",
        PrincipalRole::From => "User",
    }
}

fn cef_type(field: &str) -> Option<&'static str> {
    match field {
        "domain" => Some("domain"),
        "email" => Some("user id"),
        _ => None,
    }
}

pub fn build_artifacts(finding: &Finding) -> Vec<ArtifactPayload> {
    finding
        .principals()
        .into_iter()
        .map(|(role, principal)| {
            let name = principal.name().to_string();
            let description = principal
                .description()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} with name {name}", role.as_str()));
            let cef_types: BTreeMap<String, Vec<String>> = principal
                .props
                .keys()
                .filter_map(|k| cef_type(k).map(|t| (k.clone(), vec![t.to_string()])))
                .collect();
            ArtifactPayload {
                source_data_identifier: principal.object_id.clone(),
                name,
                description,
                kind: principal.kind.clone(),
                label: principal_label(role, &finding.finding_type).to_string(),
                cef: principal.props.clone(),
                cef_types,
                container_id: None,
                id: None,
            }
        })
        .collect()
}

pub struct FindingTransformer<'a, T> {
    client: &'a BloodHoundClient<T>,
    container_label: String,
    titles: HashMap<String, String>,
}

impl<'a, T: Transport> FindingTransformer<'a, T> {
    pub fn new(client: &'a BloodHoundClient<T>, container_label: impl Into<String>) -> Self {
        Self {
            client,
            container_label: container_label.into(),
            titles: HashMap::new(),
        }
    }

    /// Human-readable title of a finding type, fetched once per run.
    pub fn title(&mut self, finding_type: &str) -> Result<String, ApiError> {
        if let Some(title) = self.titles.get(finding_type) {
            return Ok(title.clone());
        }
        let title = self.client.finding_title(finding_type)?.trim().to_string();
        debug!(finding_type, title = %title, "cached finding title");
        self.titles.insert(finding_type.to_string(), title.clone());
        Ok(title)
    }

    pub fn cached_titles(&self) -> usize {
        self.titles.len()
    }

    pub fn container_identifier(
        &mut self,
        finding: &Finding,
        domain_name: &str,
    ) -> Result<String, ApiError> {
        let title = self.title(&finding.finding_type)?;
        Ok(format!("{domain_name}:{title}:{}", finding.id))
    }

    /// Artifacts are attached only to a container that does not exist yet; updates
    /// merge them one by one instead.
    pub fn build_container(
        &mut self,
        finding: &Finding,
        domain_name: &str,
        is_new: bool,
    ) -> Result<ContainerPayload, ApiError> {
        let title = self.title(&finding.finding_type)?;
        let score = severity(finding);

        let mut data = finding.raw.clone();
        data.insert("severity".to_string(), Value::from(score));

        Ok(ContainerPayload {
            name: format!("{domain_name} : {title} : {}", finding.id),
            description: finding.finding_type.clone(),
            label: self.container_label.clone(),
            source_data_identifier: format!("{domain_name}:{title}:{}", finding.id),
            severity: bucket(score),
            data: Value::Object(data),
            asset_id: None,
            artifacts: if is_new {
                build_artifacts(finding)
            } else {
                Vec::new()
            },
        })
    }

    pub fn build_artifacts(&self, finding: &Finding) -> Vec<ArtifactPayload> {
        build_artifacts(finding)
    }
}
