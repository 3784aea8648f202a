use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::api::{ApiError, ApiResponse, Transport};
use crate::core::Domain;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct PageEnvelope {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub objectid: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

pub struct BloodHoundClient<T> {
    transport: T,
}

impl<T: Transport> BloodHoundClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// GET with status handling: anything outside 200..=399 is an error.
    pub fn get(&self, uri: &str) -> Result<ApiResponse, ApiError> {
        let resp = self.transport.get(uri)?;
        if !resp.is_success() {
            return Err(ApiError::Status {
                uri: uri.to_string(),
                status: resp.status,
                body: resp.body,
            });
        }
        Ok(resp)
    }

    pub fn get_json<R: DeserializeOwned>(&self, uri: &str) -> Result<R, ApiError> {
        let resp = self.get(uri)?;
        let body = if resp.body.trim().is_empty() {
            "{}"
        } else {
            resp.body.as_str()
        };
        serde_json::from_str(body).map_err(|err| ApiError::Parse {
            uri: uri.to_string(),
            message: err.to_string(),
        })
    }

    pub fn version(&self) -> Result<Value, ApiError> {
        self.get_json("/api/version")
    }

    pub fn available_domains(&self) -> Result<Vec<Domain>, ApiError> {
        let env: Envelope<Vec<Domain>> = self.get_json("/api/v2/available-domains")?;
        Ok(env.data)
    }

    pub fn available_types(&self, domain_id: &str) -> Result<Vec<String>, ApiError> {
        let env: Envelope<Vec<String>> =
            self.get_json(&format!("/api/v2/domains/{domain_id}/available-types"))?;
        Ok(env.data)
    }

    /// One page of raw finding records.
    pub fn finding_page(
        &self,
        domain_id: &str,
        finding_type: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Value>, ApiError> {
        let uri = format!(
            "/api/v2/domains/{domain_id}/details?finding={finding_type}&skip={skip}&limit={limit}"
        );
        let page: PageEnvelope = self.get_json(&uri)?;
        debug!(
            domain_id,
            finding_type,
            skip,
            returned = page.data.len(),
            count = ?page.count,
            "fetched details page"
        );
        Ok(page.data)
    }

    pub fn finding_title(&self, finding_type: &str) -> Result<String, ApiError> {
        let resp = self.get(&format!("/api/v2/assets/findings/{finding_type}/title.md"))?;
        Ok(resp.body.trim().to_string())
    }

    pub fn search(&self, term: &str) -> Result<Vec<SearchHit>, ApiError> {
        let env: Envelope<Vec<SearchHit>> = self.get_json(&format!("/api/v2/search?q={term}"))?;
        Ok(env.data)
    }

    pub fn shortest_path(&self, start_node: &str, end_node: &str) -> Result<Value, ApiError> {
        self.get_json(&format!(
            "/api/v2/graphs/shortest-path?start_node={start_node}&end_node={end_node}"
        ))
    }
}
