use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Method;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::{ArtifactPayload, ContainerPayload};
use crate::store::{ArtifactId, CaseStore, ContainerId, ExistingArtifact, StoreError};

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    failed: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

/// One SOAR REST call, relative to `<base>/rest/`.
#[derive(Debug, Clone, PartialEq)]
struct SoarRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
}

impl SoarRequest {
    fn get(path: impl Into<String>, query: Vec<(&'static str, String)>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query,
            body: None,
        }
    }

    fn post<B: Serialize + ?Sized>(path: impl Into<String>, body: &B) -> Result<Self, StoreError> {
        let body = serde_json::to_value(body).map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        })
    }
}

fn quoted(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn find_container_request(identifier: &str, asset_id: u64) -> SoarRequest {
    SoarRequest::get(
        "container",
        vec![
            ("_filter_source_data_identifier", quoted(identifier)),
            ("_filter_asset", asset_id.to_string()),
        ],
    )
}

fn create_container_request(
    container: &ContainerPayload,
    asset_id: u64,
) -> Result<SoarRequest, StoreError> {
    let mut body = container.clone();
    body.asset_id = Some(asset_id);
    SoarRequest::post("container", &body)
}

/// The body never carries `artifacts`; they are merged one by one afterwards.
fn update_container_request(
    id: ContainerId,
    container: &ContainerPayload,
) -> Result<SoarRequest, StoreError> {
    let mut req = SoarRequest::post(format!("container/{id}"), container)?;
    if let Some(Value::Object(body)) = req.body.as_mut() {
        body.remove("artifacts");
    }
    Ok(req)
}

fn find_artifact_request(identifier: &str, container_id: ContainerId) -> SoarRequest {
    SoarRequest::get(
        "artifact",
        vec![
            ("_filter_source_data_identifier", quoted(identifier)),
            ("_filter_container_id", container_id.to_string()),
            ("sort", "id".to_string()),
            ("order", "desc".to_string()),
        ],
    )
}

fn create_artifact_request(artifact: &ArtifactPayload) -> Result<SoarRequest, StoreError> {
    SoarRequest::post("artifact", artifact)
}

fn update_artifact_request(artifact: &ArtifactPayload) -> Result<SoarRequest, StoreError> {
    let Some(id) = artifact.id else {
        return Err(StoreError::Rejected("artifact without id".to_string()));
    };
    SoarRequest::post(format!("artifact/{id}"), artifact)
}

fn read_json<T: serde::de::DeserializeOwned>(status: u16, body: String) -> Result<T, StoreError> {
    if !(200..300).contains(&status) {
        return Err(StoreError::Status { status, body });
    }
    serde_json::from_str(&body).map_err(|e| StoreError::Parse(e.to_string()))
}

fn read_save(status: u16, body: String) -> Result<SaveResponse, StoreError> {
    let saved: SaveResponse = read_json(status, body)?;
    if saved.failed.unwrap_or(false) {
        return Err(StoreError::Rejected(
            saved.message.unwrap_or_else(|| "failed".to_string()),
        ));
    }
    Ok(saved)
}

fn saved_id(saved: SaveResponse, what: &str) -> Result<u64, StoreError> {
    saved
        .id
        .ok_or_else(|| StoreError::Parse(format!("{what} id missing from response")))
}

fn first_id(list: &ListResponse, key: &str) -> Option<u64> {
    if list.count == 0 {
        return None;
    }
    list.data.first()?.get(key)?.as_u64()
}

/// Newest match first; an artifact without a `container` field belongs to the
/// container it was looked up in.
fn first_artifact(list: &ListResponse, container_id: ContainerId) -> Option<ExistingArtifact> {
    let id = first_id(list, "id")?;
    let owner = first_id(list, "container").unwrap_or(container_id);
    Some(ExistingArtifact {
        id,
        container_id: owner,
    })
}

/// SOAR REST backend (`rest/container`, `rest/artifact`).
pub struct SoarStore {
    client: reqwest::blocking::Client,
    base_url: String,
    auth_token: String,
    asset_id: u64,
}

impl SoarStore {
    pub fn new(base_url: &str, auth_token: &str, asset_id: u64, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("HTTP クライアントの初期化に失敗しました")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.to_string(),
            asset_id,
        })
    }

    fn execute(&self, req: SoarRequest) -> Result<(u16, String), StoreError> {
        let url = format!("{}/rest/{}", self.base_url, req.path);
        let mut builder = self
            .client
            .request(req.method, url)
            .bearer_auth(&self.auth_token)
            .query(&req.query);
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }
        let resp = builder
            .send()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok((status, body))
    }

    fn list(&self, req: SoarRequest) -> Result<ListResponse, StoreError> {
        let (status, body) = self.execute(req)?;
        read_json(status, body)
    }

    fn save(&self, req: SoarRequest) -> Result<SaveResponse, StoreError> {
        let (status, body) = self.execute(req)?;
        read_save(status, body)
    }
}

impl CaseStore for SoarStore {
    fn find_container(&self, identifier: &str) -> Result<Option<ContainerId>, StoreError> {
        let list = self.list(find_container_request(identifier, self.asset_id))?;
        Ok(first_id(&list, "id"))
    }

    fn create_container(&mut self, container: &ContainerPayload) -> Result<ContainerId, StoreError> {
        let saved = self.save(create_container_request(container, self.asset_id)?)?;
        saved_id(saved, "container")
    }

    fn update_container(
        &mut self,
        id: ContainerId,
        container: &ContainerPayload,
    ) -> Result<(), StoreError> {
        self.save(update_container_request(id, container)?).map(|_| ())
    }

    fn find_artifact(
        &self,
        identifier: &str,
        container_id: ContainerId,
    ) -> Result<Option<ExistingArtifact>, StoreError> {
        let list = self.list(find_artifact_request(identifier, container_id))?;
        Ok(first_artifact(&list, container_id))
    }

    fn create_artifact(&mut self, artifact: &ArtifactPayload) -> Result<ArtifactId, StoreError> {
        let saved = self.save(create_artifact_request(artifact)?)?;
        saved_id(saved, "artifact")
    }

    fn update_artifact(&mut self, artifact: &ArtifactPayload) -> Result<(), StoreError> {
        self.save(update_artifact_request(artifact)?).map(|_| ())
    }
}
