use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::api::{ApiError, ApiResponse, Transport};
use crate::signer::RequestSigner;

const MAX_LOGGED_BODY_CHARS: usize = 500;

pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    signer: RequestSigner,
}

impl HttpTransport {
    pub fn new(base_url: &str, signer: RequestSigner, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("HTTP クライアントの初期化に失敗しました")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    fn get(&self, uri: &str) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{uri}", self.base_url);
        let headers = self.signer.sign("GET", uri, None);

        let mut req = self.client.get(&url);
        for (name, value) in headers.pairs() {
            req = req.header(name, value);
        }

        let connection_error = |err: reqwest::Error| ApiError::Connection {
            uri: uri.to_string(),
            message: err.to_string(),
        };
        let resp = req.send().map_err(connection_error)?;
        let status = resp.status().as_u16();
        let text = resp.text().map_err(connection_error)?;

        debug!(
            uri,
            status,
            body = %text.chars().take(MAX_LOGGED_BODY_CHARS).collect::<String>(),
            "BloodHound response"
        );

        Ok(ApiResponse::new(status, text))
    }
}
