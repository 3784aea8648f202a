//! Signed access to the BloodHound Enterprise API.
//!
//! [`Transport`] moves bytes; [`BloodHoundClient`] owns status handling and the
//! typed endpoints used by the poller and the lookup actions.

mod client;
mod http;

pub use client::{BloodHoundClient, SearchHit};
pub use http::HttpTransport;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("サーバーへの接続に失敗しました: {uri}: {message}")]
    Connection { uri: String, message: String },

    #[error("API がエラーを返しました: {uri}（status={status}）: {body}")]
    Status {
        uri: String,
        status: u16,
        body: String,
    },

    #[error("JSON 応答の解析に失敗しました: {uri}: {message}")]
    Parse { uri: String, message: String },
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Every BloodHound endpoint the poller and the lookups use is a bodiless GET.
pub trait Transport {
    /// `uri` is the path plus query, exactly as it is signed.
    fn get(&self, uri: &str) -> Result<ApiResponse, ApiError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, uri: &str) -> Result<ApiResponse, ApiError> {
        (**self).get(uri)
    }
}
