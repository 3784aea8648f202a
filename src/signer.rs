use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::{OffsetDateTime, UtcOffset};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

type HmacSha256 = Hmac<Sha256>;

pub const AUTH_SCHEME: &str = "bhesignature";
pub const CONTENT_TYPE_JSON: &str = "application/json";

// Date, "T" and hour of the ISO-8601 request date.
const DATE_PREFIX_LEN: usize = 13;

const REQUEST_DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6][offset_hour sign:mandatory]:[offset_minute]"
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub request_date: String,
    pub signature: String,
}

impl SignedHeaders {
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("Authorization", self.authorization.as_str()),
            ("RequestDate", self.request_date.as_str()),
            ("Signature", self.signature.as_str()),
            ("Content-Type", CONTENT_TYPE_JSON),
        ]
    }
}

#[derive(Clone)]
pub struct RequestSigner {
    token_id: String,
    token_key: String,
    offset: UtcOffset,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("token_id", &self.token_id)
            .field("token_key", &"***")
            .field("offset", &self.offset)
            .finish()
    }
}

impl RequestSigner {
    /// Dates are rendered in UTC until [`RequestSigner::with_offset`] sets the local offset.
    pub fn new(token_id: impl Into<String>, token_key: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            token_key: token_key.into(),
            offset: UtcOffset::UTC,
        }
    }

    pub fn with_offset(mut self, offset: UtcOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Signs one request with the current time in the signer's offset. Every call
    /// produces a fresh signature.
    pub fn sign(&self, method: &str, uri: &str, body: Option<&[u8]>) -> SignedHeaders {
        self.sign_at(method, uri, body, OffsetDateTime::now_utc())
    }

    pub fn sign_at(
        &self,
        method: &str,
        uri: &str,
        body: Option<&[u8]>,
        now: OffsetDateTime,
    ) -> SignedHeaders {
        let request_date = format_request_date(now.to_offset(self.offset));
        let signature = compute_signature(
            self.token_key.as_bytes(),
            method,
            uri,
            &request_date,
            body,
        );
        SignedHeaders {
            authorization: format!("{AUTH_SCHEME} {}", self.token_id),
            request_date,
            signature,
        }
    }
}

/// HMAC chain over `method ++ uri`, the request-date prefix and the body.
/// A missing body is signed as an empty one.
pub fn compute_signature(
    key: &[u8],
    method: &str,
    uri: &str,
    request_date: &str,
    body: Option<&[u8]>,
) -> String {
    let operation = hmac_digest(key, &[method.as_bytes(), uri.as_bytes()]);
    let date = hmac_digest(&operation, &[date_prefix(request_date).as_bytes()]);
    let signature = hmac_digest(&date, &[body.unwrap_or_default()]);
    STANDARD.encode(signature)
}

pub fn date_prefix(request_date: &str) -> &str {
    request_date.get(..DATE_PREFIX_LEN).unwrap_or(request_date)
}

pub fn format_request_date(now: OffsetDateTime) -> String {
    now.format(REQUEST_DATE_FORMAT)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// Local UTC offset, or UTC when it cannot be determined. On Unix the lookup only
/// succeeds while the process is single-threaded, so call this before any HTTP
/// client exists.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

fn hmac_digest(key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts keys of any length");
    };
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().to_vec()
}
