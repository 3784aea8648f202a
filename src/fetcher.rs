use thiserror::Error;
use tracing::{debug, info};

use crate::api::{ApiError, BloodHoundClient, Transport};
use crate::core::{Finding, FindingParseError};

pub const PAGE_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("所見レコードを解釈できません（skip={skip}）")]
    Record {
        skip: usize,
        #[source]
        source: FindingParseError,
    },
}

pub struct PaginatedFetcher<'a, T> {
    client: &'a BloodHoundClient<T>,
}

impl<'a, T: Transport> PaginatedFetcher<'a, T> {
    pub fn new(client: &'a BloodHoundClient<T>) -> Self {
        Self { client }
    }

    pub fn list_types(&self, domain_id: &str) -> Result<Vec<String>, ApiError> {
        let types = self.client.available_types(domain_id)?;
        info!(domain_id, types = types.len(), "available finding types");
        Ok(types)
    }

    /// Collects every finding of one type. The skip cursor advances by the number
    /// of records the server actually returned; the first empty page ends the walk.
    /// Any failing page discards what was collected so far.
    pub fn fetch_all(&self, domain_id: &str, finding_type: &str) -> Result<Vec<Finding>, FetchError> {
        let mut findings = Vec::new();
        let mut skip = 0;
        loop {
            let page = self
                .client
                .finding_page(domain_id, finding_type, skip, PAGE_SIZE)?;
            if page.is_empty() {
                break;
            }
            let returned = page.len();
            for record in page {
                let finding = Finding::parse(record, finding_type)
                    .map_err(|source| FetchError::Record { skip, source })?;
                findings.push(finding);
            }
            skip += returned;
        }
        debug!(
            domain_id,
            finding_type,
            total = findings.len(),
            "fetched all findings for type"
        );
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResponse;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Pages {
        responses: RefCell<VecDeque<Result<ApiResponse, ApiError>>>,
        seen: RefCell<Vec<String>>,
    }

    impl Pages {
        fn new(responses: Vec<Result<ApiResponse, ApiError>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for Pages {
        fn get(&self, uri: &str) -> Result<ApiResponse, ApiError> {
            self.seen.borrow_mut().push(uri.to_string());
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(ApiResponse::new(200, r#"{"data": []}"#)))
        }
    }

    fn page(ids: &[&str]) -> Result<ApiResponse, ApiError> {
        let data: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({"id": id, "ExposurePercentage": 0.1}))
            .collect();
        Ok(ApiResponse::new(
            200,
            serde_json::json!({"data": data, "count": data.len()}).to_string(),
        ))
    }

    #[test]
    fn skip_advances_by_records_returned() {
        let client = BloodHoundClient::new(Pages::new(vec![
            page(&["a", "b", "c"]),
            page(&["d"]),
            page(&[]),
        ]));
        let findings = PaginatedFetcher::new(&client)
            .fetch_all("D1", "T1")
            .expect("fetch");

        let ids: Vec<_> = findings.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(
            client.transport().seen.borrow().as_slice(),
            [
                "/api/v2/domains/D1/details?finding=T1&skip=0&limit=10",
                "/api/v2/domains/D1/details?finding=T1&skip=3&limit=10",
                "/api/v2/domains/D1/details?finding=T1&skip=4&limit=10",
            ]
        );
    }

    #[test]
    fn failing_page_discards_collected_findings() {
        let client = BloodHoundClient::new(Pages::new(vec![
            page(&["a", "b"]),
            Ok(ApiResponse::new(500, "boom")),
        ]));
        let err = PaginatedFetcher::new(&client)
            .fetch_all("D1", "T1")
            .unwrap_err();
        assert!(matches!(err, FetchError::Api(ApiError::Status { status: 500, .. })));
    }

    #[test]
    fn malformed_record_aborts_the_type() {
        let client = BloodHoundClient::new(Pages::new(vec![Ok(ApiResponse::new(
            200,
            r#"{"data": [{"Finding": "T1"}]}"#,
        ))]));
        let err = PaginatedFetcher::new(&client)
            .fetch_all("D1", "T1")
            .unwrap_err();
        assert!(matches!(err, FetchError::Record { skip: 0, .. }), "err={err:?}");
    }

    #[test]
    fn empty_type_list_is_valid() {
        let client = BloodHoundClient::new(Pages::new(vec![Ok(ApiResponse::new(
            200,
            r#"{"data": []}"#,
        ))]));
        let types = PaginatedFetcher::new(&client).list_types("D2").expect("types");
        assert!(types.is_empty());
    }
}
