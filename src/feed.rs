use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT,
};

use crate::alert::Alerter;
use crate::decompress::decompress_detailed;
use crate::domain::{PageRequest, RawPayload, RelationshipRecord, SnapshotDate};
use crate::error::IngestError;
use crate::normalize::{NormalizeOptions, normalize_with};

const REJECTION_BODY_LIMIT: usize = 512;

/// One network round trip. `Err` is reserved for failures where no response
/// was received (or its body could not be read); any status that came back is
/// returned as a payload.
pub trait FeedTransport: Send + Sync {
    fn send(&self, request: &PageRequest) -> Result<RawPayload, IngestError>;
}

#[derive(Clone)]
pub struct HttpFeedTransport {
    client: Client,
    endpoint: String,
}

impl HttpFeedTransport {
    pub fn new(endpoint: &str, token: &str, timeout: Duration) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ratings-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::InvalidConfig(err.to_string()))?,
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| IngestError::InvalidConfig("token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        headers.insert(CONTENT_LANGUAGE, HeaderValue::from_static("en-US"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| IngestError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim().to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl FeedTransport for HttpFeedTransport {
    fn send(&self, request: &PageRequest) -> Result<RawPayload, IngestError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&request.query_pairs())
            .send()
            .map_err(|err| IngestError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| IngestError::Transport(err.to_string()))?;
        Ok(RawPayload::new(status, body.to_vec()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_pages: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub records: Vec<RelationshipRecord>,
    pub pages: u32,
}

pub struct Fetcher<T: FeedTransport, A: Alerter> {
    transport: T,
    alerter: A,
    retry: RetryPolicy,
    normalize: NormalizeOptions,
}

impl<T: FeedTransport, A: Alerter> Fetcher<T, A> {
    pub fn new(transport: T, alerter: A, retry: RetryPolicy, normalize: NormalizeOptions) -> Self {
        Self {
            transport,
            alerter,
            retry,
            normalize,
        }
    }

    /// Sends `request`, retrying transport failures. A response with any
    /// status other than 200 is fatal straight away and raises one alert.
    pub fn fetch_page(&self, request: &PageRequest) -> Result<RawPayload, IngestError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=max_attempts {
            match self.transport.send(request) {
                Ok(payload) if payload.is_ok() => {
                    tracing::info!(
                        bytes = payload.body.len(),
                        "received {request} from feed"
                    );
                    return Ok(payload);
                }
                Ok(payload) => return Err(self.reject(request, payload)),
                Err(err) if err.is_retryable() => {
                    tracing::warn!("attempt {attempt}/{max_attempts} for {request} failed: {err}");
                    last_error = Some(err);
                    if attempt < max_attempts {
                        thread::sleep(self.retry.base_delay * attempt);
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Err(IngestError::FetchFailed {
            attempts: max_attempts,
            cause: last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }

    /// Fetches one page and runs it through decompression and normalization.
    pub fn fetch_records(
        &self,
        request: &PageRequest,
    ) -> Result<Vec<RelationshipRecord>, IngestError> {
        let payload = self.fetch_page(request)?;
        let decoded = decompress_detailed(&payload.body);
        tracing::debug!(codec = %decoded.codec, chars = decoded.text.len(), "decoded {request}");
        let records = normalize_with(&decoded.text, self.normalize)?;
        tracing::info!("{request} normalized to {} relationships", records.len());
        Ok(records)
    }

    pub fn fetch_single(
        &self,
        snapshot_date: Option<SnapshotDate>,
    ) -> Result<FetchOutcome, IngestError> {
        let records = self.fetch_records(&PageRequest::single(snapshot_date))?;
        Ok(FetchOutcome { records, pages: 1 })
    }

    /// Requests page 1, 2, ... until a page normalizes to no records.
    pub fn fetch_all(
        &self,
        snapshot_date: Option<SnapshotDate>,
        pagination: Pagination,
    ) -> Result<FetchOutcome, IngestError> {
        let mut outcome = FetchOutcome::default();
        let mut page = 1u32;
        loop {
            if page > pagination.max_pages {
                tracing::warn!(
                    "stopping after {} pages without reaching an empty page",
                    pagination.max_pages
                );
                break;
            }
            let request = PageRequest::page(snapshot_date, page, pagination.page_size);
            let records = self.fetch_records(&request)?;
            if records.is_empty() {
                break;
            }
            outcome.records.extend(records);
            outcome.pages = page;
            tracing::info!(
                "fetched page {page}, {} records so far",
                outcome.records.len()
            );
            page += 1;
        }
        Ok(outcome)
    }

    fn reject(&self, request: &PageRequest, payload: RawPayload) -> IngestError {
        let mut message = payload.body_text();
        if message.len() > REJECTION_BODY_LIMIT {
            let mut cut = REJECTION_BODY_LIMIT;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        self.alerter.notify(
            "Feed API Error",
            &format!("feed returned status {} for {request}", payload.status),
        );
        IngestError::ServerRejection {
            status: payload.status,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_transport_rejects_bad_token() {
        let result = HttpFeedTransport::new("http://localhost", "bad\ntoken", Duration::from_secs(1));
        assert!(matches!(result, Err(IngestError::InvalidConfig(_))));
    }

    #[test]
    fn http_transport_trims_endpoint() {
        let transport =
            HttpFeedTransport::new(" http://localhost/feed ", "abc", Duration::from_secs(1))
                .unwrap();
        assert_eq!(transport.endpoint(), "http://localhost/feed");
    }
}
