use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// One normalized internal rating relationship, ready for bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub bdr_id: String,
    pub business_entity: String,
    pub nature: String,
    pub status: String,
    pub golden_bdr_id: Option<String>,
    pub label: Option<String>,
}

impl RelationshipRecord {
    pub fn new(
        bdr_id: impl Into<String>,
        business_entity: impl Into<String>,
        nature: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            bdr_id: bdr_id.into(),
            business_entity: business_entity.into(),
            nature: nature.into(),
            status: status.into(),
            golden_bdr_id: None,
            label: None,
        }
    }

    pub fn with_reason(mut self, golden_bdr_id: Option<String>, label: Option<String>) -> Self {
        self.golden_bdr_id = golden_bdr_id;
        self.label = label;
        self
    }
}

impl fmt::Display for RelationshipRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.bdr_id, self.business_entity, self.nature, self.status
        )
    }
}

/// Response body exactly as received, before any decoding.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawPayload {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Gzip,
    Deflate,
    Identity,
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Gzip => write!(f, "gzip"),
            Codec::Deflate => write!(f, "deflate"),
            Codec::Identity => write!(f, "identity"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotDate(NaiveDate);

impl SnapshotDate {
    pub fn today() -> Self {
        Self(chrono::Utc::now().date_naive())
    }

    pub fn as_date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for SnapshotDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for SnapshotDate {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|_| IngestError::InvalidConfig(format!("invalid snapshot date: {value}")))
    }
}

/// A single request against the feed endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub snapshot_date: Option<SnapshotDate>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageRequest {
    pub fn single(snapshot_date: Option<SnapshotDate>) -> Self {
        Self {
            snapshot_date,
            page: None,
            page_size: None,
        }
    }

    pub fn page(snapshot_date: Option<SnapshotDate>, page: u32, page_size: u32) -> Self {
        Self {
            snapshot_date,
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(date) = self.snapshot_date {
            pairs.push(("snapshotDate", date.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(size) = self.page_size {
            pairs.push(("pageSize", size.to_string()));
        }
        pairs
    }
}

impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "page {page}"),
            None => write!(f, "single page"),
        }
    }
}
