//! Turning exported profiling documents into storable records
//!
//! An export is one JSON document per profiled request:
//!
//! ```json
//! {
//!   "profile": { "main()": { "wt": 120, "ct": 1, "cpu": 90, "mu": 2048, "pmu": 4096 } },
//!   "meta": { "url": "/orders?id=42", "request_ts": 1700000000 }
//! }
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::{ProfileMetrics, ProfileRecord};

/// Key of the root call in a profile payload
pub const MAIN_ENTRY: &str = "main()";

/// One exported profile as produced by the instrumentation.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportDocument {
    /// Existing identifier, if the exporter assigned one
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    /// Call tree keyed by `parent==>child` edges plus `main()`
    pub profile: serde_json::Value,
    pub meta: ImportMeta,
}

/// Request context captured next to the profile.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportMeta {
    pub url: Option<String>,
    #[serde(default, rename = "SERVER")]
    pub server: Option<serde_json::Value>,
    #[serde(default)]
    pub get: Option<serde_json::Value>,
    #[serde(default)]
    pub env: Option<serde_json::Value>,
    #[serde(default)]
    pub simple_url: Option<String>,
    #[serde(default)]
    pub request_ts: Option<i64>,
    #[serde(default)]
    pub request_ts_micro: Option<f64>,
    #[serde(default)]
    pub request_date: Option<NaiveDate>,
}

impl ImportDocument {
    /// Parse a single JSON document.
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Build the record the store persists.
    ///
    /// Missing timestamps fall back to `now`; the simple URL is derived
    /// from the full URL when the exporter did not provide one.
    pub fn into_record(self, now: DateTime<Utc>) -> Result<ProfileRecord> {
        let metrics = main_metrics(&self.profile)?;
        let meta = self.meta;

        let request_ts = meta.request_ts.unwrap_or_else(|| now.timestamp());
        let request_ts_micro = meta
            .request_ts_micro
            .map(round_micro)
            .unwrap_or(request_ts as f64);
        let request_date = match meta.request_date {
            Some(date) => date,
            None => DateTime::<Utc>::from_timestamp(request_ts, 0)
                .ok_or_else(|| Error::Import(format!("request_ts out of range: {request_ts}")))?
                .date_naive(),
        };
        let simple_url = meta
            .simple_url
            .or_else(|| meta.url.as_deref().map(simple_url));

        Ok(ProfileRecord {
            id: self.id.unwrap_or_else(generate_id),
            profile: serde_json::to_string(&self.profile)?,
            url: meta.url,
            server: meta.server.map(|v| v.to_string()),
            get: meta.get.map(|v| v.to_string()),
            env: meta.env.map(|v| v.to_string()),
            simple_url,
            request_ts,
            request_ts_micro,
            request_date,
            metrics,
        })
    }
}

/// Extract summary metrics from the `main()` entry of a payload.
pub fn main_metrics(profile: &serde_json::Value) -> Result<ProfileMetrics> {
    let main = profile
        .get(MAIN_ENTRY)
        .ok_or_else(|| Error::Import(format!("profile has no {MAIN_ENTRY} entry")))?;
    let field = |key: &str| main.get(key).and_then(|v| v.as_i64()).unwrap_or(0);

    Ok(ProfileMetrics {
        wt: field("wt"),
        ct: field("ct"),
        cpu: field("cpu"),
        mu: field("mu"),
        pmu: field("pmu"),
    })
}

/// Normalize a URL for grouping: numeric parameter values are dropped so
/// `/item?id=7` and `/item?id=8` share one simple URL.
pub fn simple_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    let mut chars = url.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '=' && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            while chars.peek().is_some_and(|n| n.is_ascii_digit()) {
                chars.next();
            }
            continue;
        }
        out.push(c);
    }
    out
}

/// Generate a 24-character lowercase hex identifier.
///
/// The first 8 characters encode the creation time in epoch seconds; the
/// remaining 16 are random.
pub fn generate_id() -> String {
    let secs = Utc::now().timestamp() as u32;
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{:08x}{}", secs, &random[..16])
}

fn round_micro(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
