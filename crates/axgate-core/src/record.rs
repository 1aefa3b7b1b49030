//! Record batches, validation, and enrichment.
//!
//! A record is an opaque JSON object; the collector only interprets the
//! client-received timestamps (for validation) and the identity fields it
//! enriches. Validation is all-or-nothing per batch: one bad record rejects
//! the whole submission before anything is buffered.

use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::tenant::{DeveloperInfo, Tenant};

/// One analytics record: an opaque map of field name to JSON value.
pub type Record = serde_json::Map<String, Value>;

/// An ordered batch of records for a single resolved tenant.
///
/// Produced by the enrichment step and consumed exactly once by the bucket
/// manager; never mutated after hand-off.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub tenant: Tenant,
    pub records: Vec<Record>,
}

impl RecordBatch {
    pub fn new(tenant: Tenant, records: Vec<Record>) -> Self {
        Self { tenant, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

const START_TS: &str = "client_received_start_timestamp";
const END_TS: &str = "client_received_end_timestamp";

/// Validate a single record.
///
/// Both client-received timestamps must be present, numeric, and non-zero,
/// and the start must not exceed the end (equal is valid).
pub fn validate_record(record: &Record) -> Result<()> {
    for field in [START_TS, END_TS] {
        if record.get(field).map_or(true, Value::is_null) {
            return Err(CoreError::MissingField(field.to_string()));
        }
    }

    let start = number_field(record, START_TS)?;
    let end = number_field(record, END_TS)?;

    if start == 0.0 || end == 0.0 {
        return Err(CoreError::BadData(format!(
            "{START_TS} or {END_TS} cannot be 0"
        )));
    }
    if start > end {
        return Err(CoreError::BadData(format!("{START_TS} > {END_TS}")));
    }
    Ok(())
}

fn number_field(record: &Record, field: &str) -> Result<f64> {
    record
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| CoreError::BadData(format!("{START_TS} and {END_TS} has to be number")))
}

/// Validate every record in a batch; the first invalid record rejects the
/// whole batch. An empty batch is `NO_RECORDS`.
pub fn validate_batch(records: &[Record]) -> Result<()> {
    if records.is_empty() {
        return Err(CoreError::NoRecords);
    }
    for record in records {
        validate_record(record)?;
    }
    Ok(())
}

/// Enrich a record with tenant identity and developer attribution.
///
/// Organization and environment are always overwritten from the resolved
/// tenant. Developer fields are filled from `dev_info` only when the record
/// does not already carry a non-null value, and only when the record has a
/// `client_id` to attribute by (callers pass `None` otherwise).
pub fn enrich_record(record: &mut Record, tenant: &Tenant, dev_info: Option<&DeveloperInfo>) {
    record.insert(
        "organization".to_string(),
        Value::String(tenant.org.clone()),
    );
    record.insert(
        "environment".to_string(),
        Value::String(tenant.env.clone()),
    );

    if let Some(info) = dev_info {
        fill_if_absent(record, "api_product", &info.api_product);
        fill_if_absent(record, "developer_app", &info.developer_app);
        fill_if_absent(record, "developer_email", &info.developer_email);
        fill_if_absent(record, "developer", &info.developer);
    }
}

fn fill_if_absent(record: &mut Record, field: &str, value: &str) {
    let absent = record.get(field).map_or(true, Value::is_null);
    if absent {
        record.insert(field.to_string(), Value::String(value.to_string()));
    }
}

/// The api key a record is attributed by, when present.
pub fn client_id(record: &Record) -> Option<&str> {
    record.get("client_id").and_then(Value::as_str)
}
