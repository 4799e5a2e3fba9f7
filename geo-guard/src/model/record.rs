//! One version of an administrative entity.

use super::entity::{end_event_pattern, start_event_pattern, EntityDescriptor};
use super::window::DateWindow;
use crate::core::store::{date_column, string_column};
use crate::error::{GeoError, Result};
use arrow::array::{
    Array, ArrayRef, Date32Builder, Int64Builder, StringArray, StringBuilder,
};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single row of a snapshot.
///
/// Serialized with the snapshot column names so that amendments in the
/// exceptions configuration read like the CSV files they are merged into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeographicRecord {
    pub uri: String,
    #[serde(rename = "insee_code")]
    pub code: String,
    pub label: String,
    #[serde(rename = "article_code")]
    pub qualifier_code: String,
    #[serde(
        rename = "parent_uri",
        default,
        with = "pipe_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub parent_uris: Vec<String>,
    pub start_event_uri: String,
    #[serde(default)]
    pub end_event_uri: Option<String>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Class-specific columns such as the ISO codes of countries
    #[serde(flatten)]
    pub extra: BTreeMap<String, Option<String>>,
}

mod pipe_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.join("|"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let joined = String::deserialize(deserializer)?;
        Ok(super::split_parent_uris(&joined))
    }
}

/// Splits a `|`-joined parent column. Empty input yields an empty list.
pub fn split_parent_uris(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        Vec::new()
    } else {
        joined.split('|').map(str::to_string).collect()
    }
}

impl GeographicRecord {
    /// Checks the record invariants and the class patterns.
    ///
    /// Used on amendments before they are merged into a snapshot, so the
    /// message names the offending uri.
    pub fn validate(&self, descriptor: &EntityDescriptor, window: &DateWindow) -> Result<()> {
        let fail = |reason: String| {
            Err(GeoError::Configuration(format!(
                "Invalid {} record '{}': {reason}",
                descriptor.description, self.uri
            )))
        };

        if !descriptor.uri_matches(&self.uri) {
            return fail(format!("uri does not match {}", descriptor.uri_pattern()));
        }
        if !descriptor.code_matches(&self.code) {
            return fail(format!("code '{}' does not match {}", self.code, descriptor.code_pattern));
        }
        if !descriptor.qualifier_matches(&self.qualifier_code) {
            return fail(format!("article code '{}' is not valid", self.qualifier_code));
        }
        if !descriptor.parent_uris_match(&self.parent_uris) {
            return fail(format!("parent uris '{}' are not valid", self.parent_uris.join("|")));
        }
        if !matches_pattern(&start_event_pattern(), &self.start_event_uri)? {
            return fail(format!("start event uri '{}' is not valid", self.start_event_uri));
        }
        if let Some(end_event) = &self.end_event_uri {
            if !matches_pattern(&end_event_pattern(), end_event)? {
                return fail(format!("end event uri '{end_event}' is not valid"));
            }
            if *end_event == self.start_event_uri {
                return fail("start and end events are identical".to_string());
            }
        }
        match (&self.end_event_uri, self.end_date) {
            (Some(_), None) => return fail("end_date must be provided with end_event_uri".into()),
            (None, Some(_)) => return fail("end_event_uri must be provided with end_date".into()),
            _ => {}
        }
        if !window.contains(self.start_date) {
            return fail(format!(
                "start date {} is outside [{}, {}]",
                self.start_date, window.min, window.max
            ));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return fail(format!("end date {end} is before start date {}", self.start_date));
            }
        }
        for key in self.extra.keys() {
            if !descriptor.extra_columns.iter().any(|(name, _)| name == key) {
                return fail(format!("unknown column '{key}'"));
            }
        }
        for (name, pattern) in descriptor.extra_columns {
            if let (Some(pattern), Some(Some(value))) = (pattern, self.extra.get(*name)) {
                if !matches_pattern(pattern, value)? {
                    return fail(format!("{name} '{value}' does not match {pattern}"));
                }
            }
        }
        Ok(())
    }
}

fn matches_pattern(pattern: &str, value: &str) -> Result<bool> {
    let regex = Regex::new(pattern).map_err(|e| GeoError::Internal(e.to_string()))?;
    Ok(regex.is_match(value))
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
    (date - epoch).num_days() as i32
}

/// Builds a snapshot batch from records, following the column order of the
/// descriptor. Extraction counts are derived the same way the extraction
/// query computes them.
pub fn records_to_batch(
    descriptor: &EntityDescriptor,
    records: &[GeographicRecord],
) -> Result<RecordBatch> {
    let mut columns: Vec<ArrayRef> = Vec::new();
    for name in descriptor.column_names() {
        let column: ArrayRef = match name {
            "start_date" | "end_date" => {
                let mut builder = Date32Builder::with_capacity(records.len());
                for r in records {
                    let value = if name == "start_date" { Some(r.start_date) } else { r.end_date };
                    builder.append_option(value.map(days_since_epoch));
                }
                Arc::new(builder.finish())
            }
            "parent_uri_count" | "start_date_count" | "end_date_count" => {
                let mut builder = Int64Builder::with_capacity(records.len());
                for r in records {
                    builder.append_value(match name {
                        "parent_uri_count" => r.parent_uris.len() as i64,
                        "start_date_count" => 1,
                        _ => i64::from(r.end_date.is_some()),
                    });
                }
                Arc::new(builder.finish())
            }
            _ => {
                let mut builder = StringBuilder::new();
                for r in records {
                    builder.append_option(text_value(r, name));
                }
                Arc::new(builder.finish())
            }
        };
        columns.push(column);
    }
    Ok(RecordBatch::try_new(descriptor.schema(), columns)?)
}

fn text_value(record: &GeographicRecord, column: &str) -> Option<String> {
    match column {
        "uri" => Some(record.uri.clone()),
        "insee_code" => Some(record.code.clone()),
        "label" => Some(record.label.clone()),
        "article_code" => Some(record.qualifier_code.clone()),
        "parent_uri" => Some(record.parent_uris.join("|")),
        "start_event_uri" => Some(record.start_event_uri.clone()),
        "end_event_uri" => record.end_event_uri.clone(),
        other => record.extra.get(other).cloned().flatten(),
    }
}

/// Decodes snapshot batches back into records. Rows with a null start date
/// cannot be represented and are reported as a parse error.
pub fn records_from_batches(
    descriptor: &EntityDescriptor,
    batches: &[RecordBatch],
) -> Result<Vec<GeographicRecord>> {
    let mut records = Vec::new();
    for batch in batches {
        let opt = |array: &StringArray, i: usize| -> Option<String> {
            (!array.is_null(i)).then(|| array.value(i).to_string())
        };

        let uri = string_column(batch, "uri")?;
        let code = string_column(batch, "insee_code")?;
        let label = string_column(batch, "label")?;
        let article = string_column(batch, "article_code")?;
        let start_event = string_column(batch, "start_event_uri")?;
        let end_event = string_column(batch, "end_event_uri")?;
        let start = date_column(batch, "start_date")?;
        let end = date_column(batch, "end_date")?;
        let parents = if descriptor.has_parents() {
            Some(string_column(batch, "parent_uri")?)
        } else {
            None
        };
        let extras = descriptor
            .extra_columns
            .iter()
            .map(|(name, _)| string_column(batch, name).map(|array| (*name, array)))
            .collect::<Result<Vec<_>>>()?;

        for i in 0..batch.num_rows() {
            let start_date = start.value_as_date(i).filter(|_| !start.is_null(i)).ok_or_else(|| {
                GeoError::Parse(format!("row {} of {} has no start date", i + 1, descriptor.description))
            })?;
            records.push(GeographicRecord {
                uri: opt(uri, i).unwrap_or_default(),
                code: opt(code, i).unwrap_or_default(),
                label: opt(label, i).unwrap_or_default(),
                qualifier_code: opt(article, i).unwrap_or_default(),
                parent_uris: parents
                    .and_then(|p| opt(p, i))
                    .map(|joined| split_parent_uris(&joined))
                    .unwrap_or_default(),
                start_event_uri: opt(start_event, i).unwrap_or_default(),
                end_event_uri: opt(end_event, i),
                start_date,
                end_date: if end.is_null(i) { None } else { end.value_as_date(i) },
                extra: extras
                    .iter()
                    .map(|(name, array)| (name.to_string(), opt(array, i)))
                    .collect(),
            });
        }
    }
    Ok(records)
}
