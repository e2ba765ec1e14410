//! Column catalog resolution.
//!
//! Maps requested dimension/metric ids to typed [`ColumnDescriptor`]s using
//! the Metadata API column list, and derives the output Arrow schema.

use std::collections::HashSet;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::{Deserialize, Deserializer};

use crate::error::ConnectorError;

use super::config::{GoogleAnalyticsConfig, TimeSeries};

/// Name of the synthetic column carrying the view id.
pub const VIEW_ID_COLUMN: &str = "view_id";

const TEMPLATE_PLACEHOLDER: &str = "XX";

/// One entry of the Metadata API column list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    /// Column id, e.g. `ga:sessions` or `ga:goalXXValue`.
    pub id: String,
    /// Declared attributes; absent for custom dimensions.
    #[serde(default)]
    pub attributes: Option<ColumnAttributes>,
}

impl CatalogEntry {
    /// Creates an entry with a data type and no template range.
    #[must_use]
    pub fn new(id: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Some(ColumnAttributes {
                data_type: Some(data_type.into()),
                ..ColumnAttributes::default()
            }),
        }
    }
}

/// Attributes of a catalog entry. Template bounds arrive as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnAttributes {
    /// `STRING`, `INTEGER`, `PERCENT`, `FLOAT`, `CURRENCY` or `TIME`.
    #[serde(default)]
    pub data_type: Option<String>,
    /// Lowest template index in the standard tier.
    #[serde(default, deserialize_with = "lenient_index")]
    pub min_template_index: Option<i64>,
    /// Highest template index in the standard tier.
    #[serde(default, deserialize_with = "lenient_index")]
    pub max_template_index: Option<i64>,
    /// Lowest template index in the premium tier.
    #[serde(default, deserialize_with = "lenient_index")]
    pub premium_min_template_index: Option<i64>,
    /// Highest template index in the premium tier.
    #[serde(default, deserialize_with = "lenient_index")]
    pub premium_max_template_index: Option<i64>,
}

/// Accepts `"20"`, `20` or `null`.
fn lenient_index<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Semantic type of an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// UTF-8 text.
    String,
    /// 64-bit integer.
    Long,
    /// 64-bit float.
    Double,
    /// Time-series value.
    Timestamp,
}

impl ColumnType {
    /// Maps a Metadata API `dataType`. Unknown types fall back to string.
    #[must_use]
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type {
            "INTEGER" => ColumnType::Long,
            "PERCENT" | "FLOAT" | "CURRENCY" | "TIME" => ColumnType::Double,
            _ => ColumnType::String,
        }
    }
}

/// A resolved output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Raw API id (`ga:dateHour`), or `view_id` for the synthetic column.
    pub id: String,
    /// Canonical snake_case name (`date_hour`).
    pub name: String,
    /// Semantic type.
    pub column_type: ColumnType,
}

/// Derives the canonical column name of an API id.
///
/// Strips the `ga:` prefix, inserts `_` before every run of uppercase
/// letters, strips a leading `_` and lowercases:
/// `ga:dateHour` → `date_hour`, `ga:adwordsCustomerID` → `adwords_customer_id`.
#[must_use]
pub fn canonicalize_column_name(id: &str) -> String {
    let stripped = id.strip_prefix("ga:").unwrap_or(id);
    let mut out = String::with_capacity(stripped.len() + 4);
    let mut in_upper_run = false;
    for c in stripped.chars() {
        if c.is_ascii_uppercase() {
            if !in_upper_run {
                out.push('_');
            }
            in_upper_run = true;
        } else {
            in_upper_run = false;
        }
        out.push(c);
    }
    let trimmed = out.strip_prefix('_').unwrap_or(&out);
    trimmed.to_lowercase()
}

/// Expands templated entries (ids containing `XX`) into one entry per
/// index in `[min(min, premium_min), max(max, premium_max)]`. Order is
/// preserved; entries without usable bounds are kept as-is.
#[must_use]
pub fn expand_templates(entries: &[CatalogEntry]) -> Vec<CatalogEntry> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let bounds = entry
            .attributes
            .as_ref()
            .filter(|_| entry.id.contains(TEMPLATE_PLACEHOLDER))
            .and_then(template_bounds);
        match bounds {
            Some((lo, hi)) => {
                for index in lo..=hi {
                    out.push(CatalogEntry {
                        id: entry
                            .id
                            .replace(TEMPLATE_PLACEHOLDER, &index.to_string()),
                        attributes: entry.attributes.clone(),
                    });
                }
            }
            None => out.push(entry.clone()),
        }
    }
    out
}

fn template_bounds(attrs: &ColumnAttributes) -> Option<(i64, i64)> {
    let lo = [attrs.min_template_index, attrs.premium_min_template_index]
        .into_iter()
        .flatten()
        .min()?;
    let hi = [attrs.max_template_index, attrs.premium_max_template_index]
        .into_iter()
        .flatten()
        .max()?;
    (lo <= hi).then_some((lo, hi))
}

/// Returns the requested column ids: time series, then dimensions, then
/// metrics, keeping the first occurrence of duplicates.
#[must_use]
pub fn requested_columns(config: &GoogleAnalyticsConfig) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once(config.time_series.api_name().to_string())
        .chain(config.dimensions.iter().cloned())
        .chain(config.metrics.iter().cloned())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Resolves requested ids against an (already expanded) catalog.
///
/// The time-series column is typed [`ColumnType::Timestamp`] regardless of
/// its catalog type, and a `view_id` string column is appended last.
///
/// # Errors
///
/// Returns `ConnectorError::UnknownColumn` for the first requested id with
/// no exact catalog match.
pub fn resolve_columns(
    requested: &[String],
    catalog: &[CatalogEntry],
    time_series: TimeSeries,
) -> Result<Vec<ColumnDescriptor>, ConnectorError> {
    let mut columns = Vec::with_capacity(requested.len() + 1);
    for id in requested {
        let entry = catalog
            .iter()
            .find(|e| &e.id == id)
            .ok_or_else(|| ConnectorError::UnknownColumn(id.clone()))?;

        let column_type = if id == time_series.api_name() {
            ColumnType::Timestamp
        } else {
            entry
                .attributes
                .as_ref()
                .and_then(|a| a.data_type.as_deref())
                .map_or(ColumnType::String, ColumnType::from_data_type)
        };

        columns.push(ColumnDescriptor {
            id: id.clone(),
            name: canonicalize_column_name(id),
            column_type,
        });
    }
    columns.push(ColumnDescriptor {
        id: VIEW_ID_COLUMN.to_string(),
        name: VIEW_ID_COLUMN.to_string(),
        column_type: ColumnType::String,
    });
    Ok(columns)
}

/// Returns the Arrow type of a column for the given time series.
///
/// Hourly/daily timestamps are `Timestamp(Second, "UTC")`; monthly/yearly
/// buckets are carried as their `YYYY-MM` / `YYYY` label.
#[must_use]
pub fn arrow_type(column_type: ColumnType, time_series: TimeSeries) -> DataType {
    match column_type {
        ColumnType::String => DataType::Utf8,
        ColumnType::Long => DataType::Int64,
        ColumnType::Double => DataType::Float64,
        ColumnType::Timestamp if time_series.is_instant() => {
            DataType::Timestamp(TimeUnit::Second, Some("UTC".into()))
        }
        ColumnType::Timestamp => DataType::Utf8,
    }
}

/// Builds the output schema, one nullable field per column, named by the
/// canonical name.
#[must_use]
pub fn to_arrow_schema(columns: &[ColumnDescriptor], time_series: TimeSeries) -> SchemaRef {
    let fields: Vec<Field> = columns
        .iter()
        .map(|c| Field::new(&c.name, arrow_type(c.column_type, time_series), true))
        .collect();
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry::new("ga:dateHour", "STRING"),
            CatalogEntry::new("ga:date", "STRING"),
            CatalogEntry::new("ga:browser", "STRING"),
            CatalogEntry::new("ga:sessions", "INTEGER"),
            CatalogEntry::new("ga:bounceRate", "PERCENT"),
            CatalogEntry::new("ga:avgSessionDuration", "TIME"),
            CatalogEntry::new("ga:goalValueAll", "CURRENCY"),
            CatalogEntry {
                id: "ga:dimension1".into(),
                attributes: None,
            },
        ]
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize_column_name("dateHour"), "date_hour");
        assert_eq!(canonicalize_column_name("ga:dateHour"), "date_hour");
        assert_eq!(canonicalize_column_name("CPM"), "cpm");
        assert_eq!(canonicalize_column_name("goalXXValue"), "goal_xxvalue");
        assert_eq!(
            canonicalize_column_name("adwordsCustomerID"),
            "adwords_customer_id"
        );
        assert_eq!(canonicalize_column_name("dcmCTR"), "dcm_ctr");
        assert_eq!(canonicalize_column_name("ga:sessions"), "sessions");
        assert_eq!(canonicalize_column_name(""), "");
    }

    #[test]
    fn test_expand_templates() {
        let raw: Vec<CatalogEntry> = serde_json::from_str(
            r#"[{"id":"gaXXn","attributes":{"dataType":"INTEGER","minTemplateIndex":"1","maxTemplateIndex":"3"}}]"#,
        )
        .unwrap();
        let expanded = expand_templates(&raw);
        let ids: Vec<&str> = expanded.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["ga1n", "ga2n", "ga3n"]);
        assert!(expanded
            .iter()
            .all(|e| e.attributes.as_ref().unwrap().data_type.as_deref() == Some("INTEGER")));
    }

    #[test]
    fn test_expand_templates_premium_range() {
        let raw: Vec<CatalogEntry> = serde_json::from_str(
            r#"[
                {"id":"ga:sessions","attributes":{"dataType":"INTEGER"}},
                {"id":"ga:goalXXStarts","attributes":{"dataType":"INTEGER",
                  "minTemplateIndex":"1","maxTemplateIndex":"2",
                  "premiumMinTemplateIndex":1,"premiumMaxTemplateIndex":"4"}},
                {"id":"ga:users","attributes":{"dataType":"INTEGER"}}
            ]"#,
        )
        .unwrap();
        let ids: Vec<String> = expand_templates(&raw).into_iter().map(|e| e.id).collect();
        assert_eq!(
            ids,
            vec![
                "ga:sessions",
                "ga:goal1Starts",
                "ga:goal2Starts",
                "ga:goal3Starts",
                "ga:goal4Starts",
                "ga:users"
            ]
        );
    }

    #[test]
    fn test_template_without_bounds_kept() {
        let raw = vec![CatalogEntry::new("ga:metricXX", "INTEGER")];
        assert_eq!(expand_templates(&raw), raw);
    }

    #[test]
    fn test_resolve_types() {
        let requested: Vec<String> = [
            "ga:dateHour",
            "ga:browser",
            "ga:dimension1",
            "ga:sessions",
            "ga:bounceRate",
            "ga:avgSessionDuration",
            "ga:goalValueAll",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect();

        let cols = resolve_columns(&requested, &catalog(), TimeSeries::DateHour).unwrap();
        let summary: Vec<(&str, ColumnType)> =
            cols.iter().map(|c| (c.name.as_str(), c.column_type)).collect();
        assert_eq!(
            summary,
            vec![
                ("date_hour", ColumnType::Timestamp),
                ("browser", ColumnType::String),
                ("dimension1", ColumnType::String),
                ("sessions", ColumnType::Long),
                ("bounce_rate", ColumnType::Double),
                ("avg_session_duration", ColumnType::Double),
                ("goal_value_all", ColumnType::Double),
                ("view_id", ColumnType::String),
            ]
        );
    }

    #[test]
    fn test_resolve_unknown_column() {
        let requested = vec!["ga:date".to_string(), "ga:foooooo".to_string()];
        let err = resolve_columns(&requested, &catalog(), TimeSeries::Date).unwrap_err();
        assert!(matches!(err, ConnectorError::UnknownColumn(ref id) if id == "ga:foooooo"));
    }

    #[test]
    fn test_resolve_requires_exact_match() {
        let requested = vec!["ga:date".to_string(), "ga:Sessions".to_string()];
        assert!(resolve_columns(&requested, &catalog(), TimeSeries::Date).is_err());
    }

    #[test]
    fn test_arrow_schema_by_granularity() {
        let requested = vec!["ga:date".to_string(), "ga:sessions".to_string()];
        let cols = resolve_columns(&requested, &catalog(), TimeSeries::Date).unwrap();

        let schema = to_arrow_schema(&cols, TimeSeries::Date);
        assert_eq!(
            schema.field(0).data_type(),
            &DataType::Timestamp(TimeUnit::Second, Some("UTC".into()))
        );
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);
        assert_eq!(schema.field(2).name(), "view_id");

        assert_eq!(
            arrow_type(ColumnType::Timestamp, TimeSeries::YearMonth),
            DataType::Utf8
        );
    }
}
