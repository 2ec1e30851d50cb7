use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

const FALLBACK_FAILURE: &str = "Processing failed";

/// Server-assigned job identifier. Always a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u64")]
pub struct JobId(u64);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobIdError {
    #[error("job id must be a positive integer, got {0}")]
    NotPositive(i64),
    #[error("invalid job id '{0}'")]
    Malformed(String),
}

impl JobId {
    pub fn new(raw: i64) -> Result<Self, JobIdError> {
        if raw <= 0 {
            return Err(JobIdError::NotPositive(raw));
        }
        Ok(Self(raw as u64))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<i64> for JobId {
    type Error = JobIdError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<JobId> for u64 {
    fn from(id: JobId) -> u64 {
        id.0
    }
}

impl FromStr for JobId {
    type Err = JobIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let raw: i64 = trimmed
            .parse()
            .map_err(|_| JobIdError::Malformed(trimmed.to_string()))?;
        Self::new(raw)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Uploaded | Self::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Uploaded => "File received",
            Self::Processing => "Processing",
            Self::Done => "Done",
            Self::Error => "Error",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Uploaded => "⏳",
            Self::Processing => "⚡",
            Self::Done => "✅",
            Self::Error => "❌",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic images the extraction pipeline may attach to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKey {
    LineformerPrediction,
    ChartdetePredictions,
    ConvertedPlot,
}

impl ArtifactKey {
    pub const ALL: [ArtifactKey; 3] = [
        Self::LineformerPrediction,
        Self::ChartdetePredictions,
        Self::ConvertedPlot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LineformerPrediction => "lineformer_prediction",
            Self::ChartdetePredictions => "chartdete_predictions",
            Self::ConvertedPlot => "converted_plot",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::LineformerPrediction => "LineFormer",
            Self::ChartdetePredictions => "ChartDete",
            Self::ConvertedPlot => "Converted datapoints",
        }
    }

    pub fn subtitle(&self) -> &'static str {
        match self {
            Self::LineformerPrediction => "Prediction (extracted line)",
            Self::ChartdetePredictions => "Predictions (chart elements)",
            Self::ConvertedPlot => "Plot (when data.json was produced)",
        }
    }
}

impl FromStr for ArtifactKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown artifact '{s}'"))
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a chart job as last reported by the server.
///
/// Snapshots are never patched in place; a newer fetch replaces the whole value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub n_panels: Option<u32>,
    #[serde(default)]
    pub n_series: Option<u32>,
    #[serde(default)]
    pub result_json: Option<Value>,
    /// Older server builds return panels at the top level instead of inside `result_json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panels: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Job {
    pub fn result_payload(&self) -> Option<Value> {
        match (&self.result_json, &self.panels) {
            (Some(result), _) if !result.is_null() => Some(result.clone()),
            (_, Some(panels @ Value::Array(_))) => {
                Some(serde_json::json!({ "panels": panels }))
            }
            _ => None,
        }
    }

    pub fn failure_message(&self) -> String {
        match self.error_message.as_deref().map(str::trim) {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ => FALLBACK_FAILURE.to_string(),
        }
    }

    pub fn artifacts(&self) -> Vec<ArtifactKey> {
        let Some(artifacts) = self
            .result_json
            .as_ref()
            .and_then(|r| r.get("artifacts"))
            .and_then(Value::as_object)
        else {
            return Vec::new();
        };

        ArtifactKey::ALL
            .into_iter()
            .filter(|key| {
                artifacts
                    .get(key.as_str())
                    .and_then(Value::as_str)
                    .is_some_and(|v| !v.trim().is_empty())
            })
            .collect()
    }

    pub fn can_export(&self) -> bool {
        self.status == JobStatus::Done && self.result_payload().is_some()
    }

    pub fn display_name(&self) -> &str {
        self.original_filename.as_deref().unwrap_or("(unnamed)")
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
