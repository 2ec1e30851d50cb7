use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::job::JobId;
use crate::result::CanonicalResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Txt,
    Json,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported export format '{0}' (expected csv, txt or json)")]
pub struct ExportFormatError(pub String);

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [Self::Csv, Self::Txt, Self::Json];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Json => "json",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Txt => "text/plain",
            Self::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extension() == lower)
            .ok_or_else(|| ExportFormatError(s.to_string()))
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Restricts an export to a single series.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub series: Option<String>,
}

impl ExportFilter {
    fn accepts(&self, id: &str) -> bool {
        self.series.as_deref().is_none_or(|wanted| wanted == id)
    }
}

pub fn default_filename(id: JobId, format: ExportFormat, local: bool) -> String {
    let suffix = if local { "_local" } else { "" };
    format!("chart_{id}{suffix}.{}", format.extension())
}

/// Renders a normalized result the way the server's export endpoints lay it out.
pub fn render(result: &CanonicalResult, format: ExportFormat, filter: &ExportFilter) -> String {
    let rows = result.iter().filter(|(id, _)| filter.accepts(id));

    match format {
        ExportFormat::Csv => {
            let mut out = String::from("series_id,x,y\n");
            for (id, points) in rows {
                let id = csv_field(id);
                for p in points {
                    out.push_str(&format!("{id},{},{}\n", p.x, p.y));
                }
            }
            out
        }
        ExportFormat::Txt => {
            let mut out = String::from("series_id\tx\ty\n");
            for (id, points) in rows {
                let id = id.replace(['\t', '\n', '\r'], " ");
                for p in points {
                    out.push_str(&format!("{id}\t{}\t{}\n", p.x, p.y));
                }
            }
            out
        }
        ExportFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = rows
                .map(|(id, points)| {
                    let points = serde_json::to_value(points).unwrap_or_default();
                    (id.to_string(), points)
                })
                .collect();
            let mut text = serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".into());
            text.push('\n');
            text
        }
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::normalize;
    use serde_json::json;

    fn sample() -> CanonicalResult {
        normalize(&json!({
            "a": [[0, 1.5], [1, 2]],
            "b, \"quoted\"": [[3, 4]]
        }))
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(" json ".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xlsx".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Txt.mime(), "text/plain");
    }

    #[test]
    fn test_csv_quotes_awkward_ids() {
        let csv = render(&sample(), ExportFormat::Csv, &ExportFilter::default());
        assert_eq!(csv, "series_id,x,y\na,0,1.5\na,1,2\n\"b, \"\"quoted\"\"\",3,4\n");
    }

    #[test]
    fn test_txt_is_tab_separated() {
        let txt = render(&sample(), ExportFormat::Txt, &ExportFilter { series: Some("a".into()) });
        assert_eq!(txt, "series_id\tx\ty\na\t0\t1.5\na\t1\t2\n");
    }

    #[test]
    fn test_json_reparses_to_same_result() {
        let result = sample();
        let text = render(&result, ExportFormat::Json, &ExportFilter::default());
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(normalize(&value), result);
    }

    #[test]
    fn test_empty_result_has_only_header() {
        let csv = render(&CanonicalResult::default(), ExportFormat::Csv, &ExportFilter::default());
        assert_eq!(csv, "series_id,x,y\n");
    }

    #[test]
    fn test_default_filename() {
        let id = JobId::new(9).unwrap();
        assert_eq!(default_filename(id, ExportFormat::Csv, false), "chart_9.csv");
        assert_eq!(default_filename(id, ExportFormat::Json, true), "chart_9_local.json");
    }
}
