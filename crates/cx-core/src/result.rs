//! Normalization of job result payloads.
//!
//! The server has shipped two result encodings over time: a legacy
//! panel/series tree and a flat `series id -> points` mapping. Everything that
//! renders or exports data consumes [`CanonicalResult`] and never looks at the
//! raw payload, so this module is the only place that knows about either shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const FALLBACK_SERIES: &str = "series";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Series id to ordered points. Every point is finite and no series is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CanonicalResult {
    series: BTreeMap<String, Vec<Point>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    pub id: String,
    pub points: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl CanonicalResult {
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn get(&self, id: &str) -> Option<&[Point]> {
        self.series.get(id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Point])> {
        self.series.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn total_points(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    pub fn summaries(&self) -> Vec<SeriesSummary> {
        self.iter()
            .map(|(id, points)| {
                let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
                let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
                for p in points {
                    x_min = x_min.min(p.x);
                    x_max = x_max.max(p.x);
                    y_min = y_min.min(p.y);
                    y_max = y_max.max(p.y);
                }
                SeriesSummary {
                    id: id.to_string(),
                    points: points.len(),
                    x_min,
                    x_max,
                    y_min,
                    y_max,
                }
            })
            .collect()
    }

    fn insert(&mut self, id: String, points: Vec<Point>) {
        if !points.is_empty() {
            self.series.insert(id, points);
        }
    }
}

/// Display names keyed by canonical series id.
///
/// Only legacy series carry a `name`; ids without one are absent.
pub type SeriesLabels = BTreeMap<String, String>;

/// Which encoding a payload uses, decided by its structure.
#[derive(Debug)]
pub enum ResultShape<'a> {
    Legacy(&'a [Value]),
    Canonical(&'a Map<String, Value>),
    Unrecognized,
}

impl<'a> ResultShape<'a> {
    /// Legacy wins when a payload carries both a panel list and other series keys.
    pub fn detect(value: &'a Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::Unrecognized;
        };

        match object.get("panels").and_then(Value::as_array) {
            Some(panels) if panels.iter().all(is_panel_like) => Self::Legacy(panels),
            _ => Self::Canonical(object),
        }
    }
}

fn is_panel_like(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| !(o.contains_key("x") && o.contains_key("y")))
}

/// Converts any decoded result payload into the canonical shape. Never fails.
pub fn normalize(value: &Value) -> CanonicalResult {
    match ResultShape::detect(value) {
        ResultShape::Legacy(panels) => flatten_panels(panels, &mut SeriesLabels::new()),
        ResultShape::Canonical(object) => collect_series(object),
        ResultShape::Unrecognized => CanonicalResult::default(),
    }
}

/// Series names for the keys [`normalize`] assigns to the same payload.
pub fn series_labels(value: &Value) -> SeriesLabels {
    let mut labels = SeriesLabels::new();
    if let ResultShape::Legacy(panels) = ResultShape::detect(value) {
        flatten_panels(panels, &mut labels);
    }
    labels
}

fn flatten_panels(panels: &[Value], labels: &mut SeriesLabels) -> CanonicalResult {
    let mut out = CanonicalResult::default();

    for (panel_idx, panel) in panels.iter().enumerate() {
        let Some(series_list) = panel.get("series").and_then(Value::as_array) else {
            continue;
        };
        let panel_id = id_of(panel).unwrap_or_else(|| format!("panel_{panel_idx}"));

        for series in series_list {
            let points = series
                .get("points")
                .and_then(Value::as_array)
                .map(|pts| parse_points(pts))
                .unwrap_or_default();
            if points.is_empty() {
                continue;
            }

            let series_id = id_of(series).unwrap_or_else(|| FALLBACK_SERIES.to_string());
            let key = unique_key(&out, series_id, &panel_id);
            if let Some(name) = series.get("name").and_then(Value::as_str) {
                let name = name.trim();
                if !name.is_empty() && name != key {
                    labels.insert(key.clone(), name.to_string());
                }
            }
            out.insert(key, points);
        }
    }

    out
}

fn collect_series(object: &Map<String, Value>) -> CanonicalResult {
    let mut out = CanonicalResult::default();
    for (id, value) in object {
        if let Some(points) = value.as_array() {
            out.insert(id.clone(), parse_points(points));
        }
    }
    out
}

fn id_of(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn unique_key(out: &CanonicalResult, series_id: String, panel_id: &str) -> String {
    if !out.series.contains_key(&series_id) {
        return series_id;
    }
    let qualified = format!("{panel_id}/{series_id}");
    if !out.series.contains_key(&qualified) {
        return qualified;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{qualified}#{n}");
        if !out.series.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn parse_points(raw: &[Value]) -> Vec<Point> {
    raw.iter().filter_map(parse_point).collect()
}

/// Accepts `[x, y, ...]` or `{"x": .., "y": ..}`; numeric strings count as numbers.
pub fn parse_point(value: &Value) -> Option<Point> {
    let (x, y) = match value {
        Value::Array(items) if items.len() >= 2 => (&items[0], &items[1]),
        Value::Object(o) => (o.get("x")?, o.get("y")?),
        _ => return None,
    };
    Some(Point::new(finite(x)?, finite(y)?))
}

fn finite(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pts(raw: &[(f64, f64)]) -> Vec<Point> {
        raw.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_non_object_is_empty() {
        for value in [json!(null), json!(3), json!("panels"), json!([[0, 0]])] {
            assert!(normalize(&value).is_empty());
        }
    }

    #[test]
    fn test_legacy_two_panels() {
        let payload = json!({
            "panels": [
                { "id": "p0", "series": [{ "id": "a", "points": [[0, 1], [1, 2], [2, 3]] }] },
                { "id": "p1", "series": [{ "id": "b", "points": [[0, 5], [1, 6], [2, 7]] }] }
            ]
        });

        let result = normalize(&payload);
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("a").unwrap(), pts(&[(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]).as_slice());
        assert_eq!(result.get("b").unwrap(), pts(&[(0.0, 5.0), (1.0, 6.0), (2.0, 7.0)]).as_slice());
    }

    #[test]
    fn test_malformed_point_is_dropped() {
        let payload = json!({ "panels": [{ "series": [{ "id": "s", "points": [[0, 0], [1], [2, 4]] }] }] });
        let result = normalize(&payload);
        assert_eq!(result.get("s").unwrap(), pts(&[(0.0, 0.0), (2.0, 4.0)]).as_slice());
    }

    #[test]
    fn test_empty_panels_is_empty() {
        assert!(normalize(&json!({ "panels": [] })).is_empty());
    }

    #[test]
    fn test_missing_series_id_falls_back() {
        let payload = json!({ "panels": [{ "series": [{ "points": [[1, 1]] }] }] });
        let result = normalize(&payload);
        assert_eq!(result.get("series").unwrap(), pts(&[(1.0, 1.0)]).as_slice());
    }

    #[test]
    fn test_colliding_series_ids_are_qualified() {
        let payload = json!({
            "panels": [
                { "id": "top", "series": [{ "id": "s0", "points": [[0, 0]] }] },
                { "id": "bottom", "series": [{ "id": "s0", "points": [[1, 1]] }] },
                { "series": [{ "id": "s0", "points": [[2, 2]] }, { "id": "s0", "points": [[3, 3]] }] }
            ]
        });

        let result = normalize(&payload);
        let keys: Vec<&str> = result.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["bottom/s0", "panel_2/s0", "panel_2/s0#2", "s0"]);
    }

    #[test]
    fn test_canonical_passes_through() {
        let payload = json!({
            "line": [{ "x": 0, "y": 1.5 }, { "x": 1, "y": 2.5 }],
            "artifacts": { "converted_plot": "plot.png" }
        });

        let result = normalize(&payload);
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("line").unwrap(), pts(&[(0.0, 1.5), (1.0, 2.5)]).as_slice());
    }

    #[test]
    fn test_bad_canonical_entries_are_defended() {
        let payload = json!({
            "s": [{ "x": "1", "y": "2" }, { "x": null, "y": 1 }, { "x": 1 }, "junk", [3, 4]],
            "empty": [],
            "scalar": 4
        });

        let result = normalize(&payload);
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("s").unwrap(), pts(&[(1.0, 2.0), (3.0, 4.0)]).as_slice());
    }

    #[test]
    fn test_non_finite_strings_rejected() {
        assert!(parse_point(&json!(["NaN", 1])).is_none());
        assert!(parse_point(&json!(["inf", 1])).is_none());
        assert_eq!(parse_point(&json!([1, 2, 3])), Some(Point::new(1.0, 2.0)));
    }

    #[test]
    fn test_legacy_takes_precedence() {
        let payload = json!({
            "panels": [{ "series": [{ "id": "legacy", "points": [[0, 0]] }] }],
            "flat": [{ "x": 9, "y": 9 }]
        });

        let result = normalize(&payload);
        assert!(result.get("legacy").is_some());
        assert!(result.get("flat").is_none());
    }

    #[test]
    fn test_series_named_panels_is_not_legacy() {
        let payload = json!({ "panels": [{ "x": 1, "y": 2 }] });
        let result = normalize(&payload);
        assert_eq!(result.get("panels").unwrap(), pts(&[(1.0, 2.0)]).as_slice());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            json!({ "panels": [{ "series": [{ "id": "a", "points": [[0, 0], [1], [2, 4]] }] }] }),
            json!({ "panels": [{ "id": "p", "series": [{ "id": "panels", "points": [[1, 1]] }] }] }),
            json!({ "a": [[1, 2]], "b": [{ "x": 3, "y": "4" }], "c": [] }),
            json!({ "panels": [] }),
            json!("not a result"),
        ];

        for input in inputs {
            let once = normalize(&input);
            let twice = normalize(&once.to_value());
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }

    #[test]
    fn test_legacy_names_become_labels() {
        let payload = json!({ "panels": [
            { "id": "top", "series": [
                { "id": "s0", "name": "Revenue", "points": [[0, 1]] },
                { "id": "s1", "name": "  ", "points": [[0, 2]] },
                { "id": "s2", "name": "Costs", "points": [] }
            ] },
            { "id": "bottom", "series": [{ "id": "s0", "name": "Margin", "points": [[0, 3]] }] }
        ] });

        let labels = series_labels(&payload);
        assert_eq!(labels.get("s0").map(String::as_str), Some("Revenue"));
        assert_eq!(labels.get("bottom/s0").map(String::as_str), Some("Margin"));
        assert_eq!(labels.len(), 2);

        assert!(series_labels(&json!({ "s0": [[0, 1]] })).is_empty());
        assert_eq!(normalize(&payload).len(), 3);
    }

    #[test]
    fn test_summaries() {
        let result = normalize(&json!({ "s": [[0, 5], [2, -1], [1, 3]] }));
        let summary = &result.summaries()[0];
        assert_eq!(summary.points, 3);
        assert_eq!((summary.x_min, summary.x_max), (0.0, 2.0));
        assert_eq!((summary.y_min, summary.y_max), (-1.0, 5.0));
        assert_eq!(result.total_points(), 3);
    }
}
