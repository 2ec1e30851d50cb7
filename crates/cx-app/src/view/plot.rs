use std::fmt::Write;

use cx_core::{CanonicalResult, Point, SeriesLabels};

use super::NO_DATA;

const MARKERS: [char; 8] = ['*', 'o', '+', 'x', '#', '@', '%', '&'];
const MIN_WIDTH: usize = 16;
const MIN_HEIGHT: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if !min.is_finite() || !max.is_finite() {
            return None;
        }
        if max - min <= f64::EPSILON * max.abs().max(1.0) {
            return Some(Self { min: min - 0.5, max: max + 0.5 });
        }
        Some(Self { min, max })
    }

    /// Maps `v` onto `0..cells`.
    fn cell(&self, v: f64, cells: usize) -> usize {
        let t = (v - self.min) / (self.max - self.min);
        let idx = (t * (cells - 1) as f64).round();
        idx.clamp(0.0, (cells - 1) as f64) as usize
    }
}

struct Canvas {
    width: usize,
    height: usize,
    cells: Vec<char>,
}

impl Canvas {
    fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![' '; width * height],
        }
    }

    /// Row 0 is the top of the plot.
    fn set(&mut self, col: usize, row: usize, marker: char) {
        self.cells[row * self.width + col] = marker;
    }

    fn line(&mut self, from: (usize, usize), to: (usize, usize), marker: char) {
        let (c0, r0) = (from.0 as i64, from.1 as i64);
        let (c1, r1) = (to.0 as i64, to.1 as i64);
        let steps = (c1 - c0).abs().max((r1 - r0).abs());
        for step in 0..=steps {
            let t = if steps == 0 { 0.0 } else { step as f64 / steps as f64 };
            let c = c0 as f64 + (c1 - c0) as f64 * t;
            let r = r0 as f64 + (r1 - r0) as f64 * t;
            let idx = r.round() as usize * self.width + c.round() as usize;
            if self.cells[idx] == ' ' {
                self.cells[idx] = '.';
            }
        }
        self.set(from.0, from.1, marker);
        self.set(to.0, to.1, marker);
    }

    fn row(&self, row: usize) -> String {
        self.cells[row * self.width..(row + 1) * self.width].iter().collect()
    }
}

/// Draws every series into a `width` x `height` grid with axis labels and a legend.
///
/// Consecutive points of a series are joined with dots; markers win over dots.
pub fn render(result: &CanonicalResult, width: usize, height: usize) -> String {
    render_labelled(result, &SeriesLabels::new(), width, height)
}

/// Like [`render`], naming legend entries from `labels` where present.
pub fn render_labelled(result: &CanonicalResult, labels: &SeriesLabels, width: usize, height: usize) -> String {
    let (Some(xs), Some(ys)) = (
        Range::of(result.iter().flat_map(|(_, pts)| pts.iter().map(|p| p.x))),
        Range::of(result.iter().flat_map(|(_, pts)| pts.iter().map(|p| p.y))),
    ) else {
        return format!("{NO_DATA}\n");
    };

    let width = width.max(MIN_WIDTH);
    let height = height.max(MIN_HEIGHT);
    let mut canvas = Canvas::new(width, height);

    let project = |p: &Point| (xs.cell(p.x, width), height - 1 - ys.cell(p.y, height));

    for (i, (_, points)) in result.iter().enumerate() {
        let marker = MARKERS[i % MARKERS.len()];
        let mut ordered: Vec<&Point> = points.iter().collect();
        ordered.sort_by(|a, b| a.x.total_cmp(&b.x));

        let mut prev = None;
        for p in ordered {
            let cell = project(p);
            match prev {
                Some(last) => canvas.line(last, cell, marker),
                None => canvas.set(cell.0, cell.1, marker),
            }
            prev = Some(cell);
        }
    }

    let top = label(ys.max);
    let bottom = label(ys.min);
    let gutter = top.len().max(bottom.len());

    let mut out = String::new();
    for row in 0..height {
        let tick = match row {
            0 => top.as_str(),
            r if r == height - 1 => bottom.as_str(),
            _ => "",
        };
        let _ = writeln!(out, "{tick:>gutter$} |{}", canvas.row(row));
    }
    let _ = writeln!(out, "{:>gutter$} +{}", "", "-".repeat(width));

    let left = label(xs.min);
    let right = label(xs.max);
    let pad = width.saturating_sub(left.len() + right.len());
    let _ = writeln!(out, "{:>gutter$}  {left}{}{right}", "", " ".repeat(pad));

    for (i, (id, points)) in result.iter().enumerate() {
        let marker = MARKERS[i % MARKERS.len()];
        let _ = match labels.get(id) {
            Some(name) => writeln!(out, "  {marker} {name} [{id}] ({} pts)", points.len()),
            None => writeln!(out, "  {marker} {id} ({} pts)", points.len()),
        };
    }
    out
}

fn label(v: f64) -> String {
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}
