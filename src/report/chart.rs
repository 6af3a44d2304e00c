//! Inline SVG charts for the HTML report: result donut, failure-type bars and
//! response times per endpoint.

use super::html::html_escape;
use std::f64::consts::PI;
use std::fmt::Write;

const PALETTE: [&str; 6] = ["#8b5cf6", "#10b981", "#f59e0b", "#ef4444", "#3b82f6", "#ec4899"];
const MUTED: &str = "#374151";
const LABEL: &str = "#9ca3af";

/// Donut of `(label, value, color)` slices with a legend. Zero slices are
/// left out of the ring but kept in the legend.
pub fn donut(slices: &[(&str, u32, &str)]) -> String {
    let total: u32 = slices.iter().map(|(_, v, _)| v).sum();
    let (cx, cy, r) = (90.0, 90.0, 64.0);
    let circumference = 2.0 * PI * r;

    let mut svg = String::from(
        r#"<svg class="chart" viewBox="0 0 360 180" width="360" height="180" role="img">"#,
    );
    let _ = write!(
        svg,
        r#"<circle cx="{cx}" cy="{cy}" r="{r}" fill="none" stroke="{MUTED}" stroke-width="26"/>"#
    );

    let mut offset = 0.0;
    for (_, value, color) in slices.iter().filter(|(_, v, _)| *v > 0) {
        let length = circumference * f64::from(*value) / f64::from(total);
        let _ = write!(
            svg,
            r#"<circle class="slice" cx="{cx}" cy="{cy}" r="{r}" fill="none" stroke="{color}" stroke-width="26" stroke-dasharray="{length:.2} {rest:.2}" stroke-dashoffset="{offset:.2}" transform="rotate(-90 {cx} {cy})"/>"#,
            rest = circumference - length,
            offset = -offset,
        );
        offset += length;
    }

    let center = if total == 0 {
        "No data".to_string()
    } else {
        total.to_string()
    };
    let _ = write!(
        svg,
        r#"<text x="{cx}" y="{y}" text-anchor="middle" fill="{LABEL}" font-size="18">{center}</text>"#,
        y = cy + 6.0,
    );

    for (i, (label, value, color)) in slices.iter().enumerate() {
        let y = 40 + i * 26;
        let _ = write!(
            svg,
            r#"<rect x="200" y="{top}" width="12" height="12" fill="{color}"/><text x="220" y="{y}" fill="{LABEL}" font-size="13">{label}: {value}</text>"#,
            top = y - 10,
            label = html_escape(label),
        );
    }

    svg.push_str("</svg>");
    svg
}

/// Horizontal bars, one row per `(label, value)`
pub fn bars(rows: &[(&str, u32)], color: &str) -> String {
    let row_height = 28;
    let height = rows.len() * row_height + 8;
    let max = rows.iter().map(|(_, v)| *v).max().unwrap_or(0).max(1);

    let mut svg = format!(
        r#"<svg class="chart" viewBox="0 0 520 {height}" width="520" height="{height}" role="img">"#
    );
    for (i, (label, value)) in rows.iter().enumerate() {
        let y = i * row_height + 4;
        let width = 280.0 * f64::from(*value) / f64::from(max);
        let _ = write!(
            svg,
            r#"<text x="0" y="{ty}" fill="{LABEL}" font-size="13">{label}</text><rect class="bar" x="180" y="{y}" width="{width:.1}" height="18" rx="3" fill="{color}"/><text x="{vx:.1}" y="{ty}" fill="{LABEL}" font-size="13">{value}</text>"#,
            ty = y + 14,
            label = html_escape(label),
            vx = 188.0 + width,
        );
    }
    svg.push_str("</svg>");
    svg
}

/// One polyline per series; x is the request sequence within the series
pub fn lines(series: &[(String, Vec<u64>)]) -> String {
    let (width, height, left, top, plot_w, plot_h) = (640.0, 260.0, 56.0, 16.0, 440.0, 200.0);
    let max_y = series
        .iter()
        .flat_map(|(_, values)| values.iter().copied())
        .max()
        .unwrap_or(0)
        .max(1) as f64;
    let max_x = series.iter().map(|(_, v)| v.len()).max().unwrap_or(0).max(2) - 1;

    let mut svg = format!(
        r#"<svg class="chart" viewBox="0 0 {width} {height}" width="{width}" height="{height}" role="img">"#
    );
    let bottom = top + plot_h;
    let _ = write!(
        svg,
        r#"<line x1="{left}" y1="{bottom}" x2="{right}" y2="{bottom}" stroke="{MUTED}"/><line x1="{left}" y1="{top}" x2="{left}" y2="{bottom}" stroke="{MUTED}"/><text x="4" y="{ty}" fill="{LABEL}" font-size="11">{max_y}ms</text><text x="4" y="{bottom}" fill="{LABEL}" font-size="11">0ms</text>"#,
        right = left + plot_w,
        ty = top + 10.0,
    );

    for (i, (name, values)) in series.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let points: Vec<(f64, f64)> = values
            .iter()
            .enumerate()
            .map(|(x, y)| {
                (
                    left + plot_w * x as f64 / max_x as f64,
                    bottom - plot_h * *y as f64 / max_y,
                )
            })
            .collect();

        let path = points
            .iter()
            .map(|(x, y)| format!("{:.1},{:.1}", x, y))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = write!(
            svg,
            r#"<polyline class="series" fill="none" stroke="{color}" stroke-width="2" points="{path}"/>"#
        );
        for (x, y) in &points {
            let _ = write!(svg, r#"<circle cx="{x:.1}" cy="{y:.1}" r="3" fill="{color}"/>"#);
        }

        let ly = top + 12.0 + i as f64 * 18.0;
        let _ = write!(
            svg,
            r#"<rect x="510" y="{ry}" width="10" height="10" fill="{color}"/><text x="526" y="{ly}" fill="{LABEL}" font-size="11">{name}</text>"#,
            ry = ly - 9.0,
            name = html_escape(name),
        );
    }

    svg.push_str("</svg>");
    svg
}
