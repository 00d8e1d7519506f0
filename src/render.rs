//! Text and SVG output for a [`Frame`]. Nothing here touches the network or
//! the shared view.

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};

use crate::{
    projector::Canvas,
    structs::Shuttle,
    view::{DistanceEntry, Frame},
};

pub fn updated_label(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.with_timezone(&Local).format("%H:%M:%S").to_string(),
        None => "—".to_string(),
    }
}

/// "Approx distances between first stop and shuttles: EV-01: 1.23 km, ..."
pub fn distances_line(distances: &[DistanceEntry]) -> Option<String> {
    if distances.is_empty() {
        return None;
    }
    let parts = distances
        .iter()
        .map(|d| match d.distance_km {
            Some(km) => format!("{}: {km:.2} km", d.identifier),
            None => format!("{}: — km", d.identifier),
        })
        .collect::<Vec<_>>();
    Some(format!("Approx distances between first stop and shuttles: {}", parts.join(", ")))
}

pub fn status_lines(shuttles: &[Shuttle]) -> Vec<String> {
    if shuttles.is_empty() {
        return vec!["No shuttles registered yet for this campus.".to_string()];
    }

    shuttles
        .iter()
        .map(|s| {
            let battery = s.battery_level.map_or("—".to_string(), |b| format!("{b}%"));
            let route = s.route_name.as_deref().unwrap_or("—");
            let position = match (s.latitude, s.longitude) {
                (Some(lat), Some(lon)) => format!("{lat:.4}, {lon:.4}"),
                _ => "No GPS".to_string(),
            };
            format!(
                "{} | {} • Battery {} | Route: {} | {}",
                s.identifier,
                s.status.as_deref().unwrap_or("unknown"),
                battery,
                route,
                position
            )
        })
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

/// Stops are cyan circles labelled with their name, shuttles green squares
/// labelled with their identifier.
pub fn svg(frame: &Frame, canvas: &Canvas) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = canvas.width,
        h = canvas.height
    );
    let _ = writeln!(
        out,
        r##"  <rect width="100%" height="100%" rx="12" fill="#0f172a" stroke="#334155"/>"##
    );

    for stop in &frame.stops {
        let p = stop.point;
        let _ = writeln!(
            out,
            r##"  <g><circle cx="{:.2}" cy="{:.2}" r="6" fill="#22d3ee" opacity="0.9"/><text x="{:.2}" y="{:.2}" fill="white" font-size="12">{}</text></g>"##,
            p.x,
            p.y,
            p.x + 8.0,
            p.y - 8.0,
            escape(&stop.name)
        );
    }

    for shuttle in &frame.shuttles {
        let p = shuttle.point;
        let _ = writeln!(
            out,
            r##"  <g><rect x="{:.2}" y="{:.2}" width="12" height="12" rx="3" fill="#10b981" opacity="0.9"/><text x="{:.2}" y="{:.2}" fill="#a7f3d0" font-size="12">{}</text></g>"##,
            p.x - 6.0,
            p.y - 6.0,
            p.x + 8.0,
            p.y + 4.0,
            escape(&shuttle.identifier)
        );
    }

    let _ = writeln!(
        out,
        r##"  <text x="8" y="{:.2}" fill="#c7d2fe" font-size="11">{} · Updated: {}</text>"##,
        canvas.height - 8.0,
        frame.campus,
        updated_label(frame.last_updated)
    );
    out.push_str("</svg>\n");
    out
}
