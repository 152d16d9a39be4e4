//! HTML status page

use registry_core::{InstanceRecord, InstanceStatus, ServiceRegistry};
use std::collections::BTreeMap;
use std::fmt::Write;

pub fn render(registry: &ServiceRegistry) -> String {
    let now = registry.now();
    let services = registry.services_at(now);
    let mut by_service: BTreeMap<String, Vec<InstanceRecord>> = BTreeMap::new();
    for record in registry.snapshot_at(now) {
        by_service.entry(record.service_name.clone()).or_default().push(record);
    }

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Service Registry</title></head>\n<body>\n");
    html.push_str("<h1>Service Registry</h1>\n");
    let _ = writeln!(
        html,
        "<p>Lease duration: {}s &middot; Evicted since start: {} &middot; Rendered at {}</p>",
        registry.settings().lease_duration.as_secs(),
        registry.evicted_total(),
        now.format("%Y-%m-%d %H:%M:%S UTC")
    );

    html.push_str("<h2>Instances currently registered</h2>\n");
    if services.is_empty() {
        html.push_str("<p>No instances available</p>\n");
    } else {
        html.push_str("<table border=\"1\">\n<tr><th>Application</th><th>Live</th><th>Instances</th></tr>\n");
        for summary in &services {
            let instances = by_service
                .get(&summary.name)
                .map(|records| {
                    records
                        .iter()
                        .map(instance_cell)
                        .collect::<Vec<_>>()
                        .join("<br>")
                })
                .unwrap_or_default();
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}/{}</td><td>{}</td></tr>",
                escape(&summary.name),
                summary.live,
                summary.total,
                instances
            );
        }
        html.push_str("</table>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn instance_cell(record: &InstanceRecord) -> String {
    let marker = match record.status {
        InstanceStatus::Up => "",
        _ => " (!)",
    };
    format!(
        "{} - {} - {}{}",
        escape(&record.instance_id),
        escape(&record.address.to_string()),
        record.status,
        marker
    )
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
