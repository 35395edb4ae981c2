use std::collections::HashSet;
use bytes::Bytes;
use serde::Serialize;
use shared::protocol::FILTER_ALL;
use shared::types::PrefixRecord;
use crate::filter::{FilterQuery, FilteredResult, OutputFormat};

pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A rendered API body
#[derive(Debug)]
pub struct Rendered {
    pub body: Bytes,
    pub content_type: &'static str,
    /// Open read API: JSON responses may be fetched cross-origin
    pub allow_any_origin: bool,
}

#[derive(Serialize)]
struct AppliedFilters {
    region: String,
    service: String,
    ipv: &'static str,
}

#[derive(Serialize)]
struct Counts {
    ipv4: usize,
    ipv6: usize,
}

#[derive(Serialize)]
struct JsonBody<'a> {
    generated_at: &'a str,
    filters: AppliedFilters,
    count: Counts,
    prefixes: &'a [&'a PrefixRecord],
    ipv6_prefixes: &'a [&'a PrefixRecord],
}

pub fn render(
    result: &FilteredResult<'_>,
    query: &FilterQuery,
    generated_at: &str,
) -> Result<Rendered, serde_json::Error> {
    // Excluded families render as empty sequences, never as missing keys
    let ipv4: &[&PrefixRecord] = if query.ip_version.includes_v4() { &result.ipv4 } else { &[] };
    let ipv6: &[&PrefixRecord] = if query.ip_version.includes_v6() { &result.ipv6 } else { &[] };

    match query.format {
        OutputFormat::Text => Ok(Rendered {
            body: render_text(ipv4, ipv6),
            content_type: CONTENT_TYPE_TEXT,
            allow_any_origin: false,
        }),
        OutputFormat::Json => {
            let body = JsonBody {
                generated_at,
                filters: AppliedFilters {
                    region: describe(&query.regions),
                    service: describe(&query.services),
                    ipv: query.ip_version.as_str(),
                },
                count: Counts {
                    ipv4: ipv4.len(),
                    ipv6: ipv6.len(),
                },
                prefixes: ipv4,
                ipv6_prefixes: ipv6,
            };

            Ok(Rendered {
                body: Bytes::from(serde_json::to_vec_pretty(&body)?),
                content_type: CONTENT_TYPE_JSON,
                allow_any_origin: true,
            })
        }
    }
}

fn render_text(ipv4: &[&PrefixRecord], ipv6: &[&PrefixRecord]) -> Bytes {
    let lines: Vec<&str> = ipv4
        .iter()
        .chain(ipv6.iter())
        .map(|record| record.cidr.as_str())
        .collect();
    Bytes::from(lines.join("\n"))
}

/// Normalized filter values, sorted for stable output
fn describe(values: &HashSet<String>) -> String {
    if values.is_empty() {
        return FILTER_ALL.to_string();
    }
    let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}
