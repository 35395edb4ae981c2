use serde_json::Value;
use shared::types::{AddressFamily, Dataset, PrefixRecord};

const IPV4_ARRAY: &str = "prefixes";
const IPV6_ARRAY: &str = "ipv6_prefixes";

/// Parse an upstream ip-ranges document.
///
/// Never fails: a body that is not JSON yields an empty dataset, a missing
/// or non-array collection yields an empty sequence, and entries lacking a
/// prefix, region or service are dropped.
pub fn parse_dataset(body: &[u8]) -> Dataset {
    let document: Value = match serde_json::from_slice(body) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!("Upstream document is not valid JSON, using empty dataset: {}", e);
            return Dataset::default();
        }
    };

    let generated_at = document
        .get("createDate")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let sync_token = document.get("syncToken").and_then(|token| match token {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    Dataset {
        ipv4: parse_records(&document, IPV4_ARRAY, AddressFamily::V4),
        ipv6: parse_records(&document, IPV6_ARRAY, AddressFamily::V6),
        generated_at,
        sync_token,
    }
}

fn parse_records(document: &Value, field: &str, family: AddressFamily) -> Vec<PrefixRecord> {
    let Some(items) = document.get(field).and_then(Value::as_array) else {
        tracing::warn!("Upstream document has no `{}` array, treating as empty", field);
        return Vec::new();
    };

    let records: Vec<PrefixRecord> = items
        .iter()
        .filter_map(|item| parse_record(item, family))
        .collect();

    let skipped = items.len() - records.len();
    if skipped > 0 {
        tracing::warn!("Skipped {} malformed entries in `{}`", skipped, field);
    }

    records
}

fn parse_record(item: &Value, family: AddressFamily) -> Option<PrefixRecord> {
    let text = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);

    Some(PrefixRecord {
        cidr: text(family.prefix_field())?,
        region: text("region")?,
        service: text("service")?,
        network_border_group: text("network_border_group"),
        family,
    })
}
