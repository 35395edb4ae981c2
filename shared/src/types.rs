use serde::ser::{Serialize, SerializeMap, Serializer};

/// Address family a prefix belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Field name carrying the CIDR in the upstream document
    pub fn prefix_field(self) -> &'static str {
        match self {
            AddressFamily::V4 => "ip_prefix",
            AddressFamily::V6 => "ipv6_prefix",
        }
    }
}

/// One routable network block published by the upstream feed.
/// IPv4 and IPv6 entries share this shape and differ only by `family`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRecord {
    /// CIDR string, trusted as published
    pub cidr: String,

    pub region: String,

    pub service: String,

    pub network_border_group: Option<String>,

    pub family: AddressFamily,
}

/// Serializes in the upstream shape so API consumers see the same field
/// names they would get from the feed itself.
impl Serialize for PrefixRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.network_border_group.is_some() { 4 } else { 3 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(self.family.prefix_field(), &self.cidr)?;
        map.serialize_entry("region", &self.region)?;
        map.serialize_entry("service", &self.service)?;
        if let Some(group) = &self.network_border_group {
            map.serialize_entry("network_border_group", group)?;
        }
        map.end()
    }
}

/// Immutable snapshot of the upstream feed. Replaced as a whole on refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pub ipv4: Vec<PrefixRecord>,

    pub ipv6: Vec<PrefixRecord>,

    /// `createDate` exactly as published upstream
    pub generated_at: String,

    pub sync_token: Option<String>,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(family: AddressFamily, cidr: &str) -> PrefixRecord {
        PrefixRecord {
            cidr: cidr.to_string(),
            region: "us-east-1".to_string(),
            service: "EC2".to_string(),
            network_border_group: None,
            family,
        }
    }

    #[test]
    fn test_serialize_uses_family_field_name() {
        let v4 = serde_json::to_value(record(AddressFamily::V4, "3.5.0.0/16")).unwrap();
        assert_eq!(v4["ip_prefix"], "3.5.0.0/16");
        assert!(v4.get("ipv6_prefix").is_none());

        let v6 = serde_json::to_value(record(AddressFamily::V6, "2600:1f00::/40")).unwrap();
        assert_eq!(v6["ipv6_prefix"], "2600:1f00::/40");
        assert!(v6.get("ip_prefix").is_none());
    }

    #[test]
    fn test_serialize_border_group_only_when_present() {
        let mut entry = record(AddressFamily::V4, "3.5.0.0/16");
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("network_border_group").is_none());

        entry.network_border_group = Some("us-east-1".to_string());
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["network_border_group"], "us-east-1");
    }
}
