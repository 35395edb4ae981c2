use std::collections::HashSet;
use std::str::FromStr;
use shared::types::{Dataset, PrefixRecord};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported value {value:?}, expected one of {expected}")]
pub struct UnknownVariant {
    pub value: String,
    pub expected: &'static str,
}

/// Which address families a response includes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpVersion {
    #[default]
    All,
    V4,
    V6,
}

impl IpVersion {
    pub fn includes_v4(self) -> bool {
        self != IpVersion::V6
    }

    pub fn includes_v6(self) -> bool {
        self != IpVersion::V4
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IpVersion::All => "all",
            IpVersion::V4 => "v4",
            IpVersion::V6 => "v6",
        }
    }
}

impl FromStr for IpVersion {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(IpVersion::All),
            "v4" => Ok(IpVersion::V4),
            "v6" => Ok(IpVersion::V6),
            _ => Err(UnknownVariant {
                value: s.to_string(),
                expected: "all, v4, v6",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for OutputFormat {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "text" => Ok(OutputFormat::Text),
            _ => Err(UnknownVariant {
                value: s.to_string(),
                expected: "json, text",
            }),
        }
    }
}

/// Per-request match predicates.
///
/// Regions are held lower-cased and services upper-cased; an empty set
/// places no restriction on that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterQuery {
    pub regions: HashSet<String>,
    pub services: HashSet<String>,
    pub ip_version: IpVersion,
    pub format: OutputFormat,
}

impl FilterQuery {
    /// Build from comma-separated lists as they appear in a query string.
    /// Blank items are ignored.
    pub fn from_lists(
        regions: Option<&str>,
        services: Option<&str>,
        ip_version: IpVersion,
        format: OutputFormat,
    ) -> Self {
        Self {
            regions: split_list(regions, str::to_lowercase),
            services: split_list(services, str::to_uppercase),
            ip_version,
            format,
        }
    }

    pub fn matches(&self, record: &PrefixRecord) -> bool {
        (self.regions.is_empty() || self.regions.contains(&record.region.to_lowercase()))
            && (self.services.is_empty() || self.services.contains(&record.service.to_uppercase()))
    }
}

fn split_list(list: Option<&str>, normalize: fn(&str) -> String) -> HashSet<String> {
    list.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(normalize)
        .collect()
}

/// Records of each family that satisfy a query, in dataset order
#[derive(Debug, Default)]
pub struct FilteredResult<'a> {
    pub ipv4: Vec<&'a PrefixRecord>,
    pub ipv6: Vec<&'a PrefixRecord>,
}

/// Both families are always filtered; family selection is left to rendering.
pub fn filter<'a>(dataset: &'a Dataset, query: &FilterQuery) -> FilteredResult<'a> {
    let select = |records: &'a [PrefixRecord]| -> Vec<&'a PrefixRecord> {
        records.iter().filter(|record| query.matches(record)).collect()
    };

    FilteredResult {
        ipv4: select(&dataset.ipv4),
        ipv6: select(&dataset.ipv6),
    }
}
