/// Published AWS IP range feed
pub const SOURCE_URL: &str = "https://ip-ranges.amazonaws.com/ip-ranges.json";

/// User-Agent sent on every upstream fetch
pub const USER_AGENT: &str = concat!("ip-rangesd/", env!("CARGO_PKG_VERSION"));

/// Cached upstream documents are considered fresh for four hours
pub const DEFAULT_TTL_SECS: u64 = 4 * 3600;

/// Placeholder reported in `filters` when a dimension is unrestricted
pub const FILTER_ALL: &str = "all";
