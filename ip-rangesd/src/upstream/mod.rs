pub mod document;
pub mod fetcher;

pub use fetcher::{FetchError, Fetcher, Upstream};
