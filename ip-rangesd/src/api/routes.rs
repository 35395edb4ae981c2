use axum::{
    extract::{Query, RawQuery, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use crate::filter::{filter, FilterQuery, IpVersion, OutputFormat};
use crate::gateway::Gateway;
use crate::render::render;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

/// Body of every 500; the underlying cause only goes to the log
const UNAVAILABLE_MESSAGE: &str = "Failed to fetch upstream IP range data";

const CACHE_STATUS_HEADER: &str = "x-cache-status";

#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ApiParams {
    pub region: Option<String>,
    pub service: Option<String>,
    pub format: Option<String>,
    pub ipv: Option<String>,
}

impl ApiParams {
    /// Collect the known selectors from decoded query pairs. A repeated key
    /// keeps its first value; unknown keys are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "region" => &mut params.region,
                "service" => &mut params.service,
                "format" => &mut params.format,
                "ipv" => &mut params.ipv,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        params
    }

    /// Absent or empty selectors fall back to their defaults
    pub fn into_query(self) -> Result<FilterQuery, String> {
        let format = match self.format.as_deref().filter(|s| !s.is_empty()) {
            Some(value) => value
                .parse::<OutputFormat>()
                .map_err(|e| format!("Invalid `format` parameter: {}", e))?,
            None => OutputFormat::default(),
        };
        let ip_version = match self.ipv.as_deref().filter(|s| !s.is_empty()) {
            Some(value) => value
                .parse::<IpVersion>()
                .map_err(|e| format!("Invalid `ipv` parameter: {}", e))?,
            None => IpVersion::default(),
        };

        Ok(FilterQuery::from_lists(
            self.region.as_deref(),
            self.service.as_deref(),
            ip_version,
            format,
        ))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_root))
        .with_state(state)
}

/// The bare root serves the browser front end; any query string makes it an API call
async fn get_root(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    if raw.as_deref().map_or(true, str::is_empty) {
        return Html(INDEX_HTML).into_response();
    }

    let query = match ApiParams::from_pairs(pairs).into_query() {
        Ok(query) => query,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };

    let snapshot = match state.gateway.dataset().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!("Failed to obtain dataset: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, UNAVAILABLE_MESSAGE).into_response();
        }
    };

    let result = filter(&snapshot.dataset, &query);
    let rendered = match render(&result, &query, &snapshot.dataset.generated_at) {
        Ok(rendered) => rendered,
        Err(e) => {
            tracing::error!("Failed to render response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    tracing::debug!(
        "Served {} IPv4 / {} IPv6 matches ({})",
        result.ipv4.len(),
        result.ipv6.len(),
        snapshot.status.as_str()
    );

    let mut response = (
        [(header::CONTENT_TYPE, rendered.content_type)],
        rendered.body,
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static(snapshot.status.as_str()));
    if rendered.allow_any_origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    }

    response
}
