//! Upstream failure detection inside otherwise successful handler output

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::routing::Presentation;

/// Substring identifying an upstream API error report
pub const API_ERROR_MARKER: &str = "API error:";

/// Substring identifying a tunnel gateway error page
const TUNNEL_ERROR_MARKER: &str = "Cloudflare Tunnel error";

/// Gateway error codes that appear as text on error pages
const GATEWAY_ERROR_MARKERS: [&str; 3] = ["Error 502", "Error 503", "Error 530"];

/// Standalone three-digit status codes
static STATUS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{3})\b").expect("valid regex"));

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));

/// Failure reported by an HTML gateway page instead of a handler answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// Tunnel between gateway and the home network is down
    TunnelDown,
    /// Gateway answered with 502, 503 or 530
    GatewayUnavailable,
    /// Any other error page
    Unreachable,
}

/// Failure reported by the upstream API through the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFailure {
    /// 530: instance offline or unreachable
    Offline,
    /// 502: server down
    ServerDown,
    /// 503: temporarily unavailable
    Unavailable,
    /// 403: credentials rejected
    Forbidden,
    /// 404: device or service not found
    NotFound,
    /// Any other code, or none
    Other,
}

/// Codes in the order they are matched; the first present wins
const API_CODE_PRECEDENCE: [(u16, ApiFailure); 5] = [
    (530, ApiFailure::Offline),
    (502, ApiFailure::ServerDown),
    (503, ApiFailure::Unavailable),
    (403, ApiFailure::Forbidden),
    (404, ApiFailure::NotFound),
];

/// An upstream failure embedded in handler output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailure {
    /// Gateway/transport error page
    Transport(TransportFailure),
    /// Upstream API error report
    Api(ApiFailure),
}

impl UpstreamFailure {
    /// Detect a failure in `content`, if any
    #[must_use]
    pub fn detect(content: &str) -> Option<Self> {
        if is_html(content) {
            return Some(Self::Transport(classify_html(content)));
        }
        if content.contains(API_ERROR_MARKER) {
            return Some(Self::Api(classify_api_error(content)));
        }
        None
    }

    /// User-facing sentence for this failure, tagged with the presentation
    #[must_use]
    pub fn message(self, p: &Presentation) -> String {
        let system = p.system;
        let server = p.server;
        let text = match self {
            Self::Transport(TransportFailure::TunnelDown) => format!(
                "Sorry, I can't connect to your {system} right now. The connection appears to be down. Please try again later."
            ),
            Self::Transport(TransportFailure::GatewayUnavailable) => format!(
                "Sorry, your {system} is currently unavailable. Please try again in a few minutes."
            ),
            Self::Transport(TransportFailure::Unreachable) => format!(
                "Sorry, I'm having trouble connecting to your {system} right now."
            ),
            Self::Api(ApiFailure::Offline) => format!(
                "Your {system} is currently offline or unreachable. Please check your {server} connection."
            ),
            Self::Api(ApiFailure::ServerDown) => format!(
                "Your {server} server appears to be down. Please check if your {server} instance is running."
            ),
            Self::Api(ApiFailure::Unavailable) => format!(
                "Your {server} server is temporarily unavailable. Please try again in a moment."
            ),
            Self::Api(ApiFailure::Forbidden) => format!(
                "I don't have permission to access your {system}. Please check the API credentials."
            ),
            Self::Api(ApiFailure::NotFound) => format!(
                "The requested device or service wasn't found in your {system}."
            ),
            Self::Api(ApiFailure::Other) => format!(
                "There was an error communicating with your {system}. Please try again."
            ),
        };
        p.tag(&text)
    }
}

/// Whether content is an HTML document rather than an answer
#[must_use]
pub fn is_html(content: &str) -> bool {
    let trimmed = content.trim_start();
    if trimmed
        .get(..9)
        .is_some_and(|head| head.eq_ignore_ascii_case("<!doctype"))
    {
        return true;
    }
    let head: String = content.chars().take(100).collect();
    head.to_ascii_lowercase().contains("<html")
}

fn classify_html(content: &str) -> TransportFailure {
    tracing::debug!(title = ?page_title(content), "handler returned an HTML page");

    if content.contains(TUNNEL_ERROR_MARKER) {
        TransportFailure::TunnelDown
    } else if GATEWAY_ERROR_MARKERS.iter().any(|m| content.contains(m)) {
        TransportFailure::GatewayUnavailable
    } else {
        TransportFailure::Unreachable
    }
}

fn classify_api_error(content: &str) -> ApiFailure {
    // only codes reported after the marker count
    let report = content
        .find(API_ERROR_MARKER)
        .map_or(content, |i| &content[i + API_ERROR_MARKER.len()..]);

    let codes: Vec<u16> = STATUS_CODE
        .captures_iter(report)
        .filter_map(|c| c[1].parse().ok())
        .collect();

    API_CODE_PRECEDENCE
        .iter()
        .find(|(code, _)| codes.contains(code))
        .map_or(ApiFailure::Other, |(_, failure)| *failure)
}

/// Title of an HTML page, for diagnostics
#[must_use]
pub fn page_title(content: &str) -> Option<String> {
    let document = Html::parse_document(content);
    document
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}
