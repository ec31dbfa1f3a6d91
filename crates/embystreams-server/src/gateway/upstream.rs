//! HTTP client for the media server.
//!
//! Every call is a bounded GET: 3 s to connect, 5 s overall, at most three
//! redirects, all to the configured origin. The API key travels in the
//! `X-Auth-Token` header (mirrored in `X-Emby-Token`, which Emby servers
//! read) and never appears in a URL or a log line. HTTPS uses the default
//! rustls verifier; there is no way to turn certificate or hostname checks
//! off.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{redirect, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use embystreams_core::{parse_session_list, RawSession, ServerConfig, UpstreamError};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_REDIRECTS: usize = 3;

const TOKEN_HEADER: &str = "X-Auth-Token";
const EMBY_TOKEN_HEADER: &str = "X-Emby-Token";
const USER_AGENT: &str = concat!("EmbyStreams-Gateway/", env!("CARGO_PKG_VERSION"));

/// Subset of `/System/Info/Public`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerInfo {
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Media-server client. Stateless apart from the reusable HTTP client.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    /// Path segment in front of every endpoint, e.g. `emby`.
    api_root: String,
}

impl UpstreamClient {
    pub fn new(api_root: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .redirect(same_origin_redirects())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            api_root: api_root.trim_matches('/').to_string(),
        })
    }

    /// `scheme://host:port/<api-root>`.
    pub fn api_base(&self, cfg: &ServerConfig) -> String {
        format!("{}/{}", cfg.base_url(), self.api_root)
    }

    /// Raw `/Sessions` body.
    pub async fn fetch_sessions_raw(&self, cfg: &ServerConfig) -> Result<Bytes, UpstreamError> {
        self.get(cfg, "Sessions").await
    }

    /// All sessions the server reports, in upstream order.
    pub async fn fetch_sessions(&self, cfg: &ServerConfig) -> Result<Vec<RawSession>, UpstreamError> {
        let body = self.fetch_sessions_raw(cfg).await?;
        parse_session_list(&body).inspect_err(|_| {
            warn!(host = %cfg.host, bytes = body.len(), "sessions body is not a list of objects");
        })
    }

    pub async fn fetch_server_info(&self, cfg: &ServerConfig) -> Result<ServerInfo, UpstreamError> {
        let body = self.get(cfg, "System/Info/Public").await?;
        serde_json::from_slice(&body).map_err(|e| {
            warn!(host = %cfg.host, error = %e, "server info body is not valid JSON");
            UpstreamError::InvalidBody
        })
    }

    async fn get(&self, cfg: &ServerConfig, endpoint: &str) -> Result<Bytes, UpstreamError> {
        let url = format!("{}/{}", self.api_base(cfg), endpoint);
        debug!(url = %url, "requesting media server");

        let response = self
            .http
            .get(&url)
            .header(TOKEN_HEADER, &cfg.api_key)
            .header(EMBY_TOKEN_HEADER, &cfg.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, timeout = e.is_timeout(), redirect = e.is_redirect(), error = %e, "media server request failed");
                UpstreamError::ConnectFailed
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(url = %url, status = status.as_u16(), "media server returned non-200 status");
            return Err(UpstreamError::HttpStatus(status.as_u16()));
        }

        response.bytes().await.map_err(|e| {
            warn!(url = %url, error = %e, "failed to read media server body");
            UpstreamError::ConnectFailed
        })
    }
}

/// Follow up to [`MAX_REDIRECTS`] hops, never off the original origin.
///
/// The token headers would be forwarded to whatever host a redirect names,
/// and that host never went through the host validator. A cross-origin
/// redirect is returned as-is and ends up as a non-200 status.
fn same_origin_redirects() -> redirect::Policy {
    redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let allowed = attempt
            .previous()
            .first()
            .is_some_and(|origin| same_origin(origin, attempt.url()));
        if allowed {
            attempt.follow()
        } else {
            warn!(target_host = ?attempt.url().host_str(), "refusing cross-origin redirect");
            attempt.stop()
        }
    })
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}
