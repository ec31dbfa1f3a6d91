//! Per-request pipeline.
//!
//! Every action walks the same stages: load the raw settings, verify the
//! CSRF token, pass the rate limiter, then run the action itself. Any
//! failure ends the request with a category-only error response; nothing
//! is fatal to the gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use embystreams_core::config::{parse_port, validate_api_key, validate_host};
use embystreams_core::{
    csrf, keys, ConfigStore, GatewayError, GatewayResult, PluginSettings, ServerConfig,
    SessionNormalizer,
};

use super::policy::SessionFilterPolicy;
use super::response::GatewayResponse;
use super::upstream::UpstreamClient;
use crate::auth::{RateLimiter, SessionTokens};

/// Connection keys a `testConnection` request may carry as candidates.
const CONNECTION_KEYS: [&str; 4] = [keys::HOST, keys::PORT, keys::API_KEY, keys::USE_HTTPS];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GetSessions,
    TestConnection,
    GetStatus,
    SaveConfig,
}

impl Action {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "getSessions" => Some(Action::GetSessions),
            "testConnection" => Some(Action::TestConnection),
            "getStatus" => Some(Action::GetStatus),
            "saveConfig" => Some(Action::SaveConfig),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::GetSessions => "getSessions",
            Action::TestConnection => "testConnection",
            Action::GetStatus => "getStatus",
            Action::SaveConfig => "saveConfig",
        }
    }
}

/// An inbound gateway call, already stripped of transport details.
#[derive(Debug, Clone, Default)]
pub struct GatewayRequest {
    pub action: String,
    /// Opaque caller identity used for the CSRF secret and the rate limiter.
    pub caller_key: String,
    /// Token the caller presented. Never logged.
    pub csrf_token: Option<String>,
    /// Query and form parameters.
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    ConfigLoaded,
    Authenticated,
    RateChecked,
    Fetched,
    Filtered,
    Normalized,
    Done,
}

/// Where a request is in the pipeline; reported when it fails.
struct Trace<'a> {
    caller: &'a str,
    stage: Stage,
}

impl<'a> Trace<'a> {
    fn new(caller_key: &'a str) -> Self {
        let caller = caller_key
            .char_indices()
            .nth(8)
            .map_or(caller_key, |(end, _)| &caller_key[..end]);
        Self {
            caller,
            stage: Stage::Start,
        }
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        debug!(caller = self.caller, stage = ?stage, "gateway stage");
    }
}

/// The gateway. Cheap to clone; clones share the rate-limit ledger.
#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn ConfigStore>,
    tokens: Arc<dyn SessionTokens>,
    limiter: Arc<Mutex<RateLimiter>>,
    upstream: UpstreamClient,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        tokens: Arc<dyn SessionTokens>,
        upstream: UpstreamClient,
    ) -> Self {
        Self {
            store,
            tokens,
            limiter: Arc::new(Mutex::new(RateLimiter::default())),
            upstream,
        }
    }

    /// Run one request to completion. Always yields a response.
    pub async fn handle(&self, req: GatewayRequest) -> GatewayResponse {
        let mut trace = Trace::new(&req.caller_key);
        match self.run(&req, &mut trace).await {
            Ok(resp) => {
                trace.enter(Stage::Done);
                resp
            }
            Err(e) => {
                let category = e.category();
                warn!(
                    caller = trace.caller,
                    stage = ?trace.stage,
                    category = category.as_str(),
                    error = %e,
                    "gateway request failed"
                );
                GatewayResponse::failure(category)
            }
        }
    }

    async fn run(&self, req: &GatewayRequest, trace: &mut Trace<'_>) -> GatewayResult<GatewayResponse> {
        let raw = self.store.load()?;
        trace.enter(Stage::ConfigLoaded);

        let secret = self.tokens.session_token(&req.caller_key);
        csrf::verify(secret.as_deref(), req.csrf_token.as_deref())?;
        trace.enter(Stage::Authenticated);

        self.limiter
            .lock()
            .await
            .check_and_update(&req.caller_key, Instant::now())?;
        trace.enter(Stage::RateChecked);

        let action = Action::parse(&req.action).ok_or(GatewayError::UnknownAction)?;
        debug!(caller = trace.caller, action = action.as_str(), "dispatching action");

        match action {
            Action::GetSessions => self.get_sessions(&raw, trace).await,
            Action::TestConnection => self.test_connection(&raw, &req.params).await,
            Action::GetStatus => self.get_status(&raw).await,
            Action::SaveConfig => self.save_config(&raw, &req.params),
        }
    }

    async fn get_sessions(
        &self,
        raw: &HashMap<String, String>,
        trace: &mut Trace<'_>,
    ) -> GatewayResult<GatewayResponse> {
        let settings = PluginSettings::from_map(raw);
        if !settings.is_configured() {
            return Err(GatewayError::Unconfigured);
        }
        let cfg = ServerConfig::validate(raw)?;

        let fetched = self.upstream.fetch_sessions(&cfg).await?;
        trace.enter(Stage::Fetched);

        let upstream_count = fetched.len();
        let kept = SessionFilterPolicy::from_settings(&settings).apply(fetched);
        trace.enter(Stage::Filtered);

        let normalizer = SessionNormalizer::new(self.upstream.api_base(&cfg));
        let sessions: Vec<_> = kept.iter().map(|s| normalizer.normalize(s)).collect();
        trace.enter(Stage::Normalized);

        debug!(upstream = upstream_count, returned = sessions.len(), "sessions normalized");
        Ok(GatewayResponse::sessions(sessions))
    }

    async fn test_connection(
        &self,
        raw: &HashMap<String, String>,
        params: &HashMap<String, String>,
    ) -> GatewayResult<GatewayResponse> {
        let mut candidate = raw.clone();
        for key in CONNECTION_KEYS {
            if let Some(v) = params.get(key) {
                candidate.insert(key.to_string(), v.trim().to_string());
            }
        }

        if !PluginSettings::from_map(&candidate).is_configured() {
            return Err(GatewayError::Unconfigured);
        }
        let cfg = ServerConfig::validate(&candidate)?;
        let info = self.upstream.fetch_server_info(&cfg).await?;
        info!(host = %cfg.host, port = cfg.port, "test connection succeeded");

        Ok(GatewayResponse {
            server: Some(info.server_name.unwrap_or_else(|| "Unknown".to_string())),
            version: Some(info.version.unwrap_or_else(|| "Unknown".to_string())),
            ..GatewayResponse::message("Connection successful")
        })
    }

    async fn get_status(&self, raw: &HashMap<String, String>) -> GatewayResult<GatewayResponse> {
        let settings = PluginSettings::from_map(raw);
        if !settings.is_configured() {
            return Ok(GatewayResponse {
                configured: Some(false),
                online: Some(false),
                stream_count: Some(0),
                ..GatewayResponse::ok()
            });
        }

        let cfg = ServerConfig::validate(raw)?;
        let mut resp = GatewayResponse {
            configured: Some(true),
            online: Some(false),
            stream_count: Some(0),
            ..GatewayResponse::ok()
        };

        match self.upstream.fetch_server_info(&cfg).await {
            Ok(info) => {
                resp.online = Some(true);
                resp.server_name = info.server_name;
                resp.server_version = info.version;
            }
            Err(e) => {
                debug!(error = %e, "media server offline");
                return Ok(resp);
            }
        }

        if let Ok(sessions) = self.upstream.fetch_sessions(&cfg).await {
            let playing = SessionFilterPolicy::default().apply(sessions);
            resp.stream_count = Some(playing.len());
        }
        Ok(resp)
    }

    fn save_config(
        &self,
        raw: &HashMap<String, String>,
        params: &HashMap<String, String>,
    ) -> GatewayResult<GatewayResponse> {
        let mut merged = raw.clone();
        for (key, value) in params {
            if keys::is_recognized(key) {
                merged.insert(key.clone(), value.trim().to_string());
            }
        }

        let settings = PluginSettings::from_map(&merged);
        if !settings.host.is_empty() {
            validate_host(&settings.host)?;
        }
        parse_port(Some(&settings.port))?;
        if !settings.api_key.is_empty() {
            validate_api_key(&settings.api_key)?;
        }

        self.store.save(&settings)?;
        info!(host = %settings.host, port = %settings.port, "configuration saved");
        Ok(GatewayResponse::message("Configuration saved"))
    }
}
