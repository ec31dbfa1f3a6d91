//! embystreams-core: shared library for the EmbyStreams gateway.
//!
//! Provides media-server settings validation (including the SSRF host
//! guard), the plugin settings store, CSRF verification, and the session
//! normalizer that turns raw upstream sessions into display records.
//! No network I/O lives here.

pub mod config;
pub mod csrf;
pub mod error;
pub mod format;
pub mod session;
pub mod settings;
pub mod store;

// Re-export commonly used items at crate root.
pub use config::ServerConfig;
pub use error::{
    AuthError, ConfigError, ErrorCategory, GatewayError, GatewayResult, RateLimitError,
    StoreError, UpstreamError,
};
pub use session::{
    normalize, parse_session_list, DisplaySession, PlayMethod, RawSession, SessionNormalizer,
    TranscodeDetails,
};
pub use settings::{keys, PluginSettings};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore};
