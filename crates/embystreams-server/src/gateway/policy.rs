//! Session filter policy: which upstream sessions reach the dashboard.
//!
//! A session is kept when something is playing on it, or when idle sessions
//! are enabled. The survivors keep upstream order and are then cut to the
//! configured cap.

use embystreams_core::{PluginSettings, RawSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionFilterPolicy {
    /// Keep sessions with no now-playing item.
    pub include_idle: bool,
    /// Keep at most this many sessions. `None` = unlimited.
    pub max_streams: Option<usize>,
}

/// Only playing sessions, no cap.
impl Default for SessionFilterPolicy {
    fn default() -> Self {
        Self {
            include_idle: false,
            max_streams: None,
        }
    }
}

impl SessionFilterPolicy {
    pub fn from_settings(settings: &PluginSettings) -> Self {
        Self {
            include_idle: settings.show_idle,
            max_streams: settings.stream_cap(),
        }
    }

    pub fn admits(&self, session: &RawSession) -> bool {
        self.include_idle || session.is_now_playing()
    }

    /// Filter then truncate, preserving order.
    pub fn apply(&self, sessions: Vec<RawSession>) -> Vec<RawSession> {
        let kept = sessions.into_iter().filter(|s| self.admits(s));
        match self.max_streams {
            Some(cap) => kept.take(cap).collect(),
            None => kept.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sessions() -> Vec<RawSession> {
        vec![
            RawSession::new(json!({"Id": "a", "NowPlayingItem": {"Name": "One"}})),
            RawSession::new(json!({"Id": "b"})),
            RawSession::new(json!({"Id": "c", "NowPlayingItem": {"Name": "Two"}})),
            RawSession::new(json!({"Id": "d", "NowPlayingItem": {}})),
            RawSession::new(json!({"Id": "e", "NowPlayingItem": {"Name": "Three"}})),
        ]
    }

    fn ids(list: &[RawSession]) -> Vec<&str> {
        list.iter().map(|s| s.field("Id").str().unwrap()).collect()
    }

    #[test]
    fn default_keeps_only_playing() {
        let kept = SessionFilterPolicy::default().apply(sessions());
        assert_eq!(ids(&kept), ["a", "c", "e"]);
    }

    #[test]
    fn idle_included_on_request() {
        let policy = SessionFilterPolicy {
            include_idle: true,
            max_streams: None,
        };
        assert_eq!(policy.apply(sessions()).len(), 5);
    }

    #[test]
    fn cap_takes_first_n_in_upstream_order() {
        let policy = SessionFilterPolicy {
            include_idle: false,
            max_streams: Some(2),
        };
        assert_eq!(ids(&policy.apply(sessions())), ["a", "c"]);
    }

    #[test]
    fn zero_max_streams_setting_means_unlimited() {
        let settings = PluginSettings {
            max_streams: 0,
            show_idle: true,
            ..PluginSettings::default()
        };
        let policy = SessionFilterPolicy::from_settings(&settings);
        assert_eq!(policy.max_streams, None);
        assert!(policy.include_idle);
    }
}
