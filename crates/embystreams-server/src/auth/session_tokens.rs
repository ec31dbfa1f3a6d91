//! Source of the per-session CSRF secret.
//!
//! Token issuance belongs to the dashboard host. The gateway only asks it
//! which secret belongs to a caller; standalone deployments use one static
//! secret for every caller.

/// Looks up the CSRF secret bound to a caller session.
pub trait SessionTokens: Send + Sync {
    fn session_token(&self, caller_key: &str) -> Option<String>;
}

/// The same secret for every caller.
pub struct StaticSessionToken {
    token: String,
}

impl StaticSessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl SessionTokens for StaticSessionToken {
    fn session_token(&self, _caller_key: &str) -> Option<String> {
        Some(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token_for_everyone() {
        let tokens = StaticSessionToken::new("secret");
        assert_eq!(tokens.session_token("a").as_deref(), Some("secret"));
        assert_eq!(tokens.session_token("b").as_deref(), Some("secret"));
    }
}
