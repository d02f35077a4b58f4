// src/config/credentials.rs
use crate::error::ConfigError;

pub const ENV_BOT_TOKEN: &str = "RELAY_BOT_TOKEN";
pub const ENV_TARGET_CHAT: &str = "RELAY_TARGET_CHAT";
pub const ENV_STORE_PATH: &str = "RELAY_STORE_PATH";
pub const ENV_HTTP_ADDR: &str = "RELAY_HTTP_ADDR";
pub const ENV_BOT_API_URL: &str = "RELAY_BOT_API_URL";

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Secrets and deployment knobs that never live in the config file.
#[derive(Clone)]
pub struct Credentials {
    pub bot_token: String,
    pub target_chat: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Safe diagnostics: only token length
        f.debug_struct("Credentials")
            .field("bot_token_len", &self.bot_token.len())
            .field("target_chat", &self.target_chat)
            .finish()
    }
}

impl Credentials {
    /// Returns `Ok(None)` when no bot token is set (dry-run mode).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let token = match std::env::var(ENV_BOT_TOKEN) {
            Ok(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => return Ok(None),
        };
        let target = std::env::var(ENV_TARGET_CHAT)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(ENV_TARGET_CHAT))?;
        Ok(Some(Self {
            bot_token: token,
            target_chat: target.trim().to_string(),
        }))
    }
}

pub fn store_path_override() -> Option<String> {
    std::env::var(ENV_STORE_PATH)
        .ok()
        .filter(|p| !p.trim().is_empty())
}

/// Self-hosted Bot API server, if any.
pub fn bot_api_url() -> Option<String> {
    std::env::var(ENV_BOT_API_URL)
        .ok()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
}

pub fn http_addr() -> String {
    std::env::var(ENV_HTTP_ADDR).unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[serial_test::serial]
    #[test]
    fn token_without_target_is_an_error() {
        env::set_var(ENV_BOT_TOKEN, "123:abc");
        env::remove_var(ENV_TARGET_CHAT);
        assert!(matches!(
            Credentials::from_env(),
            Err(ConfigError::MissingEnv(ENV_TARGET_CHAT))
        ));

        env::set_var(ENV_TARGET_CHAT, "@out");
        let c = Credentials::from_env().unwrap().unwrap();
        assert_eq!(c.target_chat, "@out");
        assert!(!format!("{c:?}").contains("123:abc"));

        env::remove_var(ENV_BOT_TOKEN);
        env::remove_var(ENV_TARGET_CHAT);
        assert!(Credentials::from_env().unwrap().is_none());
    }

    #[serial_test::serial]
    #[test]
    fn blank_bot_api_url_means_default_server() {
        env::set_var(ENV_BOT_API_URL, "   ");
        assert_eq!(bot_api_url(), None);
        env::set_var(ENV_BOT_API_URL, " http://localhost:8081 ");
        assert_eq!(bot_api_url().as_deref(), Some("http://localhost:8081"));
        env::remove_var(ENV_BOT_API_URL);
    }
}
