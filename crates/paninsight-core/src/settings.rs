use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Which chat backend the widget talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    /// The PanInsight backend's `/api/ask` proxy.
    Proxy,
    /// An OpenAI-compatible completion endpoint.
    Completion,
}

/// How the chat widget decides whether the user may send messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    None,
    Local,
    Remote,
}

/// Environment-driven configuration shared by the CLI and the library clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base: String,
    pub chat_mode: ChatMode,
    pub chat_endpoint: Option<String>,
    pub chat_model: String,
    pub chat_api_key: Option<String>,
    pub chat_auth: AuthMode,
    pub timeout: Duration,
    pub state_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub logo: Option<String>,
    pub print_command: Option<String>,
}

impl Settings {
    pub const API_BASE_ENV: &'static str = "PANINSIGHT_API_BASE";
    pub const CHAT_MODE_ENV: &'static str = "PANINSIGHT_CHAT_MODE";
    pub const CHAT_ENDPOINT_ENV: &'static str = "PANINSIGHT_CHAT_ENDPOINT";
    pub const CHAT_MODEL_ENV: &'static str = "PANINSIGHT_CHAT_MODEL";
    pub const CHAT_API_KEY_ENV: &'static str = "PANINSIGHT_CHAT_API_KEY";
    pub const CHAT_AUTH_ENV: &'static str = "PANINSIGHT_CHAT_AUTH";
    pub const TIMEOUT_ENV: &'static str = "PANINSIGHT_TIMEOUT";
    pub const STATE_DIR_ENV: &'static str = "PANINSIGHT_STATE_DIR";
    pub const DOWNLOADS_DIR_ENV: &'static str = "PANINSIGHT_DOWNLOADS_DIR";
    pub const LOGO_ENV: &'static str = "PANINSIGHT_LOGO";
    pub const PRINT_COMMAND_ENV: &'static str = "PANINSIGHT_PRINT_COMMAND";

    pub const DEFAULT_API_BASE: &'static str = "http://localhost:8080";
    pub const DEFAULT_COMPLETION_ENDPOINT: &'static str = "https://api.deepinfra.com/v1/openai";
    pub const DEFAULT_CHAT_MODEL: &'static str = "meta-llama/Meta-Llama-3-8B-Instruct";
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Load settings from environment variables.
    ///
    /// * `PANINSIGHT_API_BASE`: backend base URL (default: `http://localhost:8080`).
    /// * `PANINSIGHT_CHAT_MODE`: `proxy` (default) or `completion`.
    /// * `PANINSIGHT_CHAT_API_KEY`: bearer key, required in `completion` mode.
    /// * `PANINSIGHT_CHAT_AUTH`: `none`, `local` (default) or `remote`.
    /// * `PANINSIGHT_TIMEOUT`: request timeout such as `30s` or `1m`.
    pub fn from_env() -> Result<Self> {
        Self::from_map(std::env::vars().collect())
    }

    pub fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_base = get(Self::API_BASE_ENV)
            .unwrap_or_else(|| Self::DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let chat_mode = match get(Self::CHAT_MODE_ENV)
            .map(|v| v.to_lowercase())
            .as_deref()
        {
            None | Some("proxy") => ChatMode::Proxy,
            Some("completion") => ChatMode::Completion,
            Some(other) => bail!(
                "unsupported chat mode '{other}' in {} (expected proxy or completion)",
                Self::CHAT_MODE_ENV
            ),
        };
        let chat_auth = match get(Self::CHAT_AUTH_ENV)
            .map(|v| v.to_lowercase())
            .as_deref()
        {
            Some("none") => AuthMode::None,
            None | Some("local") => AuthMode::Local,
            Some("remote") => AuthMode::Remote,
            Some(other) => bail!(
                "unsupported auth mode '{other}' in {} (expected none, local or remote)",
                Self::CHAT_AUTH_ENV
            ),
        };
        let chat_api_key = get(Self::CHAT_API_KEY_ENV);
        if chat_mode == ChatMode::Completion && chat_api_key.is_none() {
            bail!(
                "environment variable {} must be set when {}=completion",
                Self::CHAT_API_KEY_ENV,
                Self::CHAT_MODE_ENV
            );
        }
        let timeout = match get(Self::TIMEOUT_ENV) {
            Some(raw) => humantime::parse_duration(&raw)
                .with_context(|| format!("invalid duration '{raw}' in {}", Self::TIMEOUT_ENV))?,
            None => Self::DEFAULT_TIMEOUT,
        };

        Ok(Self {
            api_base,
            chat_mode,
            chat_endpoint: get(Self::CHAT_ENDPOINT_ENV),
            chat_model: get(Self::CHAT_MODEL_ENV)
                .unwrap_or_else(|| Self::DEFAULT_CHAT_MODEL.to_string()),
            chat_api_key,
            chat_auth,
            timeout,
            state_dir: get(Self::STATE_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".paninsight")),
            downloads_dir: get(Self::DOWNLOADS_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            logo: get(Self::LOGO_ENV),
            print_command: get(Self::PRINT_COMMAND_ENV),
        })
    }

    /// Endpoint the configured chat backend posts to.
    pub fn chat_endpoint(&self) -> String {
        match (&self.chat_endpoint, self.chat_mode) {
            (Some(endpoint), _) => endpoint.trim_end_matches('/').to_string(),
            (None, ChatMode::Proxy) => format!("{}/api/ask", self.api_base),
            (None, ChatMode::Completion) => Self::DEFAULT_COMPLETION_ENDPOINT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn with_env_lock<F: FnOnce()>(func: F) {
        let _guard = ENV_LOCK.lock().unwrap();
        func();
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_environment() {
        let settings = Settings::from_map(HashMap::new()).expect("defaults should load");
        assert_eq!(settings.api_base, "http://localhost:8080");
        assert_eq!(settings.chat_mode, ChatMode::Proxy);
        assert_eq!(settings.chat_auth, AuthMode::Local);
        assert_eq!(settings.chat_model, Settings::DEFAULT_CHAT_MODEL);
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.state_dir, PathBuf::from(".paninsight"));
        assert_eq!(settings.chat_endpoint(), "http://localhost:8080/api/ask");
        assert!(settings.chat_api_key.is_none());
    }

    #[test]
    fn completion_mode_requires_key() {
        let err = Settings::from_map(vars(&[(Settings::CHAT_MODE_ENV, "completion")]))
            .expect_err("missing key should error");
        assert!(err.to_string().contains(Settings::CHAT_API_KEY_ENV));
    }

    #[test]
    fn completion_mode_with_key() {
        let settings = Settings::from_map(vars(&[
            (Settings::CHAT_MODE_ENV, "Completion"),
            (Settings::CHAT_API_KEY_ENV, "secret"),
            (Settings::TIMEOUT_ENV, "1m 30s"),
            (Settings::API_BASE_ENV, "https://api.example.org/"),
        ]))
        .expect("should load completion settings");
        assert_eq!(settings.chat_mode, ChatMode::Completion);
        assert_eq!(settings.chat_api_key.as_deref(), Some("secret"));
        assert_eq!(settings.timeout, Duration::from_secs(90));
        assert_eq!(settings.api_base, "https://api.example.org");
        assert_eq!(settings.chat_endpoint(), Settings::DEFAULT_COMPLETION_ENDPOINT);
    }

    #[test]
    fn rejects_unknown_modes_and_durations() {
        assert!(Settings::from_map(vars(&[(Settings::CHAT_MODE_ENV, "carrier-pigeon")])).is_err());
        assert!(Settings::from_map(vars(&[(Settings::CHAT_AUTH_ENV, "sometimes")])).is_err());
        let err = Settings::from_map(vars(&[(Settings::TIMEOUT_ENV, "soon")])).unwrap_err();
        assert!(err.to_string().contains(Settings::TIMEOUT_ENV));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let settings = Settings::from_map(vars(&[
            (Settings::LOGO_ENV, "  "),
            (Settings::CHAT_AUTH_ENV, "none"),
        ]))
        .unwrap();
        assert!(settings.logo.is_none());
        assert_eq!(settings.chat_auth, AuthMode::None);
    }

    #[test]
    fn reads_process_environment() {
        with_env_lock(|| {
            env::set_var(Settings::STATE_DIR_ENV, "/tmp/paninsight-state");
            env::set_var(Settings::CHAT_AUTH_ENV, "remote");
            env::remove_var(Settings::CHAT_MODE_ENV);
            env::remove_var(Settings::TIMEOUT_ENV);
            let settings = Settings::from_env().expect("should load settings");
            assert_eq!(settings.state_dir, PathBuf::from("/tmp/paninsight-state"));
            assert_eq!(settings.chat_auth, AuthMode::Remote);
            env::remove_var(Settings::STATE_DIR_ENV);
            env::remove_var(Settings::CHAT_AUTH_ENV);
        });
    }
}
