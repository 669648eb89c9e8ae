use std::path::{Path, PathBuf};
use std::time::Duration;

use corki_llm::{
    DEFAULT_BASE_URL, DEFAULT_HEALTH_PATH, DEFAULT_RECOMMEND_PATH, ProviderConfig,
    normalize_base_url, normalize_path,
};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "corki";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "CORKI_";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_GREETING: &str = "Hi there! How can I help you find the perfect wine today? \
Feel free to ask me anything or share a wine menu by tapping the 📎 icon.";
pub const DEFAULT_APOLOGY: &str = "I apologize, but I encountered an error while processing \
your request. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_recommend_path")]
    pub recommend_path: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Seconds to wait for response headers and for each body chunk.
    /// `None` (JSON `null`) or `0` disables the timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: Option<u64>,
    /// Opening assistant message; empty disables it.
    #[serde(default = "default_greeting")]
    pub greeting: String,
    /// Replaces the streamed text when a call fails.
    #[serde(default = "default_apology")]
    pub apology: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            recommend_path: default_recommend_path(),
            health_path: default_health_path(),
            request_timeout_secs: default_request_timeout_secs(),
            greeting: default_greeting(),
            apology: default_apology(),
        }
    }
}

impl Settings {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".corki"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Defaults, then the JSON file at `path` if present, then `CORKI_*` variables.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load_from(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults and environment", path);
        }

        Self::figment(path)
            .extract::<Settings>()
            .context(ExtractSnafu {
                stage: "extract-settings",
            })
            .map(Settings::normalized)
    }

    /// Loads from the default location, falling back to defaults on a bad file.
    pub fn load() -> Self {
        let path = Self::default_config_path();
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(
                    "failed to load settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                Settings::default()
            }
        }
    }

    pub fn normalized(mut self) -> Self {
        self.api_base_url = normalize_base_url(&self.api_base_url);
        self.recommend_path = normalize_path(&self.recommend_path, DEFAULT_RECOMMEND_PATH);
        self.health_path = normalize_path(&self.health_path, DEFAULT_HEALTH_PATH);
        self.request_timeout_secs = self.request_timeout_secs.filter(|secs| *secs > 0);
        self.greeting = self.greeting.trim().to_string();
        if self.apology.trim().is_empty() {
            self.apology = default_apology();
        }
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(&self.api_base_url)
            .with_recommend_path(&self.recommend_path)
            .with_health_path(&self.health_path)
            .with_request_timeout(self.request_timeout())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to extract settings on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        source: figment::Error,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

fn default_api_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_recommend_path() -> String {
    DEFAULT_RECOMMEND_PATH.to_string()
}

fn default_health_path() -> String {
    DEFAULT_HEALTH_PATH.to_string()
}

fn default_request_timeout_secs() -> Option<u64> {
    Some(DEFAULT_REQUEST_TIMEOUT_SECS)
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

fn default_apology() -> String {
    DEFAULT_APOLOGY.to_string()
}
