pub mod state;

pub use state::{
    DEFAULT_APOLOGY, DEFAULT_GREETING, DEFAULT_REQUEST_TIMEOUT_SECS, ENV_PREFIX, Settings,
    SettingsError, SettingsResult,
};
