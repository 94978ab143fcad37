//! Configuration management
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! `voicebridge.toml` (or the file named by `VOICEBRIDGE_CONFIG`), and
//! `VOICEBRIDGE_*` environment variables using `__` between sections, e.g.
//! `VOICEBRIDGE_SESSION__IDLE_TIMEOUT_SECS=45`.

use crate::application::{RelayConfig, SessionConfig};
use crate::domain::consultancy::{Consultancy, InMemoryAppointmentStore};
use crate::domain::event::AudioEncoding;
use crate::domain::handler::RegistryBuilder;
use crate::domain::pharmacy::{InMemoryInventory, Pharmacy};
use crate::domain::shared::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_VAR: &str = "VOICEBRIDGE_CONFIG";
/// Fallback source for the voice-agent API key
pub const API_KEY_VAR: &str = "DEEPGRAM_API_KEY";

const DEFAULT_CONFIG_NAME: &str = "voicebridge";
const ENV_PREFIX: &str = "VOICEBRIDGE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub session: SessionSettings,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path the telephony provider opens its media stream on
    pub media_path: String,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub url: String,
    pub api_key: Option<String>,
    /// JSON settings document sent to the agent at the start of each call
    pub settings_file: String,
    pub connect_timeout_secs: u64,
    pub audio_encoding: AudioEncoding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub idle_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub outbound_buffer: usize,
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub handler_timeout_ms: u64,
    /// Extra attempts for a timed-out handler; other failures are never retried
    pub max_retries: u32,
    /// Function set offered to the agent
    pub catalog: Catalog,
}

/// Business functions a deployment answers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Catalog {
    #[default]
    Consultancy,
    Pharmacy,
}

impl Catalog {
    /// Register this catalog's handlers, backed by in-memory stores
    pub fn register(&self, builder: &mut RegistryBuilder) -> Result<()> {
        match self {
            Catalog::Consultancy => {
                Arc::new(Consultancy::new(Arc::new(InMemoryAppointmentStore::new())))
                    .register(builder)
            }
            Catalog::Pharmacy => {
                Arc::new(Pharmacy::new(Arc::new(InMemoryInventory::default()))).register(builder)
            }
        }
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Catalog::Consultancy => write!(f, "consultancy"),
            Catalog::Pharmacy => write!(f, "pharmacy"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            media_path: "/twilio".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: "wss://agent.deepgram.com/agent".to_string(),
            api_key: None,
            settings_file: "config.json".to_string(),
            connect_timeout_secs: 5,
            audio_encoding: AudioEncoding::Mulaw,
        }
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("settings_file", &self.settings_file)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("audio_encoding", &self.audio_encoding)
            .finish()
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30,
            handshake_timeout_secs: 10,
            outbound_buffer: 64,
            shutdown_grace_secs: 5,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 3000,
            max_retries: 0,
            catalog: Catalog::default(),
        }
    }
}

impl AppConfig {
    /// Load from the default locations and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load from `path` (required when given) and the environment
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => ::config::File::from(path).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let mut config: AppConfig = ::config::Config::builder()
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| BridgeError::Configuration(e.to_string()))?;

        if config.agent.api_key.is_none() {
            config.agent.api_key = std::env::var(API_KEY_VAR).ok().filter(|key| !key.is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, bool); 7] = [
            ("agent.connect_timeout_secs", self.agent.connect_timeout_secs > 0),
            ("session.idle_timeout_secs", self.session.idle_timeout_secs > 0),
            ("session.handshake_timeout_secs", self.session.handshake_timeout_secs > 0),
            ("session.outbound_buffer", self.session.outbound_buffer > 0),
            ("session.shutdown_grace_secs", self.session.shutdown_grace_secs > 0),
            ("dispatch.handler_timeout_ms", self.dispatch.handler_timeout_ms > 0),
            ("server.port", self.server.port > 0),
        ];
        if let Some((field, _)) = checks.iter().find(|(_, ok)| !ok) {
            return Err(BridgeError::Configuration(format!("{} must be greater than zero", field)));
        }
        if !self.server.media_path.starts_with('/') {
            return Err(BridgeError::Configuration(
                "server.media_path must start with '/'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.connect_timeout_secs)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.handler_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.session.shutdown_grace_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            handshake_timeout: Duration::from_secs(self.session.handshake_timeout_secs),
            agent_encoding: self.agent.audio_encoding,
            relay: RelayConfig {
                idle_timeout: Duration::from_secs(self.session.idle_timeout_secs),
                outbound_buffer: self.session.outbound_buffer,
                ..RelayConfig::default()
            },
        }
    }
}
