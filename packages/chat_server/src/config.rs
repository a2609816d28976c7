use std::path::Path;
use std::time::Duration;

use chat_core::{ChannelSpec, HubConfig, SessionConfig};
use serde::{Deserialize, Serialize};

// =============================================================================
// File config (figment-deserialized from defaults / chatd.toml / env vars)
// =============================================================================
//
//   chatd.toml:      [server]
//                    port = 4000
//
//   env var:         CHATD_SERVER__PORT=4000   (double underscore = nesting)

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "chatd.toml";

/// How outbound events are written to clients.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One human-readable line per event
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub hub: HubFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            format: OutputFormat::default(),
        }
    }
}

impl ServerFileConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFileConfig {
    pub name: String,
    #[serde(default)]
    pub topic: String,
}

/// Hub tunables (lives under `[hub]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubFileConfig {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_join_replay")]
    pub join_replay: usize,
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
    #[serde(default = "default_announce_presence")]
    pub announce_presence: bool,
    #[serde(default = "default_channels")]
    pub default_channels: Vec<ChannelFileConfig>,
}

impl Default for HubFileConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            join_replay: default_join_replay(),
            join_timeout_ms: default_join_timeout_ms(),
            event_capacity: default_event_capacity(),
            inbound_capacity: default_inbound_capacity(),
            command_capacity: default_command_capacity(),
            outbound_capacity: default_outbound_capacity(),
            announce_presence: default_announce_presence(),
            default_channels: default_channels(),
        }
    }
}

impl HubFileConfig {
    /// Runtime view consumed by [`chat_core::Hub`].
    pub fn to_hub_config(&self) -> HubConfig {
        let mut config = HubConfig {
            history_capacity: self.history_capacity,
            join_replay: self.join_replay,
            join_timeout: Duration::from_millis(self.join_timeout_ms),
            event_capacity: self.event_capacity,
            session: SessionConfig {
                inbound_capacity: self.inbound_capacity,
                command_capacity: self.command_capacity,
                outbound_capacity: self.outbound_capacity,
            },
            announce_presence: self.announce_presence,
            ..HubConfig::default()
        };
        if !self.default_channels.is_empty() {
            config.default_channels = self
                .default_channels
                .iter()
                .map(|c| ChannelSpec::new(&c.name, &c.topic))
                .collect();
        }
        config
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    42069
}
fn default_history_capacity() -> usize {
    100
}
fn default_join_replay() -> usize {
    20
}
fn default_join_timeout_ms() -> u64 {
    1000
}
fn default_event_capacity() -> usize {
    16
}
fn default_inbound_capacity() -> usize {
    64
}
fn default_command_capacity() -> usize {
    16
}
fn default_outbound_capacity() -> usize {
    64
}
fn default_announce_presence() -> bool {
    true
}
fn default_channels() -> Vec<ChannelFileConfig> {
    vec![
        ChannelFileConfig {
            name: "general".to_string(),
            topic: "General discussion".to_string(),
        },
        ChannelFileConfig {
            name: "random".to_string(),
            topic: "Random".to_string(),
        },
    ]
}

/// Build a figment that layers: defaults → config file → CHATD_* env vars.
///
/// A missing config file is not an error; its layer is simply empty.
pub fn load_config(path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CHATD_").split("__"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_file_config_defaults() {
        let fc = ServerFileConfig::default();
        assert_eq!(fc.host, "127.0.0.1");
        assert_eq!(fc.port, 42069);
        assert_eq!(fc.format, OutputFormat::Text);
        assert_eq!(fc.bind_addr(), "127.0.0.1:42069");
    }

    #[test]
    fn test_hub_file_config_maps_to_runtime() {
        let config = HubFileConfig::default().to_hub_config();
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.join_replay, 20);
        assert_eq!(config.join_timeout, Duration::from_secs(1));
        assert_eq!(config.session, SessionConfig::default());
        assert!(config.announce_presence);
        assert_eq!(config.landing_channel, "general");
        assert_eq!(
            config.default_channels,
            vec![
                ChannelSpec::new("general", "General discussion"),
                ChannelSpec::new("random", "Random"),
            ]
        );
    }

    #[test]
    fn test_empty_channel_list_keeps_builtin_defaults() {
        let fc = HubFileConfig {
            default_channels: vec![],
            ..Default::default()
        };
        assert_eq!(fc.to_hub_config().default_channels.len(), 2);
    }

    #[test]
    fn test_load_config_defaults_without_file() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(&tmp.path().join(DEFAULT_CONFIG_FILE))
            .extract()
            .unwrap();
        assert_eq!(fc.server.port, 42069);
        assert_eq!(fc.hub.history_capacity, 100);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(
            &path,
            r#"
[server]
port = 4000
format = "json"

[hub]
history_capacity = 10
announce_presence = false
default_channels = [{ name = "lobby", topic = "Say hi" }]
"#,
        )
        .unwrap();

        let fc: FileConfig = load_config(&path).extract().unwrap();
        assert_eq!(fc.server.port, 4000);
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.format, OutputFormat::Json);

        let hub = fc.hub.to_hub_config();
        assert_eq!(hub.history_capacity, 10);
        assert_eq!(hub.join_replay, 20);
        assert!(!hub.announce_presence);
        assert_eq!(hub.default_channels, vec![ChannelSpec::new("lobby", "Say hi")]);
    }
}
