use std::time::Duration;

/// A channel created when the hub starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub topic: String,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
        }
    }
}

/// Bounds for the three per-session queues.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Chat messages waiting for the hub
    pub inbound_capacity: usize,
    /// Commands waiting for the hub
    pub command_capacity: usize,
    /// Events waiting for the render layer
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 64,
            command_capacity: 16,
            outbound_capacity: 64,
        }
    }
}

/// Runtime configuration for a [`crate::Hub`].
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Channels that exist from startup
    pub default_channels: Vec<ChannelSpec>,
    /// Channel every new session is joined to
    pub landing_channel: String,
    /// Per-channel history bound (oldest evicted first)
    pub history_capacity: usize,
    /// History entries replayed to a session when it joins
    pub join_replay: usize,
    /// Deadline for the asynchronous landing-channel join
    pub join_timeout: Duration,
    /// Capacity of the dispatch loop's event queue
    pub event_capacity: usize,
    /// Queue bounds used by [`crate::Session::with_config`]
    pub session: SessionConfig,
    /// Send Join/Leave notices to the other members of a channel
    pub announce_presence: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            default_channels: vec![
                ChannelSpec::new("general", "General discussion"),
                ChannelSpec::new("random", "Random"),
            ],
            landing_channel: "general".to_string(),
            history_capacity: 100,
            join_replay: 20,
            join_timeout: Duration::from_secs(1),
            event_capacity: 16,
            session: SessionConfig::default(),
            announce_presence: false,
        }
    }
}
