/// Errors surfaced by the hub's in-process entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The dispatch loop has exited (or is exiting) and accepts no more events.
    #[error("hub is not running")]
    Stopped,
}

/// Errors produced while parsing raw user input into a [`crate::Command`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,

    #[error("commands start with '/' or ':'")]
    MissingMarker,
}
