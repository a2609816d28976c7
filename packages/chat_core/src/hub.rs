//! The coordinator: session and channel registries plus the dispatch loop.
//!
//! [`Hub`] owns both registries and is driven by exactly one task
//! ([`Hub::run`]), so every structural change (registration, unregistration,
//! joins, command effects) happens in one total order. Everything else talks
//! to it through a cloneable [`HubHandle`]. Each registered session gets a
//! pump task that relays its inbound queues into the loop and never touches
//! the registries itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::command::Command;
use crate::config::{HubConfig, SessionConfig};
use crate::error::HubError;
use crate::message::{Message, MessageKind};
use crate::session::{Session, SessionInbound};

/// Lifecycle of the dispatch loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HubState {
    Running,
    ShuttingDown,
    Stopped,
}

/// Snapshot of one channel as reported by [`HubHandle::channels`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub topic: String,
    pub member_count: usize,
}

/// Events processed by the dispatch loop, one at a time.
#[derive(Debug)]
pub(crate) enum HubEvent {
    Register(Arc<Session>),
    Unregister(String),
    Chat(Message),
    Command {
        session_id: String,
        command: Command,
    },
    Join {
        session_id: String,
        channel: String,
    },
    ListChannels {
        respond_to: oneshot::Sender<Vec<ChannelInfo>>,
    },
    ChannelMembers {
        name: String,
        respond_to: oneshot::Sender<Option<Vec<String>>>,
    },
    SessionCount {
        respond_to: oneshot::Sender<usize>,
    },
}

/// Handle to a running hub. Cheap to clone.
#[derive(Clone, Debug)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
    shutdown: CancellationToken,
    state: watch::Receiver<HubState>,
    session_config: SessionConfig,
}

impl HubHandle {
    /// Build a session using this hub's queue bounds.
    pub fn new_session(&self, identity: impl Into<String>, display_name: impl Into<String>) -> Session {
        Session::with_config(identity, display_name, &self.session_config)
    }

    /// Hand a freshly connected session to the hub.
    ///
    /// If the hub is shutting down or gone, the session is closed and
    /// [`HubError::Stopped`] is returned.
    pub async fn register(&self, session: Arc<Session>) -> Result<(), HubError> {
        if self.shutdown.is_cancelled() {
            session.close();
            return Err(HubError::Stopped);
        }

        let sent = tokio::select! {
            res = self.events.send(HubEvent::Register(session.clone())) => res.is_ok(),
            _ = self.shutdown.cancelled() => false,
        };

        if sent {
            Ok(())
        } else {
            session.close();
            Err(HubError::Stopped)
        }
    }

    /// Ask the dispatch loop to stop. Every live session's stream is closed.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Current lifecycle state. Reports `ShuttingDown` as soon as
    /// [`HubHandle::shutdown`] is called, before the loop has drained.
    pub fn state(&self) -> HubState {
        let state = *self.state.borrow();
        if state == HubState::Running && self.shutdown.is_cancelled() {
            HubState::ShuttingDown
        } else {
            state
        }
    }

    /// Wait until the hub has finished tearing down.
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == HubState::Stopped).await;
    }

    /// All known channels, sorted by name.
    pub async fn channels(&self) -> Result<Vec<ChannelInfo>, HubError> {
        self.request(|respond_to| HubEvent::ListChannels { respond_to })
            .await
    }

    /// Identities of a channel's members, or `None` if the channel does not exist.
    pub async fn channel_members(&self, name: &str) -> Result<Option<Vec<String>>, HubError> {
        let name = name.to_string();
        self.request(|respond_to| HubEvent::ChannelMembers { name, respond_to })
            .await
    }

    pub async fn session_count(&self) -> Result<usize, HubError> {
        self.request(|respond_to| HubEvent::SessionCount { respond_to })
            .await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> HubEvent,
    ) -> Result<T, HubError> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(make(tx))
            .await
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)
    }
}

/// The coordinator state, owned by the dispatch loop task.
pub struct Hub {
    config: HubConfig,
    pub(crate) sessions: HashMap<String, Arc<Session>>,
    pub(crate) channels: HashMap<String, Arc<Channel>>,
    events_tx: mpsc::Sender<HubEvent>,
    events_rx: mpsc::Receiver<HubEvent>,
    shutdown: CancellationToken,
    state_tx: watch::Sender<HubState>,
}

impl Hub {
    /// Create a hub with its default channels, plus a handle to it.
    ///
    /// Nothing is processed until [`Hub::run`] is polled; see [`Hub::spawn`].
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(HubState::Running);
        let shutdown = CancellationToken::new();

        let handle = HubHandle {
            events: events_tx.clone(),
            shutdown: shutdown.clone(),
            state: state_rx,
            session_config: config.session.clone(),
        };

        let mut hub = Self {
            config,
            sessions: HashMap::new(),
            channels: HashMap::new(),
            events_tx,
            events_rx,
            shutdown,
            state_tx,
        };

        let defaults = hub.config.default_channels.clone();
        for spec in defaults {
            hub.create_channel(&spec.name, &spec.topic);
        }

        (hub, handle)
    }

    /// Create a hub and run its dispatch loop on the current runtime.
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (hub, handle) = Self::new(config);
        tokio::spawn(hub.run());
        handle
    }

    /// The dispatch loop. Returns once the hub is stopped.
    pub async fn run(mut self) {
        info!(channels = self.channels.len(), "Hub dispatch loop started");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                event = self.events_rx.recv() => event,
            };
            let Some(event) = event else {
                break;
            };
            self.handle_event(event).await;
        }

        self.cleanup();
    }

    async fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register(session) => self.handle_register(session),
            HubEvent::Unregister(session_id) => self.handle_unregister(&session_id).await,
            HubEvent::Chat(msg) => self.broadcast_to_channel(msg).await,
            HubEvent::Command {
                session_id,
                command,
            } => match self.sessions.get(&session_id).cloned() {
                Some(session) => self.execute_command(&session, command).await,
                None => debug!(session = %session_id, "Dropping command from unregistered session"),
            },
            HubEvent::Join {
                session_id,
                channel,
            } => match self.sessions.get(&session_id).cloned() {
                Some(session) => self.join_channel(&session, &channel).await,
                None => debug!(session = %session_id, "Dropping join for unregistered session"),
            },
            HubEvent::ListChannels { respond_to } => {
                let _ = respond_to.send(self.channel_infos().await);
            }
            HubEvent::ChannelMembers { name, respond_to } => {
                let members = match self.channels.get(&name) {
                    Some(channel) => Some(channel.members().await),
                    None => None,
                };
                let _ = respond_to.send(members);
            }
            HubEvent::SessionCount { respond_to } => {
                let _ = respond_to.send(self.sessions.len());
            }
        }
    }

    fn handle_register(&mut self, session: Arc<Session>) {
        if self.shutdown.is_cancelled() {
            session.close();
            return;
        }

        if self.sessions.contains_key(session.id()) {
            warn!(session = %session.id(), "Session already registered");
            return;
        }

        let Some(inbound) = session.take_inbound() else {
            warn!(session = %session.id(), "Session inbound queues already claimed");
            return;
        };

        info!(
            session = %session.id(),
            name = %session.display_name(),
            "Session registered"
        );
        self.sessions
            .insert(session.id().to_string(), session.clone());

        tokio::spawn(run_pump(
            session,
            inbound,
            self.events_tx.clone(),
            self.shutdown.clone(),
            self.config.landing_channel.clone(),
            self.config.join_timeout,
        ));
    }

    async fn handle_unregister(&mut self, session_id: &str) {
        let Some(session) = self.sessions.get(session_id).cloned() else {
            return;
        };

        for channel in self.channels.values() {
            if channel.remove_member(session_id).await && self.config.announce_presence {
                let notice = presence_notice(MessageKind::Leave, &session, channel.name());
                channel.notify(&notice, &self.sessions, session_id).await;
            }
        }

        self.sessions.remove(session_id);
        session.set_current_channel(None);
        session.close_outbound();

        info!(session = %session_id, "Session unregistered");
    }

    pub(crate) async fn broadcast_to_channel(&self, msg: Message) {
        let channel = msg
            .channel_id
            .as_deref()
            .and_then(|name| self.channels.get(name));

        match channel {
            Some(channel) => {
                let delivered = channel.broadcast(&msg, &self.sessions).await;
                debug!(channel = %channel.name(), delivered, "Broadcast message");
            }
            None => debug!(channel = ?msg.channel_id, "Dropping message for unknown channel"),
        }
    }

    /// Move `session` into `name`, creating the channel if needed, and replay
    /// its recent history to the session.
    pub(crate) async fn join_channel(&mut self, session: &Arc<Session>, name: &str) {
        let channel = match self.channels.get(name) {
            Some(channel) => channel.clone(),
            None => self.create_channel(name, ""),
        };

        let previous = session.current_channel();
        if let Some(prev) = previous.as_deref().filter(|prev| *prev != name) {
            if let Some(old) = self.channels.get(prev) {
                old.remove_member(session.id()).await;
                if self.config.announce_presence {
                    let notice = presence_notice(MessageKind::Leave, session, prev);
                    old.notify(&notice, &self.sessions, session.id()).await;
                }
            }
        }

        channel.add_member(session.id()).await;
        session.set_current_channel(Some(name.to_string()));

        for msg in channel.recent_history(self.config.join_replay).await {
            session.deliver(msg);
        }

        if self.config.announce_presence && previous.as_deref() != Some(name) {
            let notice = presence_notice(MessageKind::Join, session, name);
            channel.notify(&notice, &self.sessions, session.id()).await;
        }

        debug!(session = %session.id(), channel = %name, "Joined channel");
    }

    pub(crate) async fn channel_infos(&self) -> Vec<ChannelInfo> {
        let mut infos = Vec::with_capacity(self.channels.len());
        for channel in self.channels.values() {
            infos.push(ChannelInfo {
                name: channel.name().to_string(),
                topic: channel.topic().to_string(),
                member_count: channel.member_count().await,
            });
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    fn create_channel(&mut self, name: &str, topic: &str) -> Arc<Channel> {
        let channel = Arc::new(Channel::new(name, topic, self.config.history_capacity));
        self.channels.insert(name.to_string(), channel.clone());
        info!(channel = %name, "Channel created");
        channel
    }

    fn cleanup(&mut self) {
        self.state_tx.send_replace(HubState::ShuttingDown);
        info!(sessions = self.sessions.len(), "Hub shutting down");

        // Registrations that raced the shutdown never reach the registry.
        self.events_rx.close();
        while let Ok(event) = self.events_rx.try_recv() {
            if let HubEvent::Register(session) = event {
                session.close();
                session.close_outbound();
            }
        }

        for (_, session) in self.sessions.drain() {
            session.close_outbound();
        }

        self.state_tx.send_replace(HubState::Stopped);
        info!("Hub stopped");
    }
}

fn presence_notice(kind: MessageKind, session: &Session, channel: &str) -> Message {
    let verb = if kind == MessageKind::Join { "joined" } else { "left" };
    Message::new(
        kind,
        Some(channel.to_string()),
        session.id(),
        session.display_name(),
        format!("{} {} #{}", session.display_name(), verb, channel),
    )
}

/// Relay one session's inbound queues and close signal into the dispatch loop.
///
/// The landing-channel join is sent first so it is ordered before anything
/// the session itself sends.
async fn run_pump(
    session: Arc<Session>,
    mut inbound: SessionInbound,
    events: mpsc::Sender<HubEvent>,
    shutdown: CancellationToken,
    landing_channel: String,
    join_timeout: Duration,
) {
    let session_id = session.id().to_string();

    let join = HubEvent::Join {
        session_id: session_id.clone(),
        channel: landing_channel,
    };
    match tokio::time::timeout(join_timeout, events.send(join)).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => return,
        Err(_) => warn!(session = %session_id, "Default join timed out"),
    }

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = session.closed() => break,
            Some(msg) = inbound.chat.recv() => HubEvent::Chat(msg),
            Some(command) = inbound.commands.recv() => HubEvent::Command {
                session_id: session_id.clone(),
                command,
            },
        };
        if events.send(event).await.is_err() {
            return;
        }
    }

    debug!(session = %session_id, "Session closed, unregistering");
    let _ = events.send(HubEvent::Unregister(session_id)).await;
}

#[cfg(test)]
impl Hub {
    /// Put a session straight into the registry without spawning its pump.
    pub(crate) fn insert_test_session(&mut self, session: Arc<Session>) {
        self.sessions.insert(session.id().to_string(), session);
    }

    pub(crate) async fn unregister_for_test(&mut self, session_id: &str) {
        self.handle_unregister(session_id).await;
    }
}
