//! Per-connection state and its three bounded queues.
//!
//! A [`Session`] is shared between three parties: the transport/render layer
//! (which enqueues input and drains output), the session's pump inside the
//! hub (which drains input), and the hub's dispatch loop (which tracks the
//! current channel and delivers output). Every queue operation is
//! non-blocking: a full queue drops the newest item.

use std::fmt;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::Command;
use crate::config::SessionConfig;
use crate::message::{Message, MessageKind};

/// Receiving ends of a session's inbound queues, owned by its pump.
pub(crate) struct SessionInbound {
    pub chat: mpsc::Receiver<Message>,
    pub commands: mpsc::Receiver<Command>,
}

/// Server-side state for one connected user.
pub struct Session {
    id: String,
    display_name: String,
    current_channel: RwLock<Option<String>>,
    chat_tx: mpsc::Sender<Message>,
    command_tx: mpsc::Sender<Command>,
    inbound: Mutex<Option<SessionInbound>>,
    /// `None` once the hub has closed the outbound stream
    outbound_tx: Mutex<Option<mpsc::Sender<Message>>>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    closed: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Create a session with the default queue bounds.
    pub fn new(identity: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::with_config(identity, display_name, &SessionConfig::default())
    }

    pub fn with_config(
        identity: impl Into<String>,
        display_name: impl Into<String>,
        config: &SessionConfig,
    ) -> Self {
        let (chat_tx, chat_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));

        Self {
            id: identity.into(),
            display_name: display_name.into(),
            current_channel: RwLock::new(None),
            chat_tx,
            command_tx,
            inbound: Mutex::new(Some(SessionInbound {
                chat: chat_rx,
                commands: command_rx,
            })),
            outbound_tx: Mutex::new(Some(outbound_tx)),
            outbound_rx: Mutex::new(Some(outbound_rx)),
            closed: CancellationToken::new(),
        }
    }

    /// Stable identity (fingerprint) supplied by the transport layer.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Channel this session is currently a member of.
    pub fn current_channel(&self) -> Option<String> {
        self.current_channel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_current_channel(&self, channel: Option<String>) {
        *self
            .current_channel
            .write()
            .unwrap_or_else(PoisonError::into_inner) = channel;
    }

    /// Queue a chat line for the current channel.
    ///
    /// Dropped when the session has not joined a channel yet or the inbound
    /// queue is full.
    pub fn send_message(&self, text: impl Into<String>) {
        let Some(channel) = self.current_channel() else {
            debug!(session = %self.id, "Dropping chat message: no current channel");
            return;
        };

        let msg = Message::new(
            MessageKind::Chat,
            Some(channel),
            self.id.clone(),
            self.display_name.clone(),
            text,
        );

        if self.chat_tx.try_send(msg).is_err() {
            debug!(session = %self.id, "Dropping chat message: inbound queue full");
        }
    }

    /// Queue a command for the hub. Dropped when the command queue is full.
    pub fn send_command(&self, command: Command) {
        if self.command_tx.try_send(command).is_err() {
            debug!(session = %self.id, "Dropping command: command queue full");
        }
    }

    /// Push an event onto the outbound queue without ever waiting.
    ///
    /// A slow consumer loses the newest events; a closed stream loses all of them.
    pub fn deliver(&self, msg: Message) {
        let guard = lock(&self.outbound_tx);
        let Some(tx) = guard.as_ref() else {
            return;
        };
        match tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(session = %self.id, "Dropping outbound message: queue full");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session = %self.id, "Dropping outbound message: consumer gone");
            }
        }
    }

    /// Take the outbound event stream. Only the first caller gets it.
    pub fn messages(&self) -> Option<MessageStream> {
        lock(&self.outbound_rx)
            .take()
            .map(|rx| MessageStream { rx })
    }

    /// Signal that this session is finished. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once [`Session::close`] has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    pub(crate) fn take_inbound(&self) -> Option<SessionInbound> {
        lock(&self.inbound).take()
    }

    /// End the outbound stream. Items already queued are still readable.
    pub(crate) fn close_outbound(&self) {
        lock(&self.outbound_tx).take();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("current_channel", &self.current_channel())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The outbound events of one session, ending when the hub closes it.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::Receiver<Message>,
}

impl MessageStream {
    /// Wait for the next event; `None` means the session was torn down.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.rx.try_recv()
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SessionConfig {
        SessionConfig {
            inbound_capacity: 2,
            command_capacity: 1,
            outbound_capacity: 2,
        }
    }

    #[test]
    fn send_message_without_channel_is_dropped() {
        let session = Session::new("u1", "alice");
        session.send_message("hello");

        let mut inbound = session.take_inbound().unwrap();
        assert!(inbound.chat.try_recv().is_err());
    }

    #[test]
    fn send_message_addresses_current_channel() {
        let session = Session::new("u1", "alice");
        session.set_current_channel(Some("general".into()));
        session.send_message("hello");

        let mut inbound = session.take_inbound().unwrap();
        let msg = inbound.chat.try_recv().unwrap();
        assert_eq!(msg.kind, MessageKind::Chat);
        assert_eq!(msg.channel_id.as_deref(), Some("general"));
        assert_eq!(msg.user_id, "u1");
        assert_eq!(msg.username, "alice");
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn full_inbound_queues_drop_newest() {
        let session = Session::with_config("u1", "alice", &small_config());
        session.set_current_channel(Some("general".into()));
        for text in ["one", "two", "three"] {
            session.send_message(text);
        }
        session.send_command(Command::new("help", vec![]));
        session.send_command(Command::new("list", vec![]));

        let mut inbound = session.take_inbound().unwrap();
        assert_eq!(inbound.chat.try_recv().unwrap().text, "one");
        assert_eq!(inbound.chat.try_recv().unwrap().text, "two");
        assert!(inbound.chat.try_recv().is_err());
        assert_eq!(inbound.commands.try_recv().unwrap().name, "help");
        assert!(inbound.commands.try_recv().is_err());
    }

    #[test]
    fn deliver_never_blocks_on_full_queue() {
        let session = Session::with_config("u1", "alice", &small_config());
        let mut stream = session.messages().unwrap();
        for text in ["one", "two", "three"] {
            session.deliver(Message::system(MessageKind::System, text));
        }

        assert_eq!(stream.try_recv().unwrap().text, "one");
        assert_eq!(stream.try_recv().unwrap().text, "two");
        assert!(matches!(stream.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn messages_can_only_be_taken_once() {
        let session = Session::new("u1", "alice");
        assert!(session.messages().is_some());
        assert!(session.messages().is_none());
    }

    #[tokio::test]
    async fn close_outbound_ends_stream_after_draining() {
        let session = Session::new("u1", "alice");
        let mut stream = session.messages().unwrap();
        session.deliver(Message::system(MessageKind::System, "last"));
        session.close_outbound();
        session.deliver(Message::system(MessageKind::System, "too late"));

        assert_eq!(stream.recv().await.unwrap().text, "last");
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let session = Session::new("u1", "alice");
        assert!(!session.is_closed());
        session.close();
        session.close();
        assert!(session.is_closed());
        session.closed().await;
    }
}
