//! Chat Core - in-memory coordination engine for a multi-room chat broker
//!
//! Transport and rendering live elsewhere. This crate receives an opaque
//! `(identity, display name)` pair per connection, gives back a [`Session`]
//! with bounded queues, and routes chat, direct messages and slash-commands
//! through a single [`Hub`] dispatch loop.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chat_core::{Command, Hub, HubConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = Hub::spawn(HubConfig::default());
//!
//!     let session = Arc::new(hub.new_session("fingerprint-1", "alice"));
//!     let mut messages = session.messages().unwrap();
//!     hub.register(session.clone()).await.unwrap();
//!
//!     session.send_command(Command::parse("/join random").unwrap());
//!     session.send_message("hello");
//!
//!     while let Some(msg) = messages.recv().await {
//!         println!("[{:?}] {}: {}", msg.kind, msg.username, msg.text);
//!     }
//! }
//! ```

mod channel;
mod command;
mod config;
mod dispatch;
mod error;
mod hub;
mod message;
mod session;


pub use channel::Channel;
pub use command::Command;
pub use config::{ChannelSpec, HubConfig, SessionConfig};
pub use error::{CommandParseError, HubError};
pub use hub::{ChannelInfo, Hub, HubHandle, HubState};
pub use message::{Message, MessageKind, SYSTEM_USER_ID, SYSTEM_USERNAME};
pub use session::{MessageStream, Session};
