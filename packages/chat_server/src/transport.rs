//! Line-oriented TCP front-end.
//!
//! One task per connection. The first line a client sends is its display
//! name; every later line is either a command (`/` or `:` prefix) or chat
//! text for the current channel. Hub events are written back one per line.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chat_core::{Command, HubHandle, MessageStream, Session};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OutputFormat;
use crate::render::render;

/// Longest line accepted from a client.
const MAX_LINE_LENGTH: usize = 4096;

const GREETING: &str = "Welcome! Enter a display name:";

/// Accept connections until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    hub: HubHandle,
    format: OutputFormat,
    shutdown: CancellationToken,
) {
    loop {
        let (socket, addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            },
        };

        debug!(%addr, "New connection");
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, addr, hub, format).await {
                warn!(%addr, "Connection error: {:#}", e);
            }
            debug!(%addr, "Disconnected");
        });
    }
    info!("Listener stopped");
}

async fn handle_connection<S>(
    socket: S,
    addr: SocketAddr,
    hub: HubHandle,
    format: OutputFormat,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    framed.send(GREETING).await?;

    let identity = Uuid::new_v4().to_string();
    let display_name = match framed.next().await {
        Some(line) => display_name_or_anonymous(&line?, &identity),
        None => return Ok(()),
    };

    let session = Arc::new(hub.new_session(identity.as_str(), display_name.as_str()));
    let mut messages = session
        .messages()
        .context("fresh session has no outbound stream")?;
    hub.register(session.clone())
        .await
        .context("Failed to register session")?;
    info!(%addr, session = %identity, name = %display_name, "Client connected");

    let result = relay(&mut framed, &session, &mut messages, format, addr).await;

    // Every exit path, write errors included, unregisters the session.
    session.close();
    info!(%addr, session = %identity, "Client disconnected");
    result
}

/// Shuttle lines between the client and its session until either side ends.
async fn relay<S>(
    framed: &mut Framed<S, LinesCodec>,
    session: &Session,
    messages: &mut MessageStream,
    format: OutputFormat,
    addr: SocketAddr,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(line)) => forward_line(session, &line),
                Some(Err(e)) => {
                    warn!(%addr, "Read error: {}", e);
                    return Ok(());
                }
                None => return Ok(()),
            },
            outbound = messages.recv() => match outbound {
                Some(msg) => framed.send(render(&msg, format)?).await?,
                // Hub closed the session (quit, shutdown).
                None => return Ok(()),
            },
        }
    }
}

/// Route one input line to the session's queues.
fn forward_line(session: &Session, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    if Command::is_command(line) {
        match Command::parse(line) {
            Ok(command) => session.send_command(command),
            Err(e) => debug!(session = %session.id(), "Ignoring command line: {}", e),
        }
    } else {
        session.send_message(line);
    }
}

fn display_name_or_anonymous(line: &str, identity: &str) -> String {
    let name = line.trim();
    if name.is_empty() {
        let short: String = identity.chars().take(8).collect();
        format!("anonymous-{}", short)
    } else {
        name.to_string()
    }
}
