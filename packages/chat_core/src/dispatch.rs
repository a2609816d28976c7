//! Slash-command handlers, run on the hub's dispatch loop.

use std::sync::Arc;

use tracing::debug;

use crate::command::Command;
use crate::hub::Hub;
use crate::message::{Message, MessageKind};
use crate::session::Session;

const HELP_TEXT: &str = "Available commands:
/help - Show this help
/join <channel> - Join a channel
/list - List channels
/users - List users in current channel
/dm <user> <msg> - Send direct message
/quit - Exit";

fn reply(session: &Session, kind: MessageKind, text: impl Into<String>) {
    session.deliver(Message::system(kind, text));
}

impl Hub {
    /// Execute `command` on behalf of `session`.
    pub(crate) async fn execute_command(&mut self, session: &Arc<Session>, command: Command) {
        debug!(session = %session.id(), command = %command.name, "Executing command");

        match command.name.as_str() {
            "help" => reply(session, MessageKind::System, HELP_TEXT),
            "join" | "j" => match command.args.first() {
                Some(target) => {
                    let name = target.strip_prefix('#').unwrap_or(target.as_str());
                    if name.is_empty() {
                        debug!(session = %session.id(), "Ignoring join without channel name");
                    } else {
                        self.join_channel(session, name).await;
                    }
                }
                None => debug!(session = %session.id(), "Ignoring join without channel name"),
            },
            "list" | "channels" => self.cmd_list_channels(session).await,
            "users" | "who" => self.cmd_list_users(session).await,
            "dm" | "msg" => match command.args.split_first() {
                Some((recipient, rest)) if !rest.is_empty() => {
                    self.cmd_direct_message(session, recipient, &rest.join(" "));
                }
                _ => debug!(session = %session.id(), "Ignoring dm without recipient and text"),
            },
            "quit" | "q" | "q!" => session.close(),
            other => reply(
                session,
                MessageKind::Error,
                format!("Unknown command: /{}", other),
            ),
        }
    }

    async fn cmd_list_channels(&self, session: &Session) {
        let lines: Vec<String> = self
            .channel_infos()
            .await
            .into_iter()
            .map(|info| {
                format!(
                    "#{} ({} users) - {}",
                    info.name, info.member_count, info.topic
                )
            })
            .collect();

        reply(
            session,
            MessageKind::System,
            format!("Channels:\n{}", lines.join("\n")),
        );
    }

    async fn cmd_list_users(&self, session: &Session) {
        let Some(current) = session.current_channel() else {
            return;
        };
        let Some(channel) = self.channels.get(&current) else {
            return;
        };

        let mut names: Vec<&str> = channel
            .members()
            .await
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .map(|s| s.display_name())
            .collect();
        names.sort_unstable();

        reply(
            session,
            MessageKind::System,
            format!("Users in #{}:\n{}", channel.name(), names.join(", ")),
        );
    }

    fn cmd_direct_message(&self, session: &Session, recipient: &str, text: &str) {
        // First match wins when display names collide.
        let target = self
            .sessions
            .values()
            .find(|s| s.display_name() == recipient);

        let Some(target) = target else {
            reply(
                session,
                MessageKind::Error,
                format!("User {} not found", recipient),
            );
            return;
        };

        let dm = Message::new(
            MessageKind::Private,
            None,
            session.id(),
            session.display_name(),
            text,
        );
        session.deliver(dm.clone());
        target.deliver(dm);
    }
}
