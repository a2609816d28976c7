use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::message::Message;
use crate::session::Session;

/// A named room: fixed topic, member set, bounded history.
///
/// Membership and history sit behind separate locks so broadcasts on
/// different channels never contend, and no lock is held while delivering.
#[derive(Debug)]
pub struct Channel {
    name: String,
    topic: String,
    members: RwLock<HashSet<String>>,
    history: RwLock<VecDeque<Message>>,
    history_capacity: usize,
}

impl Channel {
    pub fn new(name: impl Into<String>, topic: impl Into<String>, history_capacity: usize) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            members: RwLock::new(HashSet::new()),
            history: RwLock::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn add_member(&self, session_id: &str) {
        self.members.write().await.insert(session_id.to_string());
    }

    /// Returns true if the session was a member.
    pub async fn remove_member(&self, session_id: &str) -> bool {
        self.members.write().await.remove(session_id)
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.members.read().await.contains(session_id)
    }

    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    /// Member session ids, sorted.
    pub async fn members(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.members.read().await.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Record `msg` in history and deliver it to every member present in `sessions`.
    ///
    /// Returns the number of sessions the message was handed to.
    pub async fn broadcast(&self, msg: &Message, sessions: &HashMap<String, Arc<Session>>) -> usize {
        {
            let mut history = self.history.write().await;
            history.push_back(msg.clone());
            while history.len() > self.history_capacity {
                history.pop_front();
            }
        }

        self.fan_out(msg, sessions, None).await
    }

    /// Deliver `msg` to every member except `except`, without recording it.
    pub async fn notify(
        &self,
        msg: &Message,
        sessions: &HashMap<String, Arc<Session>>,
        except: &str,
    ) -> usize {
        self.fan_out(msg, sessions, Some(except)).await
    }

    async fn fan_out(
        &self,
        msg: &Message,
        sessions: &HashMap<String, Arc<Session>>,
        except: Option<&str>,
    ) -> usize {
        // Snapshot, then deliver with the lock released.
        let member_ids: Vec<String> = self.members.read().await.iter().cloned().collect();

        let mut delivered = 0;
        for id in member_ids {
            if except == Some(id.as_str()) {
                continue;
            }
            if let Some(session) = sessions.get(&id) {
                session.deliver(msg.clone());
                delivered += 1;
            }
        }
        delivered
    }

    /// The last `min(limit, len)` history entries, oldest first.
    pub async fn recent_history(&self, limit: usize) -> Vec<Message> {
        let history = self.history.read().await;
        let start = history.len().saturating_sub(limit);
        history.iter().skip(start).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    fn chat(channel: &str, text: &str) -> Message {
        Message::new(MessageKind::Chat, Some(channel.into()), "u1", "alice", text)
    }

    fn registry(sessions: &[Arc<Session>]) -> HashMap<String, Arc<Session>> {
        sessions
            .iter()
            .map(|s| (s.id().to_string(), s.clone()))
            .collect()
    }

    #[tokio::test]
    async fn history_is_bounded_and_ordered() {
        let channel = Channel::new("general", "", 100);
        let sessions = HashMap::new();
        for i in 0..150 {
            channel.broadcast(&chat("general", &i.to_string()), &sessions).await;
        }

        let history = channel.recent_history(100).await;
        assert_eq!(history.len(), 100);
        assert_eq!(history.first().unwrap().text, "50");
        assert_eq!(history.last().unwrap().text, "149");

        let last_three: Vec<_> = channel
            .recent_history(3)
            .await
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(last_three, vec!["147", "148", "149"]);
    }

    #[tokio::test]
    async fn recent_history_on_short_history() {
        let channel = Channel::new("general", "", 100);
        channel.broadcast(&chat("general", "only"), &HashMap::new()).await;
        assert_eq!(channel.recent_history(20).await.len(), 1);
        assert!(Channel::new("empty", "", 100).recent_history(20).await.is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_members_only() {
        let alice = Arc::new(Session::new("u1", "alice"));
        let bob = Arc::new(Session::new("u2", "bob"));
        let carol = Arc::new(Session::new("u3", "carol"));
        let sessions = registry(&[alice.clone(), bob.clone(), carol.clone()]);

        let mut alice_rx = alice.messages().unwrap();
        let mut bob_rx = bob.messages().unwrap();
        let mut carol_rx = carol.messages().unwrap();

        let channel = Channel::new("general", "", 100);
        channel.add_member("u1").await;
        channel.add_member("u2").await;

        let delivered = channel.broadcast(&chat("general", "hi"), &sessions).await;
        assert_eq!(delivered, 2);
        assert_eq!(alice_rx.try_recv().unwrap().text, "hi");
        assert_eq!(bob_rx.try_recv().unwrap().text, "hi");
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_skips_members_missing_from_registry() {
        let channel = Channel::new("general", "", 100);
        channel.add_member("ghost").await;
        let delivered = channel.broadcast(&chat("general", "hi"), &HashMap::new()).await;
        assert_eq!(delivered, 0);
        assert_eq!(channel.recent_history(10).await.len(), 1);
    }

    #[tokio::test]
    async fn notify_excludes_sender_and_history() {
        let alice = Arc::new(Session::new("u1", "alice"));
        let bob = Arc::new(Session::new("u2", "bob"));
        let sessions = registry(&[alice.clone(), bob.clone()]);
        let mut alice_rx = alice.messages().unwrap();
        let mut bob_rx = bob.messages().unwrap();

        let channel = Channel::new("general", "", 100);
        channel.add_member("u1").await;
        channel.add_member("u2").await;

        let notice = Message::new(MessageKind::Join, Some("general".into()), "u1", "alice", "");
        assert_eq!(channel.notify(&notice, &sessions, "u1").await, 1);
        assert_eq!(bob_rx.try_recv().unwrap().kind, MessageKind::Join);
        assert!(alice_rx.try_recv().is_err());
        assert!(channel.recent_history(10).await.is_empty());
    }

    #[tokio::test]
    async fn membership_add_remove() {
        let channel = Channel::new("general", "General discussion", 100);
        channel.add_member("u1").await;
        channel.add_member("u1").await;
        assert_eq!(channel.member_count().await, 1);
        assert!(channel.contains("u1").await);
        assert!(channel.remove_member("u1").await);
        assert!(!channel.remove_member("u1").await);
        assert_eq!(channel.member_count().await, 0);
        assert_eq!(channel.topic(), "General discussion");
    }
}
