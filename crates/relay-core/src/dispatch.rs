//! Inbound frame dispatch.
//!
//! Decodes each frame into a [`Request`], updates room state and produces
//! the replies and fan-out for it.

use crate::broadcast::Broadcaster;
use crate::connection::ConnectionId;
use crate::state::SharedState;
use crate::stats::StatsCollector;
use relay_protocol::{codec, Envelope, Event, Request, INVALID_MESSAGE_FORMAT};
use tracing::debug;

/// What happened to an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A recognized request was handled.
    Handled,
    /// A well-formed envelope with an unknown `type`; ignored.
    Unrecognized,
    /// The frame could not be decoded; an error reply was sent.
    Malformed,
}

/// Routes decoded requests to their handlers.
#[derive(Clone)]
pub struct Dispatcher {
    state: SharedState,
    broadcaster: Broadcaster,
    stats: StatsCollector,
}

impl Dispatcher {
    pub(crate) fn new(state: SharedState, broadcaster: Broadcaster, stats: StatsCollector) -> Self {
        Self {
            state,
            broadcaster,
            stats,
        }
    }

    /// Handle one inbound frame from `sender`.
    pub fn dispatch(&self, sender: &ConnectionId, frame: &[u8]) -> Dispatched {
        let request = match codec::decode(frame) {
            Ok(request) => request,
            Err(e) => {
                debug!(connection = %sender, error = %e, "Malformed frame");
                self.broadcaster
                    .to_one(sender, &Envelope::error(INVALID_MESSAGE_FORMAT));
                return Dispatched::Malformed;
            }
        };

        self.state.lock().total_messages += 1;
        self.handle(sender, request)
    }

    fn handle(&self, sender: &ConnectionId, request: Request) -> Dispatched {
        match request {
            Request::Join { room } => {
                let Some(changed) = self.state.lock().join(sender, &room) else {
                    return Dispatched::Handled;
                };

                self.broadcaster
                    .to_one(sender, &Envelope::new(Event::Joined).in_room(room.as_str()));

                if changed {
                    let notice = Envelope::new(Event::UserJoined {
                        client_id: sender.to_string(),
                    });
                    self.broadcaster.to_room(&room, notice, Some(sender));
                }
            }

            Request::Leave { room } => {
                if self.state.lock().leave(sender, &room).is_some() {
                    self.broadcaster
                        .to_one(sender, &Envelope::new(Event::Left).in_room(room));
                }
            }

            Request::Broadcast { room, data } => {
                let delivered = self
                    .broadcaster
                    .to_room(&room, Envelope::new(Event::Broadcast { data }), None);
                debug!(connection = %sender, room = %room, delivered, "Broadcast");
            }

            Request::Ping => {
                self.broadcaster.to_one(sender, &Envelope::new(Event::Pong));
            }

            Request::GetStats => {
                let stats = self.stats.snapshot();
                self.broadcaster
                    .to_one(sender, &Envelope::new(Event::Stats { stats }));
            }

            Request::Unknown { kind } => {
                debug!(connection = %sender, kind = %kind, "Unknown message type");
                return Dispatched::Unrecognized;
            }
        }

        Dispatched::Handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ChannelHandle, Outgoing};
    use relay_transport::ConnectionMetadata;
    use serde_json::Value;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        state: SharedState,
        dispatcher: Dispatcher,
    }

    impl Fixture {
        fn new() -> Self {
            let state = SharedState::default();
            let broadcaster = Broadcaster::new(state.clone());
            let stats = StatsCollector::new(state.clone());
            let dispatcher = Dispatcher::new(state.clone(), broadcaster, stats);
            Self { state, dispatcher }
        }

        fn connect(&self) -> (ConnectionId, UnboundedReceiver<Outgoing>) {
            let (channel, rx) = ChannelHandle::new();
            let id = self
                .state
                .lock()
                .registry
                .register(channel, ConnectionMetadata::default());
            (id, rx)
        }

        fn send(&self, id: &ConnectionId, frame: &str) -> Dispatched {
            self.dispatcher.dispatch(id, frame.as_bytes())
        }

        fn total_messages(&self) -> u64 {
            self.state.lock().total_messages
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Outgoing>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outgoing::Text(text) = item {
                frames.push(serde_json::from_str(&text).unwrap());
            }
        }
        frames
    }

    #[test]
    fn test_malformed_frames_get_error_reply() {
        let fx = Fixture::new();
        let (id, mut rx) = fx.connect();

        for frame in ["not json", r#"{"room":"lobby"}"#, r#"{"type":"join"}"#, "[1,2]"] {
            assert_eq!(fx.send(&id, frame), Dispatched::Malformed, "{frame}");
        }

        let replies = drain(&mut rx);
        assert_eq!(replies.len(), 4);
        for reply in &replies {
            assert_eq!(reply["type"], "error");
            assert_eq!(reply["message"], INVALID_MESSAGE_FORMAT);
            assert!(reply["timestamp"].is_string());
        }
        assert_eq!(fx.total_messages(), 0);
    }

    #[test]
    fn test_join_notifies_existing_members() {
        let fx = Fixture::new();
        let (a, mut rx_a) = fx.connect();
        let (b, mut rx_b) = fx.connect();

        fx.send(&a, r#"{"type":"join","room":"lobby"}"#);
        let joined = drain(&mut rx_a);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0]["type"], "joined");
        assert_eq!(joined[0]["room"], "lobby");

        fx.send(&b, r#"{"type":"join","room":"lobby"}"#);
        assert_eq!(drain(&mut rx_b)[0]["type"], "joined");

        let notices = drain(&mut rx_a);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0]["type"], "user_joined");
        assert_eq!(notices[0]["clientId"], b.as_str());
        assert_eq!(notices[0]["room"], "lobby");
    }

    #[test]
    fn test_repeat_join_is_not_announced() {
        let fx = Fixture::new();
        let (a, mut rx_a) = fx.connect();
        let (b, mut rx_b) = fx.connect();
        fx.send(&a, r#"{"type":"join","room":"lobby"}"#);
        fx.send(&b, r#"{"type":"join","room":"lobby"}"#);
        drain(&mut rx_a);
        drain(&mut rx_b);

        fx.send(&b, r#"{"type":"join","room":"lobby"}"#);

        assert_eq!(drain(&mut rx_b)[0]["type"], "joined");
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(fx.state.lock().rooms.members_of("lobby").len(), 2);
    }

    #[test]
    fn test_leave_is_idempotent() {
        let fx = Fixture::new();
        let (a, mut rx) = fx.connect();
        fx.send(&a, r#"{"type":"join","room":"lobby"}"#);
        drain(&mut rx);

        fx.send(&a, r#"{"type":"leave","room":"lobby"}"#);
        fx.send(&a, r#"{"type":"leave","room":"lobby"}"#);

        let replies = drain(&mut rx);
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|r| r["type"] == "left" && r["room"] == "lobby"));
        assert!(!fx.state.lock().rooms.contains("lobby"));
    }

    #[test]
    fn test_broadcast_reaches_sender_in_room() {
        let fx = Fixture::new();
        let (a, mut rx_a) = fx.connect();
        let (b, mut rx_b) = fx.connect();
        let (outsider, mut rx_out) = fx.connect();
        fx.send(&a, r#"{"type":"join","room":"lobby"}"#);
        fx.send(&b, r#"{"type":"join","room":"lobby"}"#);
        drain(&mut rx_a);
        drain(&mut rx_b);

        fx.send(&a, r#"{"type":"broadcast","room":"lobby","data":{"text":"hi"}}"#);
        fx.send(&outsider, r#"{"type":"broadcast","room":"lobby","data":[1]}"#);

        for rx in [&mut rx_a, &mut rx_b] {
            let received = drain(rx);
            assert_eq!(received.len(), 2);
            assert_eq!(received[0]["type"], "broadcast");
            assert_eq!(received[0]["data"]["text"], "hi");
            assert_eq!(received[0]["room"], "lobby");
            assert_eq!(received[1]["data"][0], 1);
        }
        assert!(drain(&mut rx_out).is_empty());
    }

    #[test]
    fn test_ping_and_stats() {
        let fx = Fixture::new();
        let (a, mut rx) = fx.connect();

        assert_eq!(fx.send(&a, r#"{"type":"ping"}"#), Dispatched::Handled);
        assert_eq!(fx.send(&a, r#"{"type":"get_stats"}"#), Dispatched::Handled);

        let replies = drain(&mut rx);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["type"], "pong");

        let stats = &replies[1]["stats"];
        assert_eq!(replies[1]["type"], "stats");
        assert_eq!(stats["totalConnections"], 1);
        assert_eq!(stats["activeConnections"], 1);
        assert_eq!(stats["totalMessages"], 2);
        assert_eq!(stats["totalRooms"], 0);
        assert!(stats["startTime"].is_string());
    }

    #[test]
    fn test_unknown_type_is_counted_without_reply() {
        let fx = Fixture::new();
        let (a, mut rx) = fx.connect();

        assert_eq!(
            fx.send(&a, r#"{"type":"teleport","room":"x"}"#),
            Dispatched::Unrecognized
        );
        assert!(drain(&mut rx).is_empty());
        assert_eq!(fx.total_messages(), 1);
    }

    #[test]
    fn test_frames_from_departed_sender() {
        let fx = Fixture::new();
        let (a, _rx) = fx.connect();
        crate::state::disconnect(&fx.state, &a);

        fx.send(&a, r#"{"type":"join","room":"lobby"}"#);
        assert_eq!(fx.state.lock().rooms.len(), 0);
    }
}
