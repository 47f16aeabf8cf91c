//! # relay-protocol
//!
//! Wire protocol definitions for the Relay room server.
//!
//! Every message exchanged with a client is a JSON object carrying a
//! `type` discriminator. Clients send [`Request`]s; the server answers
//! with [`Envelope`]s, each wrapping an [`Event`] together with the send
//! timestamp and, for room traffic, the room it was addressed to.
//!
//! ## Request types
//!
//! - `join` / `leave` - Room membership
//! - `broadcast` - Fan a payload out to every member of a room
//! - `ping` - Application-level round trip
//! - `get_stats` - Server counters
//!
//! ## Example
//!
//! ```rust
//! use relay_protocol::{codec, Envelope, Event, Request};
//!
//! let request = codec::decode(br#"{"type":"join","room":"lobby"}"#).unwrap();
//! assert_eq!(request, Request::Join { room: "lobby".into() });
//!
//! let reply = Envelope::new(Event::Joined).in_room("lobby");
//! let text = codec::encode(&reply).unwrap();
//! assert!(text.contains(r#""type":"joined""#));
//! ```

pub mod codec;
pub mod envelope;

pub use codec::{decode, encode, ProtocolError, INVALID_MESSAGE_FORMAT};
pub use envelope::{Envelope, Event, Request, StatsSnapshot};
