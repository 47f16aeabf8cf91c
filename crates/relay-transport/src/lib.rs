//! # relay-transport
//!
//! Channel abstraction layer for the Relay room server.
//!
//! The relay core never performs a handshake itself. A transport hands it an
//! already-established channel split into two halves:
//!
//! - [`FrameSink`] - the write side, owned by the connection's writer task
//! - [`FrameStream`] - the read side, polled by the connection's session task
//!
//! plus the [`ConnectionMetadata`] captured during the handshake.
//!
//! ```rust,ignore
//! use relay_transport::{FrameStream, Frame};
//!
//! async fn drain(mut stream: impl FrameStream) {
//!     while let Ok(Some(frame)) = stream.recv().await {
//!         // Process frame
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "axum")]
pub mod axum;

pub use traits::{ConnectionMetadata, Frame, FrameSink, FrameStream, TransportError};
