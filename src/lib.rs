//! PixelGrid State Library
//!
//! This crate provides client-side canvas synchronization for the PixelGrid
//! shared pixel board.
//!
//! # Overview
//!
//! The state module provides:
//!
//! - **Layered Board** - Reconstructs the authoritative board from a bulk
//!   snapshot and keeps ground truth, confirmed deltas and locally observed
//!   updates in separate same-length buffers.
//!
//! - **Wire Codecs** - The two historical encodings: the run-length bulk
//!   snapshot and the variable-length positional delta stream, decoded with
//!   strict length and bounds validation.
//!
//! - **Cooldown Timer** - A single-timer state machine tracking the client's
//!   rate-limit window (idle, active until a deadline, or indefinite).
//!
//! - **Placer Index** - A sparse, demand-populated map from board position
//!   to the identifier of whoever last placed there, backfilled with
//!   coalesced region requests.
//!
//! - **Snapshot Loader** - One shared, memoized fetch of the initial board
//!   bytes with capped exponential backoff.
//!
//! # Design Principles
//!
//! 1. **One owning context** - All mutable state lives in [`SyncState`];
//!    there is no ambient global state and no internal locking.
//!
//! 2. **Closed message dispatch** - Inbound transport messages are a tagged
//!    union, matched exhaustively.
//!
//! 3. **No rendering, no sockets** - This crate is pure synchronization
//!    state. Painting, pan/zoom, the palette UI and the WebSocket itself are
//!    collaborators wired up through the event and outbound channels.
//!
//! 4. **Strict decoding** - Malformed or mis-sized streams fail with an
//!    error; nothing ever writes past a buffer.
//!
//! # Example
//!
//! ```no_run
//! use pixelgrid_state::{HttpFetch, InboundMessage, SyncEvent, SyncState};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (mut state, mut handles) =
//!         SyncState::start(HttpFetch::new(), "https://example.invalid/boarddata");
//!
//!     // The transport collaborator feeds messages in...
//!     state
//!         .handle_message(InboundMessage::CanvasInfo {
//!             width: 640,
//!             height: 480,
//!         })
//!         .await?;
//!
//!     // ...and the rendering collaborator consumes notifications.
//!     while let Some(event) = handles.events.recv().await {
//!         match event {
//!             SyncEvent::PixelChanged { position, colour } => {
//!                 println!("repaint {} with {}", position, colour);
//!             }
//!             SyncEvent::SnapshotFailed => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod state;

// Re-export everything from state module at crate root
pub use state::*;
