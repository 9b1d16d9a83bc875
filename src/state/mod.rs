//! Canvas synchronization state for PixelGrid.
//!
//! This module provides the core state types and the owning context:
//!
//! - `codec` - Wire decoders (bulk run-length snapshot, positional deltas)
//! - `board` - The four layered pixel buffers
//! - `cooldown` - Rate-limit state machine with its single timer
//! - `placers` - Sparse position-to-placer index with coalesced backfill
//! - `snapshot` - Shared snapshot fetch with retry/backoff
//! - `message` / `event` - Inbound tagged union and outward notifications
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            SyncState                             │
//! │                                                                  │
//! │  transport ──InboundMessage──▶ handle_message                    │
//! │                                   │                              │
//! │   ┌───────────────┐   ┌───────────┴───┐   ┌──────────────┐       │
//! │   │ SnapshotLoader│──▶│  LayeredBoard │   │ CooldownTimer│       │
//! │   │ (shared fetch)│   │ raw/working/  │   │ one timer,   │       │
//! │   │               │   │ changes/local │   │ deadline     │       │
//! │   └───────────────┘   └───────────────┘   └──────────────┘       │
//! │                                   │                              │
//! │   ┌───────────────┐               │                              │
//! │   │  PlacerIndex  │◀──────────────┤                              │
//! │   │ pos → placer  │               ▼                              │
//! │   └───────┬───────┘        SyncEvent bus ──▶ rendering / UI      │
//! │           └── OutboundMessage ──▶ transport                      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on the single task that calls [`SyncState::handle_message`];
//! the only suspension points are the shared snapshot fetch and the armed
//! cooldown timer. A multi-threaded host must serialize access (one owning
//! task, or a mutex around the whole context); nothing here tolerates
//! concurrent mutation.

pub mod board;
pub mod codec;
pub mod cooldown;
pub mod event;
pub mod message;
pub mod placers;
pub mod snapshot;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

// Re-export commonly used types
pub use board::{BoardError, LayeredBoard, NO_PIXEL};
pub use codec::{decode_deltas, decode_snapshot, encode_delta_record, DecodeError, DeltaCell};
pub use cooldown::{CooldownPhase, CooldownTimer};
pub use event::{
    EventReceiver, EventSender, OutboundMessage, OutboundReceiver, OutboundSender, SyncEvent,
};
pub use message::{InboundMessage, PaletteInfo, PixelUpdate, UsableRegion};
pub use placers::{PlacerIndex, BACKFILL_REGION, NO_PLACER};
pub use snapshot::{FetchError, HttpFetch, SnapshotFetch, SnapshotLoader};

/// Receiver ends handed to the rendering/UI and transport collaborators.
#[derive(Debug)]
pub struct SyncHandles {
    /// Outward notifications, one per state mutation.
    pub events: EventReceiver,
    /// Requests to carry back to the server.
    pub outbound: OutboundReceiver,
}

/// The owned synchronization context.
///
/// Combines the layered board, the cooldown state machine, the placer index
/// and the shared snapshot fetch, and dispatches every inbound transport
/// message exhaustively.
#[derive(Debug)]
pub struct SyncState {
    /// The four layered pixel buffers.
    pub board: LayeredBoard,
    /// Rate-limit window tracker.
    pub cooldown: CooldownTimer,
    /// Sparse placement attribution.
    pub placers: PlacerIndex,
    snapshot: SnapshotLoader,
    events: EventSender,

    connected: bool,
    palette: Option<PaletteInfo>,
    own_id: Option<u32>,
    online: Option<u32>,
    locked: bool,
    lock_reason: Option<String>,
    /// Base cooldown length in seconds, as announced by the server.
    base_cooldown_secs: Option<f64>,
    /// Identities currently spectating us.
    spectators: HashSet<u32>,
    /// The identity we are currently spectating, if any.
    spectating_target: Option<u32>,
}

impl SyncState {
    /// Start the context: kicks off the shared snapshot fetch and returns
    /// the receiver ends for the consuming collaborators.
    pub fn start<F: SnapshotFetch>(
        fetcher: F,
        snapshot_url: impl Into<String>,
    ) -> (Self, SyncHandles) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let loader = SnapshotLoader::start(fetcher, snapshot_url, event_tx.clone());
        Self::with_loader(loader, event_tx, event_rx)
    }

    fn with_loader(
        snapshot: SnapshotLoader,
        event_tx: EventSender,
        event_rx: EventReceiver,
    ) -> (Self, SyncHandles) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = Self {
            board: LayeredBoard::new(),
            cooldown: CooldownTimer::new(event_tx.clone()),
            placers: PlacerIndex::new(outbound_tx),
            snapshot,
            events: event_tx,
            connected: false,
            palette: None,
            own_id: None,
            online: None,
            locked: false,
            lock_reason: None,
            base_cooldown_secs: None,
            spectators: HashSet::new(),
            spectating_target: None,
        };
        (
            state,
            SyncHandles {
                events: event_rx,
                outbound: outbound_rx,
            },
        )
    }

    /// Dispatch one inbound transport message.
    ///
    /// Decode and initialization errors surface to the caller for explicit
    /// recovery; everything else is best-effort and reports through the
    /// event bus.
    pub async fn handle_message(&mut self, msg: InboundMessage) -> Result<(), BoardError> {
        match msg {
            InboundMessage::Connect => {
                self.connected = true;
                self.emit(SyncEvent::Connected);
            }
            InboundMessage::Palette(info) => {
                self.palette = Some(info.clone());
                self.emit(SyncEvent::PaletteChanged(info));
            }
            InboundMessage::CooldownInfo { end_date, cooldown } => {
                self.base_cooldown_secs = Some(cooldown);
                self.set_cooldown_millis(end_date);
            }
            InboundMessage::Cooldown { end_date } => {
                self.set_cooldown_millis(end_date);
            }
            InboundMessage::CanvasInfo { width, height } => {
                self.handle_canvas_info(width, height).await?;
            }
            InboundMessage::Changes {
                width,
                height,
                changes,
            } => {
                let bytes = self.snapshot.wait().await;
                self.board
                    .initialize_from_flat(bytes.as_deref(), width, height)?;
                self.board.apply_delta_stream(&changes)?;
                self.emit(SyncEvent::BoardInitialized { width, height });
            }
            InboundMessage::SetOnline { count } => {
                self.online = Some(count);
                self.emit(SyncEvent::OnlineCountChanged(count));
            }
            InboundMessage::PlacerInfoRegion {
                position,
                width,
                height,
                region,
            } => {
                if self.board.width() == 0 {
                    warn!("placer region before board dimensions; dropped");
                } else {
                    self.placers
                        .bulk_fill(position, width, height, &region, self.board.width());
                }
            }
            InboundMessage::SetIntId { id } => {
                self.own_id = Some(id);
                self.emit(SyncEvent::OwnIdChanged(id));
            }
            InboundMessage::SetCanvasLocked { locked, reason } => {
                self.locked = locked;
                self.lock_reason = reason.clone();
                self.emit(SyncEvent::CanvasLockChanged { locked, reason });
            }
            InboundMessage::Pixels { pixels } => {
                for update in pixels {
                    self.apply_pixel(update);
                }
            }
            InboundMessage::RejectedPixel {
                end_date,
                position,
                colour,
            } => {
                // Revert to the authoritative value and restart the window.
                self.apply_pixel(PixelUpdate {
                    position,
                    colour,
                    placer: None,
                });
                self.set_cooldown_millis(Some(end_date));
            }
            InboundMessage::Spectating { id } => {
                self.spectating_target = Some(id);
                self.emit(SyncEvent::SpectatingTargetChanged(Some(id)));
            }
            InboundMessage::Unspectating => {
                self.spectating_target = None;
                self.emit(SyncEvent::SpectatingTargetChanged(None));
            }
            InboundMessage::Spectated { id } => {
                if self.spectators.insert(id) {
                    self.emit(SyncEvent::SpectatorJoined(id));
                }
            }
            InboundMessage::Unspectated { id } => {
                if self.spectators.remove(&id) {
                    self.emit(SyncEvent::SpectatorLeft(id));
                }
            }
        }
        Ok(())
    }

    /// First dimension message initializes from the shared snapshot; a later
    /// one with different dimensions resets every layer and the placer index
    /// together, so no stale geometry survives.
    async fn handle_canvas_info(&mut self, width: u32, height: u32) -> Result<(), BoardError> {
        if self.board.is_initialized() {
            if (width, height) == (self.board.width(), self.board.height()) {
                debug!(width, height, "duplicate canvas dimensions; ignored");
                return Ok(());
            }
            self.board.resize(width, height);
            self.placers.clear();
            self.emit(SyncEvent::BoardResized { width, height });
            return Ok(());
        }

        let bytes = self.snapshot.wait().await;
        self.board
            .initialize_from_snapshot(bytes.as_deref(), width, height)?;
        self.emit(SyncEvent::BoardInitialized { width, height });
        Ok(())
    }

    fn apply_pixel(&mut self, update: PixelUpdate) {
        if let Err(err) = self.board.set_pixel(update.position, update.colour) {
            warn!(%err, "live pixel update dropped");
            return;
        }
        self.emit(SyncEvent::PixelChanged {
            position: update.position,
            colour: update.colour,
        });
        if let Some(placer) = update.placer {
            self.placers.set(update.position, placer);
            if self.spectating_target == Some(placer) {
                self.emit(SyncEvent::SpectatedPixel {
                    position: update.position,
                    colour: update.colour,
                    placer,
                });
            }
        }
    }

    fn set_cooldown_millis(&mut self, end_date: Option<i64>) {
        match end_date {
            None => self.cooldown.set_cooldown(None),
            Some(ms) => match DateTime::<Utc>::from_timestamp_millis(ms) {
                Some(ends_at) => self.cooldown.set_cooldown(Some(ends_at)),
                None => warn!(ms, "unrepresentable cooldown end date; ignored"),
            },
        }
    }

    fn emit(&self, event: SyncEvent) {
        event::emit(&self.events, event);
    }

    // Lookups for the UI collaborator

    /// Attribution of a cell, issuing a coalesced backfill on a miss.
    pub fn placer_at(&mut self, position: usize) -> Option<u32> {
        let (w, h) = (self.board.width(), self.board.height());
        self.placers.query(position, w, h)
    }

    /// Whether the transport has reported a connection.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The active palette, once announced.
    pub fn palette(&self) -> Option<&PaletteInfo> {
        self.palette.as_ref()
    }

    /// Our own identifier, once assigned.
    pub fn own_id(&self) -> Option<u32> {
        self.own_id
    }

    /// Last announced online-user count.
    pub fn online(&self) -> Option<u32> {
        self.online
    }

    /// Whether the canvas is locked, with the announced reason.
    pub fn lock_state(&self) -> (bool, Option<&str>) {
        (self.locked, self.lock_reason.as_deref())
    }

    /// Base cooldown length in seconds, once announced.
    pub fn base_cooldown_secs(&self) -> Option<f64> {
        self.base_cooldown_secs
    }

    /// The identity we are spectating, if any.
    pub fn spectating_target(&self) -> Option<u32> {
        self.spectating_target
    }

    /// How many identities are spectating us.
    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }
}
