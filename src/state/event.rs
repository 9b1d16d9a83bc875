//! Outward notification surface.
//!
//! Every mutation of the synchronization state emits a [`SyncEvent`] on an
//! unbounded channel; rendering and UI collaborators subscribe by matching
//! on the variant. Requests the core needs carried back to the server travel
//! on a separate [`OutboundMessage`] channel so transport code never has to
//! sift through UI notifications.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;

use super::message::PaletteInfo;

/// Sender half of the event bus.
pub type EventSender = mpsc::UnboundedSender<SyncEvent>;

/// Receiver half of the event bus, handed to the consuming collaborator.
pub type EventReceiver = mpsc::UnboundedReceiver<SyncEvent>;

/// Sender half of the transport-facing outbound channel.
pub type OutboundSender = mpsc::UnboundedSender<OutboundMessage>;

/// Receiver half of the transport-facing outbound channel.
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundMessage>;

/// Notifications consumed by rendering/UI collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The transport reported an established connection.
    Connected,
    /// The palette (and its usable range) was replaced.
    PaletteChanged(PaletteInfo),
    /// The board was (re)built from a snapshot transfer.
    BoardInitialized { width: u32, height: u32 },
    /// The board dimensions changed; all layers were reset.
    BoardResized { width: u32, height: u32 },
    /// A single cell changed through a live update.
    PixelChanged { position: usize, colour: u8 },
    /// A live update was placed by the identity we are spectating.
    SpectatedPixel {
        position: usize,
        colour: u8,
        placer: u32,
    },
    /// The rate-limit window changed (fires on every transition).
    CooldownChanged {
        ends_at: Option<DateTime<Utc>>,
        on_cooldown: bool,
    },
    /// An active rate-limit window ran out.
    CooldownEnded,
    /// The online-user count changed.
    OnlineCountChanged(u32),
    /// The server assigned our own identifier.
    OwnIdChanged(u32),
    /// The canvas was locked or unlocked.
    CanvasLockChanged {
        locked: bool,
        reason: Option<String>,
    },
    /// We started or stopped spectating somebody.
    SpectatingTargetChanged(Option<u32>),
    /// Somebody started spectating us.
    SpectatorJoined(u32),
    /// Somebody stopped spectating us.
    SpectatorLeft(u32),
    /// One snapshot fetch attempt failed; a retry is scheduled.
    SnapshotAttemptFailed { attempt: u32 },
    /// The snapshot fetch gave up after crossing the backoff ceiling.
    SnapshotFailed,
}

/// Requests carried back to the server by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Ask for placer attribution over a board region.
    RequestPixelPlacers {
        position: usize,
        width: u32,
        height: u32,
    },
}

/// Send on the bus, tolerating a departed consumer.
pub(crate) fn emit(tx: &EventSender, event: SyncEvent) {
    if tx.send(event).is_err() {
        warn!("event receiver dropped; notification discarded");
    }
}

/// Send an outbound request, tolerating a departed transport.
pub(crate) fn emit_outbound(tx: &OutboundSender, message: OutboundMessage) {
    if tx.send(message).is_err() {
        warn!("outbound receiver dropped; request discarded");
    }
}
