//! Placer attribution index.
//!
//! A sparse, demand-populated map from linear board position to the 32-bit
//! identifier of whoever last placed there. Entries arrive through live
//! pixel updates and through bulk region fills answered by the server; the
//! index only ever merges entries in (except for the deliberate clear on a
//! board resize, where every entry would be addressed by stale geometry).
//!
//! Lookups that miss trigger a backfill: one outbound region request per
//! debounce window, sized [`BACKFILL_REGION`] square and clamped to the
//! board, so rapid pointer movement stays bounded at one request per second
//! instead of one per cell.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use super::event::{emit_outbound, OutboundMessage, OutboundSender};

/// Wire sentinel: no placement on record for this cell. Never stored.
pub const NO_PLACER: u32 = 0xffff_ffff;

/// Side length of the square region requested on a cache miss.
pub const BACKFILL_REGION: u32 = 15;

/// Minimum spacing between backfill requests during continuous movement.
pub const BACKFILL_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Sparse position-to-placer map with coalesced backfill.
#[derive(Debug)]
pub struct PlacerIndex {
    placers: HashMap<usize, u32>,
    /// Debounce deadline. While it lies in the future, miss-driven
    /// requests are dropped, not queued.
    debounce_until: Option<Instant>,
    outbound: OutboundSender,
}

impl PlacerIndex {
    /// Create an empty index that sends backfill requests on `outbound`.
    pub fn new(outbound: OutboundSender) -> Self {
        Self {
            placers: HashMap::new(),
            debounce_until: None,
            outbound,
        }
    }

    /// Who last placed at `position`, if known locally.
    pub fn get(&self, position: usize) -> Option<u32> {
        self.placers.get(&position).copied()
    }

    /// Record a single placement. The wire sentinel is never stored.
    pub fn set(&mut self, position: usize, placer: u32) {
        if placer != NO_PLACER {
            self.placers.insert(position, placer);
        }
    }

    /// Number of cells with known attribution.
    pub fn len(&self) -> usize {
        self.placers.len()
    }

    /// Whether no attribution is known at all.
    pub fn is_empty(&self) -> bool {
        self.placers.is_empty()
    }

    /// Drop every entry. Used when a resize invalidates all positions.
    pub fn clear(&mut self) {
        self.placers.clear();
        self.debounce_until = None;
    }

    /// Merge a rectangular region of 32-bit big-endian identifiers.
    ///
    /// The region is `region_w` x `region_h`, row-major, anchored at
    /// `origin` and strided by the board's full width between rows.
    /// Sentinel entries mean "no placement on record" and are skipped.
    /// A short payload merges what it covers; the missing tail is logged
    /// and ignored (this path has no failure mode).
    pub fn bulk_fill(
        &mut self,
        origin: usize,
        region_w: u32,
        region_h: u32,
        region: &[u8],
        board_width: u32,
    ) {
        let cells = region_w as usize * region_h as usize;
        let mut ids = region.chunks_exact(4);
        if region.len() < cells * 4 {
            warn!(
                expected = cells * 4,
                actual = region.len(),
                "short placer region payload"
            );
        }
        'rows: for row in 0..region_h as usize {
            for col in 0..region_w as usize {
                let Some(chunk) = ids.next() else {
                    break 'rows;
                };
                let id = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                if id == NO_PLACER {
                    continue;
                }
                self.placers
                    .insert(origin + col + row * board_width as usize, id);
            }
        }
    }

    /// Look up a position, backfilling on a miss.
    ///
    /// A miss issues at most one outbound region request per debounce
    /// window: a [`BACKFILL_REGION`]-square rectangle centred on the query
    /// and clamped to the board. Misses inside the window are dropped.
    pub fn query(&mut self, position: usize, board_w: u32, board_h: u32) -> Option<u32> {
        if let Some(placer) = self.get(position) {
            return Some(placer);
        }
        if board_w == 0 || board_h == 0 || position >= board_w as usize * board_h as usize {
            return None;
        }

        let now = Instant::now();
        match self.debounce_until {
            Some(until) if now < until => return None,
            _ => self.debounce_until = Some(now + BACKFILL_DEBOUNCE),
        }

        let (origin, width, height) = backfill_region(position, board_w, board_h);
        emit_outbound(
            &self.outbound,
            OutboundMessage::RequestPixelPlacers {
                position: origin,
                width,
                height,
            },
        );
        None
    }
}

/// Compute the backfill rectangle for a query: [`BACKFILL_REGION`] square,
/// centred on the cell, shifted to stay within the board.
fn backfill_region(position: usize, board_w: u32, board_h: u32) -> (usize, u32, u32) {
    let x = (position % board_w as usize) as u32;
    let y = (position / board_w as usize) as u32;

    let width = BACKFILL_REGION.min(board_w);
    let height = BACKFILL_REGION.min(board_h);
    let x0 = x.saturating_sub(width / 2).min(board_w - width);
    let y0 = y.saturating_sub(height / 2).min(board_h - height);

    (x0 as usize + y0 as usize * board_w as usize, width, height)
}
