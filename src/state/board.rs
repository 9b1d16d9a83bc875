//! Layered board buffers.
//!
//! Four same-length byte buffers back the canvas:
//!
//! - `raw` - the pristine decoded snapshot, untouched after load.
//! - `working` - the render-facing composite, mutated by every confirmed or
//!   local update.
//! - `changes` - cells that diverged from `raw` during a delta decode pass.
//! - `local` - the last value observed through any live update.
//!
//! Overlay cells hold the sentinel [`NO_PIXEL`] when no value is present at
//! that layer. Whenever the layers are allocated they share the exact length
//! `width * height`, and `raw`/`working` always derive from the same
//! snapshot transfer.

use std::fmt;

use super::codec::{self, DecodeError};

/// Overlay sentinel: no value present at this layer.
pub const NO_PIXEL: u8 = 255;

/// Errors raised while building or mutating the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    /// A dimension message arrived but the awaited snapshot resolved to no
    /// data. Fatal for board setup; surfaced, never retried here.
    SnapshotMissing,
    /// A delta stream arrived before any base board existed.
    NotInitialized,
    /// A live update addressed a cell outside the board.
    PositionOutOfRange { position: usize, len: usize },
    /// The snapshot or delta stream itself was malformed.
    Decode(DecodeError),
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SnapshotMissing => write!(f, "snapshot resolved to no data"),
            Self::NotInitialized => write!(f, "no base board loaded yet"),
            Self::PositionOutOfRange { position, len } => {
                write!(f, "pixel write at {} outside board of {} cells", position, len)
            }
            Self::Decode(err) => write!(f, "decode failed: {}", err),
        }
    }
}

impl std::error::Error for BoardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DecodeError> for BoardError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

/// The four-layer pixel board.
#[derive(Debug, Clone, Default)]
pub struct LayeredBoard {
    width: u32,
    height: u32,
    raw: Vec<u8>,
    working: Vec<u8>,
    changes: Vec<u8>,
    local: Vec<u8>,
}

impl LayeredBoard {
    /// Create an empty, unallocated board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Board width in cells.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Board height in cells.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total cell count (`width * height`).
    pub fn len(&self) -> usize {
        self.working.len()
    }

    /// Whether any layers have been allocated yet.
    pub fn is_empty(&self) -> bool {
        self.working.is_empty()
    }

    /// Whether a base board has been installed.
    pub fn is_initialized(&self) -> bool {
        !self.raw.is_empty()
    }

    /// Current render-facing value of a cell.
    pub fn pixel(&self, position: usize) -> Option<u8> {
        self.working.get(position).copied()
    }

    /// The render-facing composite buffer.
    pub fn working(&self) -> &[u8] {
        &self.working
    }

    /// The pristine snapshot buffer.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Cells that diverged from the snapshot during the last delta pass.
    pub fn changes(&self) -> &[u8] {
        &self.changes
    }

    /// The last value observed through any live update, per cell.
    pub fn local(&self) -> &[u8] {
        &self.local
    }

    /// Build all four layers from a bulk run-length snapshot.
    ///
    /// `bytes` is the raw snapshot transfer, or `None` when the shared
    /// pending fetch resolved without data, a fatal initialization error.
    pub fn initialize_from_snapshot(
        &mut self,
        bytes: Option<&[u8]>,
        width: u32,
        height: u32,
    ) -> Result<(), BoardError> {
        let bytes = bytes.ok_or(BoardError::SnapshotMissing)?;
        let len = width as usize * height as usize;
        let raw = codec::decode_snapshot(bytes, len)?;
        self.install(raw, width, height);
        Ok(())
    }

    /// Install a flat snapshot (one byte per cell) as the base board.
    ///
    /// This is the base path of the delta-stream variant, where the fetched
    /// transfer is the board verbatim rather than run-length encoded.
    pub fn initialize_from_flat(
        &mut self,
        bytes: Option<&[u8]>,
        width: u32,
        height: u32,
    ) -> Result<(), BoardError> {
        let bytes = bytes.ok_or(BoardError::SnapshotMissing)?;
        let len = width as usize * height as usize;
        if bytes.len() != len {
            return Err(DecodeError::LengthMismatch {
                expected: len,
                actual: bytes.len(),
            }
            .into());
        }
        self.install(bytes.to_vec(), width, height);
        Ok(())
    }

    fn install(&mut self, raw: Vec<u8>, width: u32, height: u32) {
        let len = raw.len();
        self.width = width;
        self.height = height;
        self.working = raw.clone();
        self.raw = raw;
        self.changes = vec![NO_PIXEL; len];
        self.local = vec![NO_PIXEL; len];
    }

    /// Run a delta decode pass against the base board.
    ///
    /// The working buffer is recopied from the snapshot and both overlays are
    /// sentinel-filled before the pass, so the result reflects exactly the
    /// snapshot plus this stream.
    pub fn apply_delta_stream(&mut self, bytes: &[u8]) -> Result<(), BoardError> {
        if !self.is_initialized() {
            return Err(BoardError::NotInitialized);
        }
        let cells = codec::decode_deltas(bytes, self.raw.len())?;

        self.working.copy_from_slice(&self.raw);
        self.changes.fill(NO_PIXEL);
        self.local.fill(NO_PIXEL);
        for cell in cells {
            self.working[cell.position] = cell.colour;
            self.changes[cell.position] = cell.colour;
        }
        Ok(())
    }

    /// Apply one authoritative live update.
    pub fn set_pixel(&mut self, position: usize, colour: u8) -> Result<(), BoardError> {
        if position >= self.working.len() {
            return Err(BoardError::PositionOutOfRange {
                position,
                len: self.working.len(),
            });
        }
        self.working[position] = colour;
        self.local[position] = colour;
        Ok(())
    }

    /// Reset every layer, sentinel-filled, at new dimensions.
    ///
    /// A dimension change invalidates all layered data, so nothing stale
    /// survives; the next snapshot or delta pass repopulates the base.
    pub fn resize(&mut self, width: u32, height: u32) {
        let len = width as usize * height as usize;
        self.width = width;
        self.height = height;
        self.raw = Vec::new();
        self.working = vec![NO_PIXEL; len];
        self.changes = vec![NO_PIXEL; len];
        self.local = vec![NO_PIXEL; len];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // 4x4 board: colour 1 for 8 cells, colour 2 for 8 cells.
    const SNAPSHOT: [u8; 4] = [1, 7, 2, 7];

    fn initialized_board() -> LayeredBoard {
        let mut board = LayeredBoard::new();
        board
            .initialize_from_snapshot(Some(SNAPSHOT.as_slice()), 4, 4)
            .unwrap();
        board
    }

    #[test]
    fn test_initialize_layers() {
        let board = initialized_board();
        assert_eq!(board.len(), 16);
        assert_eq!(board.raw(), board.working());
        assert_eq!(board.changes(), &[NO_PIXEL; 16]);
        assert_eq!(board.local(), &[NO_PIXEL; 16]);
        assert!(board.is_initialized());
    }

    #[test]
    fn test_initialize_without_bytes_is_fatal() {
        let mut board = LayeredBoard::new();
        let err = board.initialize_from_snapshot(None, 4, 4).unwrap_err();
        assert_eq!(err, BoardError::SnapshotMissing);
        assert!(!board.is_initialized());
    }

    #[test]
    fn test_initialize_from_flat_validates_length() {
        let mut board = LayeredBoard::new();
        let err = board
            .initialize_from_flat(Some([0u8; 15].as_slice()), 4, 4)
            .unwrap_err();
        assert!(matches!(err, BoardError::Decode(_)));

        board
            .initialize_from_flat(Some([3u8; 16].as_slice()), 4, 4)
            .unwrap();
        assert_eq!(board.working(), &[3u8; 16]);
    }

    #[test]
    fn test_delta_pass_writes_both_layers() {
        let mut board = initialized_board();
        // Colour 9 at position 0, colour 4 at position 5 (skip 4).
        board.apply_delta_stream(&[0x09, 0x44, 4]).unwrap();

        assert_eq!(board.pixel(0), Some(9));
        assert_eq!(board.pixel(5), Some(4));
        assert_eq!(board.changes()[0], 9);
        assert_eq!(board.changes()[5], 4);
        // Untouched cells keep the snapshot value and stay sentinel.
        assert_eq!(board.pixel(1), Some(1));
        assert_eq!(board.changes()[1], NO_PIXEL);
        // The snapshot layer itself is untouched.
        assert_eq!(board.raw()[0], 1);
    }

    #[test]
    fn test_delta_pass_resets_working_first() {
        let mut board = initialized_board();
        board.set_pixel(2, 30).unwrap();
        board.apply_delta_stream(&[0x09]).unwrap();
        // The earlier live update was discarded by the fresh copy.
        assert_eq!(board.pixel(2), Some(1));
        assert_eq!(board.local()[2], NO_PIXEL);
    }

    #[test]
    fn test_delta_requires_base_board() {
        let mut board = LayeredBoard::new();
        assert_eq!(
            board.apply_delta_stream(&[0x09]).unwrap_err(),
            BoardError::NotInitialized
        );
    }

    #[test]
    fn test_delta_out_of_range_leaves_board_unchanged() {
        let mut board = initialized_board();
        let before = board.working().to_vec();
        // Skip 20 on a 16-cell board.
        let err = board.apply_delta_stream(&[0x44, 20]).unwrap_err();
        assert!(matches!(err, BoardError::Decode(_)));
        assert_eq!(board.working(), &before[..]);
    }

    #[test]
    fn test_set_pixel() {
        let mut board = initialized_board();
        board.set_pixel(3, 12).unwrap();
        assert_eq!(board.pixel(3), Some(12));
        assert_eq!(board.local()[3], 12);
        assert_eq!(board.changes()[3], NO_PIXEL);
        assert_eq!(board.raw()[3], 1);
    }

    #[test]
    fn test_set_pixel_out_of_range() {
        let mut board = initialized_board();
        assert_eq!(
            board.set_pixel(16, 1).unwrap_err(),
            BoardError::PositionOutOfRange {
                position: 16,
                len: 16
            }
        );
    }

    #[test]
    fn test_resize_resets_every_layer() {
        let mut board = initialized_board();
        board.set_pixel(0, 9).unwrap();
        board.resize(2, 3);

        assert_eq!(board.width(), 2);
        assert_eq!(board.height(), 3);
        assert_eq!(board.len(), 6);
        assert_eq!(board.working(), &[NO_PIXEL; 6]);
        assert_eq!(board.changes(), &[NO_PIXEL; 6]);
        assert_eq!(board.local(), &[NO_PIXEL; 6]);
        // No stale base survives a dimension change.
        assert!(!board.is_initialized());
    }
}
