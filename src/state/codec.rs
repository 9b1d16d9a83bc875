//! Board wire codecs.
//!
//! Two historically distinct encodings arrive from the server, selected by
//! which initialization message the variant sends:
//!
//! - **Bulk snapshot** (run-length): pairs of `(colour, repeat - 1)` bytes.
//!   A stored repeat byte `v` covers `v + 1` cells, recovering the 1..=256
//!   range a single byte cannot express directly.
//! - **Delta stream** (positional, variable-length): each record's lead byte
//!   carries a size class in its top 2 bits and a palette colour (0-63) in
//!   its bottom 6 bits. The size class selects how many extra bytes encode
//!   the big-endian skip count: 0, 1, 2 or 4.
//!
//! Both decoders are pure and stateless. They must consume every declared
//! record exactly once and never write past the destination length; anything
//! else is a [`DecodeError`].

use std::fmt;

/// Bits of the lead byte reserved for the palette colour.
pub const COLOUR_MASK: u8 = 0x3f;

/// A single decoded delta record: one cell write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaCell {
    /// Linear position (`x + y * width`) into the board.
    pub position: usize,
    /// Palette index (0-63).
    pub colour: u8,
}

/// Errors raised by the board decoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The stream ended in the middle of a record.
    TruncatedRecord { offset: usize },
    /// The expanded snapshot does not cover exactly `width * height` cells.
    LengthMismatch { expected: usize, actual: usize },
    /// A delta record would write at or past the end of the board.
    PositionOutOfRange { position: usize, len: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedRecord { offset } => {
                write!(f, "stream truncated inside a record at byte {}", offset)
            }
            Self::LengthMismatch { expected, actual } => {
                write!(
                    f,
                    "snapshot covers {} cells, board declares {}",
                    actual, expected
                )
            }
            Self::PositionOutOfRange { position, len } => {
                write!(
                    f,
                    "delta write at position {} outside board of {} cells",
                    position, len
                )
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a bulk run-length snapshot into a freshly allocated board.
///
/// `expected_len` is the `width * height` declared by the companion
/// dimension message; the expansion must cover exactly that many cells.
pub fn decode_snapshot(input: &[u8], expected_len: usize) -> Result<Vec<u8>, DecodeError> {
    if input.len() % 2 != 0 {
        // A colour byte without its repeat byte.
        return Err(DecodeError::TruncatedRecord {
            offset: input.len() - 1,
        });
    }

    // Validate the declared total before allocating anything.
    let total: usize = input
        .chunks_exact(2)
        .map(|pair| pair[1] as usize + 1)
        .sum();
    if total != expected_len {
        return Err(DecodeError::LengthMismatch {
            expected: expected_len,
            actual: total,
        });
    }

    let mut board = Vec::with_capacity(expected_len);
    for pair in input.chunks_exact(2) {
        let colour = pair[0];
        let run = pair[1] as usize + 1;
        board.resize(board.len() + run, colour);
    }
    Ok(board)
}

/// Decode a positional delta stream against a board of `board_len` cells.
///
/// The cursor starts at zero, advances by each record's skip count, writes,
/// then advances one more cell. It never moves backward, and a write at or
/// past `board_len` is an error rather than an overrun.
pub fn decode_deltas(input: &[u8], board_len: usize) -> Result<Vec<DeltaCell>, DecodeError> {
    let mut cells = Vec::new();
    let mut cursor: usize = 0;
    let mut offset = 0;

    while offset < input.len() {
        let lead = input[offset];
        let colour = lead & COLOUR_MASK;
        let class = lead >> 6;
        let extra = match class {
            0 => 0,
            1 => 1,
            2 => 2,
            _ => 4,
        };
        if offset + extra >= input.len() && extra > 0 {
            return Err(DecodeError::TruncatedRecord { offset });
        }

        let skip = match class {
            0 => 0,
            1 => input[offset + 1] as usize,
            2 => u16::from_be_bytes([input[offset + 1], input[offset + 2]]) as usize,
            _ => u32::from_be_bytes([
                input[offset + 1],
                input[offset + 2],
                input[offset + 3],
                input[offset + 4],
            ]) as usize,
        };
        offset += 1 + extra;

        cursor += skip;
        if cursor >= board_len {
            return Err(DecodeError::PositionOutOfRange {
                position: cursor,
                len: board_len,
            });
        }
        cells.push(DeltaCell {
            position: cursor,
            colour,
        });
        cursor += 1;
    }

    Ok(cells)
}

/// Append one delta record to `buf`, choosing the smallest size class that
/// holds `skip`. The colour is masked to its 6-bit range.
pub fn encode_delta_record(buf: &mut Vec<u8>, skip: u32, colour: u8) {
    let colour = colour & COLOUR_MASK;
    if skip == 0 {
        buf.push(colour);
    } else if skip <= u8::MAX as u32 {
        buf.push(0x40 | colour);
        buf.push(skip as u8);
    } else if skip <= u16::MAX as u32 {
        buf.push(0x80 | colour);
        buf.extend_from_slice(&(skip as u16).to_be_bytes());
    } else {
        buf.push(0xc0 | colour);
        buf.extend_from_slice(&skip.to_be_bytes());
    }
}
