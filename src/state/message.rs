//! Inbound transport messages.
//!
//! The worker boundary delivers JSON objects keyed by a `type` string; here
//! that dispatch table is a closed tagged union so handling stays exhaustive.
//! Variant and field names are serde-renamed to the wire's camelCase.

use serde::{Deserialize, Serialize};

/// One live pixel update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelUpdate {
    /// Linear position (`x + y * width`).
    pub position: usize,
    /// Palette index (0-63).
    pub colour: u8,
    /// Identifier of whoever placed the pixel, when the server shares it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placer: Option<u32>,
}

/// The slice of the palette the client may place from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsableRegion {
    pub start: u8,
    pub end: u8,
}

/// Palette state as announced by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaletteInfo {
    /// Colour table entries (hex strings as sent on the wire).
    pub palette: Vec<String>,
    pub usable_region: UsableRegion,
}

/// Everything the transport boundary can deliver into the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    /// Connection established.
    Connect,
    /// Replace the palette.
    Palette(PaletteInfo),
    /// Rate-limit status plus the base cooldown length in seconds.
    #[serde(rename_all = "camelCase")]
    CooldownInfo {
        /// Epoch milliseconds; absent means an indefinite cooldown.
        end_date: Option<i64>,
        cooldown: f64,
    },
    /// Board dimensions for the run-length snapshot variant.
    CanvasInfo { width: u32, height: u32 },
    /// Board dimensions plus a positional delta stream (legacy variant).
    Changes {
        width: u32,
        height: u32,
        changes: Vec<u8>,
    },
    /// Online-user count.
    SetOnline { count: u32 },
    /// Placer attribution for a rectangular region.
    PlacerInfoRegion {
        position: usize,
        width: u32,
        height: u32,
        /// Row-major 32-bit big-endian identifiers.
        region: Vec<u8>,
    },
    /// Our own numeric identifier.
    SetIntId { id: u32 },
    /// Canvas lock state.
    SetCanvasLocked {
        locked: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// A batch of confirmed pixel placements.
    Pixels { pixels: Vec<PixelUpdate> },
    /// Our own placement was refused; revert it and restart the cooldown.
    #[serde(rename_all = "camelCase")]
    RejectedPixel {
        end_date: i64,
        position: usize,
        colour: u8,
    },
    /// Rate-limit window update.
    #[serde(rename_all = "camelCase")]
    Cooldown { end_date: Option<i64> },
    /// We started spectating this identity.
    Spectating { id: u32 },
    /// We stopped spectating.
    Unspectating,
    /// This identity started spectating us.
    Spectated { id: u32 },
    /// This identity stopped spectating us.
    Unspectated { id: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags_round_trip() {
        let msg = InboundMessage::CanvasInfo {
            width: 640,
            height: 480,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"canvasInfo\""));
        let back: InboundMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_camel_case_fields() {
        let json = r#"{"type":"rejectedPixel","endDate":1700000000000,"position":42,"colour":7}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            InboundMessage::RejectedPixel {
                end_date: 1_700_000_000_000,
                position: 42,
                colour: 7,
            }
        );
    }

    #[test]
    fn test_optional_placer() {
        let json = r#"{"type":"pixels","pixels":[{"position":3,"colour":1},{"position":4,"colour":2,"placer":99}]}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        let InboundMessage::Pixels { pixels } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(pixels[0].placer, None);
        assert_eq!(pixels[1].placer, Some(99));
    }

    #[test]
    fn test_indefinite_cooldown_payload() {
        let json = r#"{"type":"cooldown","endDate":null}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg, InboundMessage::Cooldown { end_date: None });
    }
}
