use crate::foundation::core::BezPath;
use crate::foundation::error::{InklayError, InklayResult};

/// One captured stroke: a path in page-native coordinates plus paint state.
///
/// Coordinates are in the owning page's native space, so a stroke drawn over
/// a background feature stays on that feature at any composite resolution.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Stroke {
    /// Stroke geometry in page-native coordinates.
    pub path: BezPath,
    /// Stroke width in page-native units.
    pub width: f64,
    /// Straight-alpha RGBA8 stroke color.
    pub color: [u8; 4],
}

/// The opaque ink payload for one page.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StrokeBlob {
    /// Strokes in capture order (painter's order when composited).
    pub strokes: Vec<Stroke>,
}

impl StrokeBlob {
    /// Return `true` when the blob contributes no visible ink.
    pub fn is_empty(&self) -> bool {
        self.strokes.iter().all(|s| s.path.elements().is_empty())
    }
}

/// Encode a stroke blob into its serialized byte form.
pub fn encode_blob(blob: &StrokeBlob) -> InklayResult<Vec<u8>> {
    serde_json::to_vec(blob).map_err(|e| InklayError::decode(format!("encode stroke blob: {e}")))
}

/// Decode a stroke blob from its serialized byte form.
///
/// Fails with [`InklayError::Decode`] on malformed input; the caller's
/// recovery policy (for display, substituting an empty blob) lives one layer
/// up.
pub fn decode_blob(bytes: &[u8]) -> InklayResult<StrokeBlob> {
    serde_json::from_slice(bytes)
        .map_err(|e| InklayError::decode(format!("malformed stroke blob: {e}")))
}

/// Encode and pack a blob into the form stored on a page annotation.
pub fn store_blob(blob: &StrokeBlob) -> InklayResult<Vec<u8>> {
    let encoded = encode_blob(blob)?;
    Ok(crate::codec::pack::pack(
        &encoded,
        crate::codec::pack::Algorithm::Deflate,
    ))
}

/// Unpack and decode a blob from its stored form.
pub fn load_blob(bytes: &[u8]) -> InklayResult<StrokeBlob> {
    let encoded = crate::codec::pack::unpack(bytes)?;
    decode_blob(&encoded)
}

#[cfg(test)]
#[path = "../../tests/unit/codec/stroke.rs"]
mod tests;
