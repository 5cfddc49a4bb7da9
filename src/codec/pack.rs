use crate::foundation::error::{InklayError, InklayResult};
use std::io::{Read, Write};

/// Storage algorithm selected by the leading tag byte.
///
/// The tag is written ahead of the payload so future algorithm changes stay
/// backward-readable. `Stored` passes bytes through unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    /// Uncompressed passthrough.
    Stored,
    /// zlib/DEFLATE (dictionary-based LZ).
    Deflate,
}

impl Algorithm {
    fn tag(self) -> u8 {
        match self {
            Algorithm::Stored => 0x00,
            Algorithm::Deflate => 0x01,
        }
    }

    fn from_tag(tag: u8) -> InklayResult<Self> {
        match tag {
            0x00 => Ok(Algorithm::Stored),
            0x01 => Ok(Algorithm::Deflate),
            other => Err(InklayError::compression(format!(
                "unknown storage tag 0x{other:02x}"
            ))),
        }
    }
}

/// Total size overhead of [`pack`] over the raw payload, in bytes.
pub const TAG_OVERHEAD: usize = 1;

/// Pack `bytes` for storage under the requested algorithm.
///
/// Compression is opportunistic: when the compressed form is not smaller
/// than the input (near-empty payloads), the bytes are stored unchanged
/// behind the `Stored` tag, so the packed size never exceeds
/// `bytes.len() + TAG_OVERHEAD`.
pub fn pack(bytes: &[u8], algorithm: Algorithm) -> Vec<u8> {
    if let Algorithm::Deflate = algorithm
        && let Some(compressed) = deflate(bytes)
        && compressed.len() < bytes.len()
    {
        let mut out = Vec::with_capacity(TAG_OVERHEAD + compressed.len());
        out.push(Algorithm::Deflate.tag());
        out.extend_from_slice(&compressed);
        return out;
    }

    let mut out = Vec::with_capacity(TAG_OVERHEAD + bytes.len());
    out.push(Algorithm::Stored.tag());
    out.extend_from_slice(bytes);
    out
}

/// Unpack a stored payload.
///
/// Fails with [`InklayError::Compression`] on a missing/unknown tag or a
/// corrupt or truncated compressed stream. Decode is deterministic: the tag
/// alone selects the algorithm.
pub fn unpack(bytes: &[u8]) -> InklayResult<Vec<u8>> {
    let (&tag, payload) = bytes
        .split_first()
        .ok_or_else(|| InklayError::compression("empty payload has no storage tag"))?;
    match Algorithm::from_tag(tag)? {
        Algorithm::Stored => Ok(payload.to_vec()),
        Algorithm::Deflate => {
            let mut out = Vec::new();
            flate2::read::ZlibDecoder::new(payload)
                .read_to_end(&mut out)
                .map_err(|e| InklayError::compression(format!("corrupt deflate stream: {e}")))?;
            Ok(out)
        }
    }
}

fn deflate(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(bytes).ok()?;
    enc.finish().ok()
}

#[cfg(test)]
#[path = "../../tests/unit/codec/pack.rs"]
mod tests;
