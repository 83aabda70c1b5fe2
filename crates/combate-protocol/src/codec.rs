//! Codec trait and implementations for serializing/deserializing frames.
//!
//! The dispatcher never calls `serde_json` directly; it goes through a
//! [`Codec`], so the wire format can change without touching game code.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because the codec is owned by the server's
/// long-lived tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected type (including an unknown `type` tag).
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`). Browser clients speak
/// JSON text frames, so this is the only codec the server ships.
///
/// ## Example
///
/// ```rust
/// use combate_protocol::{Codec, Envelope, JsonCodec, ServerMessage, TextMessage};
///
/// let codec = JsonCodec;
/// let envelope = Envelope::new(ServerMessage::Announcement(TextMessage {
///     text: "waiting for opponent".into(),
/// }));
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope<ServerMessage> = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
