//! Error types for the protocol layer.
//!
//! Each crate in Combate defines its own error enum. A `ProtocolError`
//! always means the problem is in the shape of a frame, never in the
//! game rules.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing field, or an
    /// unrecognized message `type`.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A rank identifier that is not in the catalog.
    #[error("unknown rank: {0:?}")]
    UnknownRank(String),
}
