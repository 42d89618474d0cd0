use thiserror::Error;

/// Reasons a wire body is refused as a [`Request`](crate::consensus::Request).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("request identifier is empty")]
    EmptyIdentifier,

    #[error("request identifier contains invalid character {0:?}")]
    InvalidIdentifier(char),

    #[error("request operation is empty")]
    EmptyOperation,
}

/// Outbound delivery failures. Sends are fire-and-forget, so these are only
/// ever logged.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("outbound channel closed")]
    ChannelClosed,

    #[error("replica bus closed")]
    ReplicaBusClosed,
}
