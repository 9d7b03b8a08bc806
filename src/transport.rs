//! The minimal read/write/close contract the bridge needs from a per-connection duplex
//! transport: an `async_trait` interface with an associated `Error` type, split into owned
//! reader/writer halves so the bridge's reader task and writer task can each own one side
//! independently, the same shape `tokio::io::split` or a websocket stream's `.split()` gives
//! you.

use async_trait::async_trait;

/// How a connection should be closed, surfaced so the bridge can distinguish an orderly
/// shutdown from one caused by the exchange itself going away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// A normal, expected end of the connection.
    Normal,
    /// The server is shutting down or reloading; the Terminal reason was the exchange's stop
    /// reason.
    GoingAway,
}

/// A duplex transport that can be split into an owned reader and an owned writer.
pub trait DuplexTransport: Send + 'static {
    type Reader: TransportReader;
    type Writer: TransportWriter;

    fn split(self) -> (Self::Reader, Self::Writer);
}

/// The read half: produces complete text frames, one per logical message.
#[async_trait]
pub trait TransportReader: Send + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read one frame. Returning `Err` terminates the bridge's reader loop.
    async fn read_frame(&mut self) -> Result<String, Self::Error>;
}

/// The write half: sends complete text frames and can close the underlying connection.
#[async_trait]
pub trait TransportWriter: Send + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn write_frame(&mut self, frame: String) -> Result<(), Self::Error>;

    /// Close the connection with the given code. Infallible from the bridge's point of view;
    /// a failure to close cleanly is not this crate's concern to report further.
    async fn close(&mut self, code: CloseCode, reason: &str);
}
