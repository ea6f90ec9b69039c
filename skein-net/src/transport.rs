use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::error::NetError;

/// A bidirectional byte stream delivering unordered chunks. Framing is the
/// session layer's job, not the transport's.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

/// An owned, type-erased stream.
pub type BoxedStream = Box<dyn ByteStream>;

/// A stream opened by a remote peer.
pub struct IncomingStream {
    pub stream: BoxedStream,
    /// Transport-level identifier of the dialing peer. Carries no
    /// authentication weight; principals are only established by the
    /// session handshake.
    pub remote_id: String,
}

/// The substrate's boundary to the stream transport.
///
/// Implementations multiplex several protocols over one endpoint: a dial
/// names the protocol it wants, and each registered protocol receives its
/// own incoming streams.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identifier under which remote peers reach this endpoint.
    fn local_id(&self) -> String;

    /// Open a stream to `address` speaking `protocol_id`.
    async fn dial(&self, address: &str, protocol_id: &str) -> Result<BoxedStream, NetError>;

    /// Register a handler for `protocol_id`; incoming streams for it are
    /// delivered on the returned receiver.
    async fn listen(
        &self,
        protocol_id: &str,
    ) -> Result<mpsc::Receiver<IncomingStream>, NetError>;
}
