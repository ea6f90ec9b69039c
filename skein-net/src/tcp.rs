use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::NetError;
use crate::transport::{BoxedStream, IncomingStream, Transport};

/// Longest accepted protocol-id preamble.
const MAX_PROTOCOL_ID_LEN: usize = 256;

type HandlerMap = HashMap<String, mpsc::Sender<IncomingStream>>;

/// TCP transport.
///
/// One listening socket serves every protocol: a dialer opens the
/// connection with a length-prefixed protocol-id preamble
/// (`[2-byte BE length][utf-8 protocol id]`), and the acceptor dispatches
/// the stream to whichever handler registered that id.
pub struct TcpTransport {
    local_addr: SocketAddr,
    handlers: Arc<Mutex<HandlerMap>>,
}

impl TcpTransport {
    /// Bind to `addr` and start accepting connections.
    pub async fn bind(addr: &str) -> Result<Arc<Self>, NetError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| NetError::Transport {
            reason: format!("bind {}: {}", addr, e),
        })?;
        let local_addr = listener.local_addr().map_err(|e| NetError::Transport {
            reason: format!("local addr: {}", e),
        })?;

        let transport = Arc::new(Self {
            local_addr,
            handlers: Arc::new(Mutex::new(HashMap::new())),
        });

        let handlers = Arc::clone(&transport.handlers);
        tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("tcp accept failed: {}", e);
                        continue;
                    }
                };
                let handlers = Arc::clone(&handlers);
                tokio::spawn(async move {
                    if let Err(e) = dispatch(stream, peer, &handlers).await {
                        debug!(%peer, "dropping inbound connection: {}", e);
                    }
                });
            }
        });

        Ok(transport)
    }

    /// The bound socket address (useful after binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn lock(&self) -> MutexGuard<'_, HandlerMap> {
        self.handlers.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Read the protocol preamble and hand the stream to its handler.
async fn dispatch(
    mut stream: TcpStream,
    peer: SocketAddr,
    handlers: &Mutex<HandlerMap>,
) -> Result<(), NetError> {
    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| NetError::Transport {
            reason: format!("read preamble: {}", e),
        })?;
    let len = u16::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_PROTOCOL_ID_LEN {
        return Err(NetError::Transport {
            reason: format!("bad protocol preamble length: {}", len),
        });
    }

    let mut proto_buf = vec![0u8; len];
    stream
        .read_exact(&mut proto_buf)
        .await
        .map_err(|e| NetError::Transport {
            reason: format!("read preamble: {}", e),
        })?;
    let protocol_id = String::from_utf8(proto_buf).map_err(|_| NetError::Transport {
        reason: "protocol id is not utf-8".to_string(),
    })?;

    let handler = handlers
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .get(&protocol_id)
        .cloned();
    let handler = handler.ok_or_else(|| NetError::Transport {
        reason: format!("no handler for {}", protocol_id),
    })?;

    handler
        .send(IncomingStream {
            stream: Box::new(stream),
            remote_id: peer.to_string(),
        })
        .await
        .map_err(|_| NetError::Transport {
            reason: format!("handler for {} is gone", protocol_id),
        })
}

#[async_trait]
impl Transport for TcpTransport {
    fn local_id(&self) -> String {
        self.local_addr.to_string()
    }

    async fn dial(&self, address: &str, protocol_id: &str) -> Result<BoxedStream, NetError> {
        let mut stream = TcpStream::connect(address)
            .await
            .map_err(|e| NetError::Transport {
                reason: format!("connect {}: {}", address, e),
            })?;

        let id_bytes = protocol_id.as_bytes();
        if id_bytes.is_empty() || id_bytes.len() > MAX_PROTOCOL_ID_LEN {
            return Err(NetError::Transport {
                reason: format!("bad protocol id length: {}", id_bytes.len()),
            });
        }
        let mut preamble = Vec::with_capacity(2 + id_bytes.len());
        preamble.extend_from_slice(&(id_bytes.len() as u16).to_be_bytes());
        preamble.extend_from_slice(id_bytes);
        stream
            .write_all(&preamble)
            .await
            .map_err(|e| NetError::Transport {
                reason: format!("write preamble: {}", e),
            })?;

        Ok(Box::new(stream))
    }

    async fn listen(
        &self,
        protocol_id: &str,
    ) -> Result<mpsc::Receiver<IncomingStream>, NetError> {
        let (tx, rx) = mpsc::channel(16);
        self.lock().insert(protocol_id.to_string(), tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_dispatches_by_protocol() {
        let server = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let mut incoming = server.listen("/test/1").await.unwrap();
        let addr = server.local_addr().to_string();

        let client = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let mut stream = client.dial(&addr, "/test/1").await.unwrap();
        stream.write_all(b"hi").await.unwrap();

        let accepted = incoming.recv().await.unwrap();
        let mut stream = accepted.stream;
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn test_unknown_protocol_is_dropped() {
        let server = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let mut incoming = server.listen("/known/1").await.unwrap();
        let addr = server.local_addr().to_string();

        let client = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        // Dial succeeds at the TCP level; the server drops the stream after
        // reading the unknown preamble.
        let _stream = client.dial(&addr, "/unknown/1").await.unwrap();

        tokio::select! {
            _ = incoming.recv() => panic!("unknown protocol reached known handler"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => {}
        }
    }
}
