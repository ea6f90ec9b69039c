use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::NetError;
use crate::transport::{BoxedStream, IncomingStream, Transport};

/// Buffer size for each in-memory duplex pipe.
const PIPE_CAPACITY: usize = 64 * 1024;

type ListenerKey = (String, String); // (address, protocol id)
type ListenerMap = HashMap<ListenerKey, mpsc::Sender<IncomingStream>>;

/// In-process transport hub.
///
/// Every endpoint created from the same hub can dial every other by
/// address; streams are tokio duplex pipes. Lets tests and multi-identity
/// hosts run several nodes in one process with no real networking.
#[derive(Clone, Default)]
pub struct MemoryHub {
    listeners: Arc<Mutex<ListenerMap>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an endpoint reachable at `address` on this hub.
    pub fn endpoint(&self, address: &str) -> MemoryTransport {
        MemoryTransport {
            address: address.to_string(),
            hub: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ListenerMap> {
        self.listeners.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// One endpoint on a [`MemoryHub`].
pub struct MemoryTransport {
    address: String,
    hub: MemoryHub,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_id(&self) -> String {
        self.address.clone()
    }

    async fn dial(&self, address: &str, protocol_id: &str) -> Result<BoxedStream, NetError> {
        let key = (address.to_string(), protocol_id.to_string());
        let listener = self.hub.lock().get(&key).cloned();
        let listener = listener.ok_or_else(|| NetError::Transport {
            reason: format!("no listener for {} at {}", protocol_id, address),
        })?;

        let (ours, theirs) = tokio::io::duplex(PIPE_CAPACITY);
        listener
            .send(IncomingStream {
                stream: Box::new(theirs),
                remote_id: self.address.clone(),
            })
            .await
            .map_err(|_| NetError::Transport {
                reason: format!("listener for {} at {} is gone", protocol_id, address),
            })?;

        Ok(Box::new(ours))
    }

    async fn listen(
        &self,
        protocol_id: &str,
    ) -> Result<mpsc::Receiver<IncomingStream>, NetError> {
        let (tx, rx) = mpsc::channel(16);
        self.hub
            .lock()
            .insert((self.address.clone(), protocol_id.to_string()), tx);
        Ok(rx)
    }
}
