//! In-process relay with Piping Server semantics.
//!
//! A POST waits until a GET on the same path has taken its body; a GET waits
//! until a body is posted. Used for tests and the loopback self-test.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tracing::debug;

use crate::chat::error::ChatError;
use crate::chat::transport::{RelayBody, RelayResponse, RelayTransport};

struct Delivery {
    body: RelayBody,
    taken: oneshot::Sender<()>,
}

#[derive(Clone)]
struct Pipe {
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: Arc<AsyncMutex<mpsc::UnboundedReceiver<Delivery>>>,
}

impl Pipe {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(AsyncMutex::new(receiver)),
        }
    }
}

/// Shared in-memory relay. Clones refer to the same set of pipes.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    pipes: Arc<Mutex<HashMap<String, Pipe>>>,
}

impl MemoryRelay {
    /// Create an empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    fn pipe(&self, path: &str) -> Pipe {
        let mut pipes = self.pipes.lock().unwrap_or_else(|e| e.into_inner());
        pipes.entry(path.to_string()).or_insert_with(Pipe::new).clone()
    }
}

#[async_trait]
impl RelayTransport for MemoryRelay {
    async fn post(&self, path: &str, body: RelayBody) -> Result<(), ChatError> {
        debug!(path, bytes = body.len(), "memory POST");
        let (taken, confirmation) = oneshot::channel();

        self.pipe(path)
            .sender
            .send(Delivery { body, taken })
            .map_err(|_| ChatError::Network("Relay pipe closed".to_string()))?;

        confirmation
            .await
            .map_err(|_| ChatError::Network("Body was discarded before delivery".to_string()))
    }

    async fn get(&self, path: &str) -> Result<RelayResponse, ChatError> {
        let pipe = self.pipe(path);
        let mut receiver = pipe.receiver.lock().await;

        let delivery = receiver
            .recv()
            .await
            .ok_or_else(|| ChatError::Network("Relay pipe closed".to_string()))?;

        let content_type = Some(delivery.body.content_type().to_string());
        let body = delivery.body.into_bytes();
        // The sender may have given up waiting; the body is delivered either way.
        let _ = delivery.taken.send(());

        debug!(path, bytes = body.len(), "memory GET");
        Ok(RelayResponse { content_type, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_post_then_get() {
        let relay = MemoryRelay::new();

        let poster = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.post("p", RelayBody::Text("hello".into())).await })
        };

        let response = relay.get("p").await.unwrap();
        assert!(response.is_plaintext());
        assert_eq!(response.body, b"hello");

        poster.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_post_waits_for_receiver() {
        let relay = MemoryRelay::new();

        let poster = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.post("p", RelayBody::Binary(vec![1])).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!poster.is_finished());

        let response = relay.get("p").await.unwrap();
        assert!(!response.is_plaintext());
        poster.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_paths_are_isolated_and_ordered() {
        let relay = MemoryRelay::new();

        for i in 0..3u8 {
            let relay = relay.clone();
            tokio::spawn(async move { relay.post("a", RelayBody::Binary(vec![i])).await });
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        {
            let relay = relay.clone();
            tokio::spawn(async move { relay.post("b", RelayBody::Binary(vec![9])).await });
        }

        assert_eq!(relay.get("b").await.unwrap().body, vec![9]);
        for i in 0..3u8 {
            assert_eq!(relay.get("a").await.unwrap().body, vec![i]);
        }
    }
}
