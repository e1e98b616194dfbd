//! Session buffer registry — one ordered byte-chunk accumulator per
//! active connection.
//!
//! An explicitly owned instance lives in the gateway state and is passed
//! into each connection handler; its lifetime is the service lifetime.
//! All accessors are linearizable per key. Per-id event ordering is the
//! caller's side of the contract: each connection issues its session's
//! calls from a single task.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct SessionBuffer {
    chunks: Vec<Vec<u8>>,
    total_bytes: usize,
}

/// Concurrency-safe map of session id to chunk accumulator.
#[derive(Default)]
pub struct SessionBufferRegistry {
    sessions: RwLock<HashMap<String, SessionBuffer>>,
}

impl SessionBufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer for `id` if absent. Idempotent.
    pub async fn open(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.entry(id.to_string()).or_default();
    }

    /// Append a chunk to the end of the session's sequence, creating the
    /// session first if it does not exist yet. Chunks arriving before an
    /// explicit start signal are therefore never lost.
    pub async fn append(&self, id: &str, chunk: Vec<u8>) {
        let mut sessions = self.sessions.write().await;
        let buffer = sessions.entry(id.to_string()).or_default();
        buffer.total_bytes += chunk.len();
        buffer.chunks.push(chunk);
    }

    /// Atomically return the concatenated bytes of all buffered chunks and
    /// reset the sequence to empty. The session entry stays present. An
    /// unknown id yields an empty result (and creates the entry).
    pub async fn drain(&self, id: &str) -> Vec<u8> {
        let mut sessions = self.sessions.write().await;
        let buffer = sessions.entry(id.to_string()).or_default();

        let mut out = Vec::with_capacity(buffer.total_bytes);
        for chunk in buffer.chunks.drain(..) {
            out.extend_from_slice(&chunk);
        }
        buffer.total_bytes = 0;
        out
    }

    /// Delete the session entry entirely.
    pub async fn remove(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(id).is_some() {
            debug!(session_id = id, "Session buffer removed");
        }
    }

    /// Whether a session entry exists for `id`.
    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Cumulative byte length of the session's buffered chunks.
    pub async fn buffered_bytes(&self, id: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|b| b.total_bytes)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let registry = SessionBufferRegistry::new();
        registry.open("s1").await;
        registry.append("s1", vec![1, 2, 3]).await;
        registry.open("s1").await;
        // Re-opening must not clear the buffer
        assert_eq!(registry.buffered_bytes("s1").await, 3);
    }

    #[tokio::test]
    async fn test_append_creates_session_on_demand() {
        let registry = SessionBufferRegistry::new();
        assert!(!registry.contains("s1").await);
        registry.append("s1", vec![0; 10]).await;
        assert!(registry.contains("s1").await);
        assert_eq!(registry.buffered_bytes("s1").await, 10);
    }

    #[tokio::test]
    async fn test_drain_concatenates_in_order_and_empties() {
        let registry = SessionBufferRegistry::new();
        registry.append("s1", vec![1, 2]).await;
        registry.append("s1", vec![3]).await;
        registry.append("s1", vec![4, 5]).await;

        let bytes = registry.drain("s1").await;
        assert_eq!(bytes, vec![1, 2, 3, 4, 5]);

        // Entry stays, buffer is empty
        assert!(registry.contains("s1").await);
        assert_eq!(registry.buffered_bytes("s1").await, 0);
        assert!(registry.drain("s1").await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_deletes_entry() {
        let registry = SessionBufferRegistry::new();
        registry.append("s1", vec![9]).await;
        registry.remove("s1").await;
        assert!(!registry.contains("s1").await);
        // A new connection reusing the id starts empty
        registry.append("s1", vec![7]).await;
        assert_eq!(registry.drain("s1").await, vec![7]);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let registry = SessionBufferRegistry::new();
        registry.append("a", vec![1]).await;
        registry.append("b", vec![2]).await;
        assert_eq!(registry.drain("a").await, vec![1]);
        assert_eq!(registry.buffered_bytes("b").await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_across_ids() {
        let registry = Arc::new(SessionBufferRegistry::new());

        let mut handles = Vec::new();
        for session in 0..8u8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("session-{session}");
                for i in 0..100u8 {
                    registry.append(&id, vec![i]).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for session in 0..8u8 {
            let id = format!("session-{session}");
            let bytes = registry.drain(&id).await;
            // No chunk lost or reordered within a session
            let expected: Vec<u8> = (0..100u8).collect();
            assert_eq!(bytes, expected);
        }
    }
}
