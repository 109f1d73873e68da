// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! In-memory storage backends, the default for a single node broker.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use codec::TopicFilter;

use crate::message::{Delivery, Message};
use crate::types::MessageId;

use super::{ArchiveStore, QueueStore, Result, RetainedStore, SessionStore, StoredSession};

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, StoredSession>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, client_id: &str) -> Result<Option<StoredSession>> {
        Ok(self.sessions.lock().unwrap().get(client_id).cloned())
    }

    async fn put(&self, session: StoredSession) -> Result<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.client_id.clone(), session);
        Ok(())
    }

    async fn delete(&self, client_id: &str) -> Result<()> {
        self.sessions.lock().unwrap().remove(client_id);
        Ok(())
    }

    async fn iterate(&self) -> Result<Vec<StoredSession>> {
        Ok(self.sessions.lock().unwrap().values().cloned().collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    queues: Mutex<HashMap<String, VecDeque<Delivery>>>,
}

impl MemoryQueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, client_id: &str, delivery: Delivery) -> Result<()> {
        self.queues
            .lock()
            .unwrap()
            .entry(client_id.to_string())
            .or_default()
            .push_back(delivery);
        Ok(())
    }

    async fn dequeue(&self, client_id: &str) -> Result<Option<Delivery>> {
        Ok(self
            .queues
            .lock()
            .unwrap()
            .get_mut(client_id)
            .and_then(VecDeque::pop_front))
    }

    async fn remove(&self, client_id: &str, message_id: MessageId) -> Result<()> {
        if let Some(queue) = self.queues.lock().unwrap().get_mut(client_id) {
            queue.retain(|delivery| delivery.message.id != message_id);
        }
        Ok(())
    }

    async fn iterate(&self, client_id: &str) -> Result<Vec<Delivery>> {
        Ok(self
            .queues
            .lock()
            .unwrap()
            .get(client_id)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, client_id: &str) -> Result<usize> {
        Ok(self
            .queues
            .lock()
            .unwrap()
            .remove(client_id)
            .map_or(0, |queue| queue.len()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryRetainedStore {
    messages: Mutex<HashMap<String, Message>>,
}

impl MemoryRetainedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetainedStore for MemoryRetainedStore {
    async fn put(&self, message: Message) -> Result<()> {
        let mut messages = self.messages.lock().unwrap();
        if message.payload.is_empty() {
            // A retained message with an empty payload is a delete, not a
            // stored record.
            messages.remove(message.topic.as_str());
        } else {
            messages.insert(message.topic.as_str().to_string(), message);
        }
        Ok(())
    }

    async fn get(&self, topic: &str) -> Result<Option<Message>> {
        Ok(self.messages.lock().unwrap().get(topic).cloned())
    }

    async fn find_matching(&self, filter: &TopicFilter) -> Result<Vec<Message>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .values()
            .filter(|msg| filter.matches(msg.topic.as_str()))
            .cloned()
            .collect())
    }

    async fn purge_expired(&self, now: u64) -> Result<usize> {
        let mut messages = self.messages.lock().unwrap();
        let before = messages.len();
        messages.retain(|_, msg| !msg.is_expired(now));
        Ok(before - messages.len())
    }
}

/// Bounded in-memory archive; the oldest entry is evicted on overflow.
#[derive(Debug)]
pub struct MemoryArchiveStore {
    capacity: usize,
    messages: Mutex<VecDeque<Message>>,
}

impl MemoryArchiveStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: Mutex::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn append(&self, message: Message) -> Result<()> {
        let mut messages = self.messages.lock().unwrap();
        if messages.len() == self.capacity {
            messages.pop_front();
        }
        messages.push_back(message);
        Ok(())
    }

    async fn purge_before(&self, instant: u64) -> Result<usize> {
        let mut messages = self.messages.lock().unwrap();
        let before = messages.len();
        messages.retain(|msg| msg.received_at >= instant);
        Ok(before - messages.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use codec::{QoS, TopicName};

    fn message(topic: &str, payload: &'static [u8]) -> Message {
        Message::new(
            TopicName::parse(topic).unwrap(),
            QoS::AtMostOnce,
            Bytes::from_static(payload),
        )
    }

    #[tokio::test]
    async fn test_retained_put_get_delete() {
        let store = MemoryRetainedStore::new();
        store.put(message("home/temp", b"21")).await.unwrap();
        let got = store.get("home/temp").await.unwrap().unwrap();
        assert_eq!(got.payload, Bytes::from_static(b"21"));

        // Empty payload deletes the entry.
        store.put(message("home/temp", b"")).await.unwrap();
        assert!(store.get("home/temp").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retained_last_writer_wins() {
        let store = MemoryRetainedStore::new();
        store.put(message("home/temp", b"21")).await.unwrap();
        store.put(message("home/temp", b"22")).await.unwrap();

        let filter = TopicFilter::parse("home/#").unwrap();
        let matching = store.find_matching(&filter).await.unwrap();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].payload, Bytes::from_static(b"22"));
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let store = MemoryQueueStore::new();
        let first = Delivery::new(message("a", b"1"), QoS::AtLeastOnce);
        let second = Delivery::new(message("a", b"2"), QoS::AtLeastOnce);
        store.enqueue("c1", first.clone()).await.unwrap();
        store.enqueue("c1", second.clone()).await.unwrap();

        assert_eq!(store.dequeue("c1").await.unwrap(), Some(first));
        assert_eq!(store.dequeue("c1").await.unwrap(), Some(second));
        assert_eq!(store.dequeue("c1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_archive_capacity() {
        let store = MemoryArchiveStore::new(2);
        store.append(message("a", b"1")).await.unwrap();
        store.append(message("a", b"2")).await.unwrap();
        store.append(message("a", b"3")).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_archive_purge_before() {
        let store = MemoryArchiveStore::new(8);
        store.append(message("a", b"1")).await.unwrap();
        let purged = store
            .purge_before(crate::types::unix_millis() + 1_000)
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(store.is_empty());
    }
}
