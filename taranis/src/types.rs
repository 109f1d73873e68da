// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub type ListenerId = u32;
pub type SessionId = u64;

/// Name of a broker node inside a cluster.
pub type NodeId = String;

/// Global session id.
///
/// Basically it is a (`listener_id`, `session_id`) pair.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionGid {
    listener_id: ListenerId,
    session_id: SessionId,
}

impl SessionGid {
    #[must_use]
    pub const fn new(listener_id: ListenerId, session_id: SessionId) -> Self {
        Self {
            listener_id,
            session_id,
        }
    }

    #[must_use]
    pub const fn listener_id(&self) -> ListenerId {
        self.listener_id
    }

    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }
}

/// Milliseconds since the unix epoch.
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Broker assigned, time ordered message id.
///
/// The upper bits hold the receive timestamp so ids sort in arrival order;
/// the low bits hold a per-node sequence to keep ids unique within one
/// millisecond. Cluster wide uniqueness comes from pairing the id with the
/// origin node name.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MessageId(u64);

impl MessageId {
    const SEQUENCE_BITS: u32 = 20;

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn from_value(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

/// Hands out time ordered message ids.
///
/// Owned by the dispatcher; not a process wide singleton.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    last_millis: u64,
    sequence: u64,
}

impl MessageIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> MessageId {
        let now = unix_millis();
        if now == self.last_millis {
            self.sequence += 1;
        } else {
            self.last_millis = now;
            self.sequence = 0;
        }
        MessageId((now << MessageId::SEQUENCE_BITS) | (self.sequence & 0xf_ffff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_are_time_ordered() {
        let mut generator = MessageIdGenerator::new();
        let first = generator.next();
        let second = generator.next();
        assert!(second > first);
        assert!(!first.is_zero());
    }
}
