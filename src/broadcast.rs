/*
 * Copyright 2024 lsm-store contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Cross-context change notification.
//!
//! There's no native Rust analogue of a browser tab's broadcast channel
//! for a single-process library, so the default implementation here is
//! an in-process multi-subscriber channel. Delivery is still best-effort
//! and self-delivery is still suppressed by comparing `origin_id`, so a
//! caller can freely swap in a real cross-process transport (a Unix
//! socket, Redis pub/sub, etc.) by implementing [`BroadcastBridge`]
//! without touching the engine facade.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metadata::ItemMetadata;

/// The kind of change a [`BroadcastMessage`] announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastKind {
    Set,
    Remove,
    Clear,
    Import,
}

/// A change-notification message published to peers in the same
/// namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub kind: BroadcastKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ItemMetadata>,
    pub origin_id: String,
}

impl BroadcastMessage {
    pub fn set(key: impl Into<String>, meta: ItemMetadata, origin_id: impl Into<String>) -> Self {
        BroadcastMessage {
            kind: BroadcastKind::Set,
            key: Some(key.into()),
            meta: Some(meta),
            origin_id: origin_id.into(),
        }
    }

    pub fn remove(key: impl Into<String>, origin_id: impl Into<String>) -> Self {
        BroadcastMessage {
            kind: BroadcastKind::Remove,
            key: Some(key.into()),
            meta: None,
            origin_id: origin_id.into(),
        }
    }

    pub fn clear(origin_id: impl Into<String>) -> Self {
        BroadcastMessage {
            kind: BroadcastKind::Clear,
            key: None,
            meta: None,
            origin_id: origin_id.into(),
        }
    }

    pub fn import(origin_id: impl Into<String>) -> Self {
        BroadcastMessage {
            kind: BroadcastKind::Import,
            key: None,
            meta: None,
            origin_id: origin_id.into(),
        }
    }

    /// Whether this message originated from `origin_id` and should
    /// therefore be suppressed for that subscriber.
    pub fn is_self_origin(&self, origin_id: &str) -> bool {
        self.origin_id == origin_id
    }
}

/// A handle returned by [`BroadcastBridge::subscribe`]. `recv` returns
/// messages published by *other* origins; self-delivery is filtered
/// internally as a fallback for transports without native suppression.
pub struct Subscription {
    receiver: Receiver<BroadcastMessage>,
    origin_id: String,
}

impl Subscription {
    /// Drain every message currently queued for this subscriber,
    /// excluding ones this same origin published.
    pub fn drain(&self) -> Vec<BroadcastMessage> {
        self.receiver
            .try_iter()
            .filter(|message| !message.is_self_origin(&self.origin_id))
            .collect()
    }
}

/// Publishes and subscribes to [`BroadcastMessage`]s for one namespace.
pub trait BroadcastBridge: Send + Sync {
    /// Publish `message` to every other subscriber of this bridge.
    fn publish(&self, message: BroadcastMessage) -> Result<()>;

    /// Register a new subscriber identified by `origin_id`.
    fn subscribe(&self, origin_id: String) -> Subscription;
}

/// The default, in-process [`BroadcastBridge`], fanning published
/// messages out to every live subscriber via `std::sync::mpsc`.
#[derive(Default)]
pub struct ChannelBroadcast {
    subscribers: Mutex<Vec<Sender<BroadcastMessage>>>,
}

impl ChannelBroadcast {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BroadcastBridge for ChannelBroadcast {
    fn publish(&self, message: BroadcastMessage) -> Result<()> {
        let mut subscribers = self.subscribers.lock().unwrap();
        // Best-effort: a subscriber whose receiver has been dropped is
        // pruned rather than treated as a failure.
        subscribers.retain(|sender| sender.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self, origin_id: String) -> Subscription {
        let (sender, receiver) = channel();
        self.subscribers.lock().unwrap().push(sender);
        Subscription { receiver, origin_id }
    }
}

/// The payload carried by a translated `remote:*` local event, once a
/// subscriber turns a received [`BroadcastMessage`] into something an
/// [`crate::Emitter`] handler can consume.
#[derive(Debug, Clone)]
pub struct RemoteEvent {
    pub kind: BroadcastKind,
    pub key: Option<String>,
    pub meta: Option<ItemMetadata>,
}

impl From<BroadcastMessage> for RemoteEvent {
    fn from(message: BroadcastMessage) -> Self {
        RemoteEvent {
            kind: message.kind,
            key: message.key,
            meta: message.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_others_messages() {
        let bridge = ChannelBroadcast::new();
        let sub_a = bridge.subscribe("a".to_string());
        let sub_b = bridge.subscribe("b".to_string());

        bridge
            .publish(BroadcastMessage::remove("k", "a"))
            .unwrap();

        assert!(sub_a.drain().is_empty());
        assert_eq!(sub_b.drain().len(), 1);
    }

    #[test]
    fn dropped_subscriber_does_not_break_publish() {
        let bridge = ChannelBroadcast::new();
        {
            let _dropped = bridge.subscribe("a".to_string());
        }
        let sub_b = bridge.subscribe("b".to_string());
        bridge.publish(BroadcastMessage::clear("a")).unwrap();
        assert_eq!(sub_b.drain().len(), 1);
    }
}
