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

//! The local event emitter.
//!
//! A handler that panics must not abort the mutation that triggered it,
//! so each invocation runs under `catch_unwind`; a caught panic is
//! logged and otherwise ignored.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::broadcast::RemoteEvent;
use crate::metadata::ItemMetadata;

/// The payload delivered to event handlers, one variant per emitter
/// event named in the external interface.
#[derive(Debug, Clone)]
pub enum Event {
    Set { key: String, metadata: ItemMetadata },
    Get { key: String, value: Value },
    Remove { key: String },
    Clear,
    Import { overwritten: usize, skipped: usize },
    Migrate { target_version: u32, migrated: usize },
    RemoteSet { key: Option<String>, metadata: Option<ItemMetadata> },
    RemoteRemove { key: Option<String> },
    RemoteClear,
    RemoteImport,
}

impl Event {
    /// Translate a [`RemoteEvent`] drained from a [`crate::Subscription`]
    /// into the local [`Event`] variant a handler registered via
    /// [`Emitter::on`] sees. Part of the documented remote-event drain
    /// path (see [`crate::Engine::subscribe_remote`]), not called
    /// anywhere inside the crate itself.
    pub fn from_remote(remote: RemoteEvent) -> Event {
        use crate::broadcast::BroadcastKind;
        match remote.kind {
            BroadcastKind::Set => Event::RemoteSet {
                key: remote.key,
                metadata: remote.meta,
            },
            BroadcastKind::Remove => Event::RemoteRemove { key: remote.key },
            BroadcastKind::Clear => Event::RemoteClear,
            BroadcastKind::Import => Event::RemoteImport,
        }
    }
}

type Handler = dyn Fn(&Event) + Send + Sync;

/// A simple synchronous pub/sub emitter: handlers registered via
/// [`Emitter::on`] are invoked, in registration order, every time
/// [`Emitter::emit`] is called.
#[derive(Clone, Default)]
pub struct Emitter {
    handlers: Arc<Mutex<Vec<Box<Handler>>>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Returns nothing resembling an unsubscribe
    /// token; listener lifecycle management is left to the caller.
    pub fn on(&self, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().push(Box::new(handler));
    }

    /// Invoke every registered handler with `event`. A handler that
    /// panics is caught and logged; it does not prevent later handlers
    /// from running and never propagates to the caller.
    pub fn emit(&self, event: Event) {
        let handlers = self.handlers.lock().unwrap();
        for handler in handlers.iter() {
            let result = catch_unwind(AssertUnwindSafe(|| handler(&event)));
            if let Err(panic) = result {
                log::error!("event handler panicked: {}", describe_panic(&panic));
            }
        }
    }
}

fn describe_panic(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
