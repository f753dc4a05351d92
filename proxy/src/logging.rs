//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Protocol event tracing.

use mudgate_telnet::{
    Context, EventName, Handler, ListenerId, TelnetResult, EVENT_CHARSET_ACCEPTED,
    EVENT_CHARSET_REJECTED, EVENT_NEGOTIATION, EVENT_OPTION, EVENT_SEND, EVENT_SUBNEGOTIATION,
};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

const LOGGED_EVENTS: &[EventName] = &[
    EVENT_NEGOTIATION,
    EVENT_OPTION,
    EVENT_SUBNEGOTIATION,
    EVENT_SEND,
    EVENT_CHARSET_ACCEPTED,
    EVENT_CHARSET_REJECTED,
];

/// A handler that traces every protocol event on the connection.
///
/// Invaluable when a MUD's negotiation goes sideways; enabled at the
/// `trace` level so it stays quiet in normal operation.
#[derive(Clone, Default)]
pub struct EventLogHandler {
    listeners: Arc<Mutex<Vec<(EventName, ListenerId)>>>,
}

impl EventLogHandler {
    /// A fresh, unregistered handler.
    pub fn new() -> EventLogHandler {
        EventLogHandler::default()
    }
}

impl Handler for EventLogHandler {
    fn register(&self, ctx: &Context) -> TelnetResult<()> {
        let mut ids = Vec::with_capacity(LOGGED_EVENTS.len());
        for &name in LOGGED_EVENTS {
            let id = ctx.bus().listen_fn(name, |_, ev| {
                trace!(event = ev.name, payload = ?ev.payload, "protocol event");
                Ok(())
            });
            ids.push((name, id));
        }
        *self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = ids;
        Ok(())
    }

    fn unregister(&self, ctx: &Context) -> TelnetResult<()> {
        let ids = std::mem::take(
            &mut *self
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (name, id) in ids {
            ctx.bus().remove_listener(name, id);
        }
        Ok(())
    }
}
