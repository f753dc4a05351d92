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

//! Name-keyed event bus with in-order synchronous dispatch.
//!
//! Every protocol occurrence — an inbound negotiation, a subnegotiation
//! payload, an option flipping state, bytes that must go out on the wire —
//! is published on the connection's bus. Listeners run synchronously in
//! registration order; the first listener error aborts dispatch and
//! propagates to the dispatcher.

use crate::connection::Context;
use crate::encoding::TextEncoding;
use crate::options::OptionState;
use crate::result::TelnetResult;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Name under which events are registered and dispatched.
pub type EventName = &'static str;

/// An inbound DO/DONT/WILL/WONT was decoded.
pub const EVENT_NEGOTIATION: EventName = "telnet.negotiation";
/// An inbound subnegotiation payload was decoded.
pub const EVENT_SUBNEGOTIATION: EventName = "telnet.subnegotiation";
/// An option's them/us state changed as the result of a receive.
pub const EVENT_OPTION: EventName = "telnet.option";
/// Raw bytes that must be forwarded to the transport verbatim.
pub const EVENT_SEND: EventName = "telnet.send";
/// An `IAC EOR` record boundary was decoded.
pub const EVENT_END_OF_RECORD: EventName = "telnet.end-of-record";
/// An `IAC GA` was decoded.
pub const EVENT_GO_AHEAD: EventName = "telnet.go-ahead";
/// A charset was agreed on (either side accepted).
pub const EVENT_CHARSET_ACCEPTED: EventName = "telnet.charset.accepted";
/// A charset request terminated without agreement.
pub const EVENT_CHARSET_REJECTED: EventName = "telnet.charset.rejected";

/// An inbound option negotiation command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Negotiation {
    /// The command byte: DO, DONT, WILL or WONT.
    pub cmd: u8,
    /// The option the command refers to.
    pub opt: u8,
}

/// An inbound subnegotiation, with interior `IAC IAC` already unescaped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subnegotiation {
    /// The option the payload belongs to.
    pub opt: u8,
    /// The payload between `IAC SB opt` and `IAC SE`.
    pub data: Vec<u8>,
}

/// A completed option transition, published after a receive changed state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OptionChange {
    /// Snapshot of the option slot after the transition.
    pub state: OptionState,
    /// Whether the them-side moved.
    pub changed_them: bool,
    /// Whether the us-side moved.
    pub changed_us: bool,
}

/// The encoding carried by a charset-accepted event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CharsetData {
    /// The agreed-on encoding.
    pub encoding: TextEncoding,
}

/// Payload of an [`Event`].
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// No payload.
    Empty,
    /// Raw bytes destined for the transport.
    Raw(Vec<u8>),
    /// An inbound negotiation command.
    Negotiation(Negotiation),
    /// An inbound subnegotiation.
    Subnegotiation(Subnegotiation),
    /// An option state transition.
    OptionChange(OptionChange),
    /// Charset agreement data.
    Charset(CharsetData),
}

/// A named event with its payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The name the event is dispatched under.
    pub name: EventName,
    /// The event payload.
    pub payload: Payload,
}

impl Event {
    /// An inbound DO/DONT/WILL/WONT for `opt`.
    pub fn negotiation(cmd: u8, opt: u8) -> Event {
        Event {
            name: EVENT_NEGOTIATION,
            payload: Payload::Negotiation(Negotiation { cmd, opt }),
        }
    }

    /// An inbound subnegotiation payload for `opt`.
    pub fn subnegotiation(opt: u8, data: Vec<u8>) -> Event {
        Event {
            name: EVENT_SUBNEGOTIATION,
            payload: Payload::Subnegotiation(Subnegotiation { opt, data }),
        }
    }

    /// An option transition notice.
    pub fn option_change(state: OptionState, changed_them: bool, changed_us: bool) -> Event {
        Event {
            name: EVENT_OPTION,
            payload: Payload::OptionChange(OptionChange {
                state,
                changed_them,
                changed_us,
            }),
        }
    }

    /// Raw bytes to forward to the transport.
    pub fn send(data: Vec<u8>) -> Event {
        Event {
            name: EVENT_SEND,
            payload: Payload::Raw(data),
        }
    }

    /// An `IAC EOR` record boundary.
    pub fn end_of_record() -> Event {
        Event {
            name: EVENT_END_OF_RECORD,
            payload: Payload::Empty,
        }
    }

    /// An `IAC GA` line-turn marker.
    pub fn go_ahead() -> Event {
        Event {
            name: EVENT_GO_AHEAD,
            payload: Payload::Empty,
        }
    }

    /// A charset was agreed on.
    pub fn charset_accepted(encoding: TextEncoding) -> Event {
        Event {
            name: EVENT_CHARSET_ACCEPTED,
            payload: Payload::Charset(CharsetData { encoding }),
        }
    }

    /// A charset request terminated without agreement.
    pub fn charset_rejected() -> Event {
        Event {
            name: EVENT_CHARSET_REJECTED,
            payload: Payload::Empty,
        }
    }
}

/// A registered event callback.
///
/// Listeners run synchronously on the dispatching task and may themselves
/// dispatch further events through the [`Context`] they are handed.
pub trait Listener: Send + Sync {
    /// Handle one event.
    fn on_event(&self, ctx: &Context, ev: &Event) -> TelnetResult<()>;
}

struct FnListener<F>(F);

impl<F> Listener for FnListener<F>
where
    F: Fn(&Context, &Event) -> TelnetResult<()> + Send + Sync,
{
    fn on_event(&self, ctx: &Context, ev: &Event) -> TelnetResult<()> {
        (self.0)(ctx, ev)
    }
}

/// Opaque handle identifying one registration on the bus.
///
/// Ids are handed out monotonically and never reused, so removal is
/// unambiguous even when the same listener object is registered twice.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ListenerId(u64);

struct Registered {
    id: ListenerId,
    listener: Arc<dyn Listener>,
}

/// Name-keyed listener registry.
///
/// `dispatch` snapshots the listener list under a read lock and invokes the
/// snapshot with the lock released, so listeners are free to register,
/// remove, and dispatch reentrantly. Listeners for one name run strictly in
/// registration order.
pub struct EventBus {
    listeners: RwLock<HashMap<EventName, Vec<Registered>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub(crate) fn new() -> EventBus {
        EventBus {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener object for `name`.
    pub fn listen(&self, name: EventName, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut map = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        map.entry(name).or_default().push(Registered { id, listener });
        id
    }

    /// Register a closure for `name`.
    pub fn listen_fn<F>(&self, name: EventName, f: F) -> ListenerId
    where
        F: Fn(&Context, &Event) -> TelnetResult<()> + Send + Sync + 'static,
    {
        self.listen(name, Arc::new(FnListener(f)))
    }

    /// Remove a previously registered listener. Unknown ids are ignored.
    pub fn remove_listener(&self, name: EventName, id: ListenerId) {
        let mut map = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = map.get_mut(name) {
            list.retain(|r| r.id != id);
        }
    }

    /// Invoke every listener registered for the event's name, in order.
    ///
    /// The first listener error stops dispatch and is returned.
    pub fn dispatch(&self, ctx: &Context, ev: &Event) -> TelnetResult<()> {
        let snapshot: Vec<Arc<dyn Listener>> = {
            let map = self
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match map.get(ev.name) {
                Some(list) => list.iter().map(|r| Arc::clone(&r.listener)).collect(),
                None => Vec::new(),
            }
        };
        for listener in snapshot {
            listener.on_event(ctx, ev)?;
        }
        Ok(())
    }
}
