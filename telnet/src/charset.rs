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

//! Charset option handler (RFC 2066).
//!
//! Negotiates a single character encoding for the session by exchanging
//! IANA names inside charset subnegotiations. The agreed encoding is only
//! applied to the stream once Transmit-Binary is enabled in both
//! directions; until then the stream stays ASCII, since a non-ASCII
//! encoding is meaningless on a channel that is not 8-bit clean.
//!
//! Translation tables (`TTABLE-IS`) are rejected outright.

use crate::connection::Context;
use crate::consts;
use crate::consts::option::{CHARSET, TRANSMIT_BINARY};
use crate::encoding::TextEncoding;
use crate::event::{
    Event, EventName, ListenerId, Payload, EVENT_CHARSET_ACCEPTED, EVENT_CHARSET_REJECTED,
    EVENT_OPTION, EVENT_SUBNEGOTIATION,
};
use crate::handler::Handler;
use crate::result::{TelnetError, TelnetResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

const TTABLE_PREFIX: &[u8] = b"[TTABLE]";

/// RFC 2066 charset negotiation.
///
/// The handler is cheap to clone; clones share state, so the embedding can
/// keep one clone to call [`request_encoding`](CharsetHandler::request_encoding)
/// after registering another on the connection.
#[derive(Clone, Default)]
pub struct CharsetHandler {
    inner: Arc<CharsetInner>,
}

#[derive(Default)]
struct CharsetInner {
    is_server: bool,
    state: Mutex<CharsetState>,
}

#[derive(Default)]
struct CharsetState {
    pending: Vec<TextEncoding>,
    negotiated: Option<TextEncoding>,
    listeners: Vec<(EventName, ListenerId)>,
}

impl CharsetHandler {
    /// A handler acting in the given role.
    ///
    /// The server role rejects a peer REQUEST that races one of its own;
    /// the client role yields to the peer instead.
    pub fn new(is_server: bool) -> CharsetHandler {
        CharsetHandler {
            inner: Arc::new(CharsetInner {
                is_server,
                state: Mutex::new(CharsetState::default()),
            }),
        }
    }

    /// Propose encodings to the peer, most preferred first.
    ///
    /// Serializes `IAC SB CHARSET REQUEST ";name..." IAC SE` and remembers
    /// the proposal so a crossing peer request can be detected. Fails with
    /// [`TelnetError::OptionNotEnabled`] until CHARSET has been negotiated
    /// on for us.
    pub fn request_encoding(
        &self,
        ctx: &Context,
        encodings: &[TextEncoding],
    ) -> TelnetResult<()> {
        if !ctx.get_option(CHARSET).enabled_for_us() {
            return Err(TelnetError::OptionNotEnabled { option: CHARSET });
        }
        let mut out = vec![consts::IAC, consts::SB, CHARSET, consts::charset::REQUEST];
        for enc in encodings {
            let name = enc
                .iana_name()
                .ok_or_else(|| TelnetError::UnknownEncoding {
                    name: format!("{enc:?}"),
                })?;
            out.push(b';');
            out.extend_from_slice(name.as_bytes());
        }
        out.extend_from_slice(&[consts::IAC, consts::SE]);
        self.inner.lock().pending = encodings.to_vec();
        ctx.dispatch(Event::send(out))
    }
}

impl Handler for CharsetHandler {
    fn register(&self, ctx: &Context) -> TelnetResult<()> {
        ctx.options().allow(CHARSET, true, true);
        let mut listeners = Vec::with_capacity(4);
        let inner = Arc::clone(&self.inner);
        listeners.push((
            EVENT_OPTION,
            ctx.bus()
                .listen_fn(EVENT_OPTION, move |ctx, ev| inner.on_option(ctx, ev)),
        ));
        let inner = Arc::clone(&self.inner);
        listeners.push((
            EVENT_SUBNEGOTIATION,
            ctx.bus().listen_fn(EVENT_SUBNEGOTIATION, move |ctx, ev| {
                inner.on_subnegotiation(ctx, ev)
            }),
        ));
        let inner = Arc::clone(&self.inner);
        listeners.push((
            EVENT_CHARSET_ACCEPTED,
            ctx.bus()
                .listen_fn(EVENT_CHARSET_ACCEPTED, move |ctx, ev| {
                    inner.on_accepted(ctx, ev)
                }),
        ));
        let inner = Arc::clone(&self.inner);
        listeners.push((
            EVENT_CHARSET_REJECTED,
            ctx.bus()
                .listen_fn(EVENT_CHARSET_REJECTED, move |_, _| {
                    inner.lock().pending.clear();
                    Ok(())
                }),
        ));
        self.inner.lock().listeners = listeners;
        Ok(())
    }

    fn unregister(&self, ctx: &Context) -> TelnetResult<()> {
        ctx.options().allow(CHARSET, false, false);
        let listeners = std::mem::take(&mut self.inner.lock().listeners);
        for (name, id) in listeners.into_iter().rev() {
            ctx.bus().remove_listener(name, id);
        }
        Ok(())
    }
}

impl CharsetInner {
    fn lock(&self) -> MutexGuard<'_, CharsetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply the agreed encoding once Transmit-Binary goes fully bilateral,
    /// and fall back to ASCII whenever it stops being so.
    fn on_option(&self, ctx: &Context, ev: &Event) -> TelnetResult<()> {
        let Payload::OptionChange(change) = &ev.payload else {
            return Ok(());
        };
        if change.state.option != TRANSMIT_BINARY {
            return Ok(());
        }
        let negotiated = self.lock().negotiated;
        let binary_both = change.state.enabled_for_them() && change.state.enabled_for_us();
        match negotiated {
            Some(enc) if binary_both => ctx.set_encoding(enc),
            _ => ctx.set_encoding(TextEncoding::Ascii),
        }
        Ok(())
    }

    fn on_accepted(&self, ctx: &Context, ev: &Event) -> TelnetResult<()> {
        let Payload::Charset(data) = &ev.payload else {
            return Ok(());
        };
        self.lock().negotiated = Some(data.encoding);
        let binary = ctx.get_option(TRANSMIT_BINARY);
        if binary.enabled_for_them() && binary.enabled_for_us() {
            ctx.set_encoding(data.encoding);
        }
        Ok(())
    }

    fn on_subnegotiation(&self, ctx: &Context, ev: &Event) -> TelnetResult<()> {
        let Payload::Subnegotiation(subneg) = &ev.payload else {
            return Ok(());
        };
        if subneg.opt != CHARSET || !ctx.get_option(CHARSET).enabled_for_us() {
            return Ok(());
        }
        let Some((&cmd, data)) = subneg.data.split_first() else {
            debug!("empty charset subnegotiation");
            return Ok(());
        };
        match cmd {
            consts::charset::ACCEPTED => {
                self.lock().pending.clear();
                match TextEncoding::for_label(data) {
                    Some(enc) => ctx.dispatch(Event::charset_accepted(enc)),
                    None => ctx.dispatch(Event::charset_rejected()),
                }
            }
            consts::charset::REJECTED => {
                self.lock().pending.clear();
                ctx.dispatch(Event::charset_rejected())
            }
            consts::charset::REQUEST => self.handle_request(ctx, data),
            consts::charset::TTABLE_IS => ctx.dispatch(Event::send(vec![
                consts::IAC,
                consts::SB,
                CHARSET,
                consts::charset::TTABLE_REJECTED,
                consts::IAC,
                consts::SE,
            ])),
            _ => Ok(()),
        }
    }

    fn handle_request(&self, ctx: &Context, mut data: &[u8]) -> TelnetResult<()> {
        let had_pending = {
            let mut state = self.lock();
            let had = !state.pending.is_empty();
            state.pending.clear();
            had
        };
        if had_pending {
            if self.is_server {
                // Simultaneous requests: the server's own proposal stands.
                return self.send_rejected(ctx);
            }
            // Our outstanding proposal is dead; let its issuer hear so.
            ctx.dispatch(Event::charset_rejected())?;
        }
        // Strip the version byte along with the prefix; translation tables
        // themselves are not supported.
        if data.len() > TTABLE_PREFIX.len() + 2 && data.starts_with(TTABLE_PREFIX) {
            data = &data[TTABLE_PREFIX.len() + 1..];
        }
        if data.len() > 2 {
            let sep = data[0];
            for name in data[1..].split(|&b| b == sep) {
                if let Some(enc) = TextEncoding::for_label(name) {
                    let mut out = vec![
                        consts::IAC,
                        consts::SB,
                        CHARSET,
                        consts::charset::ACCEPTED,
                    ];
                    out.extend_from_slice(name);
                    out.extend_from_slice(&[consts::IAC, consts::SE]);
                    ctx.dispatch(Event::send(out))?;
                    return ctx.dispatch(Event::charset_accepted(enc));
                }
            }
        }
        self.send_rejected(ctx)
    }

    fn send_rejected(&self, ctx: &Context) -> TelnetResult<()> {
        ctx.dispatch(Event::send(vec![
            consts::IAC,
            consts::SB,
            CHARSET,
            consts::charset::REJECTED,
            consts::IAC,
            consts::SE,
        ]))
    }
}
