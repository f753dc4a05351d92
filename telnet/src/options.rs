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

//! Option negotiation state, one Q-method machine per option (RFC 1143).
//!
//! Every option tracks two independent half-states: whether the remote is
//! performing it (`them`, negotiated with DO/DONT) and whether we are
//! (`us`, negotiated with WILL/WONT). The `WantYes*`/`WantNo*` sub-states
//! record outstanding requests so that crossed negotiations cannot loop.
//!
//! Outbound commands are never written to the transport directly: they are
//! published as [`EVENT_SEND`](crate::EVENT_SEND) payloads and forwarded by
//! the connection's send listener.

use crate::connection::Context;
use crate::consts;
use crate::event::Event;
use crate::result::TelnetResult;
use std::sync::{Mutex, PoisonError};

/// RFC 1143 negotiation state for one side of one option.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum QState {
    /// The option is off.
    #[default]
    No,
    /// The option is on.
    Yes,
    /// We asked to disable and are waiting for the acknowledgment.
    WantNoEmpty,
    /// Disable is in flight, but we have since decided we want it on.
    WantNoOpposite,
    /// We asked to enable and are waiting for the acknowledgment.
    WantYesEmpty,
    /// Enable is in flight, but we have since decided we want it off.
    WantYesOpposite,
}

/// Snapshot of one option slot.
///
/// A side counts as enabled only while it is exactly [`QState::Yes`];
/// every `Want*` sub-state is still "off" as far as the data path is
/// concerned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OptionState {
    /// The option number this slot tracks.
    pub option: u8,
    /// Whether an inbound WILL may be accepted.
    pub allow_them: bool,
    /// Whether an inbound DO may be accepted.
    pub allow_us: bool,
    /// Remote-side negotiation state.
    pub them: QState,
    /// Local-side negotiation state.
    pub us: QState,
}

impl OptionState {
    /// A fresh slot for `option`: nothing allowed, both sides off.
    pub fn new(option: u8) -> OptionState {
        OptionState {
            option,
            allow_them: false,
            allow_us: false,
            them: QState::No,
            us: QState::No,
        }
    }

    /// Whether the remote side is performing the option.
    pub fn enabled_for_them(&self) -> bool {
        self.them == QState::Yes
    }

    /// Whether we are performing the option.
    pub fn enabled_for_us(&self) -> bool {
        self.us == QState::Yes
    }
}

#[derive(Clone, Copy)]
enum Side {
    Them,
    Us,
}

/// All 256 option slots for one connection.
///
/// Slots exist from construction; there is no dynamic insertion. Each slot
/// is guarded independently, and the guard is released before any event is
/// dispatched so that listeners may call back into the table.
pub struct OptionTable {
    slots: [Mutex<OptionState>; 256],
}

impl OptionTable {
    pub(crate) fn new() -> OptionTable {
        OptionTable {
            slots: std::array::from_fn(|opt| Mutex::new(OptionState::new(opt as u8))),
        }
    }

    fn slot(&self, opt: u8) -> std::sync::MutexGuard<'_, OptionState> {
        self.slots[opt as usize]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot the current state of `opt`.
    pub fn get(&self, opt: u8) -> OptionState {
        *self.slot(opt)
    }

    /// Set the acceptance policy for both sides of `opt`.
    pub fn allow(&self, opt: u8, them: bool, us: bool) {
        let mut slot = self.slot(opt);
        slot.allow_them = them;
        slot.allow_us = us;
    }

    /// Set whether an inbound WILL for `opt` may be accepted.
    pub fn allow_them(&self, opt: u8, allow: bool) {
        self.slot(opt).allow_them = allow;
    }

    /// Set whether an inbound DO for `opt` may be accepted.
    pub fn allow_us(&self, opt: u8, allow: bool) {
        self.slot(opt).allow_us = allow;
    }

    /// Ask the remote to start performing `opt` (sends DO when idle).
    pub fn enable_for_them(&self, ctx: &Context, opt: u8) -> TelnetResult<()> {
        self.enable(ctx, opt, Side::Them)
    }

    /// Offer to start performing `opt` ourselves (sends WILL when idle).
    pub fn enable_for_us(&self, ctx: &Context, opt: u8) -> TelnetResult<()> {
        self.enable(ctx, opt, Side::Us)
    }

    /// Ask the remote to stop performing `opt` (sends DONT when enabled).
    pub fn disable_for_them(&self, ctx: &Context, opt: u8) -> TelnetResult<()> {
        self.disable(ctx, opt, Side::Them)
    }

    /// Stop performing `opt` ourselves (sends WONT when enabled).
    pub fn disable_for_us(&self, ctx: &Context, opt: u8) -> TelnetResult<()> {
        self.disable(ctx, opt, Side::Us)
    }

    fn enable(&self, ctx: &Context, opt: u8, side: Side) -> TelnetResult<()> {
        let cmd = match side {
            Side::Them => consts::DO,
            Side::Us => consts::WILL,
        };
        let send = {
            let mut slot = self.slot(opt);
            let state = match side {
                Side::Them => &mut slot.them,
                Side::Us => &mut slot.us,
            };
            match *state {
                QState::No => {
                    *state = QState::WantYesEmpty;
                    true
                }
                QState::Yes => false,
                QState::WantNoEmpty => {
                    *state = QState::WantNoOpposite;
                    false
                }
                QState::WantNoOpposite => false,
                QState::WantYesEmpty => false,
                QState::WantYesOpposite => {
                    *state = QState::WantYesEmpty;
                    false
                }
            }
        };
        if send {
            ctx.dispatch(Event::send(vec![consts::IAC, cmd, opt]))?;
        }
        Ok(())
    }

    fn disable(&self, ctx: &Context, opt: u8, side: Side) -> TelnetResult<()> {
        let cmd = match side {
            Side::Them => consts::DONT,
            Side::Us => consts::WONT,
        };
        let send = {
            let mut slot = self.slot(opt);
            let state = match side {
                Side::Them => &mut slot.them,
                Side::Us => &mut slot.us,
            };
            match *state {
                QState::No => false,
                QState::Yes => {
                    *state = QState::WantNoEmpty;
                    true
                }
                QState::WantNoEmpty => false,
                QState::WantNoOpposite => {
                    *state = QState::WantNoEmpty;
                    false
                }
                QState::WantYesEmpty => {
                    *state = QState::WantYesOpposite;
                    false
                }
                QState::WantYesOpposite => false,
            }
        };
        if send {
            ctx.dispatch(Event::send(vec![consts::IAC, cmd, opt]))?;
        }
        Ok(())
    }

    /// Run an inbound DO/DONT/WILL/WONT through the state machine.
    ///
    /// Any required answer is published as a send event, and if either
    /// half-state moved, an option-change event follows it.
    pub(crate) fn receive(&self, ctx: &Context, cmd: u8, opt: u8) -> TelnetResult<()> {
        let (before, after, send) = {
            let mut slot = self.slot(opt);
            let before = *slot;
            let (accept, reject, allow) = match cmd {
                consts::DO | consts::DONT => (consts::WILL, consts::WONT, slot.allow_us),
                consts::WILL | consts::WONT => (consts::DO, consts::DONT, slot.allow_them),
                _ => return Ok(()),
            };
            let state = match cmd {
                consts::DO | consts::DONT => &mut slot.us,
                _ => &mut slot.them,
            };
            let mut send = None;
            match cmd {
                consts::DO | consts::WILL => match *state {
                    QState::No => {
                        if allow {
                            *state = QState::Yes;
                            send = Some(accept);
                        } else {
                            send = Some(reject);
                        }
                    }
                    QState::Yes => {}
                    QState::WantNoEmpty => *state = QState::No,
                    QState::WantNoOpposite => *state = QState::Yes,
                    QState::WantYesEmpty => *state = QState::Yes,
                    QState::WantYesOpposite => {
                        *state = QState::WantNoEmpty;
                        send = Some(reject);
                    }
                },
                _ => match *state {
                    QState::No => {}
                    QState::Yes => {
                        *state = QState::No;
                        send = Some(reject);
                    }
                    QState::WantNoEmpty => *state = QState::No,
                    QState::WantNoOpposite => {
                        *state = QState::WantYesEmpty;
                        send = Some(accept);
                    }
                    QState::WantYesEmpty => *state = QState::No,
                    QState::WantYesOpposite => *state = QState::No,
                },
            }
            (before, *slot, send)
        };
        if let Some(b) = send {
            ctx.dispatch(Event::send(vec![consts::IAC, b, opt]))?;
        }
        let changed_them = before.them != after.them;
        let changed_us = before.us != after.us;
        if changed_them || changed_us {
            ctx.dispatch(Event::option_change(after, changed_them, changed_us))?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set(&self, state: OptionState) {
        *self.slot(state.option) = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{DO, DONT, IAC, WILL, WONT};
    use crate::event::{Payload, EVENT_OPTION, EVENT_SEND};
    use std::sync::{Arc, Mutex};

    const OPT: u8 = consts::option::ECHO;

    fn capture_sends(ctx: &Context) -> Arc<Mutex<Vec<Vec<u8>>>> {
        let sends = Arc::new(Mutex::new(Vec::new()));
        let sends2 = Arc::clone(&sends);
        ctx.bus().listen_fn(EVENT_SEND, move |_, ev| {
            if let Payload::Raw(bytes) = &ev.payload {
                sends2.lock().unwrap().push(bytes.clone());
            }
            Ok(())
        });
        sends
    }

    fn state(allow_them: bool, allow_us: bool, them: QState, us: QState) -> OptionState {
        OptionState {
            option: OPT,
            allow_them,
            allow_us,
            them,
            us,
        }
    }

    #[test]
    fn receive_transitions() {
        use QState::*;
        // (inbound cmd, start, end, bytes sent)
        let cases: Vec<(u8, OptionState, OptionState, Option<Vec<u8>>)> = vec![
            // DO drives the us side.
            (
                DO,
                state(false, true, No, No),
                state(false, true, No, Yes),
                Some(vec![IAC, WILL, OPT]),
            ),
            (
                DO,
                state(false, false, No, No),
                state(false, false, No, No),
                Some(vec![IAC, WONT, OPT]),
            ),
            (DO, state(false, false, No, Yes), state(false, false, No, Yes), None),
            (
                DO,
                state(false, false, No, WantNoEmpty),
                state(false, false, No, No),
                None,
            ),
            (
                DO,
                state(false, false, No, WantNoOpposite),
                state(false, false, No, Yes),
                None,
            ),
            (
                DO,
                state(false, false, No, WantYesEmpty),
                state(false, false, No, Yes),
                None,
            ),
            (
                DO,
                state(false, false, No, WantYesOpposite),
                state(false, false, No, WantNoEmpty),
                Some(vec![IAC, WONT, OPT]),
            ),
            // DONT drives the us side.
            (DONT, state(false, false, No, No), state(false, false, No, No), None),
            (
                DONT,
                state(false, false, No, Yes),
                state(false, false, No, No),
                Some(vec![IAC, WONT, OPT]),
            ),
            (
                DONT,
                state(false, false, No, WantNoEmpty),
                state(false, false, No, No),
                None,
            ),
            (
                DONT,
                state(false, false, No, WantNoOpposite),
                state(false, false, No, WantYesEmpty),
                Some(vec![IAC, WILL, OPT]),
            ),
            (
                DONT,
                state(false, false, No, WantYesEmpty),
                state(false, false, No, No),
                None,
            ),
            (
                DONT,
                state(false, false, No, WantYesOpposite),
                state(false, false, No, No),
                None,
            ),
            // WILL drives the them side.
            (
                WILL,
                state(true, false, No, No),
                state(true, false, Yes, No),
                Some(vec![IAC, DO, OPT]),
            ),
            (
                WILL,
                state(false, false, No, No),
                state(false, false, No, No),
                Some(vec![IAC, DONT, OPT]),
            ),
            (WILL, state(false, false, Yes, No), state(false, false, Yes, No), None),
            (
                WILL,
                state(false, false, WantNoEmpty, No),
                state(false, false, No, No),
                None,
            ),
            (
                WILL,
                state(false, false, WantNoOpposite, No),
                state(false, false, Yes, No),
                None,
            ),
            (
                WILL,
                state(false, false, WantYesEmpty, No),
                state(false, false, Yes, No),
                None,
            ),
            (
                WILL,
                state(false, false, WantYesOpposite, No),
                state(false, false, WantNoEmpty, No),
                Some(vec![IAC, DONT, OPT]),
            ),
            // WONT drives the them side.
            (WONT, state(false, false, No, No), state(false, false, No, No), None),
            (
                WONT,
                state(false, false, Yes, No),
                state(false, false, No, No),
                Some(vec![IAC, DONT, OPT]),
            ),
            (
                WONT,
                state(false, false, WantNoEmpty, No),
                state(false, false, No, No),
                None,
            ),
            (
                WONT,
                state(false, false, WantNoOpposite, No),
                state(false, false, WantYesEmpty, No),
                Some(vec![IAC, DO, OPT]),
            ),
            (
                WONT,
                state(false, false, WantYesEmpty, No),
                state(false, false, No, No),
                None,
            ),
            (
                WONT,
                state(false, false, WantYesOpposite, No),
                state(false, false, No, No),
                None,
            ),
        ];
        for (i, (cmd, start, end, expected)) in cases.into_iter().enumerate() {
            let ctx = Context::new();
            let sends = capture_sends(&ctx);
            ctx.options().set(start);
            ctx.options().receive(&ctx, cmd, OPT).unwrap();
            assert_eq!(ctx.options().get(OPT), end, "case {i}");
            let sent = sends.lock().unwrap();
            match expected {
                Some(bytes) => assert_eq!(sent.as_slice(), &[bytes], "case {i}"),
                None => assert!(sent.is_empty(), "case {i}"),
            }
        }
    }

    #[test]
    fn local_requests() {
        use QState::*;
        type Op = fn(&OptionTable, &Context, u8) -> TelnetResult<()>;
        let enable_them: Op = OptionTable::enable_for_them;
        let enable_us: Op = OptionTable::enable_for_us;
        let disable_them: Op = OptionTable::disable_for_them;
        let disable_us: Op = OptionTable::disable_for_us;
        // (op, start them/us pair applied to one side, end, bytes sent)
        let cases: Vec<(Op, OptionState, OptionState, Option<Vec<u8>>)> = vec![
            (disable_them, state(false, false, No, No), state(false, false, No, No), None),
            (
                disable_them,
                state(false, false, Yes, No),
                state(false, false, WantNoEmpty, No),
                Some(vec![IAC, DONT, OPT]),
            ),
            (
                disable_them,
                state(false, false, WantNoEmpty, No),
                state(false, false, WantNoEmpty, No),
                None,
            ),
            (
                disable_them,
                state(false, false, WantNoOpposite, No),
                state(false, false, WantNoEmpty, No),
                None,
            ),
            (
                disable_them,
                state(false, false, WantYesEmpty, No),
                state(false, false, WantYesOpposite, No),
                None,
            ),
            (
                disable_them,
                state(false, false, WantYesOpposite, No),
                state(false, false, WantYesOpposite, No),
                None,
            ),
            (disable_us, state(false, false, No, No), state(false, false, No, No), None),
            (
                disable_us,
                state(false, false, No, Yes),
                state(false, false, No, WantNoEmpty),
                Some(vec![IAC, WONT, OPT]),
            ),
            (
                disable_us,
                state(false, false, No, WantNoEmpty),
                state(false, false, No, WantNoEmpty),
                None,
            ),
            (
                disable_us,
                state(false, false, No, WantNoOpposite),
                state(false, false, No, WantNoEmpty),
                None,
            ),
            (
                disable_us,
                state(false, false, No, WantYesEmpty),
                state(false, false, No, WantYesOpposite),
                None,
            ),
            (
                disable_us,
                state(false, false, No, WantYesOpposite),
                state(false, false, No, WantYesOpposite),
                None,
            ),
            (
                enable_them,
                state(false, false, No, No),
                state(false, false, WantYesEmpty, No),
                Some(vec![IAC, DO, OPT]),
            ),
            (enable_them, state(false, false, Yes, No), state(false, false, Yes, No), None),
            (
                enable_them,
                state(false, false, WantNoEmpty, No),
                state(false, false, WantNoOpposite, No),
                None,
            ),
            (
                enable_them,
                state(false, false, WantNoOpposite, No),
                state(false, false, WantNoOpposite, No),
                None,
            ),
            (
                enable_them,
                state(false, false, WantYesEmpty, No),
                state(false, false, WantYesEmpty, No),
                None,
            ),
            (
                enable_them,
                state(false, false, WantYesOpposite, No),
                state(false, false, WantYesEmpty, No),
                None,
            ),
            (
                enable_us,
                state(false, false, No, No),
                state(false, false, No, WantYesEmpty),
                Some(vec![IAC, WILL, OPT]),
            ),
            (enable_us, state(false, false, No, Yes), state(false, false, No, Yes), None),
            (
                enable_us,
                state(false, false, No, WantNoEmpty),
                state(false, false, No, WantNoOpposite),
                None,
            ),
            (
                enable_us,
                state(false, false, No, WantNoOpposite),
                state(false, false, No, WantNoOpposite),
                None,
            ),
            (
                enable_us,
                state(false, false, No, WantYesEmpty),
                state(false, false, No, WantYesEmpty),
                None,
            ),
            (
                enable_us,
                state(false, false, No, WantYesOpposite),
                state(false, false, No, WantYesEmpty),
                None,
            ),
        ];
        for (i, (op, start, end, expected)) in cases.into_iter().enumerate() {
            let ctx = Context::new();
            let sends = capture_sends(&ctx);
            ctx.options().set(start);
            op(ctx.options(), &ctx, OPT).unwrap();
            assert_eq!(ctx.options().get(OPT), end, "case {i}");
            let sent = sends.lock().unwrap();
            match expected {
                Some(bytes) => assert_eq!(sent.as_slice(), &[bytes], "case {i}"),
                None => assert!(sent.is_empty(), "case {i}"),
            }
        }
    }

    #[test]
    fn enabled_only_when_yes() {
        use QState::*;
        for (q, expected) in [
            (No, false),
            (Yes, true),
            (WantNoEmpty, false),
            (WantNoOpposite, false),
            (WantYesEmpty, false),
            (WantYesOpposite, false),
        ] {
            let st = state(false, false, q, q);
            assert_eq!(st.enabled_for_them(), expected, "{q:?}");
            assert_eq!(st.enabled_for_us(), expected, "{q:?}");
        }
    }

    #[test]
    fn negotiation_events_reach_the_table() {
        let ctx = Context::new();
        let sends = capture_sends(&ctx);
        ctx.options().allow(OPT, true, true);
        let cases: Vec<(u8, u8, Vec<u8>)> = vec![
            (DO, OPT, vec![IAC, WILL, OPT]),
            (WILL, OPT, vec![IAC, DO, OPT]),
            (
                DO,
                consts::option::SUPPRESS_GO_AHEAD,
                vec![IAC, WONT, consts::option::SUPPRESS_GO_AHEAD],
            ),
            (
                WILL,
                consts::option::SUPPRESS_GO_AHEAD,
                vec![IAC, DONT, consts::option::SUPPRESS_GO_AHEAD],
            ),
        ];
        for (cmd, opt, expected) in cases {
            sends.lock().unwrap().clear();
            ctx.dispatch(Event::negotiation(cmd, opt)).unwrap();
            assert_eq!(sends.lock().unwrap().as_slice(), &[expected]);
        }
    }

    #[test]
    fn option_change_emitted_when_state_flips() {
        use QState::*;
        let cases: Vec<(OptionState, u8, OptionState, bool, bool)> = vec![
            (state(true, false, No, No), WILL, state(true, false, Yes, No), true, false),
            (
                state(true, false, WantNoOpposite, No),
                WILL,
                state(true, false, Yes, No),
                true,
                false,
            ),
            (
                state(true, false, WantYesEmpty, No),
                WILL,
                state(true, false, Yes, No),
                true,
                false,
            ),
            (state(false, true, No, No), DO, state(false, true, No, Yes), false, true),
            (
                state(false, true, No, WantNoOpposite),
                DO,
                state(false, true, No, Yes),
                false,
                true,
            ),
            (
                state(false, true, No, WantYesEmpty),
                DO,
                state(false, true, No, Yes),
                false,
                true,
            ),
            (state(false, false, Yes, No), WONT, state(false, false, No, No), true, false),
            (state(false, false, No, Yes), DONT, state(false, false, No, No), false, true),
        ];
        for (i, (start, cmd, end, changed_them, changed_us)) in cases.into_iter().enumerate() {
            let ctx = Context::new();
            let seen = Arc::new(Mutex::new(None));
            let seen2 = Arc::clone(&seen);
            ctx.bus().listen_fn(EVENT_OPTION, move |_, ev| {
                if let Payload::OptionChange(change) = &ev.payload {
                    *seen2.lock().unwrap() = Some(*change);
                }
                Ok(())
            });
            ctx.options().set(start);
            ctx.options().receive(&ctx, cmd, OPT).unwrap();
            let change = seen.lock().unwrap().expect("option event");
            assert_eq!(change.state, end, "case {i}");
            assert_eq!(change.changed_them, changed_them, "case {i}");
            assert_eq!(change.changed_us, changed_us, "case {i}");
        }
    }

    #[test]
    fn repeated_do_is_idempotent() {
        let ctx = Context::new();
        let sends = capture_sends(&ctx);
        ctx.options().allow(OPT, false, true);
        ctx.dispatch(Event::negotiation(DO, OPT)).unwrap();
        assert_eq!(sends.lock().unwrap().len(), 1);
        ctx.dispatch(Event::negotiation(DO, OPT)).unwrap();
        ctx.dispatch(Event::negotiation(DO, OPT)).unwrap();
        assert_eq!(sends.lock().unwrap().len(), 1, "already-Yes DO answered again");
        assert!(ctx.options().get(OPT).enabled_for_us());
    }

    #[test]
    fn no_enable_without_allow() {
        let ctx = Context::new();
        for _ in 0..8 {
            ctx.dispatch(Event::negotiation(DO, OPT)).unwrap();
        }
        assert!(!ctx.options().get(OPT).enabled_for_us());
        assert_eq!(ctx.options().get(OPT).us, QState::No);
    }
}
