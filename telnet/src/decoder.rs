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

//! Byte-level ingest: strips TELNET command sequences out of the raw
//! stream, normalizes CR forms, and publishes protocol events.

use crate::connection::Context;
use crate::consts;
use crate::event::Event;
use crate::result::TelnetResult;
use bytes::{BufMut, BytesMut};
use tracing::{trace, warn};

#[derive(Clone, Copy, Debug)]
enum DecodeState {
    /// Plain data.
    Byte,
    /// Saw a bare CR; the next byte picks the newline form.
    CarriageReturn,
    /// Saw IAC; the next byte is a command.
    Iac,
    /// Saw IAC DO/DONT/WILL/WONT; the next byte is the option.
    OptionNegotiation,
    /// Inside an SB payload.
    Subnegotiation,
    /// Saw IAC inside an SB payload.
    SubnegotiationIac,
}

/// Streaming TELNET decoder.
///
/// The state machine advances one byte at a time, so any split of the input
/// across successive calls produces identical output and events. Data bytes
/// (including unescaped `IAC IAC`) land in `dst`; everything else turns into
/// events on the connection's bus, dispatched in input order.
pub(crate) struct TelnetDecoder {
    state: DecodeState,
    cmd: u8,
    sbdata: BytesMut,
}

impl TelnetDecoder {
    pub(crate) fn new() -> TelnetDecoder {
        TelnetDecoder {
            state: DecodeState::Byte,
            cmd: 0,
            sbdata: BytesMut::new(),
        }
    }

    pub(crate) fn decode(
        &mut self,
        ctx: &Context,
        input: &[u8],
        dst: &mut BytesMut,
    ) -> TelnetResult<()> {
        dst.reserve(input.len());
        for &byte in input {
            match (self.state, byte) {
                (DecodeState::Byte, consts::IAC) => {
                    self.state = DecodeState::Iac;
                }
                (DecodeState::Byte, consts::CR) => {
                    self.state = DecodeState::CarriageReturn;
                }
                (DecodeState::Byte, b) => {
                    dst.put_u8(b);
                }
                (DecodeState::CarriageReturn, consts::NUL) => {
                    dst.put_u8(consts::CR);
                    self.state = DecodeState::Byte;
                }
                (DecodeState::CarriageReturn, consts::LF) => {
                    dst.put_u8(consts::LF);
                    self.state = DecodeState::Byte;
                }
                (DecodeState::CarriageReturn, _) => {
                    // Lenient: servers in the wild send bare CR followed by
                    // arbitrary bytes; both are dropped.
                    self.state = DecodeState::Byte;
                }
                (
                    DecodeState::Iac,
                    consts::DO | consts::DONT | consts::WILL | consts::WONT,
                ) => {
                    self.cmd = byte;
                    self.state = DecodeState::OptionNegotiation;
                }
                (DecodeState::Iac, consts::EOR) => {
                    self.state = DecodeState::Byte;
                    ctx.dispatch(Event::end_of_record())?;
                }
                (DecodeState::Iac, consts::GA) => {
                    self.state = DecodeState::Byte;
                    ctx.dispatch(Event::go_ahead())?;
                }
                (DecodeState::Iac, consts::SB) => {
                    self.sbdata.clear();
                    self.state = DecodeState::Subnegotiation;
                }
                (DecodeState::Iac, consts::IAC) => {
                    dst.put_u8(consts::IAC);
                    self.state = DecodeState::Byte;
                }
                (DecodeState::Iac, cmd) => {
                    // NOP, DM, BRK, IP, AO, AYT, EC, EL and anything unknown
                    // carry no payload here.
                    trace!(cmd, "discarding two-byte command");
                    self.state = DecodeState::Byte;
                }
                (DecodeState::OptionNegotiation, opt) => {
                    self.state = DecodeState::Byte;
                    ctx.dispatch(Event::negotiation(self.cmd, opt))?;
                }
                (DecodeState::Subnegotiation, consts::IAC) => {
                    self.state = DecodeState::SubnegotiationIac;
                }
                (DecodeState::Subnegotiation, b) => {
                    self.sbdata.put_u8(b);
                }
                (DecodeState::SubnegotiationIac, consts::IAC) => {
                    self.sbdata.put_u8(consts::IAC);
                    self.state = DecodeState::Subnegotiation;
                }
                (DecodeState::SubnegotiationIac, consts::SE) => {
                    self.state = DecodeState::Byte;
                    if self.sbdata.is_empty() {
                        warn!("subnegotiation closed without an option byte");
                    } else {
                        let opt = self.sbdata[0];
                        let data = self.sbdata[1..].to_vec();
                        ctx.dispatch(Event::subnegotiation(opt, data))?;
                    }
                }
                (DecodeState::SubnegotiationIac, b) => {
                    // RFC 855 requires SE after IAC inside SB. Drop the
                    // payload and resynchronize rather than buffering an
                    // unterminated subnegotiation forever.
                    warn!(byte = b, "invalid command inside subnegotiation, dropping payload");
                    self.sbdata.clear();
                    self.state = DecodeState::Byte;
                }
            }
        }
        Ok(())
    }

    /// Discard any partial sequence at end-of-stream: an unterminated
    /// subnegotiation and a trailing CR are both dropped.
    pub(crate) fn finish(&mut self) {
        self.sbdata.clear();
        self.state = DecodeState::Byte;
    }
}
