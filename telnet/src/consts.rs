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

//! Wire-level constants for the TELNET protocol (RFC 854/855/885/2066).

/// NUL, used by the `CR NUL` newline form.
pub const NUL: u8 = 0x00;
/// ASCII SUB, substituted for bytes a 7-bit channel cannot carry.
pub const SUB: u8 = 0x1A;
/// Carriage return.
pub const CR: u8 = b'\r';
/// Line feed.
pub const LF: u8 = b'\n';

/// End of Record (RFC 885).
pub const EOR: u8 = 239;
/// Subnegotiation End.
pub const SE: u8 = 240;
/// No Operation.
pub const NOP: u8 = 241;
/// Data Mark.
pub const DM: u8 = 242;
/// Break.
pub const BRK: u8 = 243;
/// Interrupt Process.
pub const IP: u8 = 244;
/// Abort Output.
pub const AO: u8 = 245;
/// Are You There.
pub const AYT: u8 = 246;
/// Erase Character.
pub const EC: u8 = 247;
/// Erase Line.
pub const EL: u8 = 248;
/// Go Ahead.
pub const GA: u8 = 249;
/// Subnegotiation Begin.
pub const SB: u8 = 250;
/// Option negotiation: sender offers to perform an option.
pub const WILL: u8 = 251;
/// Option negotiation: sender refuses to perform an option.
pub const WONT: u8 = 252;
/// Option negotiation: sender asks the peer to perform an option.
pub const DO: u8 = 253;
/// Option negotiation: sender asks the peer to stop performing an option.
pub const DONT: u8 = 254;
/// Interpret As Command; introduces every TELNET control sequence.
pub const IAC: u8 = 255;

/// TELNET option numbers.
pub mod option {
    /// Transmit-Binary (RFC 856).
    pub const TRANSMIT_BINARY: u8 = 0;
    /// Echo (RFC 857).
    pub const ECHO: u8 = 1;
    /// Suppress Go Ahead (RFC 858).
    pub const SUPPRESS_GO_AHEAD: u8 = 3;
    /// End of Record (RFC 885).
    pub const END_OF_RECORD: u8 = 25;
    /// Charset (RFC 2066).
    pub const CHARSET: u8 = 42;
}

/// RFC 2066 Charset subnegotiation command codes.
pub mod charset {
    /// REQUEST: sender proposes a separator-delimited list of charsets.
    pub const REQUEST: u8 = 1;
    /// ACCEPTED: sender accepts one charset from a prior REQUEST.
    pub const ACCEPTED: u8 = 2;
    /// REJECTED: no proposed charset was acceptable.
    pub const REJECTED: u8 = 3;
    /// TTABLE-IS: sender transmits a translation table.
    pub const TTABLE_IS: u8 = 4;
    /// TTABLE-REJECTED: receiver cannot use the translation table.
    pub const TTABLE_REJECTED: u8 = 5;
    /// TTABLE-ACK: receiver accepted the translation table.
    pub const TTABLE_ACK: u8 = 6;
    /// TTABLE-NAK: receiver asks for the translation table again.
    pub const TTABLE_NAK: u8 = 7;
}
