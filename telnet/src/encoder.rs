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

//! Byte-level egress: escapes outgoing data and appends the record and
//! go-ahead trailers the negotiated options call for.

use crate::connection::Context;
use crate::consts;
use bytes::{BufMut, BytesMut};

/// Escape one write's payload into `out`.
///
/// IAC is doubled, LF becomes CR LF, and a bare CR becomes CR NUL (the two
/// RFC 854 newline forms). An `IAC EOR` trailer follows when End-of-Record
/// is enabled for us, then an `IAC GA` unless Suppress-Go-Ahead is; the
/// option table is consulted on every call.
pub(crate) fn encode_payload(ctx: &Context, src: &[u8], out: &mut BytesMut) {
    out.reserve(src.len() * 2 + 4);
    for &byte in src {
        match byte {
            consts::IAC => {
                out.put_u8(consts::IAC);
                out.put_u8(consts::IAC);
            }
            consts::LF => {
                out.put_u8(consts::CR);
                out.put_u8(consts::LF);
            }
            consts::CR => {
                out.put_u8(consts::CR);
                out.put_u8(consts::NUL);
            }
            b => out.put_u8(b),
        }
    }
    if ctx
        .get_option(consts::option::END_OF_RECORD)
        .enabled_for_us()
    {
        out.put_u8(consts::IAC);
        out.put_u8(consts::EOR);
    }
    if !ctx
        .get_option(consts::option::SUPPRESS_GO_AHEAD)
        .enabled_for_us()
    {
        out.put_u8(consts::IAC);
        out.put_u8(consts::GA);
    }
}
