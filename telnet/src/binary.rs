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

//! Transmit-Binary option handler (RFC 856).

use crate::connection::Context;
use crate::consts::option::TRANSMIT_BINARY;
use crate::encoding::TextEncoding;
use crate::event::{ListenerId, Payload, EVENT_OPTION};
use crate::handler::Handler;
use crate::result::TelnetResult;
use std::sync::{Arc, Mutex, PoisonError};

/// Switches the encoding layer between ASCII and the identity transform as
/// the Transmit-Binary option flips, per direction.
///
/// The us side governs what we put on the wire, so it drives the write
/// encoding; the them side drives the read encoding. Unregistering disables
/// the option in both directions and resets the encoding layer to ASCII.
#[derive(Clone, Default)]
pub struct TransmitBinaryHandler {
    inner: Arc<BinaryInner>,
}

#[derive(Default)]
struct BinaryInner {
    listener: Mutex<Option<ListenerId>>,
}

impl TransmitBinaryHandler {
    /// A fresh, unregistered handler.
    pub fn new() -> TransmitBinaryHandler {
        TransmitBinaryHandler::default()
    }
}

impl Handler for TransmitBinaryHandler {
    fn register(&self, ctx: &Context) -> TelnetResult<()> {
        ctx.options().allow(TRANSMIT_BINARY, true, true);
        let id = ctx.bus().listen_fn(EVENT_OPTION, |ctx, ev| {
            if let Payload::OptionChange(change) = &ev.payload {
                if change.state.option == TRANSMIT_BINARY {
                    if change.changed_us {
                        ctx.set_write_encoding(if change.state.enabled_for_us() {
                            TextEncoding::Binary
                        } else {
                            TextEncoding::Ascii
                        });
                    }
                    if change.changed_them {
                        ctx.set_read_encoding(if change.state.enabled_for_them() {
                            TextEncoding::Binary
                        } else {
                            TextEncoding::Ascii
                        });
                    }
                }
            }
            Ok(())
        });
        *self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id);
        Ok(())
    }

    fn unregister(&self, ctx: &Context) -> TelnetResult<()> {
        if let Some(id) = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            ctx.bus().remove_listener(EVENT_OPTION, id);
        }
        ctx.options().allow(TRANSMIT_BINARY, false, false);
        ctx.options().disable_for_them(ctx, TRANSMIT_BINARY)?;
        ctx.options().disable_for_us(ctx, TRANSMIT_BINARY)?;
        ctx.set_encoding(TextEncoding::Ascii);
        Ok(())
    }
}
