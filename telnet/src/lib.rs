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

//! # Mudgate TELNET Protocol Engine
//!
//! A duplex TELNET byte-stream engine for servers and proxies that speak to
//! text-based multi-user servers (RFC 854, 855, 858, 885, 1143, 2066).
//!
//! ## Overview
//!
//! [`wrap`] turns a raw bidirectional transport into a [`TelnetConnection`]
//! that presents a cleaned, encoded byte stream:
//!
//! - **Read path**: raw bytes → command decoder (strips IAC sequences,
//!   normalizes CR forms, publishes protocol events) → read-side encoding
//!   transform → caller's buffer.
//! - **Write path**: caller bytes → write-side encoding transform → escape
//!   encoder (doubled IAC, RFC 854 newline forms, EOR/GA trailers) → one
//!   transport write.
//!
//! Every in-band occurrence is published on the connection's [`EventBus`]:
//! negotiation commands, subnegotiation payloads, option transitions,
//! record boundaries, and the raw bytes the engine itself needs to emit.
//! The [`OptionTable`] runs one RFC 1143 Q-method state machine per option
//! and answers inbound DO/DONT/WILL/WONT on its own; everything an
//! application opts into goes through a [`Handler`] registered on the
//! connection.
//!
//! Two handlers ship with the engine: [`TransmitBinaryHandler`] (RFC 856),
//! which flips the encoding layer between ASCII and the identity transform,
//! and [`CharsetHandler`] (RFC 2066), which negotiates a named character
//! encoding and applies it once the channel is 8-bit clean.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mudgate_telnet::{consts, CharsetHandler, TransmitBinaryHandler};
//! use std::sync::Arc;
//! use tokio::net::TcpStream;
//!
//! # async fn example() -> mudgate_telnet::TelnetResult<()> {
//! let socket = TcpStream::connect("mud.example.net:4000").await?;
//! let conn = mudgate_telnet::wrap(socket);
//!
//! let charset = CharsetHandler::new(false);
//! let _ = conn.register_handler(Arc::new(TransmitBinaryHandler::new()))?;
//! let _ = conn.register_handler(Arc::new(charset.clone()))?;
//!
//! let ctx = conn.context();
//! ctx.options().allow(consts::option::SUPPRESS_GO_AHEAD, true, true);
//! ctx.options().enable_for_us(&ctx, consts::option::SUPPRESS_GO_AHEAD)?;
//! conn.flush().await?;
//!
//! let mut buf = [0u8; 4096];
//! let n = conn.read(&mut buf).await?;
//! conn.write(&buf[..n]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! A connection is meant to be driven by one reader task and one writer
//! task; the two directions are locked independently. All events decoded
//! from one `read` call dispatch synchronously within that call, in input
//! order, and listeners may re-enter the bus and the option table freely.

#![warn(missing_docs, future_incompatible, rust_2018_idioms)]

mod binary;
mod charset;
mod connection;
pub mod consts;
mod decoder;
mod encoder;
mod encoding;
mod event;
mod handler;
mod options;
mod result;

pub use self::binary::TransmitBinaryHandler;
pub use self::charset::CharsetHandler;
pub use self::connection::{wrap, Context, TelnetConnection};
pub use self::encoding::TextEncoding;
pub use self::event::{
    CharsetData, Event, EventBus, EventName, Listener, ListenerId, Negotiation, OptionChange,
    Payload, Subnegotiation, EVENT_CHARSET_ACCEPTED, EVENT_CHARSET_REJECTED, EVENT_END_OF_RECORD,
    EVENT_GO_AHEAD, EVENT_NEGOTIATION, EVENT_OPTION, EVENT_SEND, EVENT_SUBNEGOTIATION,
};
pub use self::handler::{Handler, HandlerRegistration};
pub use self::options::{OptionState, OptionTable, QState};
pub use self::result::{TelnetError, TelnetResult};
