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

//! The per-connection protocol engine.
//!
//! [`TelnetConnection`] wraps a raw byte transport and presents a cleaned,
//! encoded duplex stream. On the read path, raw bytes run through the
//! command decoder (which publishes protocol events and strips control
//! sequences) and then through the read-side encoding transform. On the
//! write path, caller bytes run through the write-side transform and the
//! escape encoder before a single transport write.
//!
//! Handlers and listeners never touch the transport. Anything that must go
//! out on the wire is published as a send event; the connection queues
//! those bytes and drains the queue on the next `read`, `write` or
//! [`flush`](TelnetConnection::flush).

use crate::decoder::TelnetDecoder;
use crate::encoder;
use crate::encoding::{ReadTransform, TextEncoding, WriteTransform};
use crate::event::{Event, EventBus, Payload, EVENT_NEGOTIATION, EVENT_SEND};
use crate::handler::{Handler, HandlerRegistration};
use crate::options::{OptionState, OptionTable};
use crate::result::{TelnetError, TelnetResult};
use bytes::{Buf, BytesMut};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex as AsyncMutex;

const READ_CHUNK: usize = 4096;

/// Shared environment of one connection.
///
/// The context is the handle through which handlers and listeners reach the
/// event bus, the option table, and the per-direction encoding layer. It is
/// cheap to clone and remains valid for the life of the connection.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    bus: EventBus,
    options: OptionTable,
    read_transform: Mutex<ReadTransform>,
    write_transform: Mutex<WriteTransform>,
    outbox: Mutex<Vec<u8>>,
}

impl Context {
    /// Build a context with the protocol wiring in place: inbound
    /// negotiation events feed the option table, and send events queue
    /// their bytes for the transport. Both directions start out ASCII.
    pub fn new() -> Context {
        let ctx = Context {
            inner: Arc::new(ContextInner {
                bus: EventBus::new(),
                options: OptionTable::new(),
                read_transform: Mutex::new(ReadTransform::new(TextEncoding::Ascii)),
                write_transform: Mutex::new(WriteTransform::new(TextEncoding::Ascii)),
                outbox: Mutex::new(Vec::new()),
            }),
        };
        ctx.bus().listen_fn(EVENT_NEGOTIATION, |ctx, ev| {
            if let Payload::Negotiation(n) = &ev.payload {
                ctx.options().receive(ctx, n.cmd, n.opt)
            } else {
                Ok(())
            }
        });
        ctx.bus().listen_fn(EVENT_SEND, |ctx, ev| {
            if let Payload::Raw(bytes) = &ev.payload {
                ctx.push_outbox(bytes);
            }
            Ok(())
        });
        ctx
    }

    /// The connection's event bus.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// The connection's option table.
    pub fn options(&self) -> &OptionTable {
        &self.inner.options
    }

    /// Snapshot the state of one option.
    pub fn get_option(&self, opt: u8) -> OptionState {
        self.inner.options.get(opt)
    }

    /// Dispatch an event on the bus.
    pub fn dispatch(&self, ev: Event) -> TelnetResult<()> {
        self.inner.bus.dispatch(self, &ev)
    }

    /// Swap the wire-to-caller encoding.
    pub fn set_read_encoding(&self, encoding: TextEncoding) {
        let mut transform = self
            .inner
            .read_transform
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *transform = ReadTransform::new(encoding);
    }

    /// Swap the caller-to-wire encoding.
    pub fn set_write_encoding(&self, encoding: TextEncoding) {
        let mut transform = self
            .inner
            .write_transform
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *transform = WriteTransform::new(encoding);
    }

    /// Swap both directions at once.
    pub fn set_encoding(&self, encoding: TextEncoding) {
        self.set_read_encoding(encoding);
        self.set_write_encoding(encoding);
    }

    /// The current wire-to-caller encoding.
    pub fn read_encoding(&self) -> TextEncoding {
        self.inner
            .read_transform
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .encoding()
    }

    /// The current caller-to-wire encoding.
    pub fn write_encoding(&self) -> TextEncoding {
        self.inner
            .write_transform
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .encoding()
    }

    pub(crate) fn transform_read(&self, input: &[u8], last: bool) -> Vec<u8> {
        self.inner
            .read_transform
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .transform(input, last)
    }

    pub(crate) fn transform_write(&self, input: &[u8]) -> Vec<u8> {
        self.inner
            .write_transform
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .transform(input)
    }

    pub(crate) fn push_outbox(&self, bytes: &[u8]) {
        self.inner
            .outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
    }

    pub(crate) fn take_outbox(&self) -> Vec<u8> {
        std::mem::take(
            &mut *self
                .inner
                .outbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

struct ConnReader<R> {
    transport: R,
    decoder: TelnetDecoder,
    cleaned: BytesMut,
    pending: BytesMut,
    scratch: Box<[u8]>,
    eof: bool,
}

struct ConnWriter<W> {
    transport: W,
}

/// A TELNET protocol engine over a split byte transport.
///
/// `read` and `write` guard their direction independently, so one reader
/// task and one writer task may share the connection through an `Arc`.
pub struct TelnetConnection<R, W> {
    ctx: Context,
    reader: AsyncMutex<ConnReader<R>>,
    writer: AsyncMutex<ConnWriter<W>>,
}

/// Wrap a bidirectional transport into a [`TelnetConnection`].
pub fn wrap<T>(transport: T) -> TelnetConnection<ReadHalf<T>, WriteHalf<T>>
where
    T: AsyncRead + AsyncWrite,
{
    let (reader, writer) = tokio::io::split(transport);
    TelnetConnection::from_split(reader, writer)
}

impl<R, W> TelnetConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Build a connection from independent read and write halves.
    pub fn from_split(reader: R, writer: W) -> TelnetConnection<R, W> {
        TelnetConnection {
            ctx: Context::new(),
            reader: AsyncMutex::new(ConnReader {
                transport: reader,
                decoder: TelnetDecoder::new(),
                cleaned: BytesMut::new(),
                pending: BytesMut::new(),
                scratch: vec![0u8; READ_CHUNK].into_boxed_slice(),
                eof: false,
            }),
            writer: AsyncMutex::new(ConnWriter { transport: writer }),
        }
    }

    /// The connection's shared environment.
    pub fn context(&self) -> Context {
        self.ctx.clone()
    }

    /// Snapshot the state of one option.
    pub fn get_option(&self, opt: u8) -> OptionState {
        self.ctx.get_option(opt)
    }

    /// Attach an option handler, returning a guard that detaches it again.
    pub fn register_handler(&self, handler: Arc<dyn Handler>) -> TelnetResult<HandlerRegistration> {
        handler.register(&self.ctx)?;
        Ok(HandlerRegistration::new(self.ctx.clone(), handler))
    }

    /// Read cleaned, decoded data bytes into `dst`.
    ///
    /// A single call consumes at most one transport read, dispatches the
    /// events decoded from it in input order, forwards any negotiation
    /// answers to the transport, and returns however many data bytes are
    /// ready — `Ok(0)` when the input was all protocol. There is no
    /// relation between the transport read size and the count returned;
    /// undelivered bytes are buffered for subsequent calls.
    ///
    /// When the transport reaches end-of-stream, data decoded before it is
    /// delivered first; once drained, every further call returns
    /// [`TelnetError::EndOfStream`]. A zero-length `dst` is a no-op until
    /// then.
    pub async fn read(&self, dst: &mut [u8]) -> TelnetResult<usize> {
        let mut guard = self.reader.lock().await;
        let r = &mut *guard;
        if r.pending.is_empty() {
            if r.eof {
                return Err(TelnetError::EndOfStream);
            }
            if dst.is_empty() {
                return Ok(0);
            }
            let n = r.transport.read(&mut r.scratch).await?;
            if n == 0 {
                r.eof = true;
                r.decoder.finish();
                let tail = self.ctx.transform_read(&[], true);
                r.pending.extend_from_slice(&tail);
                if r.pending.is_empty() {
                    return Err(TelnetError::EndOfStream);
                }
            } else {
                r.cleaned.clear();
                let decoded = r.decoder.decode(&self.ctx, &r.scratch[..n], &mut r.cleaned);
                let transformed = self.ctx.transform_read(&r.cleaned, false);
                r.pending.extend_from_slice(&transformed);
                self.flush_outbox().await?;
                // A failing listener aborts this call, but the data decoded
                // before it stays buffered for the next one.
                decoded?;
            }
        }
        let n = dst.len().min(r.pending.len());
        dst[..n].copy_from_slice(&r.pending[..n]);
        r.pending.advance(n);
        Ok(n)
    }

    /// Write caller bytes to the transport.
    ///
    /// The payload runs through the write-side encoding and the command
    /// escaper, picks up the EOR/GA trailers the option table calls for,
    /// and goes out in one transport write together with any queued
    /// negotiation bytes. The returned count is the number of caller bytes
    /// consumed, always `src.len()` on success.
    pub async fn write(&self, src: &[u8]) -> TelnetResult<usize> {
        let mut w = self.writer.lock().await;
        let mut out = BytesMut::with_capacity(src.len() * 2 + 8);
        let queued = self.ctx.take_outbox();
        out.extend_from_slice(&queued);
        let encoded = self.ctx.transform_write(src);
        encoder::encode_payload(&self.ctx, &encoded, &mut out);
        w.transport.write_all(&out).await?;
        w.transport.flush().await?;
        Ok(src.len())
    }

    /// Drain queued negotiation bytes to the transport.
    pub async fn flush(&self) -> TelnetResult<()> {
        self.flush_outbox().await
    }

    /// Shut down the write half of the transport.
    pub async fn shutdown(&self) -> TelnetResult<()> {
        let mut w = self.writer.lock().await;
        w.transport.shutdown().await?;
        Ok(())
    }

    /// Tear the connection apart, returning the transport halves.
    pub fn into_parts(self) -> (R, W) {
        (
            self.reader.into_inner().transport,
            self.writer.into_inner().transport,
        )
    }

    async fn flush_outbox(&self) -> TelnetResult<()> {
        let queued = self.ctx.take_outbox();
        if queued.is_empty() {
            return Ok(());
        }
        let mut w = self.writer.lock().await;
        w.transport.write_all(&queued).await?;
        w.transport.flush().await?;
        Ok(())
    }
}
