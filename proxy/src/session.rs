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

//! Downstream and upstream session plumbing.
//!
//! A downstream client authenticates, picks a named upstream with
//! `upstream <key>`, optionally queues `send <line>` commands, and finally
//! issues `connect <addr>`. Upstream sessions are shared: every downstream
//! attached to the same key sees the same live stream, and a late attacher
//! is caught up from the on-disk transcript.

use crate::config::ProxyConfig;
use crate::history::HistoryLog;
use crate::logging::EventLogHandler;
use dashmap::DashMap;
use mudgate_telnet::consts::option;
use mudgate_telnet::{
    wrap, CharsetHandler, Payload, TelnetConnection, TelnetError, TelnetResult, TextEncoding,
    TransmitBinaryHandler, EVENT_OPTION,
};
use std::sync::Arc;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// The connection type every proxy session runs over.
pub type TcpTelnet = TelnetConnection<ReadHalf<TcpStream>, WriteHalf<TcpStream>>;

/// One TELNET endpoint with the proxy's standard handlers attached.
///
/// Both directions get Transmit-Binary and Charset handling plus protocol
/// event tracing; whenever CHARSET comes up on our side the peer is asked
/// to move the session to UTF-8.
#[derive(Clone)]
pub struct Peer {
    conn: Arc<TcpTelnet>,
}

impl Peer {
    pub fn new(socket: TcpStream, server_role: bool) -> TelnetResult<Peer> {
        let conn = Arc::new(wrap(socket));
        let charset = CharsetHandler::new(server_role);
        let _ = conn.register_handler(Arc::new(EventLogHandler::new()))?;
        let _ = conn.register_handler(Arc::new(TransmitBinaryHandler::new()))?;
        let _ = conn.register_handler(Arc::new(charset.clone()))?;
        conn.context().bus().listen_fn(EVENT_OPTION, move |ctx, ev| {
            if let Payload::OptionChange(change) = &ev.payload {
                if change.state.option == option::CHARSET
                    && change.changed_us
                    && change.state.enabled_for_us()
                {
                    charset.request_encoding(ctx, &[TextEncoding::utf8()])?;
                }
            }
            Ok(())
        });
        Ok(Peer { conn })
    }

    /// Ask for the full option suite on both sides and push the requests
    /// out.
    pub async fn negotiate_options(&self) -> TelnetResult<()> {
        let ctx = self.conn.context();
        for opt in [
            option::SUPPRESS_GO_AHEAD,
            option::END_OF_RECORD,
            option::TRANSMIT_BINARY,
            option::CHARSET,
        ] {
            ctx.options().allow(opt, true, true);
            ctx.options().enable_for_them(&ctx, opt)?;
            ctx.options().enable_for_us(&ctx, opt)?;
        }
        self.conn.flush().await
    }

    pub async fn read(&self, dst: &mut [u8]) -> TelnetResult<usize> {
        self.conn.read(dst).await
    }

    pub async fn write(&self, src: &[u8]) -> TelnetResult<usize> {
        self.conn.write(src).await
    }

    pub async fn write_line(&self, text: &str) -> TelnetResult<()> {
        self.conn.write(format!("{text}\n").as_bytes()).await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> TelnetResult<()> {
        self.conn.shutdown().await
    }
}

/// Split a command line into its verb and the remainder.
pub fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(' ') {
        Some((command, rest)) => (command, rest),
        None => (line, ""),
    }
}

/// Line scanner over a peer's cleaned stream.
pub struct LineReader {
    peer: Peer,
    buffer: Vec<u8>,
    eof: bool,
}

impl LineReader {
    pub fn new(peer: Peer) -> LineReader {
        LineReader {
            peer,
            buffer: Vec::new(),
            eof: false,
        }
    }

    /// The next line, without its terminator; `None` once the client is
    /// gone. A final unterminated line is still delivered.
    pub async fn next_line(&mut self) -> TelnetResult<Option<String>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            if self.eof {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.buffer);
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            let mut chunk = [0u8; 512];
            match self.peer.read(&mut chunk).await {
                Ok(0) => {}
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(TelnetError::EndOfStream) => self.eof = true,
                Err(e) => return Err(e),
            }
        }
    }

    /// Whatever arrived after the last delivered line.
    pub fn into_rest(self) -> Vec<u8> {
        self.buffer
    }
}

/// Registry of shared upstream sessions, keyed by name.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<UpstreamSession>>,
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        SessionRegistry {
            sessions: DashMap::new(),
        }
    }

    /// The session for `key`, creating an unconnected one on first use.
    pub fn get_or_create(&self, key: &str) -> Arc<UpstreamSession> {
        self.sessions
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(UpstreamSession::new(key.to_string())))
            .clone()
    }

    pub fn remove(&self, key: &str) {
        self.sessions.remove(key);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        SessionRegistry::new()
    }
}

#[derive(Default)]
struct UpstreamInner {
    peer: Option<Peer>,
    sinks: Vec<mpsc::UnboundedSender<Vec<u8>>>,
    history: Option<HistoryLog>,
}

/// One shared upstream connection and its attachments.
pub struct UpstreamSession {
    key: String,
    inner: Mutex<UpstreamInner>,
}

impl UpstreamSession {
    fn new(key: String) -> UpstreamSession {
        UpstreamSession {
            key,
            inner: Mutex::new(UpstreamInner::default()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Attach a downstream sink; it receives every relayed chunk until the
    /// session tears down or the sink's task goes away.
    pub async fn attach(&self, sink: mpsc::UnboundedSender<Vec<u8>>) {
        self.inner.lock().await.sinks.push(sink);
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.peer.is_some()
    }

    /// The transcript tail a newly attached downstream should see.
    pub async fn replay(&self) -> Option<Vec<u8>> {
        let inner = self.inner.lock().await;
        let history = inner.history.as_ref()?;
        match history.replay().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(key = %self.key, error = %e, "history replay failed");
                None
            }
        }
    }

    /// Dial the upstream, negotiate, and start relaying to the attached
    /// sinks and the transcript.
    pub async fn connect(
        self: Arc<Self>,
        addr: &str,
        config: &ProxyConfig,
        registry: Arc<SessionRegistry>,
    ) -> TelnetResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.peer.is_some() {
            return Ok(());
        }
        let history = HistoryLog::open(&config.log_dir, &self.key, config.history_size).await?;
        debug!(key = %self.key, path = %history.path().display(), "transcript opened");
        let socket = TcpStream::connect(addr).await?;
        let peer = Peer::new(socket, false)?;
        peer.negotiate_options().await?;
        inner.history = Some(history);
        inner.peer = Some(peer.clone());
        drop(inner);

        tokio::spawn(async move {
            self.run_forever(peer, registry).await;
        });
        Ok(())
    }

    /// Forward caller bytes to the upstream connection, if there is one.
    pub async fn write_bytes(&self, bytes: &[u8]) -> TelnetResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let peer = self.inner.lock().await.peer.clone();
        if let Some(peer) = peer {
            peer.write(bytes).await?;
        }
        Ok(())
    }

    async fn run_forever(self: Arc<Self>, peer: Peer, registry: Arc<SessionRegistry>) {
        debug!(key = %self.key(), "upstream connected");
        let mut buf = [0u8; 4096];
        loop {
            match peer.read(&mut buf).await {
                Ok(0) => {}
                Ok(n) => self.fan_out(&buf[..n]).await,
                Err(TelnetError::EndOfStream) => break,
                Err(e) => {
                    warn!(key = %self.key, error = %e, "upstream read failed");
                    break;
                }
            }
        }
        registry.remove(&self.key);
        self.teardown().await;
        debug!(key = %self.key, "upstream disconnected");
    }

    async fn fan_out(&self, bytes: &[u8]) {
        let mut inner = self.inner.lock().await;
        inner.sinks.retain(|sink| sink.send(bytes.to_vec()).is_ok());
        if let Some(history) = inner.history.as_mut() {
            if let Err(e) = history.append(bytes).await {
                warn!(key = %self.key, error = %e, "history write failed");
            }
        }
    }

    async fn teardown(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(peer) = inner.peer.take() {
            let _ = peer.shutdown().await;
        }
        if let Some(history) = inner.history.take() {
            if let Err(e) = history.close().await {
                warn!(key = %self.key, error = %e, "history close failed");
            }
        }
        // Dropping the senders lets every downstream writer task wind down.
        inner.sinks.clear();
    }
}

fn spawn_downstream_writer(peer: Peer) -> mpsc::UnboundedSender<Vec<u8>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if peer.write(&bytes).await.is_err() {
                break;
            }
        }
    });
    tx
}

/// Drive one downstream client from accept to disconnect.
pub async fn run_downstream(
    registry: Arc<SessionRegistry>,
    config: Arc<ProxyConfig>,
    socket: TcpStream,
) -> TelnetResult<()> {
    let peer = Peer::new(socket, true)?;
    peer.negotiate_options().await?;
    let mut lines = LineReader::new(peer.clone());

    match lines.next_line().await? {
        Some(line) if line == format!("login {}", config.password) => {}
        _ => {
            debug!("authentication failed");
            return Ok(());
        }
    }

    let Some(session) = select_upstream(&peer, &mut lines, &registry, &config).await? else {
        return Ok(());
    };

    // Anything the client pipelined behind `connect` belongs upstream.
    let rest = lines.into_rest();
    if !rest.is_empty() {
        session.write_bytes(&rest).await?;
    }
    let mut buf = [0u8; 4096];
    loop {
        match peer.read(&mut buf).await {
            Ok(0) => {}
            Ok(n) => session.write_bytes(&buf[..n]).await?,
            Err(TelnetError::EndOfStream) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// The pre-connect command loop: `upstream`, `send`, `connect`.
///
/// Returns the connected session, or `None` when the client left or a
/// command failed terminally.
async fn select_upstream(
    peer: &Peer,
    lines: &mut LineReader,
    registry: &Arc<SessionRegistry>,
    config: &Arc<ProxyConfig>,
) -> TelnetResult<Option<Arc<UpstreamSession>>> {
    let mut upstream: Option<Arc<UpstreamSession>> = None;
    let mut send_buffer = String::new();
    while let Some(line) = lines.next_line().await? {
        let (command, rest) = split_command(&line);
        match command {
            "connect" => {
                let Some(session) = upstream else {
                    peer.write_line("you must select an upstream to connect").await?;
                    return Ok(None);
                };
                let addr = rest.trim();
                peer.write_line(&format!("connecting to {addr}...")).await?;
                if let Err(e) = Arc::clone(&session)
                    .connect(addr, config, Arc::clone(registry))
                    .await
                {
                    peer.write_line(&format!("error connecting ({addr}): {e}"))
                        .await?;
                    return Ok(None);
                }
                session.write_bytes(send_buffer.as_bytes()).await?;
                return Ok(Some(session));
            }
            "send" => {
                send_buffer.push_str(rest);
                send_buffer.push('\n');
            }
            "upstream" => {
                let session = registry.get_or_create(rest.trim());
                session.attach(spawn_downstream_writer(peer.clone())).await;
                if session.is_connected().await {
                    if let Some(history) = session.replay().await {
                        peer.write(&history).await?;
                    }
                    return Ok(Some(session));
                }
                upstream = Some(session);
            }
            _ => {
                peer.write_line(&format!("unrecognized command: {line}"))
                    .await?;
            }
        }
    }
    Ok(None)
}
