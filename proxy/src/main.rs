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

//! # Mudgate
//!
//! A TELNET-speaking reverse proxy for text-based multi-user servers.
//! Downstream clients authenticate, pick a named upstream, and join a
//! shared session that relays a single upstream connection to every
//! attached client, with a rolling on-disk transcript for late joiners.

mod config;
mod history;
mod logging;
mod session;

use crate::config::ProxyConfig;
use crate::session::SessionRegistry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ProxyConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        std::process::exit(1);
    }
    let config = Arc::new(config);
    let registry = Arc::new(SessionRegistry::new());

    let listener = match TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.listen_addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(addr = %config.listen_addr, "started");

    loop {
        match listener.accept().await {
            Ok((socket, peer_addr)) => {
                let registry = Arc::clone(&registry);
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    debug!(client = %peer_addr, "connected");
                    if let Err(e) = session::run_downstream(registry, config, socket).await {
                        debug!(client = %peer_addr, error = %e, "session error");
                    }
                    debug!(client = %peer_addr, "disconnected");
                });
            }
            Err(e) => error!(error = %e, "error accepting connection"),
        }
    }
}
