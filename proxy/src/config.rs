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

//! Proxy configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::warn;

/// Default tail of transcript replayed to a freshly attached downstream,
/// about 256 lines of text.
pub const DEFAULT_HISTORY_SIZE: u64 = 20 * 1024;

/// Proxy configuration
///
/// Loaded from the environment (`MUDGATE_ADDR`, `MUDGATE_PASSWORD`,
/// `MUDGATE_LOGDIR`) with `--addr`, `--password` and `--logdir` argument
/// overrides, or built programmatically through the `with_*` methods.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address the downstream listener binds to.
    pub listen_addr: String,

    /// Shared secret every downstream must present in its `login` line.
    pub password: String,

    /// Directory the per-key transcript files are written into.
    pub log_dir: PathBuf,

    /// Upper bound on the transcript tail replayed to a new attachment.
    pub history_size: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4001".to_string(),
            password: String::new(),
            log_dir: PathBuf::from("."),
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from the process environment and arguments.
    pub fn from_env() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        if let Ok(value) = std::env::var("MUDGATE_ADDR") {
            if !value.is_empty() {
                config.listen_addr = value;
            }
        }
        if let Ok(value) = std::env::var("MUDGATE_PASSWORD") {
            if !value.is_empty() {
                config.password = value;
            }
        }
        if let Ok(value) = std::env::var("MUDGATE_LOGDIR") {
            if !value.is_empty() {
                config.log_dir = PathBuf::from(value);
            }
        }
        config.apply_args(std::env::args().skip(1));
        config
    }

    /// Apply `--addr`, `--password` and `--logdir` argument pairs.
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--addr" => {
                    if let Some(value) = args.next() {
                        self.listen_addr = value;
                    }
                }
                "--password" => {
                    if let Some(value) = args.next() {
                        self.password = value;
                    }
                }
                "--logdir" => {
                    if let Some(value) = args.next() {
                        self.log_dir = PathBuf::from(value);
                    }
                }
                other => warn!(argument = other, "ignoring unrecognized argument"),
            }
        }
    }

    /// Set the listen address.
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Set the shared password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the transcript directory.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Set the replayed transcript bound.
    pub fn with_history_size(mut self, size: u64) -> Self {
        self.history_size = size;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(format!("listen address {:?} is not host:port", self.listen_addr));
        }
        if self.password.is_empty() {
            return Err("password must be set (MUDGATE_PASSWORD or --password)".to_string());
        }
        if self.history_size == 0 {
            return Err("history_size must be greater than 0".to_string());
        }
        Ok(())
    }
}
