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

//! Rolling per-key on-disk transcripts.
//!
//! Each upstream session appends everything it relays to a dated log file,
//! bracketed by opened/closed banners. A downstream that attaches while the
//! session is live gets the transcript tail replayed, cut to start just
//! after the most recent opened banner so stale context from earlier runs
//! does not leak in.

use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

const BANNER_OPENED: &str = "--------------- opened";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

fn banner(kind: &str) -> String {
    format!(
        "--------------- {} {} ---------------\n",
        kind,
        Local::now().format(TIME_FORMAT)
    )
}

/// Append-only transcript for one session key.
pub struct HistoryLog {
    file: File,
    path: PathBuf,
    limit: u64,
}

impl HistoryLog {
    /// Open (or continue) today's transcript for `key` and stamp an opened
    /// banner.
    pub async fn open(dir: &Path, key: &str, limit: u64) -> std::io::Result<HistoryLog> {
        let name = format!("{}-{}.log", Local::now().format("%Y-%m-%d"), key);
        let path = dir.join(name);
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await?;
        file.write_all(banner("opened").as_bytes()).await?;
        file.flush().await?;
        Ok(HistoryLog { file, path, limit })
    }

    /// The file the transcript is written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append relayed bytes.
    pub async fn append(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.write_all(bytes).await?;
        self.file.flush().await
    }

    /// Stamp a closed banner and release the file.
    pub async fn close(mut self) -> std::io::Result<()> {
        self.file.write_all(banner("closed").as_bytes()).await?;
        self.file.flush().await
    }

    /// The transcript tail a new attachment should see: at most `limit`
    /// bytes, starting just after the most recent opened banner.
    pub async fn replay(&self) -> std::io::Result<Vec<u8>> {
        let data = tokio::fs::read(&self.path).await?;
        let start = data.len().saturating_sub(self.limit as usize);
        let mut tail = &data[start..];
        // A banner at the very start of the window marks a fresh run with
        // nothing before it; only strip when there is stale context ahead
        // of the banner.
        if let Some(idx) = find_last(tail, BANNER_OPENED.as_bytes()) {
            if idx > 0 {
                tail = &tail[idx..];
                if let Some(nl) = tail.iter().position(|&b| b == b'\n') {
                    tail = &tail[nl + 1..];
                }
            }
        }
        Ok(tail.to_vec())
    }
}

fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}
