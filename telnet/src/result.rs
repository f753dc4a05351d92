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

//! Error types and result alias for protocol operations

/// Result type for protocol operations
pub type TelnetResult<T> = Result<T, TelnetError>;

/// Errors surfaced by the protocol engine
///
/// Event listeners return this type as well, so a failing listener
/// short-circuits dispatch and the error propagates out of the `read`
/// or `write` call that triggered it.
#[derive(Debug, thiserror::Error)]
pub enum TelnetError {
    /// An error from the underlying byte transport.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The transport reached end-of-stream.
    ///
    /// Returned by `read` on the call after the one that delivered the
    /// final data bytes.
    #[error("end of stream")]
    EndOfStream,

    /// An operation required an option that has not been negotiated on.
    #[error("option {option} not enabled")]
    OptionNotEnabled {
        /// The TELNET option number that was required.
        option: u8,
    },

    /// A character-set name did not resolve against the IANA registry.
    #[error("unknown encoding: {name}")]
    UnknownEncoding {
        /// The name that failed to resolve.
        name: String,
    },
}
