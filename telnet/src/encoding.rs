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

//! Character-encoding layer applied to the cleaned byte stream.
//!
//! Two independent transformers sit between the protocol engine and the
//! caller: the read side decodes wire bytes into UTF-8, the write side
//! encodes caller bytes for the wire. Both start out as [`TextEncoding::Ascii`]
//! and can be swapped at any time; a swap only affects bytes processed after
//! it.

use crate::consts;
use crate::result::{TelnetError, TelnetResult};

/// A character encoding for one direction of the stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextEncoding {
    /// US-ASCII: bytes above 0x7F are replaced with ASCII SUB.
    Ascii,
    /// Identity: bytes pass through untouched.
    Binary,
    /// A named charset, transcoded to and from UTF-8.
    Charset(&'static encoding_rs::Encoding),
}

impl TextEncoding {
    /// UTF-8.
    pub fn utf8() -> TextEncoding {
        TextEncoding::Charset(encoding_rs::UTF_8)
    }

    /// Resolve an IANA charset name, erroring when nothing matches.
    pub fn for_iana_name(name: &str) -> TelnetResult<TextEncoding> {
        TextEncoding::for_label(name.as_bytes()).ok_or_else(|| TelnetError::UnknownEncoding {
            name: name.to_string(),
        })
    }

    /// Resolve an IANA charset label.
    ///
    /// `US-ASCII` maps to the engine's own [`TextEncoding::Ascii`]; every
    /// other label goes through the WHATWG registry, which is a superset of
    /// the common IANA names (note that `ISO-8859-1` resolves to its
    /// windows-1252 superset there).
    pub fn for_label(label: &[u8]) -> Option<TextEncoding> {
        if label == b"US-ASCII" {
            return Some(TextEncoding::Ascii);
        }
        encoding_rs::Encoding::for_label(label).map(TextEncoding::Charset)
    }

    /// The name to put on the wire in a charset subnegotiation.
    ///
    /// [`TextEncoding::Binary`] is an internal transform with no registry
    /// name and cannot be requested.
    pub fn iana_name(&self) -> Option<&'static str> {
        match self {
            TextEncoding::Ascii => Some("US-ASCII"),
            TextEncoding::Binary => None,
            TextEncoding::Charset(enc) => Some(enc.name()),
        }
    }
}

fn substitute_non_ascii(input: &[u8]) -> Vec<u8> {
    input
        .iter()
        .map(|&b| if b < 0x80 { b } else { consts::SUB })
        .collect()
}

/// Streaming wire-to-caller transform.
pub(crate) struct ReadTransform {
    encoding: TextEncoding,
    decoder: Option<encoding_rs::Decoder>,
}

impl ReadTransform {
    pub(crate) fn new(encoding: TextEncoding) -> ReadTransform {
        let decoder = match encoding {
            TextEncoding::Charset(enc) => Some(enc.new_decoder()),
            _ => None,
        };
        ReadTransform { encoding, decoder }
    }

    pub(crate) fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Transform one chunk of cleaned wire bytes. `last` flushes any state
    /// a multi-byte sequence left behind.
    pub(crate) fn transform(&mut self, input: &[u8], last: bool) -> Vec<u8> {
        match self.encoding {
            TextEncoding::Binary => input.to_vec(),
            TextEncoding::Ascii => substitute_non_ascii(input),
            TextEncoding::Charset(_) => {
                let Some(decoder) = self.decoder.as_mut() else {
                    return input.to_vec();
                };
                let mut out = String::with_capacity(
                    decoder
                        .max_utf8_buffer_length(input.len())
                        .unwrap_or(input.len() * 3 + 4),
                );
                let mut pos = 0;
                loop {
                    let (result, read, _) = decoder.decode_to_string(&input[pos..], &mut out, last);
                    pos += read;
                    match result {
                        encoding_rs::CoderResult::InputEmpty => break,
                        encoding_rs::CoderResult::OutputFull => {
                            out.reserve(64.max(input.len() - pos));
                        }
                    }
                }
                out.into_bytes()
            }
        }
    }
}

/// Streaming caller-to-wire transform.
pub(crate) struct WriteTransform {
    encoding: TextEncoding,
    encoder: Option<encoding_rs::Encoder>,
    // Trailing bytes of an incomplete UTF-8 sequence split across writes.
    carry: Vec<u8>,
}

impl WriteTransform {
    pub(crate) fn new(encoding: TextEncoding) -> WriteTransform {
        let encoder = match encoding {
            TextEncoding::Charset(enc) => Some(enc.new_encoder()),
            _ => None,
        };
        WriteTransform {
            encoding,
            encoder,
            carry: Vec::new(),
        }
    }

    pub(crate) fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub(crate) fn transform(&mut self, input: &[u8]) -> Vec<u8> {
        match self.encoding {
            TextEncoding::Binary => input.to_vec(),
            TextEncoding::Ascii => substitute_non_ascii(input),
            TextEncoding::Charset(_) => self.encode_chunk(input),
        }
    }

    fn encode_chunk(&mut self, input: &[u8]) -> Vec<u8> {
        let Some(encoder) = self.encoder.as_mut() else {
            return input.to_vec();
        };
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(input);
        let text: std::borrow::Cow<'_, str> = match std::str::from_utf8(&bytes) {
            Ok(s) => std::borrow::Cow::Borrowed(s),
            Err(e) if e.error_len().is_none() => {
                // Incomplete sequence at the end; hold it for the next write.
                let valid = e.valid_up_to();
                self.carry = bytes[valid..].to_vec();
                match std::str::from_utf8(&bytes[..valid]) {
                    Ok(s) => std::borrow::Cow::Owned(s.to_string()),
                    Err(_) => return Vec::new(),
                }
            }
            Err(_) => String::from_utf8_lossy(&bytes).into_owned().into(),
        };
        let mut out = Vec::with_capacity(text.len() + 16);
        let mut buf = [0u8; 1024];
        let mut rest: &str = &text;
        loop {
            let (result, read, written) =
                encoder.encode_from_utf8_without_replacement(rest, &mut buf, false);
            out.extend_from_slice(&buf[..written]);
            rest = &rest[read..];
            match result {
                encoding_rs::EncoderResult::InputEmpty => break,
                encoding_rs::EncoderResult::OutputFull => {}
                encoding_rs::EncoderResult::Unmappable(_) => out.push(consts::SUB),
            }
        }
        out
    }
}
