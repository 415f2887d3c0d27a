// Copyright 2026 rfchat contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Chat wire protocol.
//!
//! Each frame is UTF-8 text terminated by a single `\n`. Reads on a stream
//! may split or merge frames arbitrarily, so incoming bytes go through a
//! [`FrameDecoder`] before they are interpreted.

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Frame terminator.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Longest frame accepted, delimiter excluded.
pub const MAX_FRAME_LEN: usize = 2048;

/// Reserved frames with protocol meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    Ping,
    Pong,
    /// Ends the session; the receiver closes the connection.
    Bye,
}

impl ControlFrame {
    /// Parse from frame text. Exact match only.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "Ping" => Some(Self::Ping),
            "Pong" => Some(Self::Pong),
            "Bye" => Some(Self::Bye),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "Ping",
            Self::Pong => "Pong",
            Self::Bye => "Bye",
        }
    }
}

/// Encode `text` as one frame of at most `max_frame_len` bytes.
///
/// Carriage returns are refused as well as newlines, since the decoder
/// strips a trailing `\r` and the peer would read different text.
pub fn encode_frame(text: &str, max_frame_len: usize) -> Result<Vec<u8>> {
    if text.bytes().any(|b| b == FRAME_DELIMITER || b == b'\r') {
        return Err(Error::InvalidFrame {
            reason: "text contains a line break".to_string(),
        });
    }
    if text.len() > max_frame_len {
        return Err(Error::InvalidFrame {
            reason: format!("{} bytes exceeds limit of {}", text.len(), max_frame_len),
        });
    }

    let mut frame = Vec::with_capacity(text.len() + 1);
    frame.extend_from_slice(text.as_bytes());
    frame.push(FRAME_DELIMITER);
    Ok(frame)
}

/// Splits a byte stream back into frames.
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_len: usize,
    discarding: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            max_frame_len,
            discarding: false,
        }
    }

    /// Feed received bytes; returns every frame they complete, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();

        for chunk in bytes.split_inclusive(|b| *b == FRAME_DELIMITER) {
            let complete = chunk.last() == Some(&FRAME_DELIMITER);
            let body = if complete {
                &chunk[..chunk.len() - 1]
            } else {
                chunk
            };

            if !self.discarding {
                self.buffer.extend_from_slice(body);
                if self.buffer.len() > self.max_frame_len {
                    warn!(
                        "Frame exceeds {} bytes, discarding until next delimiter",
                        self.max_frame_len
                    );
                    self.buffer.clear();
                    self.discarding = true;
                }
            }

            if complete {
                if self.discarding {
                    self.discarding = false;
                } else {
                    frames.push(self.take_frame());
                }
            }
        }

        frames
    }

    /// Bytes of an incomplete frame held back.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn take_frame(&mut self) -> String {
        let mut raw = std::mem::take(&mut self.buffer);
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        let text = String::from_utf8_lossy(&raw).into_owned();
        debug!("Frame complete: {} bytes", text.len());
        text
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
