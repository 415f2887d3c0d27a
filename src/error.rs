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

//! Error types for the connection and chat layers.
//!
//! | Category | Variants |
//! |----------|----------|
//! | Authorization | [`Error::PermissionDenied`], [`Error::RadioUnavailable`] |
//! | Connection | [`Error::Transport`], [`Error::NotConnected`], [`Error::EndOfStream`], [`Error::Cancelled`] |
//! | Usage | [`Error::InvalidState`], [`Error::InvalidFrame`] |
//! | Configuration | [`Error::Config`] |

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::bluetooth::ConnectionState;

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The caller lacks radio authorization.
    #[error("Bluetooth permissions not granted")]
    PermissionDenied,

    /// The local radio is switched off or unsupported.
    #[error("Bluetooth radio is off or unsupported")]
    RadioUnavailable,

    /// Accept, connect, read or write failed.
    #[error("Transport error: {0}")]
    Transport(#[from] IoError),

    /// Send or receive attempted outside the Established state.
    #[error("Not connected")]
    NotConnected,

    /// The peer closed the stream.
    #[error("Peer closed the connection")]
    EndOfStream,

    /// A pending operation was interrupted by `close()`.
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation invoked from a state that does not allow it.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// Name of the rejected operation.
        operation: &'static str,
        /// State the manager was in.
        state: ConnectionState,
    },

    /// Text that cannot be carried in a single frame.
    #[error("Invalid frame: {reason}")]
    InvalidFrame {
        /// Why the frame was rejected.
        reason: String,
    },

    /// Configuration could not be loaded or saved.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

impl Error {
    /// Whether this error means the stream is gone for good.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::NotConnected | Self::EndOfStream | Self::Cancelled
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Error::NotConnected.to_string(), "Not connected");
        let err = Error::InvalidState {
            operation: "dial",
            state: ConnectionState::Listening,
        };
        assert_eq!(err.to_string(), "Cannot dial while Listening");
    }

    #[test]
    fn test_io_conversion() {
        let io = IoError::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: Error = io.into();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.is_disconnect());
        assert!(!Error::PermissionDenied.is_disconnect());
    }
}
