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

//! Point-to-point RFCOMM chat.
//!
//! One peer listens, the other dials, and the two exchange newline-framed
//! text (`Ping`, `Pong`, free text) until either side sends `Bye`.

pub mod bluetooth;
pub mod chat;
pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
