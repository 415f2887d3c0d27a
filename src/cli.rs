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

//! Command line interface.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use rfchat::config::TransportKind;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file. Defaults to the user config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the transport from the configuration file.
    #[arg(long, value_enum, global = true)]
    pub transport: Option<TransportArg>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wait for one peer to connect, then chat as the server.
    Listen(ListenArgs),
    /// Connect to a listening peer, then chat as the client.
    Dial(DialArgs),
    /// Look for nearby peers.
    Scan(ScanArgs),
    /// Run a scripted exchange between two in-process peers.
    Demo,
}

#[derive(Args, Debug, Clone)]
pub struct ListenArgs {
    /// Socket address to bind when using the TCP transport.
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args, Debug, Clone)]
pub struct DialArgs {
    /// Peer to dial: a Bluetooth address for rfcomm, host:port for tcp.
    pub address: String,
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Scan window in milliseconds.
    #[arg(long)]
    pub duration_ms: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportArg {
    Rfcomm,
    Tcp,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Rfcomm => Self::Rfcomm,
            TransportArg::Tcp => Self::Tcp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dial() {
        let cli = Cli::try_parse_from(["rfchat", "--transport", "tcp", "dial", "127.0.0.1:5959"])
            .unwrap();
        assert_eq!(cli.transport, Some(TransportArg::Tcp));
        match cli.command {
            Command::Dial(args) => assert_eq!(args.address, "127.0.0.1:5959"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_listen_and_scan() {
        let cli = Cli::try_parse_from(["rfchat", "listen", "--bind", "0.0.0.0:0"]).unwrap();
        assert!(matches!(cli.command, Command::Listen(ListenArgs { bind: Some(_) })));

        let cli = Cli::try_parse_from(["rfchat", "scan", "--duration-ms", "500"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Scan(ScanArgs {
                duration_ms: Some(500)
            })
        ));

        assert!(Cli::try_parse_from(["rfchat", "dial"]).is_err());
    }
}
