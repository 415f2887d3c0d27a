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

//! rfchat terminal client

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use rfchat::bluetooth::{
    scan_for, Authorizer, ConnectionManager, Discovery, MemoryEther, PeerAddress,
    StaticAuthorizer, Transport, TcpTransport,
};
use rfchat::chat::{ChatSession, Message, Role, SessionEvent};
use rfchat::config::{Config, TransportKind};
use rfchat::events::EventProcessor;
use rfchat::Error;

/// Transport plus the discovery it offers, if any.
struct Stack {
    transport: Arc<dyn Transport>,
    discovery: Option<Arc<dyn Discovery>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for the chat.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("rfchat=info".parse()?))
        .init();

    info!("Starting rfchat v{}...", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    if let Some(transport) = cli.transport {
        config.bluetooth.transport = transport.into();
    }
    info!("Configuration loaded (transport: {})", config.bluetooth.transport);

    let authorizer: Arc<dyn Authorizer> = Arc::new(StaticAuthorizer::granted());

    match cli.command {
        Command::Listen(args) => {
            if let Some(bind) = args.bind {
                config.bluetooth.tcp_bind = bind.to_string();
            }
            let stack = build_stack(&config, true).await?;
            let manager = Arc::new(manager_for(&config, &stack, authorizer));
            listen(manager.clone()).await?;
            run_chat(manager, Role::Server, &config).await
        }
        Command::Dial(args) => {
            let stack = build_stack(&config, false).await?;
            let manager = Arc::new(manager_for(&config, &stack, authorizer));
            dial(manager.clone(), PeerAddress::new(args.address)).await?;
            run_chat(manager, Role::Client, &config).await
        }
        Command::Scan(args) => {
            if let Some(ms) = args.duration_ms {
                config.bluetooth.scan_duration_ms = ms;
            }
            let stack = build_stack(&config, false).await?;
            scan(&config, &stack, authorizer.as_ref()).await
        }
        Command::Demo => run_demo(&config).await,
    }
}

async fn build_stack(config: &Config, discoverable: bool) -> Result<Stack> {
    match config.bluetooth.transport {
        TransportKind::Tcp => {
            let bind = config.tcp_bind()?;
            Ok(Stack {
                transport: Arc::new(TcpTransport::new(bind)),
                discovery: None,
            })
        }
        #[cfg(feature = "bluez")]
        TransportKind::Rfcomm => {
            let rfcomm = Arc::new(
                rfchat::bluetooth::RfcommTransport::new()
                    .await
                    .context("Failed to open Bluetooth adapter")?,
            );
            rfcomm.set_name(&config.bluetooth.device_alias).await?;
            if discoverable {
                rfcomm.make_discoverable().await?;
            }
            Ok(Stack {
                transport: rfcomm.clone(),
                discovery: Some(rfcomm),
            })
        }
        #[cfg(not(feature = "bluez"))]
        TransportKind::Rfcomm => {
            let _ = discoverable;
            bail!("rfcomm transport needs a build with `--features bluez`; use --transport tcp")
        }
    }
}

fn manager_for(config: &Config, stack: &Stack, authorizer: Arc<dyn Authorizer>) -> ConnectionManager {
    let mut manager = ConnectionManager::new(stack.transport.clone(), authorizer)
        .with_service(config.service())
        .with_read_buffer_size(config.chat.read_buffer_size);
    if let Some(discovery) = &stack.discovery {
        manager = manager.with_discovery(discovery.clone());
    }
    manager
}

/// Accept one peer, giving up on Ctrl+C.
async fn listen(manager: Arc<ConnectionManager>) -> Result<()> {
    manager
        .start_listening()
        .await
        .context("Failed to start listening")?;

    match manager.listening_address() {
        Some(addr) => println!("Listening for {} on {}", manager.service(), addr),
        None => println!("Listening for {}", manager.service()),
    }

    let accept = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.accept_one().await })
    };

    tokio::select! {
        res = accept => {
            let peer = res.context("Accept task failed")??;
            println!("Connected to {}", peer);
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted while waiting for a peer");
            manager.close();
            bail!("Stopped listening")
        }
    }
}

/// Connect to `peer`, giving up on Ctrl+C.
async fn dial(manager: Arc<ConnectionManager>, peer: PeerAddress) -> Result<()> {
    info!("Dialing {}...", peer);
    let dial = {
        let manager = manager.clone();
        let peer = peer.clone();
        tokio::spawn(async move { manager.dial(&peer).await })
    };

    tokio::select! {
        res = dial => {
            res.context("Dial task failed")?
                .with_context(|| format!("Failed to connect to {}", peer))?;
            println!("Connected to {}", peer);
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted while dialing {}", peer);
            manager.close();
            bail!("Stopped dialing")
        }
    }
}

async fn scan(config: &Config, stack: &Stack, authorizer: &dyn Authorizer) -> Result<()> {
    let Some(discovery) = &stack.discovery else {
        bail!("{} transport cannot scan for peers", stack.transport.name());
    };

    let paired = discovery.paired_peers().await?;
    if !paired.is_empty() {
        println!("Paired devices:");
        for peer in &paired {
            println!("  {}", peer);
        }
    }

    let found = scan_for(discovery.as_ref(), authorizer, config.scan_duration()).await?;
    println!("Discovered {} device(s):", found.len());
    for peer in &found {
        println!("  {}", peer);
    }
    Ok(())
}

/// Interactive chat until either side says goodbye.
async fn run_chat(manager: Arc<ConnectionManager>, role: Role, config: &Config) -> Result<()> {
    let mut session = ChatSession::start_with_max_frame_len(manager, role, config.chat.max_frame_len)?;
    let Some(mut events) = session.take_event_receiver() else {
        bail!("Session event receiver already taken");
    };
    let mut processor = EventProcessor::new(std::io::stdout());

    println!("Chatting as {}. Type /ping, /pong, /bye or any text.", role);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if !processor.process_event(event)? {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) => handle_input(&session, line.trim_end()).await,
                    None => {
                        stdin_open = false;
                        session.end().await.ok();
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, ending chat");
                if let Err(e) = session.end().await {
                    warn!("Failed to say goodbye: {}", e);
                }
                stdin_open = false;
            }
        }
    }

    info!("Chat finished with {} message(s)", session.transcript().len());
    Ok(())
}

async fn handle_input(session: &ChatSession, input: &str) {
    let result = match input {
        "" => return,
        "/ping" => session.send_ping().await,
        "/pong" => session.send_pong().await,
        "/bye" | "/quit" => session.end().await,
        text => session.send_text(text).await,
    };

    match result {
        Ok(()) => {}
        Err(Error::InvalidFrame { reason }) => println!("!! cannot send: {}", reason),
        // The session reports how it ended through its events.
        Err(e) if e.is_disconnect() => info!("Not sent: {}", e),
        Err(e) => error!("Send failed: {}", e),
    }
}

/// Scripted exchange between two in-process peers.
async fn run_demo(config: &Config) -> Result<()> {
    let ether = MemoryEther::new();
    let server_radio = Arc::new(ether.radio("00:00:00:00:00:01", "server"));
    let client_radio = Arc::new(ether.radio("00:00:00:00:00:02", "client"));
    let authorizer: Arc<dyn Authorizer> = Arc::new(StaticAuthorizer::granted());

    let listener = Arc::new(
        ConnectionManager::new(server_radio, authorizer.clone()).with_service(config.service()),
    );
    let dialer = Arc::new(
        ConnectionManager::new(client_radio.clone(), authorizer.clone())
            .with_discovery(client_radio.clone())
            .with_service(config.service()),
    );

    listener.start_listening().await?;
    let accept = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.accept_one().await })
    };

    let found = scan_for(client_radio.as_ref(), authorizer.as_ref(), Duration::from_millis(100)).await?;
    let Some(peer) = found.into_iter().next() else {
        bail!("Demo server not found on the memory radio");
    };
    println!("Found {}", peer);

    dialer.dial(&peer).await?;
    accept.await.context("Accept task failed")??;

    let mut server = ChatSession::start(listener, Role::Server)?;
    let mut client = ChatSession::start(dialer, Role::Client)?;
    let (Some(mut server_events), Some(mut client_events)) =
        (server.take_event_receiver(), client.take_event_receiver())
    else {
        bail!("Session event receiver already taken");
    };

    client.send_ping().await?;
    wait_for(&mut server_events, Role::Client, "Ping").await?;
    server.send_pong().await?;
    wait_for(&mut client_events, Role::Server, "Pong").await?;
    client.end().await?;
    tokio::time::timeout(Duration::from_secs(2), server.wait_ended())
        .await
        .context("Server never saw Bye")?;

    for (label, session) in [("server", &server), ("client", &client)] {
        println!("-- {} transcript", label);
        for message in session.transcript() {
            println!("{}", message);
        }
    }
    Ok(())
}

async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    origin: Role,
    text: &str,
) -> Result<()> {
    let expected = Message::new(origin, text);
    let wait = async {
        while let Some(event) = events.recv().await {
            if let SessionEvent::MessageAppended(message) = event {
                if message == expected {
                    return true;
                }
            }
        }
        false
    };

    match tokio::time::timeout(Duration::from_secs(2), wait).await {
        Ok(true) => Ok(()),
        _ => bail!("Did not receive {}", expected),
    }
}
