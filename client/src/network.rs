use crate::commands::{self, Command};
use crate::display;
use crate::view::{SessionView, Update};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, Role, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// Heartbeat ticks between `Connect` attempts while no handshake completed
const CONNECT_RETRY_TICKS: u32 = 3;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet encoding failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("invalid server address: {0}")]
    Address(#[from] std::net::AddrParseError),
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    view: SessionView,
    history_requested: bool,
    /// Heartbeat ticks since the last `Connect` went out unanswered
    ticks_unconnected: u32,
}

impl Client {
    pub async fn new(server_addr: &str, role: Role, name: &str) -> Result<Self, ClientError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            view: SessionView::new(role, name),
            history_requested: false,
            ticks_unconnected: 0,
        })
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    async fn connect(&mut self) -> Result<(), ClientError> {
        info!("Connecting to server...");
        self.ticks_unconnected = 0;

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ClientError> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Applies a server packet; returns false once the session is over
    ///
    /// Losing an established connection is not the end: the client connects
    /// again and re-registers under the same name. A refused handshake is.
    async fn handle_packet(&mut self, packet: Packet) -> Result<bool, ClientError> {
        let was_connected = self.view.is_connected();
        let update = self.view.apply(packet);

        if let Update::Connected(_) = update {
            let register = Packet::Register {
                role: self.view.role,
                name: self.view.name.clone(),
            };
            self.send_packet(&register).await?;
        }

        if update == Update::History && self.history_requested {
            self.history_requested = false;
            println!("{}", display::render_history(&self.view.history));
        }

        if let Some(text) = display::render_update(&update, &self.view) {
            println!("{}", text);
        }

        match update {
            Update::Kicked(_) => Ok(false),
            Update::Disconnected(reason) if was_connected => {
                warn!("Server dropped the connection: {}", reason);
                println!("Connection lost, reconnecting as {}...", self.view.name);
                self.connect().await?;
                Ok(true)
            }
            Update::Disconnected(_) => Ok(false),
            _ => Ok(true),
        }
    }

    /// Heartbeat while connected, `Connect` retries while not
    async fn keep_alive(&mut self) -> Result<(), ClientError> {
        if self.view.is_connected() {
            return self.send_packet(&Packet::Heartbeat).await;
        }
        self.ticks_unconnected += 1;
        if self.ticks_unconnected >= CONNECT_RETRY_TICKS {
            debug!("No handshake yet, retrying");
            self.connect().await?;
        }
        Ok(())
    }

    /// Runs one user command; returns false when the user quits
    async fn execute(&mut self, command: Command) -> Result<bool, ClientError> {
        let presenter = self.view.role == Role::Presenter;

        match command {
            Command::CreatePoll(spec) if presenter => {
                self.send_packet(&Packet::CreatePoll(spec)).await?;
            }
            Command::EndPoll if presenter => self.send_packet(&Packet::EndPoll).await?,
            Command::Kick(target) if presenter => {
                self.send_packet(&Packet::KickParticipant { target }).await?;
            }
            Command::CreatePoll(_) | Command::EndPoll | Command::Kick(_) => {
                println!("Only the presenter can do that");
            }
            Command::Answer(_) if presenter => println!("Presenters do not answer polls"),
            Command::Answer(choice) => {
                if self.view.is_submitted {
                    println!("You already answered this poll");
                    return Ok(true);
                }
                match self.view.resolve_answer(&choice) {
                    Ok(option) => {
                        debug!("Submitting '{}'", option);
                        self.send_packet(&Packet::SubmitAnswer { option }).await?;
                    }
                    Err(e) => println!("{}", e),
                }
            }
            Command::History => {
                self.history_requested = true;
                self.send_packet(&Packet::GetPollHistory).await?;
            }
            Command::Who => println!("{}", display::render_participants(&self.view.participants)),
            Command::Chat(text) => {
                let packet = Packet::SendMessage {
                    sender: self.view.name.clone(),
                    text,
                };
                self.send_packet(&packet).await?;
            }
            Command::Quit => return Ok(false),
        }

        Ok(true)
    }

    pub async fn run(&mut self) -> Result<(), ClientError> {
        self.connect().await?;

        let mut heartbeat_interval = interval(Duration::from_secs(1));
        let mut lines = BufReader::new(stdin()).lines();
        let mut buffer = vec![0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, addr)) => {
                            if addr != self.server_addr {
                                debug!("Ignoring datagram from {}", addr);
                                continue;
                            }
                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => {
                                    if !self.handle_packet(packet).await? {
                                        return Ok(());
                                    }
                                }
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if let Err(e) = self.keep_alive().await {
                        error!("Error sending heartbeat: {}", e);
                    }
                    if self.view.tick() {
                        println!("Time is up");
                    }
                },

                line = lines.next_line() => {
                    match line? {
                        Some(line) => match commands::parse(&line) {
                            Ok(Some(command)) => {
                                if !self.execute(command).await? {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => println!("{}", e),
                        },
                        None => break,
                    }
                },
            }
        }

        if self.view.is_connected() {
            self.send_packet(&Packet::Disconnect).await?;
        }

        Ok(())
    }
}
