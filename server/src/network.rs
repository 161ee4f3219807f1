//! Server network layer handling UDP communications and the session event loop

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::notifier::{Delivery, Outbound};
use crate::session::Session;
use crate::utils::now_millis;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ConnectionId, Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Told to an address that has no connection, e.g. after it timed out
pub const NOT_CONNECTED_REASON: &str = "Not connected";

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        connection_id: ConnectionId,
    },
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum OutboundMessage {
    Send {
        packet: Packet,
        addrs: Vec<SocketAddr>,
    },
}

/// Serializes a packet and checks it fits in one datagram
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, ServerError> {
    let data = serialize(packet)?;
    if data.len() > MAX_PACKET_SIZE {
        return Err(ServerError::Oversized(data.len()));
    }
    Ok(data)
}

/// Main server coordinating networking and the polling session
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    session: Session,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout,
            ))),
            session: Session::new(),
            config,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sender half of the main loop channel; sending `Shutdown` stops `run`
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::Send { packet, addrs } => {
                        let data = match encode_packet(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Dropping {} packet: {}", packet.kind(), e);
                                continue;
                            }
                        };

                        for addr in addrs {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send {} to {}: {}", packet.kind(), addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for connection_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { connection_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    fn send_packet(&self, packet: Packet, addrs: Vec<SocketAddr>) {
        if let Err(e) = self.outbound_tx.send(OutboundMessage::Send { packet, addrs }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Processes one incoming packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let connection_id = {
            let mut clients = self.clients.write().await;
            let id = clients.find_client_by_addr(addr);
            if let Some(id) = id {
                clients.touch(id);
            }
            id
        };

        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    let reason = "Protocol version mismatch".to_string();
                    self.send_packet(Packet::Disconnected { reason }, vec![addr]);
                    return;
                }

                // Remove existing connection if present
                if let Some(existing_id) = connection_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.clients.write().await.remove_client(&existing_id);
                    self.session.disconnect(existing_id);
                }

                let new_id = self.clients.write().await.add_client(addr);

                match new_id {
                    Some(connection_id) => {
                        self.send_packet(Packet::Connected { connection_id }, vec![addr]);
                        self.session.connect(connection_id);
                    }
                    None => {
                        let reason = "Server full".to_string();
                        self.send_packet(Packet::Disconnected { reason }, vec![addr]);
                    }
                }
            }

            Packet::Heartbeat => {
                if connection_id.is_none() {
                    debug!("Heartbeat from unknown address {}", addr);
                    self.reject_unconnected(addr);
                }
            }

            Packet::Disconnect => {
                if let Some(connection_id) = connection_id {
                    self.clients.write().await.remove_client(&connection_id);
                    self.session.disconnect(connection_id);
                }
            }

            other => match connection_id {
                Some(connection_id) => {
                    self.session.handle_packet(connection_id, other, now_millis());
                }
                None => {
                    warn!("Ignoring {} from unconnected address {}", other.kind(), addr);
                    self.reject_unconnected(addr);
                }
            },
        }
    }

    /// Lets a client whose connection is gone know it has to connect again
    fn reject_unconnected(&self, addr: SocketAddr) {
        let reason = NOT_CONNECTED_REASON.to_string();
        self.send_packet(Packet::Disconnected { reason }, vec![addr]);
    }

    /// Resolves queued session output to addresses and hands it to the sender.
    ///
    /// Items are resolved in order, so a packet queued before a close still
    /// reaches the connection being closed.
    async fn flush_outbox(&mut self) {
        let outbox = self.session.drain_outbox();
        if outbox.is_empty() {
            return;
        }

        let clients = Arc::clone(&self.clients);
        let mut clients = clients.write().await;

        for item in outbox {
            match item {
                Outbound::Send { delivery, packet } => {
                    let addrs: Vec<SocketAddr> = match delivery {
                        Delivery::To(connection_id) => {
                            clients.addr_of(connection_id).into_iter().collect()
                        }
                        _ => clients
                            .get_client_addrs()
                            .into_iter()
                            .filter(|(id, _)| delivery.includes(*id))
                            .map(|(_, addr)| addr)
                            .collect(),
                    };

                    if addrs.is_empty() {
                        debug!("No recipients for {}", packet.kind());
                        continue;
                    }
                    self.send_packet(packet, addrs);
                }
                Outbound::Close { connection_id } => {
                    clients.remove_client(&connection_id);
                }
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.config.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { connection_id }) => {
                            info!("Client {} timed out", connection_id);
                            self.session.disconnect(connection_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                    self.flush_outbox().await;
                },

                // Housekeeping ticks
                _ = tick_interval.tick() => {
                    tick += 1;

                    if self.config.auto_end_expired_polls {
                        if let Some(poll_id) = self.session.expire_polls(now_millis()) {
                            info!("Countdown for {} ran out", poll_id);
                        }
                        self.flush_outbox().await;
                    }

                    if tick % 600 == 0 {
                        let client_count = self.clients.read().await.len();
                        debug!(
                            "Tick {}: {} clients, {} participants, {} polls in history",
                            tick,
                            client_count,
                            self.session.registry().len(),
                            self.session.history().len()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}
