//! # Classroom Poll Server Library
//!
//! This library provides the authoritative coordinator for a live classroom
//! polling session. One presenter opens multiple-choice polls, respondents
//! answer them in real time, and every connected view is kept in sync with
//! the current poll, the participant list and the session history.
//!
//! ## Core Responsibilities
//!
//! ### Participant Registry
//! Tracks who is in the session and under which role. Respondents are
//! identified by name, so a respondent whose connection drops and comes back
//! keeps their place (and their answer) under the new connection.
//!
//! ### Poll Lifecycle
//! At most one poll occupies the current-poll slot. A new poll may only be
//! opened when the slot is empty or every registered respondent has answered
//! the poll occupying it.
//!
//! ### Aggregation and Fan-out
//! Answers are validated, recorded once per respondent, and tallied into
//! per-option counts and percentages. Every state change is queued for the
//! right audience: the requester only, everyone but the requester, or
//! everyone.
//!
//! ### Session History
//! Every poll created during the process lifetime is kept, in creation
//! order, and delivered to each newly connected view.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! All session state lives in one [`session::Session`] owned by the network
//! loop. Inbound packets are applied one at a time and the queued output is
//! flushed after each event, so the creation gate and the mutation it guards
//! can never interleave with another request.
//!
//! ### UDP-Based Communication
//! Uses a single UDP socket with bincode-encoded [`shared::Packet`]s. Clients
//! keep their connection alive with heartbeats; silent connections are timed
//! out and treated as disconnects.
//!
//! ## Module Organization
//!
//! - `registry`: participants, roles, reconnect merging, kicks
//! - `poll` / `lifecycle`: the poll entity and the current-poll slot
//! - `aggregator`: submission checks and all-answered evaluation
//! - `notifier`: delivery classes and the outbound queue
//! - `history`: append-only record of created polls
//! - `session`: the operations tying the above together
//! - `client_manager` / `network`: transport connections and the event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:8080".to_string(),
//!         ..ServerConfig::default()
//!     };
//!     let mut server = Server::new(config).await?;
//!
//!     // Runs until a Shutdown message arrives:
//!     // - receives and applies client requests one at a time
//!     // - fans the resulting packets out to the right connections
//!     // - times out silent connections
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod client_manager;
pub mod config;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod network;
pub mod notifier;
pub mod poll;
pub mod registry;
pub mod session;
pub mod utils;
