//! # Classroom Poll Client Library
//!
//! This library provides a terminal client for the live polling session.
//! The same binary serves both roles: a presenter authors and ends polls
//! and may remove participants, a respondent answers the poll on screen.
//!
//! ## Architecture Overview
//!
//! The server is authoritative for everything. The client keeps a local
//! mirror of what it has been told and renders it as text:
//!
//! ### Commands Module (`commands`)
//! Turns stdin lines into commands. Poll definitions are validated locally
//! with the same rules the server applies, so typos are reported before a
//! round trip.
//!
//! ### View Module (`view`)
//! Folds server packets into the local session view: the current poll and
//! its results, the advisory countdown, the submitted flag, the participant
//! list and the poll history.
//!
//! ### Display Module (`display`)
//! Plain-text rendering of polls, results bars, participants and history.
//!
//! ### Network Module (`network`)
//! The UDP client loop: connect and register, one-second heartbeats (which
//! also drive the countdown), incoming packets and user input multiplexed
//! with `tokio::select!`.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use shared::Role;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:8080", Role::Respondent, "ana").await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod display;
pub mod network;
pub mod view;

pub use commands::CommandError;
pub use network::ClientError;
