//! # Ward Console Adapter
//!
//! A [`ChatClient`](ward_core::ChatClient) that turns the terminal into a
//! one-channel guild, for running a Ward host without a platform account.
//!
//! ```text
//! stdin line ──▶ PlatformEvent::Message ──▶ Ward ──▶ send_message ──▶ stdout
//! "/react <message id> <emoji>" ──▶ PlatformEvent::ReactionAdd
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ward_adapter_console::ConsoleClient;
//!
//! let client = Arc::new(ConsoleClient::new("dev-guild"));
//! let ward = Arc::new(Ward::new(client, guild_config));
//! ward.run().await?;
//! ```
//!
//! Every message the bot sends is printed with its id so it can be the
//! target of `/react` and `/unreact`.

pub mod client;
pub mod input;

pub use client::{CONSOLE_CHANNEL, ConsoleClient};
pub use input::{ConsoleLine, parse_line};
