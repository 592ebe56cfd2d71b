//! # Ward Core
//!
//! Platform-facing building blocks shared by every layer of the Ward bot
//! host:
//!
//! - **Platform collaborator**: the [`ChatClient`] trait through which the
//!   host connects, receives [`PlatformEvent`]s and talks back.
//! - **Model**: [`Message`], [`Member`], [`Guild`], [`Role`], [`Reaction`].
//! - **Time**: the [`Clock`] abstraction used for scheduling and backups.
//! - **In-memory platform**: [`MemoryClient`], for embedding and tests.
//!
//! ```text
//! ┌────────────┐  events   ┌──────────┐  hooks   ┌──────────┐
//! │ ChatClient │──────────▶│   Ward   │─────────▶│ Plugins  │
//! │ (platform) │◀──────────│ (runtime)│◀─────────│  / Apis  │
//! └────────────┘  replies  └──────────┘  data    └──────────┘
//! ```

pub mod client;
pub mod clock;
pub mod error;
pub mod memory;
pub mod model;

pub use client::{BoxedClient, ChatClient};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock, elapsed_between};
pub use error::{PlatformError, PlatformResult};
pub use memory::{MemoryClient, StoredReaction};
pub use model::{Guild, Member, Message, PlatformEvent, Reaction, Role, User};
