#![deny(missing_docs)]
//! Bililink core library.
//!
//! Recognizes Bilibili links in chat text, resolves them into content cards,
//! and serves summaries and cached video clips under per-conversation policy.

/// Bilibili web API client and content models.
pub mod bilibili;
/// Admin command parsing and execution.
pub mod commands;
/// Configuration management.
pub mod config;
/// Conversation identity and per-conversation settings.
pub mod conversation;
/// Message orchestration: classify, gate, resolve, reply.
pub mod dispatcher;
/// Per-key async locks.
pub mod keyed_lock;
/// Global download limit policy.
pub mod limit;
/// Link classification.
pub mod link;
/// Download cache and external transcoding.
pub mod media;
/// Per-conversation request rate limiting.
pub mod ratelimit;
/// Outgoing reply segments and the transport seam.
pub mod reply;
/// Session (cookie) providers.
pub mod session;
/// Conversation config persistence.
pub mod storage;
/// AI summary fetching and formatting.
pub mod summary;
/// Utility functions.
pub mod utils;

/// Test doubles shared by unit tests.
#[cfg(test)]
pub mod testing;

pub use commands::AdminCommand;
pub use config::CoreSettings;
pub use conversation::ConversationKey;
pub use dispatcher::{Collaborators, IncomingMessage, LinkDispatcher};
pub use reply::{Reply, ReplyTransport, Segment};
