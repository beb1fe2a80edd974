/// Per-chat administrator lookups with a short TTL
pub mod admin_cache;
/// Command and message handlers
pub mod handlers;
/// Reply delivery as Telegram messages
pub mod transport;

pub use admin_cache::AdminCache;
pub use transport::TelegramReplyTransport;
