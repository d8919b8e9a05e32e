//! Cross-messenger abstractions (Telegram today; other chat services later).

pub mod port;
pub mod throttled;
pub mod types;
