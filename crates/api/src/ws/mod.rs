//! WebSocket infrastructure: the per-tenant event feed, the voice bridge,
//! connection management and heartbeat.

mod handler;
mod heartbeat;
pub mod manager;
pub mod voice;

pub use handler::events_handler;
pub use heartbeat::start_heartbeat;
pub use manager::{SocketKind, WsManager};
pub use voice::{voice_handler, WsVoiceConnection};
