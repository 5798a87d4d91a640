//! agentwire library root.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod logging;
pub mod transport;

pub use bridge::{ProtocolBridge, ProtocolExamples, ProtocolInfo};
pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use directory::{AgentRegistration, DirectoryClient};
pub use error::{Error, Result};
pub use events::{Event, EventBus};
pub use transport::{FileTransport, Message, SocketTransport, Transport};
