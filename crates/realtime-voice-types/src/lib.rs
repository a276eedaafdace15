//now people using the types library can use these types
pub mod audio;
pub mod connection;
pub mod events;
pub mod message;
pub mod session;

//re-export types for easier access
pub use connection::ConnectionState;
pub use events::{ClientEvent, ServerEvent};
pub use message::{ErrorKind, InboundMessage, MessageType, OutboundMessage, Role};
pub use session::TranscriptionSession;
