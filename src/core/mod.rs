//! Core coordination kernel: sessions, matching, rooms, dispatch.

pub mod dispatcher;
pub mod events;
pub mod matching;
pub mod room;
pub mod server;
pub mod session;

// Re-export main components for convenience
pub use dispatcher::EventDispatcher;
pub use events::{ClientEvent, MatchPair, ServerEvent};
pub use server::{CoreServer, SharedCore};
pub use session::{Session, SessionRegistry};
