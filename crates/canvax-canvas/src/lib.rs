//! Collaborative canvas sessions.
//!
//! A [`SessionRegistry`] owns every live [`CanvasSession`]. Each session keeps
//! its attached clients, a bounded event history, and a broadcast feed that
//! connection tasks drain to relay events to their client.

pub mod history;
pub mod ids;
pub mod processor;
pub mod registry;
pub mod session;
pub mod settings;

pub use history::HistoryBuffer;
pub use processor::{process, Outcome};
pub use registry::SessionRegistry;
pub use session::{CanvasSession, ClientHandle, Subscription, TransportKind};
pub use settings::SessionSettings;
