//! # courier-shared
//!
//! Types shared by every courier crate: identity newtypes, the JSON wire
//! frames exchanged with clients and peer nodes, the closed command
//! registries they decode into, and routed envelopes.

pub mod command;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod message;
pub mod protocol;
pub mod types;

pub use command::{ClientCommand, MutualKind, Reaction, RoutedCommand};
pub use envelope::RoutedEnvelope;
pub use error::ProtocolError;
pub use message::{DirectMessage, MutualRequest, TopicMessage};
pub use protocol::{Frame, Response};
pub use types::{ClientId, NodeAddr, TopicId};
