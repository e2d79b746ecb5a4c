//! Shared domain types for DeskRelay.
//!
//! Everything the router, lifecycle manager, and store agree on lives here:
//! endpoints and their dispatch keys, the session state machine, the error
//! taxonomy, engine configuration, the static staff-command registry, and
//! the template-render seam.

pub mod command;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod render;
pub mod state;

pub use command::{builtin_commands, CommandAction, CommandSpec};
pub use config::EngineConfig;
pub use endpoint::{Endpoint, EndpointKey};
pub use error::{Error, GatewayError, Result};
pub use message::{InboundMessage, MessageContent};
pub use render::{Rendered, TemplateRenderer};
pub use state::{SessionState, SessionStatus};

/// Sentinel prefix that marks a staff message as a command.
pub const COMMAND_SENTINEL: char = '&';

/// FSM tag a client sits in while they have an open ticket.  Part of the
/// client-side endpoint key, so a client's handler stops matching the moment
/// the tag is cleared.
pub const AWAITING_STATE_TAG: &str = "has_ticket";
