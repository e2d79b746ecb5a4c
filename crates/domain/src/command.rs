//! Static registry of staff commands.
//!
//! Commands are read-only at runtime.  Adding one means adding a table entry
//! and (if it needs a new action) extending [`CommandAction`]; the processor
//! itself never changes.

use std::collections::HashMap;

use crate::state::SessionState;

/// The closed set of things a command can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// Close the ticket as resolved (`&end <resolution>`).
    EndTicket,
    /// Mark the ticket as spam and close (`&spam`).
    MarkSpam,
    /// Show client and ticket details (`&info`).
    ShowInfo,
    /// Show the client's recent ticket history (`&history`).
    ShowHistory,
    /// Show the command table (`&help`).
    ShowHelp,
}

/// Configuration for a single staff command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub action: CommandAction,
    pub description: &'static str,
    pub requires_args: bool,
    /// Session must be at or beyond this state (total order on
    /// `SessionState`).  Ignored when `allowed_states` is non-empty.
    pub min_state: Option<SessionState>,
    /// Exact states the command is allowed in.  Takes precedence over
    /// `min_state`.
    pub allowed_states: &'static [SessionState],
    pub template_success: &'static str,
    pub template_error: &'static str,
    pub template_help: &'static str,
}

impl CommandSpec {
    /// Whether the command may run in the given session state.
    pub fn allowed_in(&self, state: SessionState) -> bool {
        if !self.allowed_states.is_empty() {
            return self.allowed_states.contains(&state);
        }
        match self.min_state {
            Some(min) => state >= min,
            None => true,
        }
    }
}

/// The built-in command table, keyed by sentinel-prefixed name.
pub fn builtin_commands() -> HashMap<&'static str, CommandSpec> {
    let specs = [
        CommandSpec {
            name: "&end",
            action: CommandAction::EndTicket,
            description: "Close ticket as resolved",
            requires_args: true,
            min_state: Some(SessionState::InProgress),
            allowed_states: &[],
            template_success: "staff_ticket_resolved",
            template_error: "staff_command_error",
            template_help: "help_end_command",
        },
        CommandSpec {
            name: "&spam",
            action: CommandAction::MarkSpam,
            description: "Mark ticket as spam",
            requires_args: false,
            min_state: None,
            allowed_states: &[SessionState::WaitingStaff, SessionState::InProgress],
            template_success: "staff_marked_spam",
            template_error: "staff_command_error",
            template_help: "help_spam_command",
        },
        CommandSpec {
            name: "&info",
            action: CommandAction::ShowInfo,
            description: "Show client and ticket information",
            requires_args: false,
            min_state: Some(SessionState::InProgress),
            allowed_states: &[],
            template_success: "staff_client_info",
            template_error: "staff_command_error",
            template_help: "help_info_command",
        },
        CommandSpec {
            name: "&history",
            action: CommandAction::ShowHistory,
            description: "Show client ticket history",
            requires_args: false,
            min_state: Some(SessionState::InProgress),
            allowed_states: &[],
            template_success: "staff_ticket_history",
            template_error: "staff_command_error",
            template_help: "help_history_command",
        },
        CommandSpec {
            name: "&help",
            action: CommandAction::ShowHelp,
            description: "Show available commands",
            requires_args: false,
            min_state: None,
            allowed_states: &[],
            template_success: "staff_help",
            template_error: "staff_command_error",
            template_help: "staff_help",
        },
    ];
    specs.into_iter().map(|s| (s.name, s)).collect()
}
