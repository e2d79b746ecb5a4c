//! Staff command processor.
//!
//! Commands arrive as sentinel-prefixed staff messages (`&end resolved`),
//! are validated against the session's state using the static command
//! table, and dispatch to a closed set of actions.  Failures inside an
//! action are caught here and answered with the command-error template;
//! nothing a command does can take down the router.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};

use dr_domain::{CommandAction, CommandSpec, InboundMessage, Result, SessionState};
use dr_store::SessionRecord;

use crate::Engine;

impl Engine {
    /// Process a staff command for a session.  Returns `true` when the
    /// command was handled (including rejections and handler errors that
    /// were answered with a notice); `false` only when the session itself
    /// could not be loaded.
    pub async fn process_command(
        self: &Arc<Self>,
        message: &InboundMessage,
        session_id: &str,
    ) -> bool {
        let text = message.content.as_text().unwrap_or_default();
        let (command, args) = parse_command(text);

        let Ok(Some(session)) = self.store.get_session(session_id) else {
            tracing::error!(session_id, command, "command for unknown session");
            return false;
        };

        let Some(spec) = self.commands.get(command.as_str()) else {
            self.outbound.notify(
                session.staff_endpoint(),
                "staff_unknown_command",
                &json!({ "command": command }),
            );
            return true;
        };
        let spec = spec.clone();

        if !spec.allowed_in(session.state) {
            self.outbound.notify(
                session.staff_endpoint(),
                spec.template_error,
                &json!({
                    "command": command,
                    "error": format!("not allowed in state {}", session.state),
                }),
            );
            return true;
        }

        if spec.requires_args && args.is_empty() {
            self.outbound.notify(
                session.staff_endpoint(),
                spec.template_help,
                &json!({ "command": command }),
            );
            return true;
        }

        let outcome = self
            .run_command(&spec, &session, &args, message.from_id)
            .await;
        if let Err(e) = outcome {
            tracing::error!(session_id, command, error = %e, "command handler failed");
            self.outbound.notify(
                session.staff_endpoint(),
                "staff_command_error",
                &json!({ "command": command, "error": e.to_string() }),
            );
        }
        true
    }

    async fn run_command(
        self: &Arc<Self>,
        spec: &CommandSpec,
        session: &SessionRecord,
        args: &str,
        staff_sender_id: i64,
    ) -> Result<()> {
        match spec.action {
            CommandAction::EndTicket => self.end_ticket(spec, session, args, staff_sender_id).await,
            CommandAction::MarkSpam => self.mark_spam(spec, session, staff_sender_id).await,
            CommandAction::ShowInfo => self.show_info(spec, session),
            CommandAction::ShowHistory => self.show_history(spec, session),
            CommandAction::ShowHelp => self.show_help(spec, session),
        }
    }

    /// `&end <resolution>` — resolve and close.
    async fn end_ticket(
        self: &Arc<Self>,
        spec: &CommandSpec,
        session: &SessionRecord,
        args: &str,
        staff_sender_id: i64,
    ) -> Result<()> {
        let resolution = args.to_owned();

        let mut patch = Map::new();
        patch.insert("resolution".into(), Value::String(resolution.clone()));
        patch.insert(
            "resolved_by".into(),
            Value::Number(staff_sender_id.into()),
        );
        patch.insert(
            "resolved_at".into(),
            Value::String(Utc::now().to_rfc3339()),
        );
        self.update_state(&session.session_id, SessionState::Resolved, Some(patch))?;

        self.outbound.notify(
            session.staff_endpoint(),
            spec.template_success,
            &json!({ "ticket_id": session.ticket_id, "resolution": resolution }),
        );

        self.close_session(&session.session_id, "staff", Some(&resolution))
            .await?;
        Ok(())
    }

    /// `&spam` — mark spam and close.
    async fn mark_spam(
        self: &Arc<Self>,
        spec: &CommandSpec,
        session: &SessionRecord,
        staff_sender_id: i64,
    ) -> Result<()> {
        // Spam can be called straight from WAITING_STAFF; walk through
        // IN_PROGRESS because the machine has no direct edge.
        if session.state == SessionState::WaitingStaff {
            self.update_state(&session.session_id, SessionState::InProgress, None)?;
        }

        let mut patch = Map::new();
        patch.insert(
            "marked_by".into(),
            Value::Number(staff_sender_id.into()),
        );
        self.update_state(&session.session_id, SessionState::Spam, Some(patch))?;

        self.outbound.notify(
            session.staff_endpoint(),
            spec.template_success,
            &json!({ "ticket_id": session.ticket_id }),
        );

        self.close_session(&session.session_id, "staff", Some("spam"))
            .await?;
        Ok(())
    }

    /// `&info` — client and ticket details to the staff thread.
    fn show_info(&self, spec: &CommandSpec, session: &SessionRecord) -> Result<()> {
        let ticket = self.store.get_ticket(session.ticket_id)?;
        let client_name = self
            .store
            .get_client(session.client_id)?
            .and_then(|c| c.display_name)
            .unwrap_or_else(|| "Unknown".into());

        let (category, subject, created_at) = match &ticket {
            Some(t) => (
                t.category.clone().unwrap_or_else(|| "general".into()),
                t.subject.clone().unwrap_or_else(|| "No subject".into()),
                t.created_at.format("%Y-%m-%d %H:%M").to_string(),
            ),
            None => ("general".into(), "No subject".into(), "Unknown".into()),
        };

        self.outbound.notify(
            session.staff_endpoint(),
            spec.template_success,
            &json!({
                "ticket_id": session.ticket_id,
                "client_name": client_name,
                "client_id": session.client_id,
                "category": category,
                "subject": subject,
                "created_at": created_at,
                "state": session.state.as_str(),
            }),
        );
        Ok(())
    }

    /// `&history` — the client's last ten tickets.
    fn show_history(&self, spec: &CommandSpec, session: &SessionRecord) -> Result<()> {
        let tickets = self.store.tickets_for_client(session.client_id, 10)?;
        let history = if tickets.is_empty() {
            "(none)".to_owned()
        } else {
            tickets
                .iter()
                .map(|t| {
                    format!(
                        "#{} [{}] {} — {}",
                        t.ticket_id,
                        t.created_at.format("%Y-%m-%d"),
                        t.category.as_deref().unwrap_or("general"),
                        t.resolution.as_deref().unwrap_or(t.status.as_str()),
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        self.outbound.notify(
            session.staff_endpoint(),
            spec.template_success,
            &json!({ "client_id": session.client_id, "history": history }),
        );
        Ok(())
    }

    /// `&help` — the command table.
    fn show_help(&self, spec: &CommandSpec, session: &SessionRecord) -> Result<()> {
        let mut lines: Vec<String> = self
            .commands
            .values()
            .map(|c| {
                let args = if c.requires_args { " <args>" } else { "" };
                format!("{}{} — {}", c.name, args, c.description)
            })
            .collect();
        lines.sort();

        self.outbound.notify(
            session.staff_endpoint(),
            spec.template_success,
            &json!({ "commands": lines.join("\n") }),
        );
        Ok(())
    }
}

/// Split command text into the lowercased command name and its argument
/// remainder.
fn parse_command(text: &str) -> (String, String) {
    match text.split_once(char::is_whitespace) {
        Some((command, args)) => (command.to_lowercase(), args.trim().to_owned()),
        None => (text.to_lowercase(), String::new()),
    }
}
