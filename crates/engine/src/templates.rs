//! Built-in template catalog.
//!
//! A plain `{var}` substitution renderer over the notice and command
//! templates the engine sends.  Deployments with a CMS-backed formatter
//! implement [`TemplateRenderer`] themselves and inject that instead.

use std::collections::HashMap;

use serde_json::Value;

use dr_domain::{Error, Rendered, Result, TemplateRenderer};

/// Static key → template text catalog.
pub struct TemplateCatalog {
    templates: HashMap<&'static str, &'static str>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateCatalog {
    pub fn new() -> Self {
        let templates: HashMap<&'static str, &'static str> = [
            // ── Client notices ───────────────────────────────────────
            (
                "dialogue_started",
                "Your ticket #{ticket_id} is now being handled by support. \
                 Messages you send here will reach the staff member directly.",
            ),
            (
                "dialogue_closed",
                "Your ticket #{ticket_id} has been closed ({reason}). \
                 Open a new ticket if you need anything else.",
            ),
            (
                "dialogue_auto_closed",
                "Your ticket #{ticket_id} was closed automatically after a \
                 period of inactivity. Open a new ticket if the issue persists.",
            ),
            (
                "no_active_session",
                "Your ticket is no longer open. Start a new request if you \
                 still need help.",
            ),
            ("client_staff_message", "💬 Support: {message}"),
            (
                "endpoint_restored_client",
                "We had a brief technical hiccup; your conversation continues \
                 as normal.",
            ),
            // ── Staff notices ────────────────────────────────────────
            (
                "staff_ticket_info",
                "Ticket #{ticket_id}\nClient: {client_name} ({client_id})\n\
                 Category: {category}\nSubject: {subject}\n\n{description}",
            ),
            ("staff_client_message", "📥 {client_name}: {message}"),
            (
                "staff_dialogue_closed",
                "Session {session_id} closed by {closed_by}: {reason}",
            ),
            (
                "staff_dialogue_auto_closed",
                "Session {session_id} auto-closed: {reason}",
            ),
            (
                "ticket_already_closed",
                "This ticket is already closed; the message was not delivered.",
            ),
            (
                "endpoint_restored",
                "⚠️ The sub-channel was deleted and has been recreated. \
                 Session {session_id} continues here.",
            ),
            // ── Command results ──────────────────────────────────────
            ("staff_unknown_command", "Unknown command: {command}. Try &help."),
            (
                "staff_command_error",
                "Command {command} failed: {error}",
            ),
            (
                "staff_ticket_resolved",
                "✅ Ticket #{ticket_id} resolved: {resolution}",
            ),
            ("staff_marked_spam", "🚫 Ticket #{ticket_id} marked as spam."),
            (
                "staff_client_info",
                "Ticket #{ticket_id}\nClient: {client_name} ({client_id})\n\
                 Category: {category}\nSubject: {subject}\nOpened: {created_at}\n\
                 State: {state}",
            ),
            (
                "staff_ticket_history",
                "Recent tickets for client {client_id}:\n{history}",
            ),
            ("staff_help", "Available commands:\n{commands}"),
            (
                "help_end_command",
                "Usage: &end <resolution>\nCloses the ticket as resolved.",
            ),
            (
                "help_spam_command",
                "Usage: &spam\nMarks the ticket as spam and closes it.",
            ),
            (
                "help_info_command",
                "Usage: &info\nShows client and ticket details.",
            ),
            (
                "help_history_command",
                "Usage: &history\nShows the client's recent tickets.",
            ),
        ]
        .into();
        Self { templates }
    }
}

impl TemplateRenderer for TemplateCatalog {
    fn render(&self, template_key: &str, variables: &Value) -> Result<Rendered> {
        let template = self
            .templates
            .get(template_key)
            .ok_or_else(|| Error::Template(format!("unknown template: {template_key}")))?;
        Ok(Rendered {
            text: substitute(template, variables)?,
        })
    }
}

/// Replace each `{var}` with the matching variable.  Missing variables are
/// an error: a notice with a hole in it is worse than no notice.
fn substitute(template: &str, variables: &Value) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err(Error::Template("unbalanced '{' in template".into()));
        };
        let name = &after[..close];
        match variables.get(name) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {
                return Err(Error::Template(format!("missing template variable: {name}")))
            }
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
