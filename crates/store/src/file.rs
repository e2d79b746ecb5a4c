//! JSON-file-backed reference store.
//!
//! Persists all rows in `records.json` under the configured state path.
//! Every mutating call commits to disk before returning, which makes each
//! trait method a short-lived transaction: a failed write surfaces as an
//! error and the in-memory image is reloaded from the file on next start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use dr_domain::{Error, Result, SessionStatus};

use crate::records::{ClientRecord, SessionPointer, SessionRecord, TicketRecord};
use crate::SupportStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreImage {
    #[serde(default)]
    sessions: HashMap<String, SessionRecord>,
    #[serde(default)]
    clients: HashMap<i64, ClientRecord>,
    #[serde(default)]
    tickets: HashMap<i64, TicketRecord>,
}

/// File-backed [`SupportStore`] implementation.
pub struct JsonFileStore {
    records_path: PathBuf,
    image: RwLock<StoreImage>,
}

impl JsonFileStore {
    /// Load or create the store at `state_path/store/records.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("store");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let records_path = dir.join("records.json");
        let image = if records_path.exists() {
            let raw = std::fs::read_to_string(&records_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            StoreImage::default()
        };

        tracing::info!(
            sessions = image.sessions.len(),
            clients = image.clients.len(),
            tickets = image.tickets.len(),
            path = %records_path.display(),
            "support store loaded"
        );

        Ok(Self {
            records_path,
            image: RwLock::new(image),
        })
    }

    /// Commit the current image to disk.  Called under the write lock by
    /// every mutating operation.
    fn commit(&self, image: &StoreImage) -> Result<()> {
        let json = serde_json::to_string_pretty(image)
            .map_err(|e| Error::Store(format!("serializing records: {e}")))?;
        std::fs::write(&self.records_path, json).map_err(Error::Io)?;
        Ok(())
    }
}

impl SupportStore for JsonFileStore {
    fn create_session(&self, record: SessionRecord, pointer: SessionPointer) -> Result<()> {
        let mut image = self.image.write();
        if image.sessions.contains_key(&record.session_id) {
            return Err(Error::Store(format!(
                "session {} already exists",
                record.session_id
            )));
        }
        let client_id = record.client_id;
        image
            .clients
            .entry(client_id)
            .or_insert_with(|| ClientRecord::new(client_id))
            .pointer = Some(pointer);
        image.sessions.insert(record.session_id.clone(), record);
        self.commit(&image)
    }

    fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.image.read().sessions.get(session_id).cloned())
    }

    fn active_session_for_ticket(&self, ticket_id: i64) -> Result<Option<SessionRecord>> {
        Ok(self
            .image
            .read()
            .sessions
            .values()
            .find(|s| s.ticket_id == ticket_id && s.is_active())
            .cloned())
    }

    fn active_sessions(&self) -> Result<Vec<SessionRecord>> {
        Ok(self
            .image
            .read()
            .sessions
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect())
    }

    fn update_session(
        &self,
        session_id: &str,
        mutate: &mut dyn FnMut(&mut SessionRecord),
    ) -> Result<bool> {
        let mut image = self.image.write();
        let Some(record) = image.sessions.get_mut(session_id) else {
            return Ok(false);
        };
        mutate(record);
        self.commit(&image)?;
        Ok(true)
    }

    fn close_session(
        &self,
        session_id: &str,
        closed_by: &str,
        reason: Option<&str>,
    ) -> Result<Option<SessionRecord>> {
        let mut image = self.image.write();
        let Some(record) = image.sessions.get_mut(session_id) else {
            return Ok(None);
        };
        if !record.is_active() {
            return Ok(None);
        }

        let now = Utc::now();
        record.status = SessionStatus::Closed;
        record.closed_at = Some(now);
        record.closed_by = Some(closed_by.to_owned());
        record.close_reason = reason.map(str::to_owned);
        record.updated_at = now;
        let closed = record.clone();

        // Guarded pointer clear, same transaction.
        if let Some(client) = image.clients.get_mut(&closed.client_id) {
            if client
                .pointer
                .as_ref()
                .is_some_and(|p| p.session_id == session_id)
            {
                client.pointer = None;
            }
        }

        self.commit(&image)?;
        Ok(Some(closed))
    }

    fn get_client(&self, client_id: i64) -> Result<Option<ClientRecord>> {
        Ok(self.image.read().clients.get(&client_id).cloned())
    }

    fn upsert_client(&self, client: ClientRecord) -> Result<()> {
        let mut image = self.image.write();
        image.clients.insert(client.client_id, client);
        self.commit(&image)
    }

    fn pointer(&self, client_id: i64) -> Result<Option<SessionPointer>> {
        Ok(self
            .image
            .read()
            .clients
            .get(&client_id)
            .and_then(|c| c.pointer.clone()))
    }

    fn set_pointer(&self, client_id: i64, pointer: SessionPointer) -> Result<()> {
        let mut image = self.image.write();
        image
            .clients
            .entry(client_id)
            .or_insert_with(|| ClientRecord::new(client_id))
            .pointer = Some(pointer);
        self.commit(&image)
    }

    fn clear_pointer_if(&self, client_id: i64, session_id: &str) -> Result<bool> {
        let mut image = self.image.write();
        let Some(client) = image.clients.get_mut(&client_id) else {
            return Ok(false);
        };
        if client
            .pointer
            .as_ref()
            .is_some_and(|p| p.session_id == session_id)
        {
            client.pointer = None;
            self.commit(&image)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn clear_pointer(&self, client_id: i64) -> Result<bool> {
        let mut image = self.image.write();
        let Some(client) = image.clients.get_mut(&client_id) else {
            return Ok(false);
        };
        if client.pointer.take().is_some() {
            self.commit(&image)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn clients_with_pointer(&self) -> Result<Vec<(i64, SessionPointer)>> {
        Ok(self
            .image
            .read()
            .clients
            .values()
            .filter_map(|c| c.pointer.clone().map(|p| (c.client_id, p)))
            .collect())
    }

    fn get_ticket(&self, ticket_id: i64) -> Result<Option<TicketRecord>> {
        Ok(self.image.read().tickets.get(&ticket_id).cloned())
    }

    fn upsert_ticket(&self, ticket: TicketRecord) -> Result<()> {
        let mut image = self.image.write();
        image.tickets.insert(ticket.ticket_id, ticket);
        self.commit(&image)
    }

    fn update_ticket(
        &self,
        ticket_id: i64,
        mutate: &mut dyn FnMut(&mut TicketRecord),
    ) -> Result<bool> {
        let mut image = self.image.write();
        let Some(ticket) = image.tickets.get_mut(&ticket_id) else {
            return Ok(false);
        };
        mutate(ticket);
        self.commit(&image)?;
        Ok(true)
    }

    fn tickets_for_client(&self, client_id: i64, limit: usize) -> Result<Vec<TicketRecord>> {
        let image = self.image.read();
        let mut tickets: Vec<TicketRecord> = image
            .tickets
            .values()
            .filter(|t| t.client_id == client_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tickets.truncate(limit);
        Ok(tickets)
    }
}
