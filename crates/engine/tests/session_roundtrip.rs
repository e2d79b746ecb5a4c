//! End-to-end engine tests against the JSON file store and a scripted
//! gateway — full round-trips without any messaging platform.
//!
//! The gateway mock records every send, mirrors the dispatch-set contract,
//! and can mark sub-channel threads dead to force `EndpointGone` paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Map;
use tempfile::TempDir;

use dr_domain::{
    Endpoint, EndpointKey, EngineConfig, Error, GatewayError, InboundMessage, MessageContent,
    SessionState,
};
use dr_engine::gateway::{GatewayResult, MessageRef, MessagingGateway};
use dr_engine::Engine;
use dr_store::{ClientRecord, JsonFileStore, SessionPointer, SupportStore, TicketRecord, TicketStatus};

const GROUP: i64 = -100;
const CLIENT: i64 = 7;
const STAFF: i64 = 5;
const TICKET: i64 = 42;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gateway mock
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct MockGateway {
    sent: Mutex<Vec<(Endpoint, String)>>,
    media: Mutex<Vec<(Endpoint, String, String)>>,
    created: Mutex<Vec<(i64, String)>>,
    renames: Mutex<Vec<(i64, i64, String)>>,
    dispatch: Mutex<HashSet<EndpointKey>>,
    /// Thread ids that answer every send with `EndpointGone`.
    dead_threads: Mutex<HashSet<i64>>,
    next_thread_id: AtomicI64,
}

impl MockGateway {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            media: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            renames: Mutex::new(Vec::new()),
            dispatch: Mutex::new(HashSet::new()),
            dead_threads: Mutex::new(HashSet::new()),
            next_thread_id: AtomicI64::new(1),
        }
    }

    fn kill_thread(&self, thread_id: i64) {
        self.dead_threads.lock().insert(thread_id);
    }

    fn texts_to(&self, endpoint: Endpoint) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn dispatches(&self, key: &EndpointKey) -> bool {
        self.dispatch.lock().contains(key)
    }
}

#[async_trait::async_trait]
impl MessagingGateway for MockGateway {
    async fn send_text(&self, endpoint: Endpoint, text: &str) -> GatewayResult<MessageRef> {
        if let Endpoint::ChannelThread { thread_id, .. } = endpoint {
            if self.dead_threads.lock().contains(&thread_id) {
                return Err(GatewayError::EndpointGone);
            }
        }
        self.sent.lock().push((endpoint, text.to_owned()));
        Ok(MessageRef::generate())
    }

    async fn send_media(
        &self,
        endpoint: Endpoint,
        media_kind: &str,
        _file_ref: &str,
        caption_prefix: &str,
    ) -> GatewayResult<MessageRef> {
        if let Endpoint::ChannelThread { thread_id, .. } = endpoint {
            if self.dead_threads.lock().contains(&thread_id) {
                return Err(GatewayError::EndpointGone);
            }
        }
        self.media
            .lock()
            .push((endpoint, media_kind.to_owned(), caption_prefix.to_owned()));
        Ok(MessageRef::generate())
    }

    async fn create_sub_channel(&self, group_id: i64, name: &str) -> GatewayResult<i64> {
        let id = self.next_thread_id.fetch_add(1, Ordering::SeqCst);
        self.created.lock().push((group_id, name.to_owned()));
        Ok(id)
    }

    async fn rename_sub_channel(
        &self,
        group_id: i64,
        thread_id: i64,
        name: &str,
    ) -> GatewayResult<()> {
        if self.dead_threads.lock().contains(&thread_id) {
            return Err(GatewayError::EndpointGone);
        }
        self.renames.lock().push((group_id, thread_id, name.to_owned()));
        Ok(())
    }

    fn bind_dispatch(&self, key: &EndpointKey) {
        self.dispatch.lock().insert(key.clone());
    }

    fn unbind_dispatch(&self, key: &EndpointKey) {
        self.dispatch.lock().remove(key);
    }

    fn live_dispatch_count(&self) -> usize {
        self.dispatch.lock().len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn seed(store: &dyn SupportStore) {
    let mut client = ClientRecord::new(CLIENT);
    client.display_name = Some("Alice".into());
    store.upsert_client(client).unwrap();

    let mut ticket = TicketRecord::new(TICKET, CLIENT);
    ticket.category = Some("billing".into());
    ticket.subject = Some("Refund request".into());
    ticket.description = Some("Please refund order 12".into());
    store.upsert_ticket(ticket).unwrap();
}

fn build_engine(
    store: Arc<JsonFileStore>,
) -> (Arc<Engine>, Arc<JsonFileStore>, Arc<MockGateway>) {
    let gateway = Arc::new(MockGateway::new());
    let config = EngineConfig {
        group_id: GROUP,
        ..EngineConfig::default()
    };
    let engine = Engine::with_builtin_templates(config, store.clone(), gateway.clone());
    (engine, store, gateway)
}

fn new_engine(tmp: &TempDir) -> (Arc<Engine>, Arc<JsonFileStore>, Arc<MockGateway>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let store = Arc::new(JsonFileStore::new(tmp.path()).unwrap());
    seed(store.as_ref());
    build_engine(store)
}

async fn create(engine: &Arc<Engine>) -> String {
    engine
        .create_session(TICKET, STAFF, Map::new())
        .await
        .unwrap()
}

/// Wait for the outbound notice queue to drain.  The paused clock makes
/// the sleeps free.
async fn settle(engine: &Arc<Engine>) {
    while engine.queued_sends() > 0 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
}

fn client_text(text: &str) -> InboundMessage {
    InboundMessage::direct(CLIENT, MessageContent::text(text))
}

fn staff_text(thread_id: i64, text: &str) -> InboundMessage {
    InboundMessage::in_thread(STAFF, GROUP, thread_id, MessageContent::text(text))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session creation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn create_registers_handler_pair_and_persists_pointer() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);

    let session_id = create(&engine).await;
    assert_eq!(session_id, "support_42");

    let stats = engine.registry_stats();
    assert_eq!(stats.total_registered, 2);
    assert_eq!(stats.gateway_live, 2);
    assert!(!stats.has_zombies());
    assert!(gateway.dispatches(&EndpointKey::user(CLIENT)));
    assert!(gateway.dispatches(&EndpointKey::thread(GROUP, 1)));

    let pointer = store.pointer(CLIENT).unwrap().unwrap();
    assert_eq!(pointer.session_id, "support_42");
    assert_eq!(pointer.thread_id, 1);

    let ticket = store.get_ticket(TICKET).unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::InProgress);

    // Sub-channel named from the ticket.
    let created = gateway.created.lock();
    assert_eq!(created.len(), 1);
    assert!(created[0].1.starts_with("Ticket #42 [billing]"));
    drop(created);

    // Welcome notices on both sides.
    settle(&engine).await;
    let to_client = gateway.texts_to(Endpoint::user(CLIENT));
    assert!(to_client.iter().any(|t| t.contains("ticket #42")));
    let to_staff = gateway.texts_to(Endpoint::thread(GROUP, 1));
    assert!(to_staff.iter().any(|t| t.contains("Alice")));
}

#[tokio::test(start_paused = true)]
async fn duplicate_create_for_same_ticket_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let (engine, _store, _gateway) = new_engine(&tmp);

    create(&engine).await;
    let err = engine
        .create_session(TICKET, STAFF, Map::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::SessionAlreadyActive { ticket_id: TICKET }
    ));

    // Only one handler pair exists.
    assert_eq!(engine.registry_stats().total_registered, 2);
}

#[tokio::test(start_paused = true)]
async fn latest_session_owns_the_client_key() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);

    let mut second = TicketRecord::new(43, CLIENT);
    second.category = Some("shipping".into());
    store.upsert_ticket(second).unwrap();

    create(&engine).await;
    engine
        .create_session(43, STAFF, Map::new())
        .await
        .unwrap();
    settle(&engine).await;

    // One client key plus two staff threads; no zombies.
    let stats = engine.registry_stats();
    assert_eq!(stats.total_registered, 3);
    assert_eq!(stats.gateway_live, 3);

    // Pointer names the newest session, so the client's messages go to
    // ticket 43's thread.
    assert_eq!(store.pointer(CLIENT).unwrap().unwrap().session_id, "support_43");
    let before = gateway.texts_to(Endpoint::thread(GROUP, 1)).len();
    assert!(engine.dispatch_inbound(client_text("which ticket?")).await);
    assert!(gateway
        .texts_to(Endpoint::thread(GROUP, 2))
        .iter()
        .any(|t| t.contains("which ticket?")));
    assert_eq!(gateway.texts_to(Endpoint::thread(GROUP, 1)).len(), before);
}

#[tokio::test(start_paused = true)]
async fn closing_one_session_leaves_the_clients_other_session_live() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);

    let mut second = TicketRecord::new(43, CLIENT);
    second.category = Some("shipping".into());
    store.upsert_ticket(second).unwrap();

    create(&engine).await;
    engine.create_session(43, STAFF, Map::new()).await.unwrap();

    // Closing the older session must not unhook the newer one.
    assert!(engine
        .close_session("support_42", "staff", Some("done"))
        .await
        .unwrap());
    settle(&engine).await;

    let stats = engine.registry_stats();
    assert_eq!(stats.total_registered, 2);
    assert_eq!(stats.gateway_live, 2);
    assert!(!gateway.dispatches(&EndpointKey::thread(GROUP, 1)));
    assert!(gateway.dispatches(&EndpointKey::thread(GROUP, 2)));
    assert!(gateway.dispatches(&EndpointKey::user(CLIENT)));
    assert_eq!(store.pointer(CLIENT).unwrap().unwrap().session_id, "support_43");

    // Both directions of the surviving session still route.
    assert!(engine.dispatch_inbound(client_text("still here")).await);
    assert!(gateway
        .texts_to(Endpoint::thread(GROUP, 2))
        .iter()
        .any(|t| t.contains("still here")));
    assert!(engine.dispatch_inbound(staff_text(2, "with you")).await);
    assert!(gateway
        .texts_to(Endpoint::user(CLIENT))
        .iter()
        .any(|t| t.contains("with you")));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message relay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn relays_messages_in_both_directions() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);
    create(&engine).await;

    assert!(engine.dispatch_inbound(client_text("hello, my order is stuck")).await);
    assert!(gateway
        .texts_to(Endpoint::thread(GROUP, 1))
        .iter()
        .any(|t| t.contains("hello, my order is stuck")));

    assert!(engine.dispatch_inbound(staff_text(1, "looking into it")).await);
    assert!(gateway
        .texts_to(Endpoint::user(CLIENT))
        .iter()
        .any(|t| t == "💬 Support: looking into it"));

    let session = store.get_session("support_42").unwrap().unwrap();
    assert_eq!(session.message_count, 2);
}

#[tokio::test(start_paused = true)]
async fn media_is_forwarded_with_caption_prefix() {
    let tmp = TempDir::new().unwrap();
    let (engine, _store, gateway) = new_engine(&tmp);
    create(&engine).await;

    let message = InboundMessage::direct(
        CLIENT,
        MessageContent::Media {
            media_kind: "photo".into(),
            file_ref: "file-abc".into(),
        },
    );
    assert!(engine.dispatch_inbound(message).await);

    let media = gateway.media.lock();
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].0, Endpoint::thread(GROUP, 1));
    assert_eq!(media[0].1, "photo");
    assert!(media[0].2.contains("Client"));
}

#[tokio::test(start_paused = true)]
async fn sentinel_text_from_client_is_never_relayed() {
    let tmp = TempDir::new().unwrap();
    let (engine, _store, gateway) = new_engine(&tmp);
    create(&engine).await;
    settle(&engine).await;

    let before = gateway.texts_to(Endpoint::thread(GROUP, 1)).len();
    assert!(!engine.dispatch_inbound(client_text("&end gotcha")).await);
    assert_eq!(gateway.texts_to(Endpoint::thread(GROUP, 1)).len(), before);
}

#[tokio::test(start_paused = true)]
async fn unrouted_message_is_dropped() {
    let tmp = TempDir::new().unwrap();
    let (engine, _store, gateway) = new_engine(&tmp);

    // No session at all: nothing is registered for the client key.
    assert!(!engine.dispatch_inbound(client_text("anyone?")).await);
    assert!(gateway.sent.lock().is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Endpoint recreation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn deleted_sub_channel_is_recreated_and_message_delivered() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);
    create(&engine).await;

    gateway.kill_thread(1);
    assert!(engine.dispatch_inbound(client_text("are you there?")).await);

    // Same session, fresh thread.
    let session = store.get_session("support_42").unwrap().unwrap();
    assert_eq!(session.thread_id, 2);
    assert!(gateway
        .texts_to(Endpoint::thread(GROUP, 2))
        .iter()
        .any(|t| t.contains("are you there?")));

    // Staff handler re-keyed to the new thread.
    assert!(gateway.dispatches(&EndpointKey::thread(GROUP, 2)));
    assert!(!gateway.dispatches(&EndpointKey::thread(GROUP, 1)));
    assert_eq!(engine.registry_stats().total_registered, 2);

    // Both sides are told.
    settle(&engine).await;
    assert!(gateway
        .texts_to(Endpoint::thread(GROUP, 2))
        .iter()
        .any(|t| t.contains("recreated")));
    assert!(gateway
        .texts_to(Endpoint::user(CLIENT))
        .iter()
        .any(|t| t.contains("technical hiccup")));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stale pointers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn pointer_to_nonexistent_session_is_cleaned_without_misdelivery() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);
    create(&engine).await;
    settle(&engine).await;

    store
        .set_pointer(
            CLIENT,
            SessionPointer {
                session_id: "support_999".into(),
                ticket_id: 999,
                thread_id: 77,
                staff_id: None,
                saved_at: Utc::now(),
            },
        )
        .unwrap();

    let staff_before = gateway.texts_to(Endpoint::thread(GROUP, 1)).len();
    assert!(!engine.dispatch_inbound(client_text("hello?")).await);
    settle(&engine).await;

    // Pointer cleared, registrations evicted, the client told, and the
    // message delivered to nobody.
    assert!(store.pointer(CLIENT).unwrap().is_none());
    assert_eq!(engine.registry_stats().total_registered, 0);
    assert_eq!(engine.registry_stats().gateway_live, 0);
    assert!(gateway
        .texts_to(Endpoint::user(CLIENT))
        .iter()
        .any(|t| t.contains("no longer open")));
    assert_eq!(gateway.texts_to(Endpoint::thread(GROUP, 1)).len(), staff_before);
}

#[tokio::test(start_paused = true)]
async fn missing_pointer_is_treated_as_stale() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);
    create(&engine).await;
    store.clear_pointer(CLIENT).unwrap();

    assert!(!engine.dispatch_inbound(client_text("hello?")).await);
    settle(&engine).await;

    assert_eq!(engine.registry_stats().total_registered, 0);
    assert!(gateway
        .texts_to(Endpoint::user(CLIENT))
        .iter()
        .any(|t| t.contains("no longer open")));
}

#[tokio::test(start_paused = true)]
async fn staff_side_repairs_a_wandered_pointer() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, _gateway) = new_engine(&tmp);
    create(&engine).await;

    store.clear_pointer(CLIENT).unwrap();
    assert!(engine.dispatch_inbound(staff_text(1, "still with you")).await);

    // The thread maps to exactly one session; the pointer follows it.
    let pointer = store.pointer(CLIENT).unwrap().unwrap();
    assert_eq!(pointer.session_id, "support_42");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Closing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn close_tears_down_both_sources_of_truth() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);
    create(&engine).await;

    assert!(engine
        .close_session("support_42", "staff", Some("done"))
        .await
        .unwrap());
    settle(&engine).await;

    let session = store.get_session("support_42").unwrap().unwrap();
    assert!(!session.is_active());
    assert_eq!(session.closed_by.as_deref(), Some("staff"));
    assert!(store.pointer(CLIENT).unwrap().is_none());
    assert_eq!(engine.registry_stats().total_registered, 0);
    assert_eq!(engine.registry_stats().gateway_live, 0);
    assert!(gateway
        .texts_to(Endpoint::user(CLIENT))
        .iter()
        .any(|t| t.contains("has been closed")));
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let (engine, _store, gateway) = new_engine(&tmp);
    create(&engine).await;

    assert!(engine.close_session("support_42", "staff", None).await.unwrap());
    assert!(!engine.close_session("support_42", "staff", None).await.unwrap());
    assert!(!engine.close_session("no_such", "staff", None).await.unwrap());
    settle(&engine).await;

    let closed_notices = gateway
        .texts_to(Endpoint::user(CLIENT))
        .iter()
        .filter(|t| t.contains("has been closed"))
        .count();
    assert_eq!(closed_notices, 1);
}

#[tokio::test(start_paused = true)]
async fn staff_message_to_closed_session_bounces() {
    let tmp = TempDir::new().unwrap();
    let (engine, _store, gateway) = new_engine(&tmp);
    create(&engine).await;
    engine.close_session("support_42", "staff", None).await.unwrap();

    let delivered = engine
        .route_staff_message(&staff_text(1, "one more thing"), "support_42")
        .await;
    assert!(!delivered);
    settle(&engine).await;

    assert!(gateway
        .texts_to(Endpoint::thread(GROUP, 1))
        .iter()
        .any(|t| t.contains("already closed")));
    assert!(!gateway
        .texts_to(Endpoint::user(CLIENT))
        .iter()
        .any(|t| t.contains("one more thing")));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Staff commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn end_command_resolves_and_closes() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);
    create(&engine).await;

    assert!(engine.dispatch_inbound(staff_text(1, "&end resolved, thanks")).await);
    settle(&engine).await;

    let session = store.get_session("support_42").unwrap().unwrap();
    assert!(!session.is_active());
    assert_eq!(session.state, SessionState::Resolved);
    assert_eq!(session.closed_by.as_deref(), Some("staff"));

    let ticket = store.get_ticket(TICKET).unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Resolved);
    assert_eq!(ticket.resolution.as_deref(), Some("resolved, thanks"));

    assert!(gateway
        .texts_to(Endpoint::thread(GROUP, 1))
        .iter()
        .any(|t| t == "✅ Ticket #42 resolved: resolved, thanks"));
    assert_eq!(engine.registry_stats().total_registered, 0);

    // Thread renamed to show the outcome.
    assert!(gateway
        .renames
        .lock()
        .iter()
        .any(|(_, _, name)| name == "✅ [RESOLVED] Ticket #42"));
}

#[tokio::test(start_paused = true)]
async fn end_without_resolution_gets_usage_help() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);
    create(&engine).await;

    assert!(engine.dispatch_inbound(staff_text(1, "&end")).await);
    settle(&engine).await;

    assert!(gateway
        .texts_to(Endpoint::thread(GROUP, 1))
        .iter()
        .any(|t| t.contains("Usage: &end")));
    assert!(store.get_session("support_42").unwrap().unwrap().is_active());
}

#[tokio::test(start_paused = true)]
async fn spam_command_works_from_waiting_staff() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);
    create(&engine).await;
    store
        .update_session("support_42", &mut |s| s.state = SessionState::WaitingStaff)
        .unwrap();

    assert!(engine.dispatch_inbound(staff_text(1, "&spam")).await);
    settle(&engine).await;

    let session = store.get_session("support_42").unwrap().unwrap();
    assert!(!session.is_active());
    assert_eq!(session.state, SessionState::Spam);
    assert_eq!(
        store.get_ticket(TICKET).unwrap().unwrap().status,
        TicketStatus::Spam
    );
    assert!(gateway
        .renames
        .lock()
        .iter()
        .any(|(_, _, name)| name == "🚫 [SPAM] Ticket #42"));
}

#[tokio::test(start_paused = true)]
async fn state_gated_command_is_rejected_with_reason() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);
    create(&engine).await;
    store
        .update_session("support_42", &mut |s| s.state = SessionState::WaitingStaff)
        .unwrap();

    assert!(engine.dispatch_inbound(staff_text(1, "&history")).await);
    settle(&engine).await;

    assert!(gateway
        .texts_to(Endpoint::thread(GROUP, 1))
        .iter()
        .any(|t| t.contains("not allowed in state")));
    assert!(store.get_session("support_42").unwrap().unwrap().is_active());
}

#[tokio::test(start_paused = true)]
async fn unknown_command_gets_a_notice() {
    let tmp = TempDir::new().unwrap();
    let (engine, _store, gateway) = new_engine(&tmp);
    create(&engine).await;

    assert!(engine.dispatch_inbound(staff_text(1, "&frobnicate now")).await);
    settle(&engine).await;

    assert!(gateway
        .texts_to(Endpoint::thread(GROUP, 1))
        .iter()
        .any(|t| t.contains("Unknown command: &frobnicate")));
}

#[tokio::test(start_paused = true)]
async fn info_and_history_report_to_the_staff_thread() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);

    let mut old = TicketRecord::new(40, CLIENT);
    old.status = TicketStatus::Resolved;
    old.resolution = Some("shipped replacement".into());
    store.upsert_ticket(old).unwrap();

    create(&engine).await;
    assert!(engine.dispatch_inbound(staff_text(1, "&info")).await);
    assert!(engine.dispatch_inbound(staff_text(1, "&history")).await);
    settle(&engine).await;

    let to_staff = gateway.texts_to(Endpoint::thread(GROUP, 1));
    assert!(to_staff.iter().any(|t| t.contains("Alice") && t.contains("State: in_progress")));
    assert!(to_staff
        .iter()
        .any(|t| t.contains("#40") && t.contains("shipped replacement")));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reaper, auditor, restore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn reaper_closes_idle_sessions_as_system() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, gateway) = new_engine(&tmp);
    create(&engine).await;

    store
        .update_session("support_42", &mut |s| {
            s.last_activity_at = Utc::now() - chrono::Duration::hours(25);
        })
        .unwrap();

    assert_eq!(engine.reap_stale_once().await.unwrap(), 1);
    settle(&engine).await;

    let session = store.get_session("support_42").unwrap().unwrap();
    assert!(!session.is_active());
    assert_eq!(session.closed_by.as_deref(), Some("system"));
    assert!(store.pointer(CLIENT).unwrap().is_none());
    assert_eq!(engine.registry_stats().total_registered, 0);
    assert!(gateway
        .texts_to(Endpoint::user(CLIENT))
        .iter()
        .any(|t| t.contains("closed automatically")));

    // Second pass finds nothing.
    assert_eq!(engine.reap_stale_once().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn reaper_leaves_fresh_sessions_alone() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, _gateway) = new_engine(&tmp);
    create(&engine).await;

    assert_eq!(engine.reap_stale_once().await.unwrap(), 0);
    assert!(store.get_session("support_42").unwrap().unwrap().is_active());
    assert_eq!(engine.registry_stats().total_registered, 2);
}

#[tokio::test(start_paused = true)]
async fn auditor_clears_pointers_without_an_active_session() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, _gateway) = new_engine(&tmp);
    create(&engine).await;

    // Session flipped closed behind the engine's back; pointer and
    // registrations linger.
    store
        .update_session("support_42", &mut |s| {
            s.status = dr_domain::SessionStatus::Closed;
        })
        .unwrap();
    assert!(store.pointer(CLIENT).unwrap().is_some());

    assert_eq!(engine.audit_pointers_once().unwrap(), 1);
    assert!(store.pointer(CLIENT).unwrap().is_none());
    assert_eq!(engine.registry_stats().total_registered, 0);

    // Converged; the next pass is a no-op.
    assert_eq!(engine.audit_pointers_once().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn auditor_keeps_valid_pointers() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, _gateway) = new_engine(&tmp);
    create(&engine).await;

    assert_eq!(engine.audit_pointers_once().unwrap(), 0);
    assert!(store.pointer(CLIENT).unwrap().is_some());
    assert_eq!(engine.registry_stats().total_registered, 2);
}

#[tokio::test(start_paused = true)]
async fn restore_reregisters_sessions_and_repairs_pointers() {
    let tmp = TempDir::new().unwrap();
    let (engine, store, _gateway) = new_engine(&tmp);
    create(&engine).await;

    // Simulate a restart: a fresh engine over the same store, with the
    // pointer corrupted while we were down.
    store
        .set_pointer(
            CLIENT,
            SessionPointer {
                session_id: "support_999".into(),
                ticket_id: 999,
                thread_id: 77,
                staff_id: None,
                saved_at: Utc::now(),
            },
        )
        .unwrap();
    drop(engine);

    let (engine, store, gateway) = build_engine(store);
    assert_eq!(engine.registry_stats().total_registered, 0);

    assert_eq!(engine.restore_on_startup().unwrap(), 1);
    assert_eq!(engine.registry_stats().total_registered, 2);
    assert!(gateway.dispatches(&EndpointKey::user(CLIENT)));

    // The session row won.
    let pointer = store.pointer(CLIENT).unwrap().unwrap();
    assert_eq!(pointer.session_id, "support_42");
    assert_eq!(pointer.thread_id, 1);

    // And the restored handlers actually route.
    assert!(engine.dispatch_inbound(client_text("back again")).await);
    assert!(gateway
        .texts_to(Endpoint::thread(GROUP, 1))
        .iter()
        .any(|t| t.contains("back again")));
}

#[tokio::test(start_paused = true)]
async fn zombie_detection_compares_registry_and_dispatch_set() {
    let tmp = TempDir::new().unwrap();
    let (engine, _store, gateway) = new_engine(&tmp);
    create(&engine).await;
    assert!(!engine.registry_stats().has_zombies());

    // The platform side lost its bindings.
    gateway.dispatch.lock().clear();
    assert!(engine.registry_stats().has_zombies());
}
