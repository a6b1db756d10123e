//! Shared test harness: a scripted in-memory transport plus helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use pairing_proxy::config::PairingConfig;
use pairing_proxy::registry::{SessionRegistry, SessionStatus};
use pairing_proxy::session::{BackoffTable, DisconnectReason, SessionManager};
use pairing_proxy::storage::{AuthState, AuthStore};
use pairing_proxy::transport::{
    ConnectionUpdate, CredentialUpdate, Transport, TransportError, TransportEvent,
    TransportEvents, TransportSession,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const NUMBER: &str = "15551234567";

/// How the scripted transport answers pairing-code requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeBehavior {
    /// Reuse the preferred code if offered, otherwise generate one.
    Normal,
    /// Refuse every preferred code.
    RejectPreferred,
    /// Fail every request.
    Fail,
}

struct ScriptState {
    sessions: Vec<Arc<MockSession>>,
    code_behavior: CodeBehavior,
    codes_generated: usize,
    fail_open: bool,
    healthy: bool,
}

/// Transport whose sessions are driven by the test.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                sessions: Vec::new(),
                code_behavior: CodeBehavior::Normal,
                codes_generated: 0,
                fail_open: false,
                healthy: true,
            })),
        }
    }

    pub fn set_code_behavior(&self, behavior: CodeBehavior) {
        self.state.lock().unwrap().code_behavior = behavior;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().unwrap().healthy = healthy;
    }

    /// Number of sessions opened so far.
    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn session(&self, index: usize) -> Arc<MockSession> {
        self.state.lock().unwrap().sessions[index].clone()
    }

    /// Wait until session `index` has been opened.
    pub async fn wait_for_session(&self, index: usize) -> Arc<MockSession> {
        for _ in 0..300 {
            if self.opened() > index {
                return self.session(index);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("transport session {} was never opened", index);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open_session(
        &self,
        _phone_number: &str,
        auth: &AuthState,
    ) -> Result<(Arc<dyn TransportSession>, TransportEvents), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_open {
            return Err(TransportError::Open("bridge unreachable".into()));
        }

        let (tx, rx) = mpsc::channel(16);
        let session = Arc::new(MockSession {
            index: state.sessions.len(),
            registered_on_open: auth.is_registered(),
            events: tx,
            script: self.state.clone(),
            code_requests: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        state.sessions.push(session.clone());

        Ok((session, rx))
    }

    async fn health_check(&self) -> bool {
        self.state.lock().unwrap().healthy
    }
}

/// One scripted transport session.
pub struct MockSession {
    pub index: usize,
    /// Whether the stored credentials were registered when it opened
    pub registered_on_open: bool,
    events: mpsc::Sender<TransportEvent>,
    script: Arc<Mutex<ScriptState>>,
    code_requests: Mutex<Vec<Option<String>>>,
    sent: Mutex<Vec<(String, String)>>,
    pings: AtomicUsize,
    closed: AtomicBool,
}

impl MockSession {
    pub async fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event).await;
    }

    pub async fn emit_creds(&self, creds: serde_json::Value) {
        self.emit(TransportEvent::Credentials(CredentialUpdate { creds }))
            .await;
    }

    pub async fn emit_open(&self, own_id: Option<&str>) {
        self.emit(TransportEvent::Connection(ConnectionUpdate::Open {
            own_id: own_id.map(str::to_string),
        }))
        .await;
    }

    pub async fn emit_close(&self, code: u16) {
        self.emit(TransportEvent::Connection(ConnectionUpdate::Close {
            reason: DisconnectReason::from_code(code),
        }))
        .await;
    }

    /// Preferred codes offered on each pairing-code request.
    pub fn code_requests(&self) -> Vec<Option<String>> {
        self.code_requests.lock().unwrap().clone()
    }

    /// Messages sent as (recipient, text).
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportSession for MockSession {
    async fn request_pairing_code(
        &self,
        _phone_number: &str,
        preferred: Option<&str>,
    ) -> Result<String, TransportError> {
        self.code_requests
            .lock()
            .unwrap()
            .push(preferred.map(str::to_string));

        let mut script = self.script.lock().unwrap();
        match (script.code_behavior, preferred) {
            (CodeBehavior::Fail, _) => Err(TransportError::PairingCode("rate limited".into())),
            (CodeBehavior::RejectPreferred, Some(code)) => {
                Err(TransportError::PairingCodeRejected(format!("{} expired", code)))
            }
            (CodeBehavior::Normal, Some(code)) => Ok(code.to_string()),
            (_, None) => {
                script.codes_generated += 1;
                Ok(format!("abcd{:04}", script.codes_generated))
            }
        }
    }

    async fn send_message(&self, recipient: &str, text: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Pairing config with short timings.
pub fn test_config() -> PairingConfig {
    PairingConfig {
        max_retries: 3,
        keepalive_interval: Duration::from_millis(20),
        settle_grace: Duration::from_millis(30),
        close_grace: Duration::from_millis(10),
        completed_cleanup_delay: Duration::from_millis(300),
        pending_cleanup_delay: Duration::from_secs(60),
        exhausted_cleanup_delay: Duration::from_millis(150),
        blob_prefix: "PAIRED~".into(),
        default_owner: "owner@s.whatsapp.net".into(),
        delivery_notice: Some("Linked.".into()),
        backoff: BackoffTable::uniform(Duration::from_millis(20)),
    }
}

/// A manager wired to a scripted transport and a temporary storage root.
pub struct Harness {
    pub manager: SessionManager,
    pub transport: MockTransport,
    pub store: AuthStore,
    _tmp: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: PairingConfig) -> Self {
        let tmp = TempDir::new().unwrap();
        let store = AuthStore::new(tmp.path(), "creds.json");
        let transport = MockTransport::new();
        let manager = SessionManager::new(
            SessionRegistry::new(),
            store.clone(),
            Arc::new(transport.clone()),
            config,
        );

        Self {
            manager,
            transport,
            store,
            _tmp: tmp,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        self.manager.registry()
    }

    /// Wait until the session for `number` has `status`.
    pub async fn wait_for_status(&self, number: &str, status: SessionStatus) {
        for _ in 0..300 {
            if let Some(session) = self.registry().get(number).await {
                if session.status == status {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {} never reached {:?}", number, status);
    }

    /// Wait until the session for `number` is gone from the registry and its
    /// storage has been erased.
    pub async fn wait_for_removal(&self, number: &str) {
        for _ in 0..300 {
            if !self.registry().contains(number).await && !self.store.dir(number).exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {} was never removed", number);
    }
}
