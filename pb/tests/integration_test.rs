//! Integration tests for PlanBridge
//!
//! These drive the public API end-to-end: a scripted in-memory transport
//! feeds protocol frames through the connection manager, the session
//! applies lifecycle transitions, and a scripted backend records every
//! outbound call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, watch};

use planbridge::backend::{ApiError, ClarificationAnswer, PlanContext, PlanDecision, PlanSnapshot};
use planbridge::config::ReconnectConfig;
use planbridge::{
    AgentKind, AgentMessage, ClientEvent, ConnectionManager, EventBus, MessageWriter, Plan, PlanBackend, PlanSession,
    PlanStatus, SessionHandle, SessionPhase, SessionSnapshot, Transport, TransportError, TransportLink, UiEffects,
};

// =============================================================================
// Scripted collaborators
// =============================================================================

struct ScriptedTransport {
    outcomes: Mutex<VecDeque<bool>>,
    connects: AtomicU32,
    closes: Arc<AtomicU32>,
    sent: Arc<Mutex<Vec<String>>>,
    links: Mutex<Vec<mpsc::UnboundedSender<Result<String, TransportError>>>>,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::new()),
            connects: AtomicU32::new(0),
            closes: Arc::new(AtomicU32::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
            links: Mutex::new(Vec::new()),
        })
    }

    fn inject(&self, frame: serde_json::Value) {
        let links = self.links.lock().unwrap();
        let tx = links.last().expect("no live link");
        tx.send(Ok(frame.to_string())).unwrap();
    }

    fn drop_link(&self) {
        self.links.lock().unwrap().pop();
    }

    fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

struct ScriptedLink {
    rx: mpsc::UnboundedReceiver<Result<String, TransportError>>,
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicU32>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, _url: &str) -> Result<Box<dyn TransportLink>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let ok = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
        if !ok {
            return Err(TransportError::Connect("refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.links.lock().unwrap().push(tx);
        Ok(Box::new(ScriptedLink {
            rx,
            sent: self.sent.clone(),
            closes: self.closes.clone(),
        }))
    }
}

#[async_trait]
impl TransportLink for ScriptedLink {
    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ScriptedBackend {
    fail_decide: AtomicBool,
    decides: Mutex<Vec<PlanDecision>>,
    clarifies: Mutex<Vec<ClarificationAnswer>>,
    persisted: Mutex<Vec<(String, bool, Option<String>)>>,
}

#[async_trait]
impl PlanBackend for ScriptedBackend {
    async fn create_plan(&self, goal: &str) -> Result<Plan, ApiError> {
        Ok(Plan {
            id: "plan-1".to_string(),
            goal: goal.to_string(),
            status: PlanStatus::Creating,
            session_id: "session-1".to_string(),
            team_id: None,
        })
    }

    async fn init_team(&self, _session_id: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn decide_plan(&self, decision: &PlanDecision) -> Result<(), ApiError> {
        self.decides.lock().unwrap().push(decision.clone());
        if self.fail_decide.load(Ordering::SeqCst) {
            Err(ApiError::Http {
                status: 503,
                message: "orchestrator busy".to_string(),
            })
        } else {
            Ok(())
        }
    }

    async fn submit_clarification(&self, answer: &ClarificationAnswer) -> Result<(), ApiError> {
        self.clarifies.lock().unwrap().push(answer.clone());
        Ok(())
    }

    async fn persist_message(
        &self,
        message: &AgentMessage,
        _ctx: &PlanContext,
        is_final: bool,
        streaming_buffer: Option<&str>,
    ) -> Result<(), ApiError> {
        self.persisted
            .lock()
            .unwrap()
            .push((message.content.clone(), is_final, streaming_buffer.map(str::to_string)));
        Ok(())
    }

    async fn fetch_plan(&self, _plan_id: &str) -> Result<PlanSnapshot, ApiError> {
        unimplemented!("not exercised")
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, ApiError> {
        Ok(vec![])
    }
}

struct SilentEffects;

impl UiEffects for SilentEffects {
    fn show_toast(&self, _text: &str, _kind: planbridge::ToastKind) {}
    fn navigate_home(&self) {}
    fn scroll_to_latest(&self) {}
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    transport: Arc<ScriptedTransport>,
    backend: Arc<ScriptedBackend>,
    bus: Arc<EventBus>,
    conn: ConnectionManager,
    session: SessionHandle,
    snapshots: watch::Receiver<SessionSnapshot>,
}

fn harness() -> Harness {
    let transport = ScriptedTransport::new();
    let backend = Arc::new(ScriptedBackend::default());
    let bus = Arc::new(EventBus::with_default_capacity());
    let config = ReconnectConfig {
        max_attempts: 5,
        base_delay_ms: 5,
        max_delay_ms: 20,
        factor: 2.0,
    };
    let conn = ConnectionManager::spawn("ws://test", transport.clone(), bus.clone(), &config);
    let writer = MessageWriter::new(backend.clone(), bus.clone(), Duration::from_millis(30));
    let (session, snapshots) = PlanSession::spawn(
        backend.clone(),
        conn.clone(),
        writer,
        Arc::new(SilentEffects),
        &bus,
    );
    Harness {
        transport,
        backend,
        bus,
        conn,
        session,
        snapshots,
    }
}

async fn wait_for<F>(rx: &mut watch::Receiver<SessionSnapshot>, mut cond: F) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if cond(&snapshot) {
                    return snapshot.clone();
                }
            }
            rx.changed().await.expect("session dropped");
        }
    })
    .await
    .expect("condition not reached in time")
}

fn approval_frame() -> serde_json::Value {
    json!({
        "type": "PLAN_APPROVAL_REQUEST",
        "plan_id": "plan-1",
        "data": {
            "steps": [
                {"action": "Collect requirements", "agent": "researcher"},
                {"action": "Draft the report", "agent": "writer"}
            ],
            "facts": "The customer wants a summary",
            "m_plan_id": "m-1"
        }
    })
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_full_lifecycle_message_order_and_single_close() {
    let mut h = harness();
    let mut events = h.bus.subscribe();

    h.conn.connect().await.unwrap();
    let plan_id = h.session.submit_goal("write the quarterly report").await.unwrap();
    assert_eq!(plan_id, "plan-1");

    // The subscribe frame went out for the new plan
    tokio::time::sleep(Duration::from_millis(20)).await;
    let frames = h.transport.sent_frames();
    assert!(frames.iter().any(|f| f.contains("SUBSCRIBE_PLAN") && f.contains("plan-1")));

    // Proposal arrives, approval controls unlock
    h.transport.inject(approval_frame());
    let snapshot = wait_for(&mut h.snapshots, |s| s.phase == SessionPhase::AwaitingApproval).await;
    assert!(snapshot.flags.approval_enabled);
    assert_eq!(snapshot.approval.as_ref().unwrap().steps.len(), 2);

    // Approve; execution begins
    h.session.approve().await.unwrap();
    let snapshot = wait_for(&mut h.snapshots, |s| s.phase == SessionPhase::InProgress).await;
    assert!(snapshot.flags.processing);

    // Streamed thinking, then a clarification interrupt
    for fragment in ["Analyzing", " data", "..."] {
        h.transport.inject(json!({
            "type": "AGENT_MESSAGE_STREAMING",
            "plan_id": "plan-1",
            "data": {"content": fragment}
        }));
    }
    wait_for(&mut h.snapshots, |s| s.streaming == "Analyzing data...").await;

    h.transport.inject(json!({
        "type": "USER_CLARIFICATION_REQUEST",
        "plan_id": "plan-1",
        "data": {"request_id": "q-1", "question": "Which quarter?"}
    }));
    let snapshot = wait_for(&mut h.snapshots, |s| s.phase == SessionPhase::AwaitingClarification).await;
    assert!(snapshot.streaming.is_empty());
    assert!(!snapshot.flags.buffering);

    // Answer; the human echo lands immediately
    h.session.answer_clarification("Q3").await.unwrap();
    let snapshot = wait_for(&mut h.snapshots, |s| s.phase == SessionPhase::InProgress).await;
    assert!(snapshot.messages.iter().any(|m| m.kind == AgentKind::Human && m.content == "Q3"));

    // More streamed thinking, then the terminal result
    h.transport.inject(json!({
        "type": "AGENT_MESSAGE_STREAMING",
        "plan_id": "plan-1",
        "data": {"content": "final touches"}
    }));
    wait_for(&mut h.snapshots, |s| s.flags.buffering).await;

    h.transport.inject(json!({
        "type": "FINAL_RESULT_MESSAGE",
        "plan_id": "plan-1",
        "data": {"status": "COMPLETED", "content": "Report delivered"}
    }));
    let snapshot = wait_for(&mut h.snapshots, |s| s.phase == SessionPhase::Completed).await;

    // Message log order: clarification question, human echo, celebration
    let contents: Vec<&str> = snapshot.messages.iter().map(|m| m.content.as_str()).collect();
    let q = contents.iter().position(|c| *c == "Which quarter?").unwrap();
    let a = contents.iter().position(|c| *c == "Q3").unwrap();
    let done = contents.iter().position(|c| c.contains("Report delivered")).unwrap();
    assert!(q < a && a < done, "unexpected order: {:?}", contents);

    // Transport closed exactly once
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.transport.closes.load(Ordering::SeqCst), 1);
    let state = h.conn.state().await.unwrap();
    assert!(!state.connected);
    assert!(state.subscriptions.is_empty());

    // The final write carried the streaming buffer, and exactly one
    // list refresh fired after it settled
    let mut refreshes = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
    while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        if matches!(event, ClientEvent::PlanListRefresh) {
            refreshes += 1;
        }
    }
    assert_eq!(refreshes, 1);

    let persisted = h.backend.persisted.lock().unwrap();
    let finals: Vec<_> = persisted.iter().filter(|(_, is_final, _)| *is_final).collect();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].2.as_deref(), Some("final touches"));
}

#[tokio::test]
async fn test_approve_failure_allows_retry() {
    let mut h = harness();

    h.conn.connect().await.unwrap();
    h.session.submit_goal("retry me").await.unwrap();

    h.transport.inject(approval_frame());
    wait_for(&mut h.snapshots, |s| s.phase == SessionPhase::AwaitingApproval).await;

    // First attempt fails; state holds and controls come back
    h.backend.fail_decide.store(true, Ordering::SeqCst);
    assert!(h.session.approve().await.is_err());
    let snapshot = wait_for(&mut h.snapshots, |s| s.flags.approval_enabled).await;
    assert_eq!(snapshot.phase, SessionPhase::AwaitingApproval);
    assert!(snapshot.approval.is_some());

    // Second attempt succeeds
    h.backend.fail_decide.store(false, Ordering::SeqCst);
    h.session.approve().await.unwrap();
    wait_for(&mut h.snapshots, |s| s.phase == SessionPhase::InProgress).await;

    let decides = h.backend.decides.lock().unwrap();
    assert_eq!(decides.len(), 2);
    assert!(decides.iter().all(|d| d.approved));
}

#[tokio::test]
async fn test_link_drop_resubscribes_and_session_survives() {
    let mut h = harness();

    h.conn.connect().await.unwrap();
    h.session.submit_goal("survive a drop").await.unwrap();
    h.transport.inject(approval_frame());
    wait_for(&mut h.snapshots, |s| s.phase == SessionPhase::AwaitingApproval).await;

    // The link dies mid-session
    h.transport.drop_link();

    // Reconnection re-issues the plan subscription automatically
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if h.transport.connects.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no reconnect happened");

    tokio::time::sleep(Duration::from_millis(20)).await;
    let subscribe_count = h
        .transport
        .sent_frames()
        .iter()
        .filter(|f| f.contains("SUBSCRIBE_PLAN") && f.contains("plan-1"))
        .count();
    assert_eq!(subscribe_count, 2);

    // Session state was untouched by the transport blip
    let snapshot = h.snapshots.borrow().clone();
    assert_eq!(snapshot.phase, SessionPhase::AwaitingApproval);
    assert!(snapshot.approval.is_some());

    // The stream keeps working on the new link
    h.transport.inject(json!({
        "type": "AGENT_MESSAGE",
        "plan_id": "plan-1",
        "data": {"source": "researcher", "content": "back online"}
    }));
    let snapshot = wait_for(&mut h.snapshots, |s| {
        s.messages.iter().any(|m| m.content == "back online")
    })
    .await;
    assert_eq!(snapshot.messages.last().unwrap().agent_id, "researcher");
}
