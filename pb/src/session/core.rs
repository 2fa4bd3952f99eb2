//! The session actor: canonical state, transitions, user actions
//!
//! One task owns all session state. Bus events and user commands are the
//! only transition triggers, and the actor processes them one at a time,
//! so transitions never interleave. After every transition the snapshot
//! is republished on the watch channel.

use std::sync::Arc;

use eyre::{Result, eyre};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::backend::{ClarificationAnswer, PlanBackend, PlanContext, PlanDecision};
use crate::client::{ConnectionManager, EventBus};
use crate::domain::{AgentKind, AgentMessage, ApprovalRequest, ClarificationRequest, PlanStatus};
use crate::persist::MessageWriter;
use crate::protocol::{ClientEvent, format_error_block};

use super::effects::{ToastKind, UiEffects};
use super::state::{SessionPhase, SessionSnapshot};

const ORCHESTRATOR_AGENT: &str = "orchestrator";
const SYSTEM_AGENT: &str = "system";
const HUMAN_AGENT: &str = "user";

enum SessionCommand {
    SubmitGoal {
        goal: String,
        reply: oneshot::Sender<Result<String>>,
    },
    OpenPlan {
        plan_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Approve {
        reply: oneshot::Sender<Result<()>>,
    },
    Reject {
        feedback: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    AnswerClarification {
        answer: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Reset,
    Shutdown,
}

enum Flow {
    Continue,
    Stop,
}

/// Cloneable handle for driving a session
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Submit a goal; returns the new plan's id once the backend accepts
    pub async fn submit_goal(&self, goal: &str) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::SubmitGoal {
            goal: goal.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| eyre!("Session shut down"))?
    }

    /// Open an existing plan: fetch its snapshot and subscribe to its stream
    pub async fn open_plan(&self, plan_id: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::OpenPlan {
            plan_id: plan_id.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| eyre!("Session shut down"))?
    }

    /// Approve the pending proposal
    pub async fn approve(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Approve { reply }).await?;
        rx.await.map_err(|_| eyre!("Session shut down"))?
    }

    /// Reject the pending proposal; always navigates away
    pub async fn reject(&self, feedback: Option<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Reject { feedback, reply }).await?;
        rx.await.map_err(|_| eyre!("Session shut down"))?
    }

    /// Answer the pending clarification
    pub async fn answer_clarification(&self, answer: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::AnswerClarification {
            answer: answer.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| eyre!("Session shut down"))?
    }

    /// Leave the plan: discard all session state unconditionally
    pub async fn reset(&self) -> Result<()> {
        self.send(SessionCommand::Reset).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown).await
    }

    async fn send(&self, cmd: SessionCommand) -> Result<()> {
        self.tx.send(cmd).await.map_err(|_| eyre!("Session channel closed"))
    }
}

/// The session actor
pub struct PlanSession {
    backend: Arc<dyn PlanBackend>,
    conn: ConnectionManager,
    writer: MessageWriter,
    effects: Arc<dyn UiEffects>,
    bus_rx: broadcast::Receiver<ClientEvent>,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    watch_tx: watch::Sender<SessionSnapshot>,
    canon: SessionSnapshot,
    m_plan_id: Option<String>,
}

impl PlanSession {
    /// Spawn the session actor; returns its handle and state projection
    pub fn spawn(
        backend: Arc<dyn PlanBackend>,
        conn: ConnectionManager,
        writer: MessageWriter,
        effects: Arc<dyn UiEffects>,
        bus: &EventBus,
    ) -> (SessionHandle, watch::Receiver<SessionSnapshot>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (watch_tx, watch_rx) = watch::channel(SessionSnapshot::default());
        let actor = PlanSession {
            backend,
            conn,
            writer,
            effects,
            bus_rx: bus.subscribe(),
            cmd_rx,
            watch_tx,
            canon: SessionSnapshot::default(),
            m_plan_id: None,
        };
        tokio::spawn(actor.run());
        (SessionHandle { tx: cmd_tx }, watch_rx)
    }

    async fn run(mut self) {
        info!("PlanSession started");
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    None => break,
                    Some(cmd) => match self.handle_command(cmd).await {
                        Flow::Continue => {}
                        Flow::Stop => break,
                    },
                },
                event = self.bus_rx.recv() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session fell behind the event bus");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
            self.publish();
        }
        info!("PlanSession stopped");
    }

    fn publish(&self) {
        self.watch_tx.send_replace(self.canon.clone());
    }

    fn plan_context(&self) -> PlanContext {
        match &self.canon.plan {
            Some(plan) => PlanContext {
                plan_id: plan.id.clone(),
                session_id: Some(plan.session_id.clone()),
                m_plan_id: self.m_plan_id.clone(),
            },
            None => PlanContext::default(),
        }
    }

    fn concerns_current_plan(&self, plan_id: Option<&str>) -> bool {
        match (&self.canon.plan, plan_id) {
            (Some(plan), Some(id)) => plan.id == id,
            // Frames without a plan id belong to the single subscription
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn set_status(&mut self, status: PlanStatus) {
        if let Some(plan) = &mut self.canon.plan {
            plan.status = status;
        }
    }

    // === Inbound events ===

    async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::ConnectionStatus { connected } => {
                debug!(connected, "session observed connection status");
            }

            ClientEvent::ReconnectExhausted { attempts } => {
                self.effects.show_toast(
                    &format!("Connection lost after {} reconnect attempts", attempts),
                    ToastKind::Error,
                );
            }

            ClientEvent::PlanListRefresh => {}

            ClientEvent::ApprovalRequest { plan_id, request } => {
                if self.concerns_current_plan(plan_id.as_deref()) {
                    self.on_approval_request(request);
                }
            }

            ClientEvent::StreamingChunk { plan_id, text } => {
                if self.concerns_current_plan(plan_id.as_deref()) {
                    self.canon.streaming.push_str(&text);
                    self.canon.flags.buffering = true;
                }
            }

            ClientEvent::Clarification { plan_id, request } => {
                if self.concerns_current_plan(plan_id.as_deref()) {
                    self.on_clarification(request);
                }
            }

            ClientEvent::ToolMessage { plan_id, .. } => {
                debug!(?plan_id, "tool message received (inert)");
            }

            ClientEvent::FinalResult {
                plan_id,
                status,
                content,
                raw,
            } => {
                if self.concerns_current_plan(plan_id.as_deref()) {
                    self.on_final_result(status, content, raw).await;
                }
            }

            ClientEvent::BackendError { plan_id, detail, raw } => {
                if self.concerns_current_plan(plan_id.as_deref()) {
                    self.on_backend_error(detail, raw);
                }
            }

            ClientEvent::AgentMessage { plan_id, message } => {
                if self.concerns_current_plan(plan_id.as_deref()) {
                    self.canon.messages.push(message.clone());
                    self.writer.process_message(message, self.plan_context(), false, None);
                    self.effects.scroll_to_latest();
                }
            }
        }
    }

    fn on_approval_request(&mut self, request: ApprovalRequest) {
        match self.canon.phase {
            SessionPhase::Creating | SessionPhase::AwaitingApproval | SessionPhase::InProgress => {}
            phase => {
                warn!(?phase, "approval request in unexpected phase, dropping");
                return;
            }
        }

        if request.m_plan_id.is_some() {
            self.m_plan_id = request.m_plan_id.clone();
        }

        // A new request fully replaces any previous one
        self.canon.approval = Some(request);
        self.canon.flags.waiting_for_plan = false;
        self.canon.flags.approval_enabled = true;
        self.canon.phase = SessionPhase::AwaitingApproval;
        self.set_status(PlanStatus::AwaitingApproval);
        self.effects.scroll_to_latest();
    }

    fn on_clarification(&mut self, request: ClarificationRequest) {
        if self.canon.phase != SessionPhase::InProgress && self.canon.phase != SessionPhase::AwaitingClarification {
            warn!(phase = ?self.canon.phase, "clarification in unexpected phase, dropping");
            return;
        }

        let message = AgentMessage::new(ORCHESTRATOR_AGENT, AgentKind::Agent, request.question.clone());
        self.canon.messages.push(message.clone());
        self.writer.process_message(message, self.plan_context(), false, None);

        // The buffered thinking text belongs to the interrupted step
        self.canon.streaming.clear();
        self.canon.flags.buffering = false;
        self.canon.flags.approval_enabled = false;
        self.canon.flags.input_enabled = false;
        self.canon.flags.processing = false;
        self.canon.clarification = Some(request);
        self.canon.phase = SessionPhase::AwaitingClarification;
        self.effects.scroll_to_latest();
    }

    async fn on_final_result(&mut self, status: PlanStatus, content: String, raw: serde_json::Value) {
        if self.canon.phase.is_terminal() {
            debug!("final result after terminal phase, dropping");
            return;
        }

        let text = if content.is_empty() {
            "\u{1f389} Plan completed - all steps finished".to_string()
        } else {
            format!("\u{1f389} {}", content)
        };
        let message = AgentMessage::new(SYSTEM_AGENT, AgentKind::Agent, text).with_raw(raw);
        self.canon.messages.push(message.clone());

        let buffer = std::mem::take(&mut self.canon.streaming);
        self.canon.flags.buffering = false;
        self.canon.flags.approval_enabled = false;
        self.canon.flags.input_enabled = false;
        self.canon.flags.processing = false;
        self.canon.phase = SessionPhase::from_status(status);
        self.set_status(status);
        self.effects.scroll_to_latest();

        if let Err(e) = self.conn.disconnect().await {
            warn!(error = %e, "disconnect after final result failed");
        }

        self.writer
            .process_message(message, self.plan_context(), true, Some(buffer));
    }

    fn on_backend_error(&mut self, detail: String, raw: serde_json::Value) {
        let message = AgentMessage::new(SYSTEM_AGENT, AgentKind::SystemError, format_error_block(&detail)).with_raw(raw);
        self.canon.messages.push(message);

        // Back to a safe idle: nothing is clickable until the user acts
        self.canon.flags.buffering = false;
        self.canon.flags.approval_enabled = false;
        self.canon.flags.input_enabled = false;
        self.canon.flags.processing = false;
        self.canon.flags.waiting_for_plan = false;
        self.canon.phase = SessionPhase::Error;
        self.set_status(PlanStatus::Error);
        self.effects.show_toast(&detail, ToastKind::Error);
        self.effects.scroll_to_latest();
    }

    // === User commands ===

    async fn handle_command(&mut self, cmd: SessionCommand) -> Flow {
        match cmd {
            SessionCommand::SubmitGoal { goal, reply } => {
                let _ = reply.send(self.submit_goal(&goal).await);
                Flow::Continue
            }
            SessionCommand::OpenPlan { plan_id, reply } => {
                let _ = reply.send(self.open_plan(&plan_id).await);
                Flow::Continue
            }
            SessionCommand::Approve { reply } => {
                let _ = reply.send(self.approve().await);
                Flow::Continue
            }
            SessionCommand::Reject { feedback, reply } => {
                let _ = reply.send(self.reject(feedback).await);
                Flow::Continue
            }
            SessionCommand::AnswerClarification { answer, reply } => {
                let _ = reply.send(self.answer_clarification(&answer).await);
                Flow::Continue
            }
            SessionCommand::Reset => {
                self.reset().await;
                Flow::Continue
            }
            SessionCommand::Shutdown => Flow::Stop,
        }
    }

    async fn submit_goal(&mut self, goal: &str) -> Result<String> {
        let plan = match self.backend.create_plan(goal).await {
            Ok(plan) => plan,
            Err(e) => {
                self.effects
                    .show_toast(&format!("Failed to create plan: {}", e), ToastKind::Error);
                return Err(eyre!("Create plan failed: {}", e));
            }
        };

        // Team readiness is best-effort; the orchestrator initializes
        // lazily if this misses
        if let Err(e) = self.backend.init_team(&plan.session_id).await {
            warn!(error = %e, session_id = %plan.session_id, "team initialization failed, continuing");
        }

        self.canon = SessionSnapshot::default();
        self.m_plan_id = None;
        self.canon.phase = SessionPhase::Creating;
        self.canon.flags.waiting_for_plan = true;
        let plan_id = plan.id.clone();
        self.canon.plan = Some(plan);

        self.conn.subscribe_plan(&plan_id).await?;
        Ok(plan_id)
    }

    async fn open_plan(&mut self, plan_id: &str) -> Result<()> {
        if let Some(previous) = self.canon.plan.as_ref().map(|p| p.id.clone()) {
            let _ = self.conn.unsubscribe_plan(&previous).await;
        }

        let snapshot = match self.backend.fetch_plan(plan_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.effects
                    .show_toast(&format!("Failed to load plan: {}", e), ToastKind::Error);
                return Err(eyre!("Fetch plan failed: {}", e));
            }
        };

        self.canon = SessionSnapshot::default();
        self.m_plan_id = snapshot.m_plan_id();
        self.canon.phase = SessionPhase::from_status(snapshot.plan.status);
        self.canon.flags.waiting_for_plan = self.canon.phase == SessionPhase::Creating;
        self.canon.flags.processing = self.canon.phase == SessionPhase::InProgress;
        self.canon.messages = snapshot.messages;
        self.canon.streaming = snapshot.streaming_message.unwrap_or_default();
        self.canon.flags.buffering = !self.canon.streaming.is_empty();
        self.canon.plan = Some(snapshot.plan);

        self.conn.subscribe_plan(plan_id).await?;
        Ok(())
    }

    async fn approve(&mut self) -> Result<()> {
        let Some(approval) = self.canon.approval.clone() else {
            return Err(eyre!("No approval request pending"));
        };
        let Some(plan_id) = self.canon.plan.as_ref().map(|p| p.id.clone()) else {
            return Err(eyre!("No plan open"));
        };

        // Optimistic: lock the controls before the call resolves
        self.canon.flags.approval_enabled = false;
        self.publish();

        let decision = PlanDecision {
            m_plan_id: approval.m_plan_id.clone().or_else(|| self.m_plan_id.clone()),
            plan_id,
            approved: true,
            feedback: None,
        };

        match self.backend.decide_plan(&decision).await {
            Ok(()) => {
                self.canon.approval = None;
                self.canon.phase = SessionPhase::InProgress;
                self.set_status(PlanStatus::InProgress);
                self.canon.flags.processing = true;
                Ok(())
            }
            Err(e) => {
                // Roll back the optimistic disable; the state does not advance
                self.canon.flags.approval_enabled = true;
                self.effects
                    .show_toast(&format!("Failed to approve plan: {}", e), ToastKind::Error);
                Err(eyre!("Approve failed: {}", e))
            }
        }
    }

    async fn reject(&mut self, feedback: Option<String>) -> Result<()> {
        let Some(plan_id) = self.canon.plan.as_ref().map(|p| p.id.clone()) else {
            return Err(eyre!("No plan open"));
        };
        if self.canon.phase != SessionPhase::AwaitingApproval {
            return Err(eyre!("No approval request pending"));
        }

        let decision = PlanDecision {
            m_plan_id: self
                .canon
                .approval
                .as_ref()
                .and_then(|a| a.m_plan_id.clone())
                .or_else(|| self.m_plan_id.clone()),
            plan_id,
            approved: false,
            feedback,
        };

        // Best-effort cleanup: a failed reject call still navigates away
        if let Err(e) = self.backend.decide_plan(&decision).await {
            warn!(error = %e, "reject call failed, navigating anyway");
        }

        self.canon.approval = None;
        self.canon.flags.approval_enabled = false;
        self.canon.phase = SessionPhase::Cancelled;
        self.set_status(PlanStatus::Cancelled);
        self.effects.navigate_home();
        Ok(())
    }

    async fn answer_clarification(&mut self, answer: &str) -> Result<()> {
        let Some(clarification) = self.canon.clarification.clone() else {
            return Err(eyre!("No clarification pending"));
        };
        let Some(plan_id) = self.canon.plan.as_ref().map(|p| p.id.clone()) else {
            return Err(eyre!("No plan open"));
        };

        // Optimistic echo; kept even if the submission fails
        let echo = AgentMessage::new(HUMAN_AGENT, AgentKind::Human, answer);
        self.canon.messages.push(echo);
        self.canon.flags.processing = true;
        self.effects.scroll_to_latest();
        self.publish();

        let submission = ClarificationAnswer {
            request_id: clarification.request_id.clone(),
            answer: answer.to_string(),
            plan_id,
            m_plan_id: self.m_plan_id.clone(),
        };

        match self.backend.submit_clarification(&submission).await {
            Ok(()) => {
                self.canon.clarification = None;
                self.canon.phase = SessionPhase::InProgress;
                self.set_status(PlanStatus::InProgress);
                Ok(())
            }
            Err(e) => {
                self.canon.flags.processing = false;
                self.canon.flags.input_enabled = true;
                self.effects
                    .show_toast(&format!("Failed to submit answer: {}", e), ToastKind::Error);
                Err(eyre!("Clarification failed: {}", e))
            }
        }
    }

    async fn reset(&mut self) {
        if let Some(plan_id) = self.canon.plan.as_ref().map(|p| p.id.clone()) {
            let _ = self.conn.unsubscribe_plan(&plan_id).await;
        }
        // Unconditional: buffered-but-unflushed streaming text is discarded
        self.canon = SessionSnapshot::default();
        self.m_plan_id = None;
    }
}
