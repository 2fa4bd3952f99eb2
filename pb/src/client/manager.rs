//! Connection manager - one transport link, reconnection, typed dispatch
//!
//! The manager runs as a task owning the only live transport link.
//! Decoded frames fan out on the event bus; commands arrive on an mpsc
//! channel from the cloneable [`ConnectionManager`] handle. When the link
//! drops, reconnection is scheduled with exponential backoff and jitter,
//! capped at a configured attempt count; on success every tracked plan
//! subscription is re-issued before the connected status is announced.

use std::collections::BTreeSet;
use std::sync::Arc;

use eyre::{Result, eyre};
use requestkit::BackoffPolicy;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;
use crate::protocol::{ClientEvent, Envelope, decode_frame};

use super::bus::EventBus;
use super::transport::{Transport, TransportError, TransportLink};

/// Snapshot of the manager's connectivity
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub subscriptions: Vec<String>,
}

/// Counters for observability
#[derive(Debug, Clone, Default)]
pub struct ConnectionMetrics {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub events_published: u64,
    pub frames_dropped: u64,
    pub reconnect_attempts: u64,
}

enum ConnCommand {
    Connect {
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    Disconnect,
    Send {
        frame: Envelope,
    },
    Subscribe {
        plan_id: String,
    },
    Unsubscribe {
        plan_id: String,
    },
    State {
        reply: oneshot::Sender<ConnectionState>,
    },
    Metrics {
        reply: oneshot::Sender<ConnectionMetrics>,
    },
    Shutdown,
}

enum LinkState {
    /// No link and no reconnection pending
    Idle,
    /// Live link
    Connected(Box<dyn TransportLink>),
    /// Link lost; `attempt` reconnect tries have failed so far and the
    /// next one fires at `deadline`
    Waiting { attempt: u32, deadline: tokio::time::Instant },
}

enum Flow {
    Continue(LinkState),
    Stop,
}

/// Cloneable handle to the connection actor
#[derive(Clone)]
pub struct ConnectionManager {
    tx: mpsc::Sender<ConnCommand>,
}

impl ConnectionManager {
    /// Spawn the connection actor and return its handle
    pub fn spawn(url: impl Into<String>, transport: Arc<dyn Transport>, bus: Arc<EventBus>, config: &ReconnectConfig) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let actor = ConnActor {
            url: url.into(),
            transport,
            bus,
            policy: config.policy(),
            max_attempts: config.max_attempts,
            rx,
            subscriptions: BTreeSet::new(),
            reconnect_attempts: 0,
            metrics: ConnectionMetrics::default(),
        };
        tokio::spawn(actor.run());
        Self { tx }
    }

    /// Open the transport; resolves once the link is up
    ///
    /// Calling this with a link already open replaces the prior link.
    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(ConnCommand::Connect { reply }).await?;
        rx.await
            .map_err(|_| eyre!("Connection manager shut down"))?
            .map_err(|e| eyre!("Connect failed: {}", e))
    }

    /// Close the link, clear subscription tracking, cancel pending
    /// reconnects. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        self.send_cmd(ConnCommand::Disconnect).await
    }

    /// Send a frame; warns and drops it when not connected
    pub async fn send(&self, frame: Envelope) -> Result<()> {
        self.send_cmd(ConnCommand::Send { frame }).await
    }

    /// Track a plan subscription and announce it to the backend
    pub async fn subscribe_plan(&self, plan_id: &str) -> Result<()> {
        self.send_cmd(ConnCommand::Subscribe {
            plan_id: plan_id.to_string(),
        })
        .await
    }

    pub async fn unsubscribe_plan(&self, plan_id: &str) -> Result<()> {
        self.send_cmd(ConnCommand::Unsubscribe {
            plan_id: plan_id.to_string(),
        })
        .await
    }

    pub async fn state(&self) -> Result<ConnectionState> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(ConnCommand::State { reply }).await?;
        rx.await.map_err(|_| eyre!("Connection manager shut down"))
    }

    pub async fn metrics(&self) -> Result<ConnectionMetrics> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(ConnCommand::Metrics { reply }).await?;
        rx.await.map_err(|_| eyre!("Connection manager shut down"))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send_cmd(ConnCommand::Shutdown).await
    }

    async fn send_cmd(&self, cmd: ConnCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| eyre!("Connection manager channel closed"))
    }
}

struct ConnActor {
    url: String,
    transport: Arc<dyn Transport>,
    bus: Arc<EventBus>,
    policy: BackoffPolicy,
    max_attempts: u32,
    rx: mpsc::Receiver<ConnCommand>,
    subscriptions: BTreeSet<String>,
    reconnect_attempts: u32,
    metrics: ConnectionMetrics,
}

impl ConnActor {
    async fn run(mut self) {
        info!(url = %self.url, "ConnectionManager started");
        let mut link = LinkState::Idle;

        loop {
            link = match link {
                LinkState::Idle => match self.rx.recv().await {
                    None => break,
                    Some(cmd) => match self.handle_cmd(cmd, LinkState::Idle).await {
                        Flow::Continue(next) => next,
                        Flow::Stop => break,
                    },
                },

                LinkState::Connected(mut conn) => {
                    tokio::select! {
                        cmd = self.rx.recv() => match cmd {
                            None => {
                                conn.close().await;
                                break;
                            }
                            Some(cmd) => match self.handle_cmd(cmd, LinkState::Connected(conn)).await {
                                Flow::Continue(next) => next,
                                Flow::Stop => break,
                            },
                        },
                        frame = conn.recv() => match frame {
                            Some(Ok(text)) => {
                                self.on_frame(&text);
                                LinkState::Connected(conn)
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "transport error, scheduling reconnect");
                                self.begin_reconnect()
                            }
                            None => {
                                info!("transport closed by peer, scheduling reconnect");
                                self.begin_reconnect()
                            }
                        },
                    }
                }

                LinkState::Waiting { attempt, deadline } => {
                    tokio::select! {
                        cmd = self.rx.recv() => match cmd {
                            None => break,
                            Some(cmd) => match self.handle_cmd(cmd, LinkState::Waiting { attempt, deadline }).await {
                                Flow::Continue(next) => next,
                                Flow::Stop => break,
                            },
                        },
                        _ = tokio::time::sleep_until(deadline) => self.try_reconnect(attempt).await,
                    }
                }
            };
        }

        info!("ConnectionManager stopped");
    }

    async fn handle_cmd(&mut self, cmd: ConnCommand, link: LinkState) -> Flow {
        match cmd {
            ConnCommand::Connect { reply } => {
                if let LinkState::Connected(mut old) = link {
                    debug!("connect: replacing existing link");
                    old.close().await;
                }
                match self.dial().await {
                    Ok(conn) => {
                        let _ = reply.send(Ok(()));
                        Flow::Continue(LinkState::Connected(conn))
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        Flow::Continue(LinkState::Idle)
                    }
                }
            }

            ConnCommand::Disconnect => {
                let was_connected = matches!(link, LinkState::Connected(_));
                if let LinkState::Connected(mut conn) = link {
                    conn.close().await;
                }
                self.subscriptions.clear();
                self.reconnect_attempts = 0;
                if was_connected {
                    self.bus.emit(ClientEvent::ConnectionStatus { connected: false });
                }
                Flow::Continue(LinkState::Idle)
            }

            ConnCommand::Send { frame } => match link {
                LinkState::Connected(conn) => self.send_on(conn, &frame.to_json()).await,
                other => {
                    warn!(kind = %frame.kind, "send: not connected, dropping frame");
                    Flow::Continue(other)
                }
            },

            ConnCommand::Subscribe { plan_id } => {
                self.subscriptions.insert(plan_id.clone());
                match link {
                    LinkState::Connected(conn) => {
                        let frame = Envelope::subscribe(&plan_id).to_json();
                        self.send_on(conn, &frame).await
                    }
                    other => Flow::Continue(other),
                }
            }

            ConnCommand::Unsubscribe { plan_id } => {
                self.subscriptions.remove(&plan_id);
                match link {
                    LinkState::Connected(conn) => {
                        let frame = Envelope::unsubscribe(&plan_id).to_json();
                        self.send_on(conn, &frame).await
                    }
                    other => Flow::Continue(other),
                }
            }

            ConnCommand::State { reply } => {
                let snapshot = ConnectionState {
                    connected: matches!(link, LinkState::Connected(_)),
                    reconnect_attempts: self.reconnect_attempts,
                    subscriptions: self.subscriptions.iter().cloned().collect(),
                };
                let _ = reply.send(snapshot);
                Flow::Continue(link)
            }

            ConnCommand::Metrics { reply } => {
                let _ = reply.send(self.metrics.clone());
                Flow::Continue(link)
            }

            ConnCommand::Shutdown => {
                if let LinkState::Connected(mut conn) = link {
                    conn.close().await;
                }
                Flow::Stop
            }
        }
    }

    /// Send on a live link; a send failure means the link is gone
    async fn send_on(&mut self, mut conn: Box<dyn TransportLink>, text: &str) -> Flow {
        match conn.send(text).await {
            Ok(()) => {
                self.metrics.frames_sent += 1;
                Flow::Continue(LinkState::Connected(conn))
            }
            Err(e) => {
                warn!(error = %e, "send failed, link lost");
                Flow::Continue(self.begin_reconnect())
            }
        }
    }

    async fn dial(&mut self) -> Result<Box<dyn TransportLink>, TransportError> {
        let mut conn = self.transport.connect(&self.url).await?;
        self.resubscribe(conn.as_mut()).await?;
        self.reconnect_attempts = 0;
        self.bus.emit(ClientEvent::ConnectionStatus { connected: true });
        Ok(conn)
    }

    /// Re-issue subscribe frames for every tracked plan
    ///
    /// The backend tolerates duplicates, so this runs unconditionally.
    async fn resubscribe(&mut self, conn: &mut dyn TransportLink) -> Result<(), TransportError> {
        for plan_id in &self.subscriptions {
            conn.send(&Envelope::subscribe(plan_id).to_json()).await?;
            self.metrics.frames_sent += 1;
        }
        Ok(())
    }

    fn begin_reconnect(&mut self) -> LinkState {
        self.reconnect_attempts = 0;
        self.bus.emit(ClientEvent::ConnectionStatus { connected: false });
        self.schedule_retry(0)
    }

    fn schedule_retry(&self, attempt: u32) -> LinkState {
        let delay = self.policy.delay_for(attempt);
        debug!(
            attempt = attempt + 1,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        LinkState::Waiting {
            attempt,
            deadline: tokio::time::Instant::now() + delay,
        }
    }

    async fn try_reconnect(&mut self, attempt: u32) -> LinkState {
        self.metrics.reconnect_attempts += 1;
        match self.dial().await {
            Ok(conn) => {
                info!(attempt = attempt + 1, "reconnected");
                LinkState::Connected(conn)
            }
            Err(e) => {
                let failed = attempt + 1;
                self.reconnect_attempts = failed;
                if failed >= self.max_attempts {
                    warn!(attempts = failed, error = %e, "reconnect attempts exhausted, giving up");
                    self.bus.emit(ClientEvent::ReconnectExhausted { attempts: failed });
                    LinkState::Idle
                } else {
                    debug!(attempt = failed, error = %e, "reconnect attempt failed");
                    self.schedule_retry(failed)
                }
            }
        }
    }

    fn on_frame(&mut self, text: &str) {
        self.metrics.frames_received += 1;
        match decode_frame(text) {
            Some(event) => {
                self.metrics.events_published += 1;
                self.bus.emit(event);
            }
            None => {
                self.metrics.frames_dropped += 1;
            }
        }
    }
}
