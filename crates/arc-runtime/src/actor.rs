//! Actor wrapper around [`Engine`].
//!
//! The actor is the single owner of the engine. Everything reaches it as a
//! [`Command`] on one `mpsc` inbox: caller requests, feed batches and the
//! results of collaborator calls, which run as spawned tasks and post back.
//! The actor itself never awaits a ledger call.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{FutureExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use arc_config::EngineConfig;
use arc_journal::{JournalEvent, JournalWriter};
use arc_ledger::{LedgerClient, LedgerQuery};
use arc_schemas::{FeedKind, GameKind, WagerParams, Wei};
use arc_session::{ValidationError, Wager};

use crate::engine::{Effect, Engine, EngineSnapshot, Input};
use crate::event::EngineEvent;

const INBOX_CAPACITY: usize = 256;
const EVENT_BUS_CAPACITY: usize = 1024;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown payload".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub tick: Duration,
    pub poll: Duration,
    /// Recorded in the journal's session header.
    pub config_hash: Option<String>,
}

impl RuntimeOptions {
    pub fn from_config(cfg: &EngineConfig, config_hash: Option<String>) -> Self {
        Self {
            tick: Duration::from_millis(cfg.round.tick_ms.max(1)),
            poll: Duration::from_millis(cfg.round.poll_ms.max(1)),
            config_hash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStopped;

impl std::fmt::Display for EngineStopped {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "engine is not running")
    }
}

impl std::error::Error for EngineStopped {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceError {
    Rejected(ValidationError),
    Stopped,
}

impl std::fmt::Display for PlaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaceError::Rejected(e) => write!(f, "{e}"),
            PlaceError::Stopped => write!(f, "{EngineStopped}"),
        }
    }
}

impl std::error::Error for PlaceError {}

enum Command {
    Place {
        params: WagerParams,
        stake: Wei,
        reply: oneshot::Sender<Result<Wager, ValidationError>>,
    },
    Reset {
        kind: Option<GameKind>,
        reply: oneshot::Sender<()>,
    },
    Input(Input),
    Shutdown,
}

/// Cloneable front door to a running actor.
#[derive(Clone)]
pub struct EngineHandle {
    inbox: mpsc::Sender<Command>,
    snapshots: watch::Receiver<EngineSnapshot>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    /// Returns the wager in `Submitting` once the gate accepts it.
    pub async fn place_wager(&self, params: WagerParams, stake: Wei) -> Result<Wager, PlaceError> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(Command::Place {
                params,
                stake,
                reply,
            })
            .await
            .map_err(|_| PlaceError::Stopped)?;
        rx.await
            .map_err(|_| PlaceError::Stopped)?
            .map_err(PlaceError::Rejected)
    }

    /// Clear one kind's history, or all of it.
    pub async fn reset(&self, kind: Option<GameKind>) -> Result<(), EngineStopped> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(Command::Reset { kind, reply })
            .await
            .map_err(|_| EngineStopped)?;
        rx.await.map_err(|_| EngineStopped)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn shutdown(&self) {
        let _ = self.inbox.send(Command::Shutdown).await;
    }
}

pub struct EngineActor {
    engine: Engine,
    ledger: Arc<dyn LedgerClient>,
    journal: Option<JournalWriter>,
    inbox: mpsc::Sender<Command>,
    snapshots: watch::Sender<EngineSnapshot>,
    events: broadcast::Sender<EngineEvent>,
    opts: RuntimeOptions,
}

impl EngineActor {
    /// Start the actor on the current tokio runtime.
    pub fn spawn(
        engine: Engine,
        ledger: Arc<dyn LedgerClient>,
        journal: Option<JournalWriter>,
        opts: RuntimeOptions,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (inbox, rx) = mpsc::channel(INBOX_CAPACITY);
        let (snapshots, snapshot_rx) = watch::channel(engine.snapshot(now_ms()));
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);

        let handle = EngineHandle {
            inbox: inbox.clone(),
            snapshots: snapshot_rx,
            events: events.clone(),
        };
        let actor = EngineActor {
            engine,
            ledger,
            journal,
            inbox,
            snapshots,
            events,
            opts,
        };
        let join = tokio::spawn(actor.run(rx));
        (handle, join)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let feeds = self.subscribe_feeds();

        self.execute(vec![Effect::Journal(JournalEvent::SessionStarted {
            identity: self.engine.identity().cloned(),
            config_hash: self.opts.config_hash.clone(),
        })]);
        self.read_min_bet();
        let startup = self.engine.startup_effects();
        self.execute(startup);
        self.publish();

        let mut tick = tokio::time::interval(self.opts.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut poll = tokio::time::interval(self.opts.poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Both intervals fire immediately; startup already covered the poll.
        poll.tick().await;

        tracing::info!(identity = ?self.engine.identity(), "engine actor started");

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    None | Some(Command::Shutdown) => break,
                    Some(cmd) => self.on_command(cmd),
                },
                _ = tick.tick() => {
                    let fx = self.engine.handle(Input::Tick, now_ms());
                    self.execute(fx);
                }
                _ = poll.tick() => {
                    self.execute(vec![Effect::RefreshRound, Effect::RefreshBalance]);
                }
            }
            self.publish();
        }

        for f in feeds {
            f.abort();
        }
        tracing::info!("engine actor stopped");
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Place {
                params,
                stake,
                reply,
            } => match self.engine.place(params, stake, now_ms()) {
                Ok(placed) => {
                    self.execute(placed.effects);
                    let _ = reply.send(Ok(placed.wager));
                }
                Err(e) => {
                    tracing::info!(code = e.code(), error = %e, "placement refused");
                    let _ = reply.send(Err(e));
                }
            },
            Command::Reset { kind, reply } => {
                let fx = self.engine.handle(Input::Reset(kind), now_ms());
                self.execute(fx);
                let _ = reply.send(());
            }
            Command::Input(input) => {
                let fx = self.engine.handle(input, now_ms());
                self.execute(fx);
            }
            Command::Shutdown => {}
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.engine.snapshot(now_ms()));
    }

    fn emit(&self, ev: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(ev);
    }

    fn subscribe_feeds(&self) -> Vec<JoinHandle<()>> {
        FeedKind::ALL
            .iter()
            .map(|&kind| {
                let mut stream = self.ledger.subscribe(kind);
                let inbox = self.inbox.clone();
                tokio::spawn(async move {
                    while let Some(batch) = stream.next().await {
                        if batch.is_empty() {
                            continue;
                        }
                        if inbox.send(Command::Input(batch.into())).await.is_err() {
                            break;
                        }
                    }
                    tracing::debug!(feed = ?kind, "notification feed ended");
                })
            })
            .collect()
    }

    fn post(&self, fut: impl std::future::Future<Output = Option<Input>> + Send + 'static) {
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            if let Some(input) = fut.await {
                let _ = inbox.send(Command::Input(input)).await;
            }
        });
    }

    fn read_min_bet(&self) {
        let ledger = Arc::clone(&self.ledger);
        self.post(async move {
            match ledger.read_value(LedgerQuery::MinBet).await {
                Ok(v) => match v.into_amount(LedgerQuery::MinBet) {
                    Ok(min) => Some(Input::MinBetRead(min)),
                    Err(e) => {
                        tracing::warn!(error = %e, "min bet read returned unexpected value");
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "min bet read failed");
                    None
                }
            }
        });
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Submit(req) => {
                    let ledger = Arc::clone(&self.ledger);
                    self.post(async move {
                        let wager_id = req.wager_id;
                        let res = AssertUnwindSafe(ledger.submit_wager(req))
                            .catch_unwind()
                            .await;
                        Some(match res {
                            Ok(Ok(tx)) => Input::SubmissionAccepted { wager_id, tx },
                            Ok(Err(e)) => Input::SubmissionFailed {
                                wager_id,
                                reason: e.to_string(),
                            },
                            Err(payload) => Input::SubmissionFailed {
                                wager_id,
                                reason: format!(
                                    "submitter fault: panicked: {}",
                                    panic_message(payload.as_ref())
                                ),
                            },
                        })
                    });
                }
                Effect::AwaitConfirmation { wager_id, tx } => {
                    let ledger = Arc::clone(&self.ledger);
                    self.post(async move {
                        let res = AssertUnwindSafe(ledger.await_confirmation(&tx))
                            .catch_unwind()
                            .await;
                        Some(match res {
                            Ok(Ok(())) => Input::Confirmed { wager_id },
                            Ok(Err(e)) => Input::ConfirmationFailed {
                                wager_id,
                                reason: e.to_string(),
                            },
                            Err(payload) => Input::ConfirmationFailed {
                                wager_id,
                                reason: format!(
                                    "confirmation watcher fault: panicked: {}",
                                    panic_message(payload.as_ref())
                                ),
                            },
                        })
                    });
                }
                Effect::RefreshRound => {
                    let ledger = Arc::clone(&self.ledger);
                    let identity = self.engine.identity().cloned();
                    self.post(async move {
                        match ledger.read_round(identity.as_ref()).await {
                            Ok(reading) => Some(Input::RoundRead(reading)),
                            Err(e) => {
                                tracing::warn!(error = %e, "round read failed");
                                None
                            }
                        }
                    });
                }
                Effect::RefreshBalance => {
                    let Some(identity) = self.engine.identity().cloned() else {
                        continue;
                    };
                    let ledger = Arc::clone(&self.ledger);
                    self.post(async move {
                        match ledger.read_balance(&identity).await {
                            Ok(b) => Some(Input::BalanceRead(b)),
                            Err(e) => {
                                tracing::warn!(error = %e, "balance read failed");
                                None
                            }
                        }
                    });
                }
                Effect::Journal(ev) => {
                    let Some(journal) = self.journal.as_mut() else {
                        continue;
                    };
                    if let Err(e) = journal.append(ev) {
                        let msg = format!("journal append failed: {e:#}");
                        tracing::error!("{msg}");
                        self.emit(EngineEvent::log("ERROR", msg));
                    }
                }
                Effect::Emit(ev) => self.emit(ev),
            }
        }
    }
}
