//! `arcade play` and `arcade jackpot enter`.
//!
//! Both boot a full engine over an in-process [`SimLedger`], place a single
//! wager, print every status transition as it happens and stop once the
//! wager is terminal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use tokio::sync::broadcast::{self, error::RecvError};

use arc_config::EngineConfig;
use arc_ledger::LedgerClient;
use arc_round::format_countdown;
use arc_runtime::{EngineEvent, EngineHandle, EngineSnapshot, PlaceError};
use arc_schemas::{
    format_units, parse_units, Address, CoinFace, DiceDirection, WagerParams, Wei,
};
use arc_session::{Wager, WagerStatus};
use arc_sim::{SimConfig, SimLedger};

use super::{history_line, wager_line};

const DEFAULT_PLAYER: &str = "0x00000000000000000000000000000000000c0ffe";

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PlayGame {
    Dice,
    Flip,
    Slots,
    Race,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DirectionArg {
    Over,
    Under,
    Exactly,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FaceArg {
    Heads,
    Tails,
}

/// Options shared by every command that runs an engine.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Layered config paths in merge order
    #[arg(long = "config")]
    pub config_paths: Vec<String>,

    /// Player address; overrides session.identity from config
    #[arg(long)]
    pub player: Option<String>,

    /// Sim RNG seed; overrides sim.seed from config
    #[arg(long)]
    pub seed: Option<String>,

    /// Append lifecycle records to this journal
    #[arg(long)]
    pub journal: Option<String>,

    /// Give up if the wager is not terminal after this long
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,
}

pub fn build_params(
    game: PlayGame,
    direction: Option<DirectionArg>,
    target: Option<u8>,
    face: Option<FaceArg>,
    racer: Option<u8>,
) -> Result<WagerParams> {
    Ok(match game {
        PlayGame::Dice => {
            let (Some(direction), Some(target)) = (direction, target) else {
                bail!("dice needs --direction and --target");
            };
            let direction = match direction {
                DirectionArg::Over => DiceDirection::Over,
                DirectionArg::Under => DiceDirection::Under,
                DirectionArg::Exactly => DiceDirection::Exactly,
            };
            WagerParams::Dice { direction, target }
        }
        PlayGame::Flip => {
            let face = match face.context("flip needs --face")? {
                FaceArg::Heads => CoinFace::Heads,
                FaceArg::Tails => CoinFace::Tails,
            };
            WagerParams::Flip { face }
        }
        PlayGame::Slots => WagerParams::Slots,
        PlayGame::Race => WagerParams::Race {
            racer: racer.context("race needs --racer")?,
        },
    })
}

pub async fn run_wager(params: WagerParams, stake: &str, args: &SessionArgs) -> Result<()> {
    let stake = parse_units(stake).context("invalid --stake")?;
    let mut sess = Session::boot(args).await?;
    let wager = sess.place_and_follow(params, stake).await;
    let snap = sess.finish().await;
    let wager = resolved(wager)?;

    if let Some(o) = &wager.outcome {
        println!("outcome won={} payout={}", o.won, format_units(o.payout));
    }
    if let Some(entries) = snap.histories.get(&wager.kind) {
        println!("history_len={}", entries.len());
        for e in entries {
            println!("{}", history_line(e));
        }
    }
    if let Some(b) = snap.balance {
        println!("balance={}", format_units(b));
    }
    Ok(())
}

pub async fn run_jackpot(stake: &str, args: &SessionArgs) -> Result<()> {
    let stake = parse_units(stake).context("invalid --stake")?;
    let mut sess = Session::boot(args).await?;
    sess.wait(|s| s.round.round_id.is_some()).await?;
    let wager = sess.place_and_follow(WagerParams::Jackpot, stake).await;
    let snap = match &wager {
        Ok(w) if w.status == WagerStatus::Resolved => {
            sess.wait(|s| s.round.user_total >= stake).await
        }
        _ => Ok(sess.handle.snapshot()),
    };
    sess.finish().await;
    let wager = resolved(wager)?;
    let snap = snap?;

    let r = &snap.round;
    println!(
        "round_id={} pool_total={} user_total={} win_chance_pct={:.2}",
        r.round_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
        format_units(r.pool_total),
        format_units(r.user_total),
        r.win_chance_pct
    );
    if let Some(ms) = snap.remaining_ms {
        println!("countdown={}", format_countdown(ms));
    }
    Ok(())
}

fn resolved(wager: Result<Wager>) -> Result<Wager> {
    let wager = wager?;
    if wager.status == WagerStatus::Failed {
        bail!(
            "WAGER_FAILED: {}",
            wager.error.as_deref().unwrap_or("no reason given")
        );
    }
    Ok(wager)
}

struct Session {
    handle: EngineHandle,
    join: tokio::task::JoinHandle<()>,
    events: broadcast::Receiver<EngineEvent>,
    timeout: Duration,
}

impl Session {
    async fn boot(args: &SessionArgs) -> Result<Self> {
        let (mut cfg, config_hash) = load_config(&args.config_paths)?;
        if let Some(p) = &args.player {
            cfg.identity = Some(Address::new(p));
        }
        if cfg.identity.is_none() {
            cfg.identity = Some(Address::new(DEFAULT_PLAYER));
        }
        if let Some(seed) = &args.seed {
            cfg.sim.seed = seed.clone();
        }
        if args.journal.is_some() {
            cfg.journal.path = args.journal.clone();
        }
        tracing::debug!(identity = ?cfg.identity, "booting engine");

        let sim = SimLedger::new(SimConfig::from_settings(&cfg.sim));
        let ledger: Arc<dyn LedgerClient> = Arc::new(sim);
        let (handle, join) = arc_runtime::start(&cfg, ledger, config_hash)?;
        let events = handle.subscribe_events();
        let sess = Self {
            handle,
            join,
            events,
            timeout: Duration::from_millis(args.timeout_ms),
        };
        sess.wait(|s| s.balance.is_some()).await?;
        Ok(sess)
    }

    async fn wait<F>(&self, pred: F) -> Result<EngineSnapshot>
    where
        F: Fn(&EngineSnapshot) -> bool,
    {
        let mut rx = self.handle.subscribe_snapshots();
        let fut = async {
            loop {
                {
                    let snap = rx.borrow_and_update();
                    if pred(&snap) {
                        return Ok(snap.clone());
                    }
                }
                if rx.changed().await.is_err() {
                    bail!("engine stopped");
                }
            }
        };
        tokio::time::timeout(self.timeout, fut)
            .await
            .context("timed out waiting for engine")?
    }

    /// Place, then print transitions until the wager is terminal.
    async fn place_and_follow(&mut self, params: WagerParams, stake: Wei) -> Result<Wager> {
        let placed = match self.handle.place_wager(params, stake).await {
            Ok(w) => w,
            Err(PlaceError::Rejected(e)) => bail!("{}: {e}", e.code()),
            Err(e) => return Err(e.into()),
        };
        println!("placed {}", wager_line(&placed));

        let id = placed.wager_id;
        let timeout = self.timeout;
        let events = &mut self.events;
        let follow = async move {
            loop {
                match events.recv().await {
                    Ok(EngineEvent::Wager { from, to, wager }) if wager.wager_id == id => {
                        println!("transition from={} to={}", from.as_str(), to.as_str());
                        if to.is_terminal() {
                            return Ok(wager);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "engine events lagged");
                    }
                    Err(RecvError::Closed) => bail!("engine stopped"),
                }
            }
        };
        let wager = tokio::time::timeout(timeout, follow)
            .await
            .context("timed out waiting for the wager to finish")??;
        println!("final {}", wager_line(&wager));
        Ok(wager)
    }

    async fn finish(self) -> EngineSnapshot {
        let snap = self.handle.snapshot();
        self.handle.shutdown().await;
        let _ = self.join.await;
        snap
    }
}

fn load_config(paths: &[String]) -> Result<(EngineConfig, Option<String>)> {
    if paths.is_empty() {
        return Ok((EngineConfig::default(), None));
    }
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = arc_config::load_layered_yaml(&refs)?;
    let cfg = EngineConfig::from_config_json(&loaded.config_json)?;
    Ok((cfg, Some(loaded.config_hash)))
}
