use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::play::{DirectionArg, FaceArg, PlayGame, SessionArgs};

#[derive(Parser)]
#[command(name = "arcade")]
#[command(about = "Arcade wager engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Place one wager against the simulated ledger and follow it to the end
    Play {
        #[arg(value_enum)]
        game: PlayGame,

        /// Stake in whole units, e.g. 0.1
        #[arg(long)]
        stake: String,

        /// Dice: over | under | exactly
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,

        /// Dice: target sum 2..=12
        #[arg(long)]
        target: Option<u8>,

        /// Flip: heads | tails
        #[arg(long, value_enum)]
        face: Option<FaceArg>,

        /// Race: racer id 1..=5
        #[arg(long)]
        racer: Option<u8>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Pooled jackpot commands
    Jackpot {
        #[command(subcommand)]
        cmd: JackpotCmd,
    },

    /// Wager journal utilities
    Journal {
        #[command(subcommand)]
        cmd: JournalCmd,
    },
}

#[derive(Subcommand)]
enum JackpotCmd {
    /// Contribute to the current simulated round
    Enter {
        #[arg(long)]
        stake: String,

        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Subcommand)]
enum JournalCmd {
    /// Verify the hash chain of a journal file
    Verify { path: String },

    /// List wagers the journal leaves in flight
    Pending { path: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = arc_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
        Commands::Play {
            game,
            stake,
            direction,
            target,
            face,
            racer,
            session,
        } => {
            let params = commands::play::build_params(game, direction, target, face, racer)?;
            commands::play::run_wager(params, &stake, &session).await?;
        }
        Commands::Jackpot { cmd } => match cmd {
            JackpotCmd::Enter { stake, session } => {
                commands::play::run_jackpot(&stake, &session).await?;
            }
        },
        Commands::Journal { cmd } => match cmd {
            JournalCmd::Verify { path } => commands::journal::verify(&path)?,
            JournalCmd::Pending { path } => commands::journal::pending(&path)?,
        },
    }
    Ok(())
}

/// Logs go to stderr so stdout stays parseable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}
