//! deskbot - help-desk assistant for device-management staff
//!
//! Every question goes through the prompt guard, the shared call budget and
//! the encrypted key vault before it reaches the provider.

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

use deskbot_core::paths;

mod commands;

/// deskbot - device-management help desk
#[derive(Parser)]
#[command(name = "deskbot")]
#[command(about = "Ask device-management questions with a guarded LLM", long_about = None)]
struct Cli {
    /// Override the model for this run
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive conversation (default)
    ///
    /// Slash commands: /history, /clear, /quota, /key [KEY], /model <name>, /quit
    Chat,

    /// Ask a single question and print the answer
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Manage the provider API key
    #[command(subcommand)]
    Key(KeyCommand),

    /// Show the remaining call budget
    Quota {
        /// Forget all recorded calls
        #[arg(long)]
        reset: bool,
    },

    /// Run the prompt guard over text without calling the provider
    Scan {
        /// Text to scan; read from stdin when omitted
        text: Option<String>,
    },
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Save a key (prompted for when not given)
    Set(KeySetArgs),
    /// Remove the saved key
    Clear,
    /// Show where the key is stored and when it expires
    Status,
    /// Send a minimal request to check that the provider accepts a key
    Verify {
        /// Key to verify; the saved key when omitted
        key: Option<String>,
    },
    /// Run every format check on a key, offline
    Check { key: String },
}

#[derive(Args)]
struct KeySetArgs {
    key: Option<String>,

    /// How long the key is kept
    ///
    /// Session keys die with the process; set one from `deskbot chat` with /key.
    #[arg(long, value_enum, default_value_t = KeyLifetime::Pinned)]
    lifetime: KeyLifetime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KeyLifetime {
    /// 24 hours
    Temporary,
    /// Until cleared
    Pinned,
}

fn init_logging() -> Result<()> {
    let log_dir = paths::logs_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory: {}", e);
    }

    #[cfg(unix)]
    let null_device = "/dev/null";
    #[cfg(windows)]
    let null_device = "NUL";

    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("deskbot.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "Failed to open log file: {}, falling back to null device",
                e
            );
            std::fs::File::create(null_device)?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { model, command } = Cli::parse();
    init_logging()?;

    let command = match command {
        // Scanning is offline and needs no config or store
        Some(Commands::Scan { text }) => return commands::scan(text),
        Some(command) => command,
        None => Commands::Chat,
    };

    let mut config = deskbot_core::DeskConfig::load()?;
    if let Some(model) = model {
        config.ai.model = model;
    }
    tracing::info!(model = %config.ai.model, "Starting deskbot");

    let desk = deskbot_core::HelpDesk::open_default(config)?;
    run(&desk, command).await
}

async fn run(desk: &deskbot_core::HelpDesk, command: Commands) -> Result<()> {
    match command {
        Commands::Chat => commands::chat(desk).await,
        Commands::Ask { question } => commands::ask(desk, &question.join(" ")).await,
        Commands::Key(KeyCommand::Set(args)) => {
            commands::key_set(desk, args.key, args.lifetime.into()).await
        }
        Commands::Key(KeyCommand::Clear) => commands::key_clear(desk),
        Commands::Key(KeyCommand::Status) => commands::key_status(desk),
        Commands::Key(KeyCommand::Verify { key }) => commands::key_verify(desk, key.as_deref()).await,
        Commands::Key(KeyCommand::Check { key }) => commands::key_check(desk, &key),
        Commands::Quota { reset } => commands::quota(desk, reset),
        Commands::Scan { text } => commands::scan(text),
    }
}

impl From<KeyLifetime> for deskbot_core::vault::StorageMode {
    fn from(value: KeyLifetime) -> Self {
        match value {
            KeyLifetime::Temporary => Self::Temporary,
            KeyLifetime::Pinned => Self::Pinned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_invocation_has_no_subcommand() {
        let cli = Cli::try_parse_from(["deskbot"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn scan_takes_optional_text() {
        let cli = Cli::try_parse_from(["deskbot", "scan", "hello"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Scan { text: Some(ref t) }) if t == "hello"));
        let cli = Cli::try_parse_from(["deskbot", "scan"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Scan { text: None })));
    }

    #[test]
    fn key_set_refuses_session_lifetime() {
        let err = Cli::try_parse_from(["deskbot", "key", "set", "--lifetime", "session"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);

        for (flag, expected) in [("temporary", KeyLifetime::Temporary), ("pinned", KeyLifetime::Pinned)] {
            let cli = Cli::try_parse_from(["deskbot", "key", "set", "--lifetime", flag]).unwrap();
            match cli.command {
                Some(Commands::Key(KeyCommand::Set(args))) => assert_eq!(args.lifetime, expected),
                _ => panic!("expected key set for {flag}"),
            }
        }
    }
}
