//! devpanel: command-line driver for the embedded observability agent.
//!
//! Runs the agent against a scripted page and works with the tab-scoped
//! storage it leaves behind in a state directory.
//!
//! ## Subcommands
//!
//! - `demo`: Scripted page session; prints every panel tab at the end
//! - `inspect`: Read captured history from the state directory
//! - `redact`: Run text through the redactor (argument or stdin)
//! - `purge`: Delete captured history from the state directory
//! - `config`: Print the effective configuration

mod demo;
mod inspect;
mod logging;
mod purge;
mod redact;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use devpanel_core::AgentConfig;
use devpanel_protocol::PanelTab;

const HOME_DIR_NAME: &str = ".devpanel";

#[derive(Parser)]
#[command(name = "devpanel")]
#[command(about = "Embedded runtime observability agent")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ~/.devpanel/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory backing the tab-scoped storage (defaults to ~/.devpanel/state)
    #[arg(long, global = true, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a scripted page through the agent and print the panel
    Demo {
        /// Identity to authorize as (defaults to the configured allow-listed id)
        #[arg(long = "as", value_name = "USER_ID")]
        user: Option<String>,

        /// Record clicks, submits and key presses
        #[arg(long)]
        track_interactions: bool,

        /// Record component renders while the script runs
        #[arg(long)]
        profile: bool,
    },

    /// Show captured history from the state directory
    Inspect {
        /// Which panel tab to show
        #[arg(long, value_enum, default_value = "general")]
        tab: TabArg,

        /// Only console entries at this level (info, warn, error)
        #[arg(long, value_name = "LEVEL")]
        level: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Redact text given as an argument or on stdin
    Redact {
        #[arg(value_name = "TEXT")]
        text: Option<String>,
    },

    /// Delete captured history from the state directory
    Purge {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum TabArg {
    General,
    Console,
    Network,
    Tools,
}

impl From<TabArg> for PanelTab {
    fn from(tab: TabArg) -> Self {
        match tab {
            TabArg::General => PanelTab::General,
            TabArg::Console => PanelTab::Console,
            TabArg::Network => PanelTab::Network,
            TabArg::Tools => PanelTab::Tools,
        }
    }
}

fn devpanel_home() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(HOME_DIR_NAME),
        None => std::env::temp_dir().join("devpanel"),
    }
}

fn load_config(path: &Path) -> Result<AgentConfig, String> {
    let config = AgentConfig::load(path)?;
    if config.allowed_user_id.is_empty() {
        tracing::warn!(path = %path.display(), "No allowed_user_id configured; every identity will be denied");
    }
    Ok(config)
}

fn run(cli: Cli, home: &Path) -> Result<(), String> {
    let config_path = cli.config.unwrap_or_else(|| home.join("config.toml"));
    let state_dir = cli.state_dir.unwrap_or_else(|| home.join("state"));
    let config = load_config(&config_path)?;

    match cli.command {
        Commands::Demo {
            user,
            track_interactions,
            profile,
        } => demo::run(
            config,
            &state_dir,
            demo::DemoOptions {
                user,
                track_interactions,
                profile,
            },
        ),
        Commands::Inspect { tab, level, json } => {
            let level = match level {
                Some(raw) => Some(raw.parse::<devpanel_protocol::LogLevel>()?),
                None => None,
            };
            inspect::run(&config, &state_dir, tab.into(), level, json)
        }
        Commands::Redact { text } => redact::run(&config, text),
        Commands::Purge { yes } => purge::run(&config, &state_dir, yes),
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| format!("Failed to render config: {}", e))?;
            print!("{}", rendered);
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let home = devpanel_home();
    let _logging_guard = logging::init(&home.join("logs"));

    if let Err(e) = run(cli, &home) {
        tracing::error!(error = %e, "devpanel failed");
        eprintln!("devpanel: {}", e);
        std::process::exit(1);
    }
}
