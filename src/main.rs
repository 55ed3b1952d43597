//! gatherbot CLI
//!
//! Vision-driven resource gathering for a live game client.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use gatherbot_lib::config::{self, AppConfig};
use gatherbot_lib::errors::GatherResult;
use gatherbot_lib::VERSION;

#[derive(Parser)]
#[command(name = "gatherbot")]
#[command(version = VERSION)]
#[command(about = "Detect, approach and gather on-screen resources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a gathering session
    Gather,

    /// Run perception only and log the chosen target
    Detect {
        /// Stop after this many frames
        #[arg(long)]
        frames: Option<u32>,
    },

    /// Check capture, focus, model and reference image, then exit
    Check,

    /// Print the effective configuration as TOML
    Config {
        /// Also write it to this path
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Overrides {
    /// Stop after gathering this many resources
    #[arg(long, global = true)]
    max_resources: Option<u32>,

    /// Stop after this many minutes
    #[arg(long, global = true)]
    max_time: Option<u32>,

    /// Detection confidence threshold (0-1)
    #[arg(long, global = true)]
    confidence: Option<f32>,

    /// Title of the window to capture
    #[arg(long, global = true)]
    window_name: Option<String>,

    /// Path to the ONNX model
    #[arg(long, global = true)]
    model: Option<String>,

    /// Slower, more variable pointer movement
    #[arg(long, global = true)]
    safe_mode: bool,

    /// Turn off delay, position and pointer randomisation
    #[arg(long, global = true)]
    disable_anti_detection: bool,

    /// Debug logging
    #[arg(long, global = true)]
    debug: bool,
}

impl Overrides {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(n) = self.max_resources {
            cfg.session.max_resources = n;
        }
        if let Some(m) = self.max_time {
            cfg.session.max_time_minutes = m;
        }
        if let Some(c) = self.confidence {
            cfg.detector.confidence = c;
        }
        if let Some(title) = &self.window_name {
            cfg.capture.window_title = title.clone();
        }
        if let Some(model) = &self.model {
            cfg.detector.model_path = model.clone();
        }
        if self.safe_mode {
            cfg.anti_detection.safe_mode = true;
        }
        if self.disable_anti_detection {
            cfg.anti_detection.disable_all();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    gatherbot_lib::init_tracing(cli.overrides.debug);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "gatherbot failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> GatherResult<bool> {
    let mut cfg = config::load_config()?;
    cli.overrides.apply(&mut cfg);

    match cli.command {
        Commands::Gather => {
            let summary = gatherbot_lib::run_gather(&cfg).await?;
            println!(
                "Gathered {} resources in {} cycles ({:.1} min, {:?})",
                summary.resources_gathered,
                summary.cycles,
                summary.elapsed_secs / 60.0,
                summary.stop_reason
            );
            Ok(true)
        }
        Commands::Detect { frames } => {
            gatherbot_lib::run_detect(&cfg, frames).await?;
            Ok(true)
        }
        Commands::Check => gatherbot_lib::run_check(&cfg).await,
        Commands::Config { output } => {
            cfg.validate()?;
            println!("{}", toml::to_string_pretty(&cfg)?);
            if let Some(path) = output {
                config::save_config(&cfg, &path)?;
            }
            Ok(true)
        }
    }
}
