use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use platform_stacks::app::App;
use platform_stacks::{config, deploy, region};

#[derive(Parser)]
#[command(name = "platform-stacks")]
#[command(about = "Synthesize the base platform and application stacks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write Terraform JSON for every stack
    Synth {
        /// Path to the deployment file
        #[arg(short, long, default_value = "deployment.yaml")]
        config: PathBuf,

        /// Directory the stacks are written to
        #[arg(short, long, default_value = "cdktf.out")]
        output: PathBuf,
    },
    /// Construct every stack without writing anything
    Validate {
        /// Path to the deployment file
        #[arg(short, long, default_value = "deployment.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Synth { config, output } => {
            let app = load(&config).await?;
            let written = app
                .synth(&output)
                .with_context(|| format!("Failed to synthesize into {}", output.display()))?;
            info!(files = written.len(), output = %output.display(), "Synthesis complete");
        }
        Commands::Validate { config } => {
            let app = load(&config).await?;
            for stack in app.stacks() {
                info!(stack = stack.name(), dependencies = ?stack.dependencies(), "Stack is valid");
            }
        }
    }

    Ok(())
}

async fn load(path: &Path) -> anyhow::Result<App> {
    let deployment =
        config::parse(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let region = region::resolve(
        deployment.base.region.as_deref(),
        deployment.base.profile.as_deref(),
    )
    .await;

    deploy::compose(&deployment, &region).context("Failed to compose stacks")
}
