//! hostkit CLI tool.

use clap::{Args, Parser, Subcommand};
use hostkit_core::TemplateFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "hostkit")]
#[command(about = "Synthesize hosted web application stacks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the stack template
    Synth {
        /// Path to the configuration file
        #[arg(short, long, default_value = "hostkit.kdl")]
        config: PathBuf,
        /// Directory the template is written to
        #[arg(short, long, default_value = "cdk.out")]
        out: PathBuf,
        /// Template format, overriding the configuration
        #[arg(long)]
        format: Option<TemplateFormat>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Validate a stack configuration
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "hostkit.kdl")]
        path: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print the build specification of a configuration
    Buildspec {
        /// Path to the configuration file
        #[arg(default_value = "hostkit.kdl")]
        path: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Write a starter configuration
    Init {
        /// Path of the configuration file to create
        #[arg(default_value = "hostkit.kdl")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Deployment target and variables shared by the commands that read a
/// configuration.
#[derive(Args)]
struct TargetArgs {
    /// Target region, overriding the configuration
    #[arg(long, env = "HOSTKIT_REGION")]
    region: Option<String>,
    /// Target account, overriding the configuration
    #[arg(long, env = "HOSTKIT_ACCOUNT")]
    account: Option<String>,
    /// Custom variable for interpolation (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,
}

impl TargetArgs {
    fn context(&self) -> anyhow::Result<hostkit_config::VariableContext> {
        commands::variables(self.region.as_deref(), self.account.as_deref(), &self.vars)
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so rendered output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Synth {
            config,
            out,
            format,
            target,
        } => {
            let options = commands::synth::SynthOptions {
                config,
                out,
                format,
                vars: target.context()?,
            };
            commands::synth::synth(&options)?;
        }
        Commands::Validate { path, target } => {
            commands::validate(&path, &target.context()?)?;
        }
        Commands::Buildspec { path, target } => {
            commands::buildspec(&path, &target.context()?)?;
        }
        Commands::Init { path, force } => {
            commands::init::init(&path, force)?;
        }
    }

    Ok(())
}
