//! Splice CLI - Main entry point
//!
//! 호스트 모듈 번들을 런타임에 로드해 패치 결과와 플러그인 상태를 확인합니다.

mod bundle;
mod commands;

use clap::{Parser, Subcommand};
use commands::{FindArgs, RuntimeOptions};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Splice - runtime module patching and plugin management
#[derive(Parser, Debug)]
#[command(name = "splice")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Settings directory (defaults to the global config directory)
    #[arg(long, global = true)]
    settings_dir: Option<PathBuf>,

    /// Plugin manifest directory
    #[arg(long, global = true)]
    plugins_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a module bundle and print the patch report
    Report {
        /// Module bundle (JSON)
        bundle: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the patched source of one module
    Patch {
        /// Module bundle (JSON)
        bundle: PathBuf,
        /// Module ID
        module: String,
    },
    /// Search loaded module exports
    Find {
        /// Module bundle (JSON)
        bundle: PathBuf,
        /// Required property names
        #[arg(long, value_delimiter = ',')]
        props: Vec<String>,
        /// Substrings of the exported function source
        #[arg(long)]
        code: Vec<String>,
        /// Component display name
        #[arg(long)]
        display_name: Option<String>,
        /// Store class name
        #[arg(long)]
        store: Option<String>,
        /// Print every match instead of the first
        #[arg(short, long)]
        all: bool,
    },
    /// Manage plugins
    Plugins {
        #[command(subcommand)]
        action: PluginAction,
    },
}

#[derive(Subcommand, Debug)]
enum PluginAction {
    /// List installed plugins
    List {
        #[arg(long)]
        json: bool,
    },
    /// Enable a plugin (and its dependencies)
    Enable { name: String },
    /// Disable a plugin
    Disable { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let options = RuntimeOptions {
        settings_dir: args.settings_dir,
        plugins_dir: args.plugins_dir,
    };
    let runtime = commands::build_runtime(&options)?;

    let output = match args.command {
        Command::Report { bundle, json } => {
            commands::boot_bundle(&runtime, &bundle)?;
            commands::report(&runtime, json)?
        }
        Command::Patch { bundle, module } => {
            commands::boot_bundle(&runtime, &bundle)?;
            commands::patched_source(&runtime, &module)?
        }
        Command::Find {
            bundle,
            props,
            code,
            display_name,
            store,
            all,
        } => {
            commands::boot_bundle(&runtime, &bundle)?;
            let find = FindArgs {
                props,
                code,
                display_name,
                store,
                all,
            };
            commands::find(&runtime, &find)?
        }
        Command::Plugins { action } => match action {
            PluginAction::List { json } => commands::plugins_list(&runtime, json)?,
            PluginAction::Enable { name } => commands::plugins_enable(&runtime, &name).await?,
            PluginAction::Disable { name } => commands::plugins_disable(&runtime, &name).await?,
        },
    };

    println!("{}", output.trim_end());
    runtime.flush().await;
    Ok(())
}
