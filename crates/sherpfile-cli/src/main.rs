//! Sherpfile CLI - Declarative helm release orchestrator with Jinja2 templates

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use sherpfile_core::{OsFileSystem, Settings};
use sherpfile_kube::{Interrupt, NeedsPolicy, Operation, Signal};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod app;
mod commands;
mod display;
mod error;
mod exit_codes;
mod util;

use app::{App, AppOptions};
use commands::converge::ConvergeArgs;
use error::Result;

#[derive(Parser)]
#[command(name = "sherpfile")]
#[command(author = "Sherpfile Contributors")]
#[command(version)]
#[command(about = "Declarative helm release orchestrator with Jinja2 templates", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Document, or directory of documents, to load
    #[arg(short = 'f', long, global = true)]
    file: Option<PathBuf>,

    /// Environment to render with
    #[arg(short = 'e', long, global = true, env = "SHERPFILE_ENVIRONMENT", default_value = "default")]
    environment: String,

    /// Override state values (key=value, comma separated)
    #[arg(long = "state-values-set", global = true)]
    state_values_set: Vec<String>,

    /// Override state values from a YAML file
    #[arg(long = "state-values-file", global = true)]
    state_values_file: Vec<PathBuf>,

    /// Namespace for every release
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Kube context for every release
    #[arg(long, global = true)]
    kube_context: Option<String>,

    /// Only process releases matching these labels (key=value,key!=value)
    #[arg(short = 'l', long = "selector", global = true)]
    selectors: Vec<String>,

    /// Helm binary to run
    #[arg(long, global = true, env = "SHERPFILE_HELM_BINARY")]
    helm_binary: Option<String>,

    /// Only render documents ending in .j2
    #[arg(long, global = true, env = "SHERPFILE_EXPERIMENTAL")]
    experimental: bool,

    /// Nested documents inherit selectors only with selectorsInherited: true
    #[arg(long, global = true)]
    explicit_selector_inheritance: bool,

    /// Succeed when no release matches the selectors
    #[arg(long, global = true)]
    allow_no_matching_release: bool,

    /// Log filter, e.g. info or sherpfile_kube=debug
    #[arg(long, global = true, env = "SHERPFILE_LOG", default_value = "warn")]
    log_level: String,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install or upgrade every release and delete disabled ones
    Sync {
        #[command(flatten)]
        converge: ConvergeFlags,
    },

    /// Upgrade only the releases whose diff shows changes
    Apply {
        #[command(flatten)]
        converge: ConvergeFlags,

        /// Exit with code 2 when releases changed
        #[arg(long)]
        detailed_exitcode: bool,
    },

    /// Show pending changes without applying them
    Diff {
        #[command(flatten)]
        converge: ConvergeFlags,

        /// Exit with code 2 when changes are pending
        #[arg(long)]
        detailed_exitcode: bool,
    },

    /// Delete every selected release, dependents first
    Destroy {
        #[command(flatten)]
        converge: ConvergeFlags,
    },

    /// List the selected releases and their groups
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Print the rendered documents
    Build,
}

#[derive(Args, Debug, Clone)]
struct ConvergeFlags {
    /// Releases processed at once within a group (0 or 1: one at a time)
    #[arg(long, default_value_t = 0)]
    concurrency: usize,

    /// Ignore needs on releases outside the selection
    #[arg(long, conflicts_with_all = ["include_needs", "include_transitive_needs"])]
    skip_needs: bool,

    /// Also process the direct needs of selected releases
    #[arg(long)]
    include_needs: bool,

    /// Also process every transitive need of selected releases
    #[arg(long)]
    include_transitive_needs: bool,

    /// Keep going after a release fails
    #[arg(long)]
    continue_on_error: bool,

    /// Extra arguments passed to helm
    #[arg(long, allow_hyphen_values = true)]
    args: Option<String>,
}

impl ConvergeFlags {
    fn needs_policy(&self) -> NeedsPolicy {
        if self.skip_needs {
            NeedsPolicy::SkipNeeds
        } else if self.include_transitive_needs {
            NeedsPolicy::IncludeTransitiveNeeds
        } else if self.include_needs {
            NeedsPolicy::IncludeNeeds
        } else {
            NeedsPolicy::Strict
        }
    }

    fn into_args(self, operation: Operation, detailed_exitcode: bool) -> ConvergeArgs {
        ConvergeArgs {
            operation,
            concurrency: self.concurrency,
            needs: self.needs_policy(),
            continue_on_error: self.continue_on_error,
            detailed_exitcode,
            args: self.args.as_deref().map(util::split_args).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Logs go to stderr; stdout carries command output
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

/// Record `received` on `interrupt`
///
/// Returns the exit code to stop with when a signal had already been
/// received, so a second Ctrl-C does not wait for hung releases.
fn handle_signal(interrupt: &Interrupt, received: Signal) -> Option<i32> {
    if let Some(first) = interrupt.signal() {
        return Some(exit_codes::for_signal(first));
    }
    tracing::warn!(?received, "signal received, waiting for running releases to finish (repeat to exit now)");
    interrupt.trigger(received);
    None
}

/// Trigger `interrupt` on SIGINT or SIGTERM; exit on the second one
#[cfg(unix)]
fn watch_signals(interrupt: Interrupt) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let (mut sigint, mut sigterm) = match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("cannot install signal handlers: {}", e);
                return;
            }
        };

        loop {
            let received = tokio::select! {
                _ = sigint.recv() => Signal::Interrupt,
                _ = sigterm.recv() => Signal::Terminate,
            };
            if let Some(code) = handle_signal(&interrupt, received) {
                eprintln!("{} interrupted again, exiting", console::style("⚠").yellow());
                std::process::exit(code);
            }
        }
    });
}

#[cfg(not(unix))]
fn watch_signals(interrupt: Interrupt) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if let Some(code) = handle_signal(&interrupt, Signal::Interrupt) {
                std::process::exit(code);
            }
        }
    });
}

async fn run(cli: Cli, interrupt: Interrupt) -> Result<i32> {
    let settings = Settings {
        experimental: cli.experimental,
        explicit_selector_inheritance: cli.explicit_selector_inheritance,
    };
    let options = AppOptions {
        file: cli.file,
        environment: cli.environment,
        state_values_set: cli.state_values_set,
        state_values_files: cli.state_values_file,
        namespace: cli.namespace.unwrap_or_default(),
        kube_context: cli.kube_context.unwrap_or_default(),
        selectors: cli.selectors,
        helm_binary: cli.helm_binary,
        allow_no_matching_release: cli.allow_no_matching_release,
    };
    let app = App::new(Arc::new(OsFileSystem::new()), settings, options).with_interrupt(interrupt);

    match cli.command {
        Commands::Sync { converge } => {
            commands::converge::run(&app, &converge.into_args(Operation::Sync, false)).await
        }
        Commands::Apply {
            converge,
            detailed_exitcode,
        } => commands::converge::run(&app, &converge.into_args(Operation::Apply, detailed_exitcode)).await,
        Commands::Diff {
            converge,
            detailed_exitcode,
        } => commands::converge::run(&app, &converge.into_args(Operation::Diff, detailed_exitcode)).await,
        Commands::Destroy { converge } => {
            commands::converge::run(&app, &converge.into_args(Operation::Destroy, false)).await
        }
        Commands::List { output } => {
            commands::list::run(&app, output == OutputFormat::Json).map(|()| exit_codes::SUCCESS)
        }
        Commands::Build => commands::build::run(&app).map(|()| exit_codes::SUCCESS),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(&cli);

    let interrupt = Interrupt::new();
    watch_signals(interrupt.clone());

    let code = match run(cli, interrupt).await {
        Ok(code) => code,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_signal_forces_exit() {
        let interrupt = Interrupt::new();

        assert_eq!(handle_signal(&interrupt, Signal::Terminate), None);
        assert_eq!(interrupt.signal(), Some(Signal::Terminate));

        assert_eq!(
            handle_signal(&interrupt, Signal::Interrupt),
            Some(exit_codes::TERMINATED)
        );
    }

    #[test]
    fn test_skip_needs_conflicts_with_include_needs() {
        let parsed = Cli::try_parse_from(["sherpfile", "sync", "--skip-needs", "--include-needs"]);
        assert!(parsed.is_err());
    }
}
