//! Sync, apply, diff and destroy

use console::style;
use sherpfile_kube::{ConvergeOptions, NeedsPolicy, Operation};

use crate::app::App;
use crate::display;
use crate::error::{CliError, Result};
use crate::exit_codes;

/// Inputs of one converge command
#[derive(Debug, Clone)]
pub struct ConvergeArgs {
    pub operation: Operation,
    /// Releases processed at once within a group
    pub concurrency: usize,
    pub needs: NeedsPolicy,
    pub continue_on_error: bool,
    /// Exit with [`exit_codes::CHANGES`] when something changed
    pub detailed_exitcode: bool,
    /// Extra helm arguments
    pub args: Vec<String>,
}

/// Run a converge command and return the process exit code
pub async fn run(app: &App, args: &ConvergeArgs) -> Result<i32> {
    let documents = app.documents(args.operation.is_reverse())?;
    let plans = app.plan(documents, args.needs, args.operation)?;
    app.ensure_matched(&plans)?;

    println!(
        "{} {} releases",
        style("→").blue().bold(),
        match args.operation {
            Operation::Sync => "Syncing",
            Operation::Apply => "Applying",
            Operation::Diff => "Comparing",
            Operation::Destroy => "Destroying",
        }
    );
    display::print_plans(&plans);

    let mut options = ConvergeOptions::new(args.operation).with_concurrency(args.concurrency);
    if args.continue_on_error {
        options = options.continue_on_error();
    }

    let report = app.converge(&plans, &options, &args.args).await;

    if args.operation == Operation::Diff {
        display::print_diffs(&report);
    }
    display::print_report(&report, args.operation);

    if let Some(signal) = app.interrupt().signal() {
        return Ok(exit_codes::for_signal(signal));
    }
    if report.has_failures() {
        return Err(CliError::ReleasesFailed {
            count: report.failed().len(),
            first: report.first_error().unwrap_or_default(),
        });
    }
    if args.detailed_exitcode && report.has_changes() {
        return Ok(exit_codes::CHANGES);
    }
    Ok(exit_codes::SUCCESS)
}
