//! List command - show the selected releases and their groups

use sherpfile_kube::{NeedsPolicy, Operation};

use crate::app::App;
use crate::display;
use crate::error::Result;

/// Run the list command
///
/// Needs pointing outside the selection are ignored; listing never fails
/// because a dependency is not selected.
pub fn run(app: &App, json: bool) -> Result<()> {
    let plans = app.plan(app.documents(false)?, NeedsPolicy::SkipNeeds, Operation::Sync)?;
    let rows = display::release_rows(&plans);

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{}", display::format_table(&rows));
    }
    Ok(())
}
