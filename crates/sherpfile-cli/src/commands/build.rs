//! Build command - print the rendered documents

use crate::app::App;
use crate::error::Result;

/// Run the build command
pub fn run(app: &App) -> Result<()> {
    for document in app.documents(false)? {
        println!("---");
        println!("#  Source: {}", document.state.file_path.display());
        print!("{}", document.state.to_yaml()?);
    }
    Ok(())
}
