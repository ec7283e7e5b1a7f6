use anyhow::Result;
use clap::Parser;
use extrun_core::DiagnosticError;

mod cli;
mod commands;

fn main() -> Result<()> {
    // Parse CLI arguments
    let parsed = cli::Cli::parse();
    let verbose_errors = parsed.verbose_errors;

    match parsed.dispatch() {
        Ok(()) => Ok(()),
        Err(err) => {
            // The child's exit code becomes ours
            if let Some(exit) = err.downcast_ref::<commands::run::CommandExitCode>() {
                std::process::exit(exit.0);
            }

            if verbose_errors {
                if let Some(diagnostic) = err.downcast_ref::<DiagnosticError>() {
                    eprintln!("Error: {}", diagnostic.render_verbose());
                    std::process::exit(1);
                }
            }

            Err(err)
        }
    }
}
