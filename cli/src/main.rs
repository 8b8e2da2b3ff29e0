use std::path::PathBuf;
use std::process::ExitCode;

use cachebay::planner::build_plan;
use clap::Parser;

/// Compiles a document with cachebay's planner and prints the plan it produces.
#[derive(Parser)]
struct Cli {
    /// Path to a `.graphql` document containing one operation (or a single fragment).
    document: PathBuf,

    /// Operation name to plan, when the document defines more than one.
    #[arg(long)]
    operation: Option<String>,

    /// Print the rewritten network document instead of the plan summary.
    #[arg(long)]
    network: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let source = match std::fs::read_to_string(&cli.document) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("error: could not read {}: {err}", cli.document.display());
            return ExitCode::FAILURE;
        }
    };

    let plan = match build_plan(&source, cli.operation.as_deref()) {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if cli.network {
        println!("{}", plan.network_document);
    } else {
        println!("operation kind: {:?}", plan.operation_kind);
        println!("root typename: {}", plan.root_typename);
        println!("fields: {}", plan.root_selection.fields.len());
        println!("fingerprint: {:#x}", plan.fingerprint());
    }

    ExitCode::SUCCESS
}
