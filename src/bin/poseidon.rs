//! Binary entry point for the Poseidon administrative CLI.
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use poseidon::admin::IntegrityOptions;
use poseidon::db::Database;
use poseidon::error::Result;

#[derive(Parser, Debug)]
#[command(name = "poseidon", version, about = "Administrative CLI for the Poseidon graph database")]
struct Cli {
    /// Directory holding the database's paged files and WAL.
    #[arg(value_name = "DIR")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints pager, storage, and WAL statistics.
    Stats,
    /// Writes a Graphviz `.dot` rendering of the committed graph.
    DumpDot {
        /// Output file path.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// Walks every record checking structural invariants.
    Verify {
        /// Stop after this many findings (0 means unbounded).
        #[arg(long, default_value_t = 100)]
        max_findings: usize,
        /// Skip relationship endpoint/label checks.
        #[arg(long)]
        skip_relationships: bool,
    },
    /// Forces a synchronous garbage-collection pass.
    Vacuum,
    /// Creates a secondary index over a label/property pair.
    CreateIndex { label: String, prop: String },
    /// Drops a secondary index.
    DropIndex { label: String, prop: String },
}

fn run(cli: Cli) -> Result<()> {
    let mut db = Database::open(&cli.db_path)?;
    match cli.command {
        Command::Stats => {
            let report = db.print_stats()?;
            println!("{report:#?}");
        }
        Command::DumpDot { path } => {
            let tx = db.begin_transaction()?;
            let xid = tx.xid();
            tx.rollback()?;
            db.dump_dot(&path, xid)?;
            println!("wrote {}", path.display());
        }
        Command::Verify { max_findings, skip_relationships } => {
            let report = db.verify(IntegrityOptions { max_findings, check_relationships: !skip_relationships });
            println!("{report:#?}");
            if !report.ok() {
                return Err(poseidon::error::GraphError::Corruption(format!("{} integrity findings", report.findings.len())));
            }
        }
        Command::Vacuum => {
            let report = db.vacuum_now()?;
            println!("{report:?}");
        }
        Command::CreateIndex { label, prop } => {
            db.create_index(&label, &prop)?;
            println!("index created: {label}.{prop}");
        }
        Command::DropIndex { label, prop } => {
            db.drop_index(&label, &prop)?;
            println!("index dropped: {label}.{prop}");
        }
    }
    db.checkpoint()?;
    Ok(())
}

fn main() -> ExitCode {
    poseidon::logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
