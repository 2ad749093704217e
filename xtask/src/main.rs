//! Build automation tasks for Keel
//!
//! This tool provides various automation tasks for the Keel project, including:
//! - Exporting the OpenAPI document served at `/api-docs.json`
//! - Checking that a committed copy of that document is up to date

use anyhow::{bail, Context};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use keel_server::api::{docs::ApiDocs, routes::RouteTable, API_PREFIX};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for Keel", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Write the OpenAPI document to a file
    Openapi {
        /// Output path for the generated document
        #[arg(short, long, default_value = "docs/openapi.json")]
        output: PathBuf,

        /// Fail instead of writing when the file differs from the generated document
        #[arg(long)]
        check: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Openapi { output, check } => export_openapi(&output, check)?,
    }

    Ok(())
}

fn export_openapi(output: &Path, check: bool) -> anyhow::Result<()> {
    let docs = ApiDocs::generate(API_PREFIX, RouteTable::new().docs().clone())
        .context("Failed to generate the OpenAPI document")?;
    let generated = docs.json();

    if check {
        let current = fs::read(output)
            .with_context(|| format!("Failed to read {}", output.display()))?;
        if current.as_slice() != &generated[..] {
            bail!(
                "{} is out of date, run `cargo xtask openapi --output {}`",
                output.display(),
                output.display()
            );
        }
        println!("✅ {} is up to date", output.display());
        return Ok(());
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    fs::write(output, generated)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("✅ OpenAPI document written to {}", output.display());

    Ok(())
}
