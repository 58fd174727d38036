//! Build automation tasks for MPDB
//!
//! - Generating the CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for MPDB", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the mpdb-ingest CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<mpdb_ingest::Cli>();

    let content = format!(
        r#"# mpdb-ingest CLI Reference

Generated from the CLI source code on {}.

## Quick Start

```bash
# Check what an expression compiles to
mpdb-ingest compile --config config.json

# Full run: search, curate, write results/data.json
mpdb-ingest run --config config.json

# Curate known entries without searching
mpdb-ingest curate --config config.json --entries 1CBS,2RH1
```

## Commands

{}

## Environment Variables

- `MPDB_CONFIG` - Configuration file (default: `config.json`)
- `MPDB_OUTPUT_DIR` - Overrides `output` from the configuration
- `MPDB_HTTP_TIMEOUT_SECS`, `MPDB_HTTP_MAX_RETRIES`, `MPDB_HTTP_CONCURRENCY` - HTTP client overrides
- `MPDB_LOG_LEVEL`, `MPDB_LOG_FORMAT`, `MPDB_LOG_OUTPUT`, `MPDB_LOG_DIR`, `MPDB_LOG_FILTER` - Logging

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());
    Ok(())
}
