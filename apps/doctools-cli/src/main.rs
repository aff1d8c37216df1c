//! doctools command-line binary
//!
//! Runs one tool per invocation and writes its artifact to the output
//! directory. Logs go to stderr; `DOCTOOLS_LOG` or `RUST_LOG` set the filter.

mod cli;
mod config;
mod run;

use clap::Parser;
use cli::Args;
use config::Config;
use run::Outcome;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("DOCTOOLS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let filter = if verbose {
        filter.add_directive("doctools_core=debug".parse()?)
    } else {
        filter
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.verbose)?;

    let config = Config::load(args.config.as_deref())?;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output.dir.clone());

    tracing::debug!(command = ?args.command, output = %output_dir.display(), "starting");

    match run::run(args.command, config, &output_dir).await? {
        Outcome::Written { path, size } => {
            println!("{} ({})", path.display(), doctools_core::format_bytes(size));
        }
        Outcome::Info(info) => {
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    Ok(())
}
