use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ccl_pass::{InsertCollectiveOpsPass, Job, PassConfig, Result};

/// Insert collective ops into a job and serialize their execution order
#[derive(Parser, Debug)]
#[command(name = "ccl-pass")]
#[command(version)]
struct Args {
    /// Job description (JSON)
    #[arg(short, long)]
    job: PathBuf,

    /// Pass configuration (JSON); defaults to a disabled pass
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable the pass regardless of the configuration flag
    #[arg(long)]
    enable: bool,

    /// Collective library version available on the devices
    #[arg(long)]
    library_version: Option<u32>,

    /// Where to write the rewritten job; stdout if omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the pass report to stderr
    #[arg(long)]
    report: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => PassConfig::from_json_file(path)?,
        None => PassConfig::default(),
    };
    if args.enable {
        config.enable_insert_collective_ops = true;
    }
    if let Some(version) = args.library_version {
        config.collective_support.device_collectives = true;
        config.collective_support.library_version = Some(version);
    }

    let mut job = Job::from_json_file(&args.job)?;
    let report = InsertCollectiveOpsPass::new(config).apply(&mut job)?;

    if args.report {
        eprintln!("{}", serde_json::to_string_pretty(&report)?);
    }

    let text = serde_json::to_string_pretty(&job)?;
    match &args.output {
        Some(path) => std::fs::write(path, text)?,
        None => println!("{text}"),
    }
    Ok(())
}
