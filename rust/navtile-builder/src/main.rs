use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use navtile_builder::cli::{run, Args, LogFormat};

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder().with_env_filter(filter).with_ansi(false).with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
    };
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_format);

    match run(&args) {
        Ok(summary) => {
            if let Some(v) = summary.verify {
                eprintln!("FoundPath: {}/{}", v.found, v.attempted);
            }
            eprintln!("\x1b[40;32mconvert NavMesh {} to {} succeed\x1b[0m", args.source.display(), args.output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = ?e, "conversion failed");
            eprintln!("\x1b[40;31mconvert NavMesh {} error: {e:#}\x1b[0m", args.source.display());
            ExitCode::FAILURE
        }
    }
}
