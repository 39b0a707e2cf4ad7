// Entry point for the mangapress command-line tool.
// The library (lib.rs) holds everything else.

use std::process::ExitCode;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use mangapress::commands::{ProcessArgs, process, render_devices, render_presets};
use mangapress::ExitStatus;

#[derive(Parser, Debug)]
#[command(name = "mangapress")]
#[command(author, version, about = "Convert manga pages and comic archives for e-readers")]
struct Cli {
    #[command(flatten)]
    args: ProcessArgs,

    /// Show per-record details in the final report
    #[arg(short, long)]
    verbose: bool,

    /// Debug-level logging (ignored when RUST_LOG is set)
    #[arg(long)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .with_ansi(true)
        .with_writer(std::io::stdout)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.args.list_presets || cli.args.list_devices {
        if cli.args.list_presets {
            print!("{}", render_presets());
        }
        if cli.args.list_devices {
            print!("{}", render_devices());
        }
        return ExitCode::SUCCESS;
    }

    init_logging(cli.debug);
    info!("=== mangapress {} ===", env!("CARGO_PKG_VERSION"));

    let code = match process(&cli.args, cli.verbose).await {
        Ok(report) => {
            if let Some(cause) = &report.aborted {
                error!("Run aborted by {}: {}", cause.path.display(), cause.message);
            }
            report.exit_status.code()
        }
        Err(e) => {
            error!("{:#}", e);
            ExitStatus::Failed.code()
        }
    };
    ExitCode::from(code as u8)
}
