use clap::Parser;
use mawaqit_scheduler::domain::models::Coordinates;
use mawaqit_scheduler::infrastructure::telemetry::init_logging;
use mawaqit_scheduler::{run, RunOptions};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(author, version, about = "Prayer-time notification scheduler")]
struct Cli {
    /// Directory holding config/, state/ and logs/.
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Device latitude; used when no manual location is configured.
    #[arg(long, requires = "longitude", allow_hyphen_values = true)]
    latitude: Option<f64>,

    #[arg(long, requires = "latitude", allow_hyphen_values = true)]
    longitude: Option<f64>,

    #[arg(long)]
    once: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let device_position = match (cli.latitude, cli.longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };

    match run(RunOptions {
        workspace_root: cli.workspace,
        device_position,
        once: cli.once,
    })
    .await
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "mawaqit-scheduler stopped");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
