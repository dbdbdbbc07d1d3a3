use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use common::config::Settings;
use std::process;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let matches = Command::new("tap-analytics")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Extracts analytics reports as a Singer message stream")
        .subcommand_required(true)
        .subcommand(
            Command::new("discover")
                .about("Print the catalog for the configured reports")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("sync")
                .about("Sync every configured report")
                .arg(config_arg())
                .arg(
                    Arg::new("state")
                        .short('s')
                        .long("state")
                        .value_name("FILE")
                        .help("State file from a previous run"),
                )
                .arg(
                    Arg::new("catalog")
                        .long("catalog")
                        .value_name("FILE")
                        .help("Catalog from discover; only its selected streams are synced"),
                ),
        )
        .get_matches();

    match run(&matches).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("tap-analytics error: {e:#}");
            process::exit(1);
        }
    }
}

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .required(true)
        .help("Tap configuration file")
}

fn load_settings(matches: &ArgMatches) -> anyhow::Result<Settings> {
    let path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .context("--config is required")?;
    let settings =
        Settings::new(path).with_context(|| format!("failed to load config from {path}"))?;
    tap::logging::init(&settings.logging);
    Ok(settings)
}

/// Returns whether every stream finished.
async fn run(matches: &ArgMatches) -> anyhow::Result<bool> {
    match matches.subcommand() {
        Some(("discover", discover_matches)) => {
            let settings = load_settings(discover_matches)?;
            tap::run_discover(&settings).context("discovery failed")?;
            Ok(true)
        }
        Some(("sync", sync_matches)) => {
            let settings = load_settings(sync_matches)?;
            let state = sync_matches.get_one::<String>("state").map(|s| s.as_str());
            let catalog = sync_matches.get_one::<String>("catalog").map(|s| s.as_str());

            let summary = tap::run_sync(&settings, state, catalog)
                .await
                .context("sync aborted")?;

            for stream in &summary.streams {
                info!(
                    stream = %stream.stream,
                    status = ?stream.status,
                    windows = stream.windows_committed,
                    records = stream.records_emitted,
                    data_errors = stream.data_errors,
                    error = ?stream.error,
                    "Stream summary"
                );
            }

            if !summary.is_success() {
                error!(failed = ?summary.failed_streams(), "Some streams failed");
            }
            Ok(summary.is_success())
        }
        _ => anyhow::bail!("please specify a valid subcommand"),
    }
}
