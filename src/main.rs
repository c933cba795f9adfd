use anyhow::Result;
use log::error;

use mbus_logger::cli::{build_cli, handle_subcommands};

// One thread: the bus is polled strictly sequentially.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let default_level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    if let Err(e) = handle_subcommands(&matches).await {
        error!("❌ {:#}", e);
        return Err(e);
    }
    Ok(())
}
