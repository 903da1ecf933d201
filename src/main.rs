mod api;
mod config;
mod presenter;
mod utils;
mod wallet;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::presenter::ConsolePresenter;
use crate::utils::{BALANCE_DECIMALS, format_balance};
use crate::wallet::SyncSession;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	// RUST_LOG wins; otherwise log at info
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting wallet finder dashboard sync");

	let config = match Config::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			return;
		}
	};

	let mut session = match SyncSession::from_config(&config) {
		Ok(session) => session,
		Err(e) => {
			error!("Failed to create sync session: {:?}", e);
			return;
		}
	};
	session.register_handler(Box::new(ConsolePresenter::new()));

	let shutdown = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			error!("Failed to listen for ctrl-c: {}", e);
			// Without a signal handler the session runs until the process is killed
			std::future::pending::<()>().await;
		}
	};

	let report = session.run(shutdown).await;

	let state = &report.state;
	if state.wallets.is_empty() {
		info!("No wallets were loaded during this session");
	}
	info!(
		"Final dashboard: {} wallets, status {:?}, connection {:?}",
		state.wallets.len(),
		state.status,
		state.connection
	);
	for (asset, stats) in &state.stats {
		info!(
			"{}: {} wallets reported, {} held locally, total {}",
			asset,
			stats.wallet_count,
			state.wallets.count_for(asset),
			format_balance(state.wallets.total_balance_for(asset), BALANCE_DECIMALS)
		);
	}
	info!("Session summary: {}", report.stats.summary());
}
