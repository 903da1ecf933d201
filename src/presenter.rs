//! Console presenter: renders applied dashboard events as log lines.

use crate::utils::{BALANCE_DECIMALS, format_balance};
use crate::wallet::StatusIndicator;
use crate::wallet::sync::events::{SourcedEvent, SyncEvent, SyncEventHandler};
use crate::wallet::sync::reconciler::DashboardView;
use crate::wallet::types::SyncError;

use tracing::{debug, info, warn};

/// Logs discoveries, stats and connectivity changes as the dashboard would show them.
#[derive(Debug, Default)]
pub struct ConsolePresenter {
    status: StatusIndicator,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn show_status(&mut self, status: StatusIndicator) {
        if status == self.status {
            return;
        }
        match status.message() {
            Some(message) => warn!("{}", message),
            None => info!("Connected to server"),
        }
        self.status = status;
    }
}

#[async_trait::async_trait]
impl SyncEventHandler for ConsolePresenter {
    async fn handle<'a>(
        &mut self,
        event: &SourcedEvent,
        view: &DashboardView<'a>,
    ) -> Result<(), SyncError> {
        match &event.event {
            SyncEvent::WalletFound(wallet) => {
                info!(
                    "Found {} wallet {} with {} {} (strategy: {}, source: {})",
                    wallet.asset,
                    wallet.address,
                    format_balance(wallet.balance, BALANCE_DECIMALS),
                    wallet.asset,
                    wallet.strategy,
                    wallet.source
                );
            }
            SyncEvent::WalletList(wallets) => {
                info!(
                    "Loaded {} wallets, {} shown",
                    wallets.len(),
                    view.wallets().len()
                );
                for (asset, stats) in view.all_stats() {
                    info!(
                        "{}: {} of {} wallets shown, {} held",
                        asset,
                        view.wallets().count_for(asset),
                        stats.wallet_count,
                        format_balance(view.wallets().total_balance_for(asset), BALANCE_DECIMALS)
                    );
                }
            }
            SyncEvent::StatsUpdate(stats) => {
                for asset in stats.keys() {
                    if let Some(aggregate) = view.stats(asset) {
                        info!(
                            "{}: {} wallets, total {}, max {}, min {}{}",
                            asset,
                            aggregate.wallet_count,
                            format_balance(aggregate.total_balance, BALANCE_DECIMALS),
                            format_balance(aggregate.max_balance, BALANCE_DECIMALS),
                            format_balance(aggregate.min_balance, BALANCE_DECIMALS),
                            if aggregate.is_searching {
                                " (searching)"
                            } else {
                                ""
                            }
                        );
                    }
                }
            }
            SyncEvent::SearchStatus {
                asset,
                is_searching,
            } => {
                info!(
                    "{} search {}",
                    asset,
                    if *is_searching { "running" } else { "stopped" }
                );
            }
            SyncEvent::SnapshotFailed { part, error } => {
                debug!("Initial {:?} unavailable: {}", part, error);
            }
            SyncEvent::ConnectionChanged(_) => {
                debug!("Live updates {:?}", view.connection());
            }
        }

        self.show_status(view.status());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ConsolePresenter"
    }
}
