//! The periodic expiry sweeper.
//!
//! Owns its own lifecycle: [`start_expiry_worker`] returns a handle whose [`stop`] method
//! requests cooperative shutdown. The worker only checks the shutdown signal between sweep
//! passes, so a pass that is mid-transaction always completes or rolls back atomically and is
//! never torn down halfway.
//!
//! [`stop`]: ExpiryWorkerHandle::stop
use std::time::Duration;

use log::*;
use pronto_engine::{db_types::Order, events::EventProducers, OrderFlowApi, SqliteDatabase};
use tokio::{sync::watch, task::JoinHandle};

pub struct ExpiryWorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ExpiryWorkerHandle {
    /// Signals the worker to stop and returns its join handle so the caller can await a clean
    /// exit.
    pub fn stop(self) -> JoinHandle<()> {
        let _ = self.shutdown_tx.send(true);
        self.handle
    }
}

/// Starts the expiry worker. Hold on to the returned handle; dropping it leaves the worker
/// running for the lifetime of the process.
pub fn start_expiry_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    interval: Duration,
) -> ExpiryWorkerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let api = OrderFlowApi::new(db, producers);
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Order expiry worker started (every {}s)", interval.as_secs());
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match api.sweep_expired_orders().await {
                        Ok(result) if result.total_count() > 0 || result.failures > 0 => {
                            info!(
                                "🕰️ Sweep pass: {} expired, {} closed with no response, {} failure(s)",
                                result.expired_count(),
                                result.closed_count(),
                                result.failures
                            );
                            debug!("🕰️ Expired orders: {}", order_list(&result.expired));
                            debug!("🕰️ No-response orders: {}", order_list(&result.closed_no_response));
                        },
                        Ok(_) => trace!("🕰️ Sweep pass: nothing to do"),
                        Err(e) => error!("🕰️ Error running order expiry sweep: {e}"),
                    }
                },
                _ = shutdown_rx.changed() => {
                    info!("🕰️ Order expiry worker stopping");
                    break;
                },
            }
        }
    });
    ExpiryWorkerHandle { shutdown_tx, handle }
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] client: #{}", o.id, o.client_id))
        .collect::<Vec<String>>()
        .join(", ")
}
