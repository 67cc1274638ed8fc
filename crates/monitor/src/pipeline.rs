use std::future::Future;
use std::time::Duration;

use hackwatch_domain::model::{InsertOutcome, TransferEvent, WatchedAddress};
use hackwatch_domain::storage::{TransferStore, WatchlistStore};
use metrics::{counter, gauge};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::alert::AlertDispatcher;
use crate::chain::ChainAdapter;
use crate::resolver::{resolve_first_known, DestinationResolver};
use crate::worker::MonitorError;

/// Shared collaborators for processing one address.
pub(crate) struct AddressContext<'a, S: ?Sized> {
    pub store: &'a S,
    pub resolver: &'a dyn DestinationResolver,
    pub dispatcher: &'a dyn AlertDispatcher,
    pub step_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddressOutcome {
    /// Transfers handled; the checkpoint advanced unless the chain height was zero.
    Processed,
    /// Chain height unavailable; nothing touched.
    Skipped,
    /// Transfer scan, validation or persistence failed; checkpoint withheld.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AddressSummary {
    pub outcome: AddressOutcome,
    pub recorded: u64,
    pub duplicate: u64,
    pub invalid: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    /// Last failure seen for the address, kept for the monitor state row.
    pub error: Option<String>,
}

impl AddressSummary {
    fn new(outcome: AddressOutcome) -> Self {
        Self {
            outcome,
            recorded: 0,
            duplicate: 0,
            invalid: 0,
            alerts_sent: 0,
            alerts_failed: 0,
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::new(AddressOutcome::Failed)
        }
    }
}

async fn bounded<T, F>(limit: Duration, upstream: &'static str, step: F) -> Result<T, MonitorError>
where
    F: Future<Output = Result<T, MonitorError>>,
{
    match timeout(limit, step).await {
        Ok(result) => result,
        Err(_) => Err(MonitorError::upstream(
            upstream,
            format!("timed out after {}s", limit.as_secs()),
        )),
    }
}

fn record_upstream(chain: &'static str, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    counter!("monitor_upstream_calls_total", "chain" => chain, "result" => result).increment(1);
}

/// Drives one watched address through height, scan, validate, persist, alert
/// and checkpoint. Never returns an error: the outcome is in the summary.
pub(crate) async fn process_address<S>(
    ctx: &AddressContext<'_, S>,
    adapter: &dyn ChainAdapter,
    watched: &WatchedAddress,
) -> AddressSummary
where
    S: WatchlistStore + TransferStore + ?Sized,
{
    let chain: &'static str = watched.chain.into();
    let address = watched.address.as_str();

    let height = match bounded(ctx.step_timeout, chain, adapter.current_height()).await {
        Ok(height) => {
            record_upstream(chain, true);
            height
        }
        Err(err) => {
            record_upstream(chain, false);
            warn!(address, chain, error = %err, "chain height unavailable, skipping address");
            counter!("monitor_addresses_total", "result" => "skipped").increment(1);
            return AddressSummary {
                error: Some(format!("{address}: {err}")),
                ..AddressSummary::new(AddressOutcome::Skipped)
            };
        }
    };

    let scan = adapter.outgoing_transfers(address, watched.checkpoint, height);
    let candidates = match bounded(ctx.step_timeout, chain, scan).await {
        Ok(candidates) => {
            record_upstream(chain, true);
            candidates
        }
        Err(err) => {
            record_upstream(chain, false);
            warn!(address, chain, error = %err, "transfer scan failed, checkpoint unchanged");
            counter!("monitor_addresses_total", "result" => "failed").increment(1);
            return AddressSummary::failed(format!("{address}: {err}"));
        }
    };

    let mut summary = AddressSummary::new(AddressOutcome::Processed);
    let mut persisted_all = true;
    for candidate in candidates {
        if let Err(reason) = candidate.validate() {
            let err = MonitorError::parse(chain, reason);
            persisted_all = false;
            summary.invalid += 1;
            counter!("monitor_transfers_total", "result" => "invalid").increment(1);
            warn!(address, tx_hash = %candidate.tx_hash, error = %err, "rejected transfer");
            summary.error = Some(format!("{address}: {err}"));
            continue;
        }

        // Stored transfers are counted without another label lookup.
        match ctx
            .store
            .transfer_exists(candidate.chain, &candidate.tx_hash)
            .await
        {
            Ok(true) => {
                summary.duplicate += 1;
                counter!("monitor_transfers_total", "result" => "duplicate").increment(1);
                debug!(tx_hash = %candidate.tx_hash, "transfer already recorded");
                continue;
            }
            Ok(false) => {}
            Err(err) => {
                persisted_all = false;
                counter!("monitor_transfers_total", "result" => "persist_error").increment(1);
                warn!(address, tx_hash = %candidate.tx_hash, error = %err, "lookup failed");
                summary.error = Some(format!("{address}: {err}"));
                continue;
            }
        }

        let label = resolve_first_known(ctx.resolver, &candidate.to_addresses).await;
        let event = candidate.into_event(label);
        match ctx.store.insert_transfer(&event).await {
            Ok(InsertOutcome::Inserted) => {
                summary.recorded += 1;
                counter!("monitor_transfers_total", "result" => "recorded").increment(1);
                if deliver_alert(ctx.store, ctx.dispatcher, &event).await {
                    summary.alerts_sent += 1;
                } else {
                    summary.alerts_failed += 1;
                }
            }
            Ok(InsertOutcome::Duplicate) => {
                summary.duplicate += 1;
                counter!("monitor_transfers_total", "result" => "duplicate").increment(1);
                debug!(tx_hash = %event.tx_hash, "transfer recorded concurrently");
            }
            Err(err) => {
                persisted_all = false;
                counter!("monitor_transfers_total", "result" => "persist_error").increment(1);
                warn!(
                    address,
                    tx_hash = %event.tx_hash,
                    error = %err,
                    "failed to persist transfer"
                );
                summary.error = Some(format!("{address}: {err}"));
            }
        }
    }

    if !persisted_all {
        summary.outcome = AddressOutcome::Failed;
        counter!("monitor_addresses_total", "result" => "failed").increment(1);
        return summary;
    }

    if height > 0 {
        if let Err(err) = ctx
            .store
            .advance_checkpoint(address, watched.chain, height)
            .await
        {
            warn!(address, chain, error = %err, "failed to advance checkpoint");
            summary.outcome = AddressOutcome::Failed;
            summary.error = Some(format!("{address}: {err}"));
            counter!("monitor_addresses_total", "result" => "failed").increment(1);
            return summary;
        }
        gauge!("monitor_checkpoint", "chain" => chain).set(height as f64);
    }
    counter!("monitor_addresses_total", "result" => "processed").increment(1);
    summary
}

/// Dispatches the alert for a stored transfer and clears its pending flag on
/// success. Returns whether the alert went out.
pub(crate) async fn deliver_alert<S>(
    store: &S,
    dispatcher: &dyn AlertDispatcher,
    event: &TransferEvent,
) -> bool
where
    S: TransferStore + ?Sized,
{
    if let Err(err) = dispatcher.dispatch(event).await {
        counter!("monitor_alerts_total", "result" => "failed").increment(1);
        warn!(tx_hash = %event.tx_hash, error = %err, "alert delivery failed, left pending");
        return false;
    }
    counter!("monitor_alerts_total", "result" => "sent").increment(1);
    if let Err(err) = store.mark_alert_delivered(event.chain, &event.tx_hash).await {
        warn!(tx_hash = %event.tx_hash, error = %err, "alert sent but pending flag not cleared");
    }
    true
}
