//! Fan-out of fix requests and update subscriptions to every positioning provider

use safeguard_api::{LocationFix, ProviderId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{HostError, LocationProvider, UpdateCadence};

/// Result of one provider request, delivered back to the engine loop
#[derive(Debug, Clone)]
pub enum LocationSignal {
    Fix(LocationFix),
    Failed { provider: ProviderId, error: String },
}

/// Ask every available provider for one fix.
///
/// Each request runs in its own task and reports through `tx`, so a slow or
/// failing provider never holds up the others. Returns the number of requests
/// started.
pub fn request_fix_from_all(
    providers: &[Arc<dyn LocationProvider>],
    timeout: Duration,
    tx: mpsc::UnboundedSender<LocationSignal>,
) -> usize {
    let mut started = 0;

    for provider in providers {
        let id = provider.id();
        if !provider.is_available() {
            debug!(provider = %id, "Provider unavailable, skipping fix request");
            continue;
        }

        let provider = Arc::clone(provider);
        let tx = tx.clone();
        tokio::spawn(async move {
            let signal = match tokio::time::timeout(timeout, provider.request_single()).await {
                Ok(Ok(fix)) => LocationSignal::Fix(fix),
                Ok(Err(e)) => LocationSignal::Failed {
                    provider: id,
                    error: e.to_string(),
                },
                Err(_) => LocationSignal::Failed {
                    provider: id,
                    error: HostError::Timeout(format!("{} fix", id)).to_string(),
                },
            };

            if tx.send(signal).is_err() {
                warn!(provider = %id, "Engine loop gone, dropping location result");
            }
        });
        started += 1;
    }

    started
}

/// Subscribe every available provider to continuous updates at its
/// cadence. A provider that refuses is reported through `tx` as a failure
/// and skipped. Returns the number of live subscriptions.
pub fn start_continuous_updates(
    providers: &[Arc<dyn LocationProvider>],
    tx: mpsc::UnboundedSender<LocationSignal>,
) -> usize {
    let mut subscribed = 0;

    for provider in providers {
        let id = provider.id();
        let Some(cadence) = UpdateCadence::for_provider(id) else {
            continue;
        };
        if !provider.is_available() {
            debug!(provider = %id, "Provider unavailable, no continuous updates");
            continue;
        }

        match provider.subscribe(cadence, tx.clone()) {
            Ok(()) => {
                info!(
                    provider = %id,
                    interval_secs = cadence.interval.as_secs(),
                    min_distance_m = cadence.min_distance_m,
                    "Continuous location updates started"
                );
                subscribed += 1;
            }
            Err(e) => {
                warn!(provider = %id, error = %e, "Continuous location updates refused");
                let _ = tx.send(LocationSignal::Failed {
                    provider: id,
                    error: e.to_string(),
                });
            }
        }
    }

    subscribed
}

/// Drop every provider's update subscription
pub fn stop_continuous_updates(providers: &[Arc<dyn LocationProvider>]) {
    for provider in providers {
        provider.unsubscribe();
    }
}
