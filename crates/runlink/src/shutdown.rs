//! Process-wide teardown of live bridges.
//!
//! Every bridge registers its supervised state here at launch and
//! unregisters on successful explicit disposal, so a host that exits
//! without cleaning up still reaps its runtime children: the first
//! registration installs a signal listener (ctrl-c, SIGTERM on unix) that
//! sweeps whatever is left. The sweep is defensive: a disposal failure
//! during host shutdown is logged, never propagated, because an escaping
//! error there would take the rest of the teardown down with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, Weak};

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::bridge::{Supervised, dispose_state};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static REGISTRY: OnceLock<StdMutex<HashMap<u64, Weak<Mutex<Supervised>>>>> = OnceLock::new();
static SIGNAL_HOOK: OnceLock<()> = OnceLock::new();

fn registry() -> &'static StdMutex<HashMap<u64, Weak<Mutex<Supervised>>>> {
    REGISTRY.get_or_init(|| StdMutex::new(HashMap::new()))
}

/// Register a bridge for the shutdown sweep. Returns the token the bridge
/// hands back to [`unregister`] once it has been disposed explicitly.
pub(crate) fn register(state: &Arc<Mutex<Supervised>>) -> u64 {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    if let Ok(mut map) = registry().lock() {
        map.insert(id, Arc::downgrade(state));
    }
    install_signal_hook();
    id
}

/// Remove a bridge from the sweep. Idempotent.
pub(crate) fn unregister(id: u64) {
    if let Ok(mut map) = registry().lock() {
        map.remove(&id);
    }
}

/// Dispose every bridge still registered.
///
/// Hosts with their own shutdown sequencing call this from it; the signal
/// listener calls it for everyone else. Failures are logged and swallowed.
pub async fn dispose_all() {
    let entries: Vec<(u64, Weak<Mutex<Supervised>>)> = match registry().lock() {
        Ok(mut map) => map.drain().collect(),
        Err(_) => return,
    };
    for (id, weak) in entries {
        // A dead Weak is a bridge that was dropped; its Drop already ran.
        let Some(state) = weak.upgrade() else { continue };
        if let Err(err) = dispose_state(&state).await {
            error!(bridge_id = id, error = %err, "shutdown sweep: disposal failed");
        }
    }
}

fn install_signal_hook() {
    SIGNAL_HOOK.get_or_init(|| {
        // Detached on purpose; the task lives until the signal arrives.
        drop(tokio::spawn(async {
            wait_for_shutdown_signal().await;
            info!("shutdown signal received, disposing live bridges");
            dispose_all().await;
        }));
    });
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                error!(error = %err, "cannot listen for SIGTERM, watching ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
