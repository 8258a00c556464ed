//! Notify-based policy hot-reload watcher.
//!
//! Watches a single JSON file. On create/modify events the file is reloaded
//! and validated, then applied to the registry. Policies whose settings did
//! not change keep their live limiter state. Editing any field of a policy
//! replaces its limiter, so that policy's blocks and violation counts are
//! dropped on reload.

use crate::config::loader::load_policy_config_from_file;
use crate::errors::WardenError;
use crate::registry::PolicyRegistry;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Watch the policy file and apply changes to `registry` until the watcher
/// channel closes.
pub async fn watch_config_file(
    path: PathBuf,
    registry: Arc<PolicyRegistry>,
) -> Result<(), notify::Error> {
    // Bridges the watcher's callback thread into this task.
    let (tx, mut rx) = mpsc::channel(16);

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Err(e) = tx.blocking_send(res) {
                debug!("Failed to forward policy file event: {}", e);
            }
        },
        notify::Config::default(),
    )?;

    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    info!("Watching policy file for changes: {}", path.display());

    while let Some(res) = rx.recv().await {
        match res {
            Ok(event) if should_reload(&event) => {
                info!("Policy file change detected ({:?}), reloading", event.kind);
                reload_policies(&path, &registry).await;
            }
            Ok(event) => {
                debug!("Ignoring filesystem event: {:?}", event.kind);
            }
            Err(e) => {
                crate::metrics::record_config_reload(false);
                error!("Error watching policy file: {}", e);
            }
        }
    }

    warn!("Policy watcher task is shutting down.");
    Ok(())
}

fn should_reload(event: &Event) -> bool {
    matches!(
        event.kind,
        notify::EventKind::Modify(_) | notify::EventKind::Create(_)
    )
}

/// Reload the file and apply it. Any failure keeps the running policies.
pub async fn reload_policies(path: &Path, registry: &PolicyRegistry) -> bool {
    let config = match load_policy_config_from_file(path).await {
        Ok(config) => config,
        Err(e) => {
            crate::metrics::record_config_reload(false);
            match e {
                WardenError::FileSystemError(io_err) => error!(
                    "Failed to read policy file '{}': {}. Keeping old policies.",
                    path.display(),
                    io_err
                ),
                WardenError::JsonError(json_err) => error!(
                    "Failed to parse '{}': {}. Keeping old policies.",
                    path.display(),
                    json_err
                ),
                other => error!(
                    "Policy file '{}' rejected: {}. Keeping old policies.",
                    path.display(),
                    other
                ),
            }
            return false;
        }
    };

    registry.apply(config);
    crate::metrics::record_config_reload(true);
    info!("Policies hot-reloaded successfully.");
    true
}
