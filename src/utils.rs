use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::error::ConfigError;

/// Wall-clock milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Wall-clock nanoseconds since the Unix epoch.
pub fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}

/// Create the output directory (and parents) if it does not exist yet.
pub fn ensure_output_dir(path: &Path) -> Result<(), ConfigError> {
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|source| ConfigError::OutputDir {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Created output directory: {}", path.display());
    Ok(())
}

/// Pin the calling thread to `core`. Returns false if the core is unknown
/// or the platform refused.
pub fn pin_current_thread(core: usize) -> bool {
    let Some(ids) = core_affinity::get_core_ids() else {
        warn!("Could not enumerate CPU cores, not pinning");
        return false;
    };

    match ids.into_iter().find(|id| id.id == core) {
        Some(id) => {
            let pinned = core_affinity::set_for_current(id);
            if pinned {
                info!("Pinned thread to core {}", core);
            } else {
                warn!("Failed to pin thread to core {}", core);
            }
            pinned
        }
        None => {
            warn!("Core {} not available, not pinning", core);
            false
        }
    }
}
