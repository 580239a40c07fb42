//! Pinning hot consumer threads to dedicated CPU cores.
//!
//! A consumer spinning on a transport benefits from owning a core: no
//! scheduler migrations, warm caches. Thin wrapper over `core_affinity`.

use tracing::{info, warn};

/// Pin the calling thread to `core`, if one is configured.
///
/// Returns `true` only when a core was requested and the OS accepted it.
pub fn pin_current_thread(core: Option<usize>) -> bool {
    let Some(core) = core else {
        return false;
    };

    let available = core_affinity::get_core_ids().unwrap_or_default();
    match available.get(core) {
        Some(id) if core_affinity::set_for_current(*id) => {
            info!("pinned thread to CPU core {core}");
            true
        }
        Some(_) => {
            warn!("OS rejected pinning to CPU core {core}");
            false
        }
        None => {
            warn!("CPU core {core} not available ({} cores)", available.len());
            false
        }
    }
}
