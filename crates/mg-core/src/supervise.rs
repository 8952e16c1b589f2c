//! Detached launching of the external processes
//!
//! Children are spawned with all streams discarded and the handle
//! dropped: the supervisor never waits on a child, and a child
//! exiting has no effect on the pipeline. There is no restart logic
//! at this layer.

use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::launch::LaunchSpec;

/// Spawn a planned process detached from the supervisor's lifetime.
///
/// Best-effort: a missing binary or a spawn failure is logged and
/// reported as `false`, never propagated.
pub fn spawn_detached(spec: &LaunchSpec) -> bool {
    if !spec.program.exists() {
        warn!("Binary not found, skipping launch: {:?}", spec.program);
        return false;
    }

    match Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => {
            debug!("Spawned {:?} (pid {})", spec.program, child.id());
            // Dropping the handle detaches the child; it is never reaped here
            drop(child);
            true
        }
        Err(e) => {
            warn!("Failed to spawn {:?}: {}", spec.program, e);
            false
        }
    }
}
