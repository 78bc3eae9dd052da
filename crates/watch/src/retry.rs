//! Bounded retry for transient snapshot reads.
//!
//! The tracker rewrites its snapshot file under its own lock, so a read
//! can momentarily find the file busy. Transient failures get a small
//! fixed number of retries with a short fixed delay; everything else
//! surfaces immediately.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use beads_live_core::{CoreError, IssueReader, IssueSnapshot};

pub(crate) async fn read_with_retry(
    reader: &dyn IssueReader,
    root: &Path,
    attempts: u32,
    delay: Duration,
) -> Result<IssueSnapshot, CoreError> {
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match reader.read_issues(root).await {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) if e.is_transient() && attempt < attempts => {
                debug!(
                    root = %root.display(),
                    attempt,
                    error = %e,
                    "transient snapshot read failure; retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
