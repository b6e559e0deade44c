//! Generational supervision of listeners over registry snapshots.
//!
//! Rather than diffing registry states and migrating workers, a change
//! retires the entire previous generation (by cancelling its die token) and
//! spawns a fresh listener per record. Tenants that did not change are
//! re-spawned too; correctness does not depend on preserving workers across
//! generations, and transient duplicate sockets are avoided by removing the
//! socket path before binding.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::listener;
use crate::registry::{RegistryError, ServeDb};

/// How often the registry is polled for a new serve document.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Why the supervisor stopped on its own.
#[derive(Debug, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The configured process deadline elapsed. The process should exit and
    /// let its external supervisor restart it with a fresh address space.
    DeadlineExpired,
}

pub struct Supervisor {
    db: ServeDb,
    deadline: Option<Duration>,
    poll_interval: Duration,
}

impl Supervisor {
    pub fn new(db: ServeDb, deadline: Option<Duration>) -> Supervisor {
        Supervisor {
            db,
            deadline,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the poll cadence. Production keeps [`POLL_INTERVAL`];
    /// integration tests turn this down to exercise generational restart.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Supervisor {
        self.poll_interval = poll_interval;
        self
    }

    /// Poll-and-respawn loop. Returns only on deadline expiry or an
    /// unrecoverable registry failure.
    pub async fn run(mut self) -> Result<SupervisorExit, RegistryError> {
        let started = Instant::now();
        let mut generation = CancellationToken::new();

        loop {
            if self.db.poll()? {
                // Tell the worker generation serving the previous registry
                // state to die, and start over from the snapshot.
                generation.cancel();
                generation = CancellationToken::new();

                let snapshot = self.db.snapshot();
                info!(
                    "serve database changed, spawning {} listener(s)",
                    snapshot.len()
                );
                for record in snapshot {
                    tokio::spawn(listener::serve(generation.clone(), record));
                }
            }

            tokio::time::sleep(self.poll_interval).await;

            if let Some(deadline) = self.deadline {
                if started.elapsed() >= deadline {
                    info!(
                        "exiting on account of the {}s deadline, to bound memory growth",
                        deadline.as_secs()
                    );
                    generation.cancel();
                    return Ok(SupervisorExit::DeadlineExpired);
                }
            }
        }
    }
}
