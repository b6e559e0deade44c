//! One listener per serve record, dispatching on protocol kind.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use logship_delivery::DeliveryError;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::febe::worker;
use crate::registry::{ProtocolKind, ServeRecord};
use crate::{logfile, syslog};

/// Failures that end a listener or single-socket worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cannot listen on {path:?}: {source}")]
    Bind { path: PathBuf, source: io::Error },
    #[error("cannot make just-bound socket {path:?} world-writable: {source}")]
    Chmod { path: PathBuf, source: io::Error },
    #[error("accept failure: {0}")]
    Accept(#[source] io::Error),
    #[error("datagram receive failure: {0}")]
    Receive(#[source] io::Error),
    #[error("cannot open log file {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("cannot watch log file {path:?}: {source}")]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Serve one registry entry until its generation dies.
///
/// Persistent I/O failures (bind, accept) are fatal to the whole process via
/// the fatal logger; an external supervisor restarts us into a clean state.
pub async fn serve(die: CancellationToken, record: ServeRecord) {
    // A transport per listener, so no tenant shares client state with
    // another. Certificate verification is deliberately off: the sink is
    // reached over a trusted path and authenticates us by token.
    let http = match reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("exiting, cannot construct sink transport: {e}");
            std::process::exit(1);
        }
    };

    let result = match record.protocol {
        ProtocolKind::Logfebe => logfebe_listen(&die, &record, http).await,
        ProtocolKind::Syslog => syslog::worker(&die, &record, http).await,
        ProtocolKind::Logfile => logfile::worker(&die, &record, http).await,
    };

    if let Err(e) = result {
        error!("exiting, listener for {:?} failed: {e}", record.path);
        std::process::exit(1);
    }
}

/// Accept loop for a stream serve: one protocol worker task per connection.
pub async fn logfebe_listen(
    die: &CancellationToken,
    record: &ServeRecord,
    http: reqwest::Client,
) -> Result<(), WorkerError> {
    let bind_err = |source| WorkerError::Bind {
        path: record.path.clone(),
        source,
    };
    remove_stale_socket(&record.path).map_err(&bind_err)?;
    let listener = UnixListener::bind(&record.path).map_err(&bind_err)?;
    add_world_write(&record.path)?;

    loop {
        tokio::select! {
            _ = die.cancelled() => {
                info!("listener exits normally from die request");
                return Ok(());
            }
            res = listener.accept() => {
                let (stream, _addr) = res.map_err(WorkerError::Accept)?;
                tokio::spawn(worker::session(
                    die.clone(),
                    stream,
                    record.clone(),
                    http.clone(),
                ));
            }
        }
    }
}

/// Remove a leftover socket file from a previous generation so a fresh bind
/// succeeds.
pub(crate) fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Make the socket world-writable so peers running as a different user can
/// connect. Unless the producer and collector share a user, common umasks
/// would otherwise shut the producer out.
pub(crate) fn add_world_write(path: &Path) -> Result<(), WorkerError> {
    let chmod_err = |source| WorkerError::Chmod {
        path: path.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(path).map_err(chmod_err)?;
    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o222);
    std::fs::set_permissions(path, permissions).map_err(chmod_err)
}
