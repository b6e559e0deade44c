#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use logship_collector::config::Config;
use logship_collector::registry::ServeDb;
use logship_collector::supervisor::{Supervisor, SupervisorExit};
use logship_collector::logger;

#[tokio::main]
async fn main() {
    if std::env::args().count() != 1 {
        eprintln!("Usage: logship-collector");
        process::exit(1);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("logship-collector: {e}");
            process::exit(1);
        }
    };

    logger::init(&config.log_level);

    // Signal handling: print a dying gasp and exit. Termination is the
    // catchable stand-in for a kill request.
    match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(mut interrupt), Ok(mut terminate)) => {
            tokio::spawn(async move {
                tokio::select! {
                    _ = interrupt.recv() => {
                        info!("got signal interrupt");
                        process::exit(0);
                    }
                    _ = terminate.recv() => {
                        info!("got signal terminated");
                        process::exit(2);
                    }
                }
            });
        }
        _ => {
            error!("cannot install signal handlers");
            process::exit(1);
        }
    }

    let db = ServeDb::new(config.serve_db_dir.clone());
    match Supervisor::new(db, config.process_deadline).run().await {
        Ok(SupervisorExit::DeadlineExpired) => process::exit(101),
        Err(e) => {
            error!("serve database suffers an unrecoverable error: {e}");
            process::exit(1);
        }
    }
}
