//! Ship stdin to the default sink, one message per line.
//!
//! Reads `LOGPLEX_URL` for the destination and pushes every line of standard
//! input through the delivery client, then drains it. Useful for smoke
//! testing a sink (or `sinkd`) without a database attached.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use std::process;

use chrono::Utc;
use logship_delivery::{DeliveryClient, DeliveryConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use logship_collector::logger;

#[tokio::main]
async fn main() {
    logger::init("info");

    let url = match std::env::var("LOGPLEX_URL")
        .ok()
        .filter(|raw| !raw.is_empty())
    {
        Some(raw) => match reqwest::Url::parse(&raw) {
            Ok(url) => url,
            Err(e) => {
                error!("LOGPLEX_URL does not parse: {e}");
                process::exit(1);
            }
        },
        None => {
            error!("LOGPLEX_URL is unset: it must name the sink to ship to");
            process::exit(1);
        }
    };

    let http = match reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("cannot construct sink transport: {e}");
            process::exit(1);
        }
    };

    let client = match DeliveryClient::new(DeliveryConfig::new(url, http)) {
        Ok(client) => client,
        Err(e) => {
            error!("cannot create delivery client: {e}");
            process::exit(1);
        }
    };

    let procid = format!("sendlog.{}", process::id());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(e) = client.buffer(134, Utc::now(), "sendlog", &procid, line.as_bytes())
                {
                    error!("cannot buffer line: {e}");
                    process::exit(1);
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("cannot read stdin: {e}");
                break;
            }
        }
    }

    client.close().await;
}
