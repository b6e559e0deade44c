//! Syslog-shaped line framing for sink request bodies.

use chrono::{DateTime, SecondsFormat, Utc};

/// Render one message as an RFC 5424-shaped line:
/// `<pri>1 <timestamp> <host> <token> <procid> - - <body>`.
///
/// The sink multiplexes tenants by the token in the APP-NAME position, so the
/// token is part of every line rather than only part of the request auth.
/// The line is newline-terminated; a body that already ends in a newline is
/// not given a second one.
pub(crate) fn format_line(
    priority: u8,
    when: DateTime<Utc>,
    host: &str,
    token: &str,
    procid: &str,
    body: &[u8],
) -> Vec<u8> {
    let stamp = when.to_rfc3339_opts(SecondsFormat::Micros, true);
    let header = format!("<{priority}>1 {stamp} {host} {token} {procid} - - ");

    let mut line = Vec::with_capacity(header.len() + body.len() + 1);
    line.extend_from_slice(header.as_bytes());
    line.extend_from_slice(body);
    if !line.ends_with(b"\n") {
        line.push(b'\n');
    }
    line
}
