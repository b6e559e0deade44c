//! End-to-end session: a framed client over a real unix socket, through the
//! listener and protocol worker, out to a mock sink server.

use std::time::Duration;

use httptest::{matchers::*, responders::*, Expectation, Server};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

use logship_collector::febe::codec::{self, Message};
use logship_collector::febe::record::LogRecord;
use logship_collector::listener;
use logship_collector::registry::{ProtocolKind, ServeRecord};

fn cstring(s: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    codec::write_cstring(&mut buf, s);
    buf
}

#[tokio::test]
async fn framed_records_reach_the_sink() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/logs"),
            request::body(matches("\\[purple-rain-1984\\] boom")),
            request::body(matches("Detail: it broke")),
        ])
        .times(1..)
        .respond_with(status_code(204)),
    );

    let mut sink_url: reqwest::Url = server.url_str("/logs").parse().unwrap();
    sink_url.set_username("token").unwrap();
    sink_url.set_password(Some("secret")).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("log.sock");

    let record = ServeRecord {
        identity: "apple".to_string(),
        path: socket_path.clone(),
        sink_url,
        audit_url: None,
        protocol: ProtocolKind::Logfebe,
        service: "postgres".to_string(),
        prefix: "[purple-rain-1984]".to_string(),
        name: String::new(),
    };

    let die = CancellationToken::new();
    let listener_die = die.clone();
    let listener_record = record.clone();
    let listener_task = tokio::spawn(async move {
        listener::logfebe_listen(&listener_die, &listener_record, reqwest::Client::new())
            .await
            .unwrap();
    });

    // The listener binds asynchronously; wait for the socket to appear.
    for _ in 0..100 {
        if socket_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut stream = UnixStream::connect(&socket_path).await.unwrap();
    Message::new(b'V', cstring("PG-9.2.2/logfebe-1"))
        .write_to(&mut stream)
        .await
        .unwrap();
    Message::new(b'I', cstring("apple"))
        .write_to(&mut stream)
        .await
        .unwrap();

    let log_record = LogRecord {
        pid: 4221,
        err_message: Some("boom".to_string()),
        err_detail: Some("it broke".to_string()),
        ..LogRecord::default()
    };
    Message::new(b'L', log_record.encode())
        .write_to(&mut stream)
        .await
        .unwrap();

    // Give the worker's delivery client a couple of flush periods.
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Retire the generation; workers drain their clients on the way out.
    die.cancel();
    listener_task.await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
}
