use std::sync::Arc;

use mas_stream::prelude::*;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serves a single canned HTTP response and returns the raw request it received.
async fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let request = read_request(&mut socket).await;
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write");
        socket.shutdown().await.ok();
        request
    });
    (format!("http://{addr}"), handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.expect("read");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn sse_response(events: &[&str]) -> String {
    let mut body = String::from(": ping\n\n");
    for event in events {
        body.push_str("data: ");
        body.push_str(event);
        body.push_str("\n\n");
    }
    format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\nconnection: close\r\n\r\n{body}"
    )
}

fn coordinator(base_url: &str) -> Coordinator {
    Coordinator::builder()
        .config(StreamConfig::new(base_url))
        .sessions(Arc::new(SessionStore::with_token("tok-123")))
        .build()
        .expect("coordinator")
}

#[tokio::test]
async fn streams_answer_over_sse() {
    let (base_url, server) = serve_once(sse_response(&[
        r#"{"type":"start","run_id":"run-42","agent_id":null,"data":{}}"#,
        r#"{"type":"tool_start","run_id":"run-42","agent_id":"sql_agent","data":{"tool":"sql_query","args":{}}}"#,
        r#"{"type":"answer_token","run_id":"run-42","agent_id":"sql_agent","data":{"text":"Paris"}}"#,
        r#"{"type":"answer_token","run_id":"run-42","agent_id":"sql_agent","data":{"text":" it is."}}"#,
        r#"{"type":"done","run_id":"run-42","agent_id":null,"data":{}}"#,
    ]))
    .await;

    let conversation = Conversation::new(vec![Turn::user("earlier")], Turn::user("hello"));
    let report = coordinator(&base_url)
        .collect(conversation, CancelToken::new())
        .await
        .expect("report");
    assert_eq!(
        report.outcome,
        RunOutcome::Completed {
            text: "Paris it is.".into()
        }
    );
    assert_eq!(report.server_run_id.as_deref(), Some("run-42"));

    let request = server.await.expect("server");
    let lowered = request.to_ascii_lowercase();
    assert!(lowered.starts_with("post /chat/stream "));
    assert!(lowered.contains("authorization: bearer tok-123"));
    assert!(lowered.contains("accept: text/event-stream"));
    assert!(request.contains(r#""message":"hello""#));
    assert!(request.contains(r#"{"role":"user","content":"earlier"}"#));
}

#[tokio::test]
async fn unauthorized_status_asks_to_sign_in() {
    let (base_url, server) = serve_once(
        "HTTP/1.1 401 Unauthorized\r\ncontent-length: 13\r\nconnection: close\r\n\r\ntoken expired"
            .to_string(),
    )
    .await;
    let report = coordinator(&base_url)
        .collect(Conversation::from_user_text("hi"), CancelToken::new())
        .await
        .expect("report");
    assert_eq!(
        report.outcome,
        RunOutcome::Failed {
            reason: FailureReason::AuthRequired,
            text: "Your session has expired. Please sign in again.".into(),
        }
    );
    server.await.expect("server");
}

#[tokio::test]
async fn server_error_status_is_upstream_failure() {
    let (base_url, server) = serve_once(
        "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 4\r\nconnection: close\r\n\r\noops"
            .to_string(),
    )
    .await;
    let report = coordinator(&base_url)
        .collect(Conversation::from_user_text("hi"), CancelToken::new())
        .await
        .expect("report");
    match report.outcome {
        RunOutcome::Failed {
            reason: FailureReason::Upstream { message },
            text,
        } => {
            assert_eq!(message, "backend returned status 500: oops");
            assert_eq!(text, "Error: backend returned status 500: oops");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    server.await.expect("server");
}

#[tokio::test]
async fn closed_port_is_reported_offline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let report = coordinator(&format!("http://{addr}"))
        .collect(Conversation::from_user_text("hi"), CancelToken::new())
        .await
        .expect("report");
    assert!(matches!(
        report.outcome,
        RunOutcome::Failed {
            reason: FailureReason::TransportOffline { .. },
            ..
        }
    ));
}
