//! Event streams of the hosted database backend against a local stream
//! server speaking just enough HTTP.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use realtime_multiplexer::{
    DetachPolicy, EventKind, EventSink, FirebaseRestBackend, RealtimeBackend, RealtimeError,
    RealtimeEvent, RemotePath, SubscriptionHub,
};
use futures_util::StreamExt;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

struct StreamServer {
    url: Url,
    /// Request target (path and query) of every accepted request.
    targets: mpsc::UnboundedReceiver<String>,
}

/// Answer the n-th request with the n-th raw response, then hold the
/// connection open until the client goes away.
async fn serve(responses: Vec<String>) -> StreamServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let (tx, targets) = mpsc::unbounded_channel();
    let mut responses = VecDeque::from(responses);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let Some(response) = responses.pop_front() else {
                break;
            };
            tokio::spawn(handle_connection(socket, response, tx.clone()));
        }
    });
    StreamServer { url, targets }
}

async fn handle_connection(
    socket: TcpStream,
    response: String,
    targets: mpsc::UnboundedSender<String>,
) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await? == 0 || header == "\r\n" {
            break;
        }
    }
    let target = request_line.split_whitespace().nth(1).unwrap_or("").to_string();
    let _ = targets.send(target);

    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;

    let mut buf = [0u8; 256];
    while reader.read(&mut buf).await? > 0 {}
    Ok(())
}

fn event_stream(frames: &[(&str, String)]) -> String {
    let mut response = String::from(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
    );
    for (event, data) in frames {
        response.push_str(&format!("event: {}\ndata: {}\n\n", event, data));
    }
    response
}

fn put(path: &str, data: serde_json::Value) -> (&'static str, String) {
    ("put", json!({"path": path, "data": data}).to_string())
}

fn backend(server: &StreamServer) -> FirebaseRestBackend {
    let http_client = reqwest::Client::builder().no_proxy().build().unwrap();
    FirebaseRestBackend::with_http_client(server.url.clone(), http_client, WAIT)
}

fn channel_sink() -> (EventSink, mpsc::UnboundedReceiver<RealtimeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink: EventSink = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    (sink, rx)
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn token_change_reopens_stream_without_replaying() {
    let mut server = serve(vec![
        event_stream(&[put("/", json!({"title": "Intro"}))]),
        event_stream(&[
            put("/", json!({"title": "Intro"})),
            ("patch", json!({"path": "/", "data": {"attend": "A12"}}).to_string()),
        ]),
    ])
    .await;
    let backend = backend(&server);
    let (sink, mut events) = channel_sink();

    let handle = backend
        .on(&RemotePath::new("course/c1"), EventKind::Value, sink)
        .unwrap();
    assert_eq!(next(&mut server.targets).await, "/course/c1.json");
    assert_eq!(
        next(&mut events).await,
        RealtimeEvent::Value(json!({"title": "Intro"}))
    );

    backend.set_auth_token(Some("tok".to_string()));
    assert_eq!(next(&mut server.targets).await, "/course/c1.json?auth=tok");
    assert_eq!(
        next(&mut events).await,
        RealtimeEvent::Value(json!({"title": "Intro", "attend": "A12"}))
    );

    backend.set_auth_token(Some("tok".to_string()));
    assert!(timeout(Duration::from_millis(200), server.targets.recv())
        .await
        .is_err());
    assert_eq!(backend.listener_count(), 1);

    backend.off(handle);
    assert_eq!(backend.listener_count(), 0);
}

#[tokio::test]
async fn cancelled_stream_is_a_registration_error() {
    let server = serve(vec![event_stream(&[
        put("/", json!({"u1": true})),
        ("cancel", "permission denied".to_string()),
    ])])
    .await;
    let backend = backend(&server);
    let (sink, mut events) = channel_sink();

    backend
        .on(&RemotePath::new("course-private/c1"), EventKind::Value, sink)
        .unwrap();
    assert_eq!(
        next(&mut events).await,
        RealtimeEvent::Value(json!({"u1": true}))
    );
    match next(&mut events).await {
        RealtimeEvent::Error(RealtimeError::Registration { path, message }) => {
            assert_eq!(path, "/course-private/c1");
            assert_eq!(message, "permission denied");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn rejected_stream_fails_every_consumer() {
    let server = serve(vec![
        "HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    ])
    .await;
    let backend = Arc::new(backend(&server));
    let hub = SubscriptionHub::new(backend.clone(), DetachPolicy::default());

    let mut a = hub.observe("payment", EventKind::Value);
    let mut b = hub.observe("payment", EventKind::Value);
    for subscription in [&mut a, &mut b] {
        let outcome = timeout(WAIT, subscription.next())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            Some(Err(RealtimeError::Registration { .. }))
        ));
    }
    timeout(WAIT, async {
        while backend.listener_count() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}
