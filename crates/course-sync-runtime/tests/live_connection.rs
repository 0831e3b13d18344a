//! A connected context against a local event-stream server: signing in
//! reopens live course streams with the new token.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use course_sync_runtime::{AppContext, CacheKey};
use realtime_multiplexer::FirebaseRestBackend;
use serde_json::json;
use sync_config_and_utils::Config;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;

const WAIT: Duration = Duration::from_secs(5);
const STREAM_HEAD: &str =
    "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";

/// Serve one raw event stream per accepted request, reporting each request
/// target.
async fn serve(bodies: Vec<String>) -> (Url, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let (tx, targets) = mpsc::unbounded_channel();
    let mut bodies = VecDeque::from(bodies);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let Some(body) = bodies.pop_front() else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
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
                let target = request_line.split_whitespace().nth(1).unwrap_or("");
                let _ = tx.send(target.to_string());

                writer.write_all(STREAM_HEAD.as_bytes()).await?;
                writer.write_all(body.as_bytes()).await?;
                writer.flush().await?;
                let mut buf = [0u8; 256];
                while reader.read(&mut buf).await? > 0 {}
                Ok::<_, std::io::Error>(())
            });
        }
    });
    (url, targets)
}

fn put(data: serde_json::Value) -> String {
    format!("event: put\ndata: {}\n\n", json!({"path": "/", "data": data}))
}

#[tokio::test]
async fn sign_in_reopens_live_course_with_token() {
    let (url, mut targets) = serve(vec![
        put(json!({"title": "Intro"})),
        put(json!({"title": "Intro", "attend": "A12"})),
    ])
    .await;
    let config = Config {
        database_url: url.to_string(),
        ..Config::default()
    };
    let http_client = reqwest::Client::builder().no_proxy().build().unwrap();
    let backend = Arc::new(FirebaseRestBackend::with_http_client(
        url,
        http_client,
        WAIT,
    ));
    let context = AppContext::connect_with_backend(config, backend.clone()).unwrap();

    let courses = context.courses();
    let _follow = courses.watch("c1").unwrap();
    let first = timeout(WAIT, targets.recv()).await.unwrap().unwrap();
    assert_eq!(first, "/course/c1.json");

    context.credentials().sign_in("tok");
    let reopened = timeout(WAIT, targets.recv()).await.unwrap().unwrap();
    assert_eq!(reopened, "/course/c1.json?auth=tok");

    let mut cached = context.store().get(&CacheKey::entity("course", "c1"));
    let record = timeout(WAIT, async {
        loop {
            let record = cached.next_defined().await.unwrap();
            if record.contains("attend") {
                return record;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(record.get("title"), Some(&json!("Intro")));
    assert_eq!(record.get("attend"), Some(&json!("A12")));
    assert_eq!(backend.listener_count(), 1);

    context.shutdown();
    assert_eq!(backend.listener_count(), 0);
}
