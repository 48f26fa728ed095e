use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use taskrelay_frame::FrameConfig;
use taskrelay_server::{
    from_async, Completion, ConnectionState, HandlerError, ServerConfig, SharedHandler, Task,
    TaskServer, WriteOutcome,
};
use taskrelay_task::{HANDLER_FAILURE_MESSAGE, UNSERIALIZABLE_ERROR};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

fn loopback_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    }
}

async fn start(config: ServerConfig, handler: SharedHandler) -> (TaskServer, SocketAddr) {
    let mut server = TaskServer::new(config);
    let addr = server.start(handler).await.expect("server should bind");
    (server, addr)
}

fn echo_handler() -> SharedHandler {
    Arc::new(|task: Task, completion: Completion| {
        completion.succeed(task);
    })
}

/// Hands every task and its completion to the test instead of replying.
fn holding_handler() -> (SharedHandler, mpsc::UnboundedReceiver<(Task, Completion)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: SharedHandler = Arc::new(move |task: Task, completion: Completion| {
        let _ = tx.send((task, completion));
    });
    (handler, rx)
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .expect("client should connect");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    async fn send_raw(&mut self, data: &str) {
        self.writer
            .write_all(data.as_bytes())
            .await
            .expect("client write should succeed");
    }

    async fn send(&mut self, doc: Value) {
        self.send_raw(&format!("{doc}\n")).await;
    }

    async fn recv(&mut self) -> Value {
        let line = timeout(REPLY_TIMEOUT, self.lines.next_line())
            .await
            .expect("reply should arrive in time")
            .expect("read should succeed")
            .expect("connection should stay open");
        serde_json::from_str(&line).expect("reply should be JSON")
    }

    async fn expect_no_reply(&mut self, wait: Duration) {
        assert!(
            timeout(wait, self.lines.next_line()).await.is_err(),
            "no reply expected"
        );
    }

    async fn expect_closed(&mut self) {
        let next = timeout(REPLY_TIMEOUT, self.lines.next_line())
            .await
            .expect("server should close the connection");
        assert!(!matches!(next, Ok(Some(_))), "unexpected reply: {next:?}");
    }
}

async fn wait_for_state(completion: &Completion, wanted: ConnectionState) {
    let deadline = Instant::now() + REPLY_TIMEOUT;
    while completion.connection_state() != wanted {
        assert!(Instant::now() < deadline, "connection never became {wanted:?}");
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn replies_with_the_completed_task() {
    let (mut server, addr) = start(loopback_config(), echo_handler()).await;
    let mut client = Client::connect(addr).await;

    client
        .send(json!({
            "taskId": "t-1",
            "taskType": "data",
            "request": {"method": "GET", "headers": {"x-trace": "abc"}},
            "response": {"statusCode": 200}
        }))
        .await;
    let reply = client.recv().await;

    assert_eq!(reply["taskId"], "t-1");
    assert_eq!(reply["taskType"], "data");
    assert_eq!(reply["request"]["headers"]["x-trace"], "abc");
    assert_eq!(reply["response"]["statusCode"], 200);

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn replies_follow_request_order() {
    let handler = from_async(|task: Task| async move {
        let delay = match task.task_id.as_deref() {
            Some("slow") => 300,
            Some("medium") => 100,
            _ => 0,
        };
        sleep(Duration::from_millis(delay)).await;
        Ok::<_, HandlerError>(task)
    });
    let (mut server, addr) = start(loopback_config(), handler).await;
    let mut client = Client::connect(addr).await;

    client
        .send_raw(concat!(
            r#"{"taskId":"slow","taskType":"data"}"#,
            "\n",
            r#"{"taskId":"medium","taskType":"data"}"#,
            "\n",
            r#"{"taskId":"fast","taskType":"data"}"#,
            "\n",
        ))
        .await;

    for expected in ["slow", "medium", "fast"] {
        assert_eq!(client.recv().await["taskId"], expected);
    }

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn invalid_json_gets_parse_error_and_connection_survives() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let handler: SharedHandler = Arc::new(move |task: Task, completion: Completion| {
        counted.fetch_add(1, Ordering::SeqCst);
        completion.succeed(task);
    });
    let (mut server, addr) = start(loopback_config(), handler).await;
    let mut client = Client::connect(addr).await;

    client.send_raw("invalid json\n").await;
    let reply = client.recv().await;
    assert_eq!(reply["isError"], true);
    let debug_message = reply["debugMessage"].as_str().expect("debugMessage string");
    assert!(debug_message.starts_with("unable to parse"), "{debug_message}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    client.send(json!({"taskId": "after", "taskType": "data"})).await;
    assert_eq!(client.recv().await["taskId"], "after");

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn non_object_document_is_a_parse_error() {
    let (mut server, addr) = start(loopback_config(), echo_handler()).await;
    let mut client = Client::connect(addr).await;

    client.send_raw("[1,2,3]\n").await;
    let reply = client.recv().await;
    assert_eq!(reply["isError"], true);
    assert!(reply["debugMessage"]
        .as_str()
        .is_some_and(|msg| msg.starts_with("unable to parse")));

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn mistyped_fields_reach_the_handler_unchanged() {
    let (mut server, addr) = start(loopback_config(), echo_handler()).await;
    let mut client = Client::connect(addr).await;

    let documents = [
        json!({"taskId": 42}),
        json!({"response": {"status": "200"}}),
        json!({"taskType": "businessLogic"}),
        json!({"request": {"params": []}}),
        json!({"request": {"entityId": 123}}),
    ];
    for doc in &documents {
        client.send(doc.clone()).await;
    }
    for doc in documents {
        assert_eq!(client.recv().await, doc);
    }

    server.stop().await.expect("server should stop");
}

struct Circular;

impl serde::Serialize for Circular {
    fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("circular structure"))
    }
}

#[tokio::test]
async fn handler_failures_are_classified() {
    let handler: SharedHandler = Arc::new(|task: Task, completion: Completion| {
        let err = match task.task_id.as_deref() {
            Some("message") => HandlerError::message("some error message"),
            Some("data") => HandlerError::from(json!({"code": 42, "reason": "quota"})),
            _ => HandlerError::from_serialize(&Circular),
        };
        completion.fail(err);
    });
    let (mut server, addr) = start(loopback_config(), handler).await;
    let mut client = Client::connect(addr).await;

    for id in ["message", "data", "circular"] {
        client.send(json!({"taskId": id, "taskType": "functions"})).await;
    }

    let message = client.recv().await;
    assert_eq!(message["isError"], true);
    assert_eq!(message["debugMessage"], HANDLER_FAILURE_MESSAGE);
    assert_eq!(message["error"], "Error: some error message");

    let data = client.recv().await;
    assert_eq!(data["debugMessage"], HANDLER_FAILURE_MESSAGE);
    assert_eq!(data["error"], json!({"code": 42, "reason": "quota"}));

    let circular = client.recv().await;
    assert_eq!(circular["debugMessage"], HANDLER_FAILURE_MESSAGE);
    assert_eq!(circular["error"], UNSERIALIZABLE_ERROR);

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn health_check_answers_without_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let handler: SharedHandler = Arc::new(move |task: Task, completion: Completion| {
        counted.fetch_add(1, Ordering::SeqCst);
        completion.succeed(task);
    });
    let (mut server, addr) = start(loopback_config(), handler).await;
    let mut client = Client::connect(addr).await;

    client.send(json!({"healthCheck": true})).await;
    assert_eq!(client.recv().await, json!({"status": "ready"}));

    // A falsy flag is an ordinary task.
    client.send(json!({"healthCheck": 0, "taskId": "h"})).await;
    assert_eq!(client.recv().await["taskId"], "h");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn null_document_is_dropped_silently() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let handler: SharedHandler = Arc::new(move |task: Task, completion: Completion| {
        counted.fetch_add(1, Ordering::SeqCst);
        completion.succeed(task);
    });
    let (mut server, addr) = start(loopback_config(), handler).await;
    let mut client = Client::connect(addr).await;

    client.send_raw("null\n").await;
    client.expect_no_reply(Duration::from_millis(500)).await;

    client.send(json!({"taskId": "next"})).await;
    assert_eq!(client.recv().await["taskId"], "next");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn empty_object_dispatches_without_request() {
    let (handler, mut tasks) = holding_handler();
    let (mut server, addr) = start(loopback_config(), handler).await;
    let mut client = Client::connect(addr).await;

    client.send_raw("{}\r\n").await;
    let (task, completion) = timeout(REPLY_TIMEOUT, tasks.recv())
        .await
        .expect("task should be dispatched")
        .expect("handler channel open");
    assert!(task.request.is_none());
    assert!(task.kind.is_none());

    assert_eq!(completion.succeed(task), WriteOutcome::Written);
    assert_eq!(client.recv().await, json!({}));

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn legacy_params_fill_empty_query() {
    let (handler, mut tasks) = holding_handler();
    let (mut server, addr) = start(loopback_config(), handler).await;
    let mut client = Client::connect(addr).await;

    client
        .send(json!({
            "taskId": "legacy",
            "taskType": "data",
            "request": {"query": {}, "params": {"limit": "10"}}
        }))
        .await;
    client
        .send(json!({
            "taskId": "modern",
            "taskType": "data",
            "request": {"query": {"limit": "5"}, "params": {"limit": "10"}}
        }))
        .await;

    let (legacy, legacy_done) = tasks.recv().await.expect("legacy task");
    let request = legacy.request.as_ref().expect("request present");
    assert_eq!(request.query.as_ref().expect("query")["limit"], "10");
    legacy_done.succeed(legacy);

    let (modern, modern_done) = tasks.recv().await.expect("modern task");
    let request = modern.request.as_ref().expect("request present");
    assert_eq!(request.query.as_ref().expect("query")["limit"], "5");
    modern_done.succeed(modern);

    assert_eq!(client.recv().await["request"]["query"]["limit"], "10");
    assert_eq!(client.recv().await["request"]["query"]["limit"], "5");

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn completion_after_client_disconnect_reports_peer_closed() {
    let (handler, mut tasks) = holding_handler();
    let (mut server, addr) = start(loopback_config(), handler).await;
    let mut client = Client::connect(addr).await;

    client.send(json!({"taskId": "orphan"})).await;
    let (task, completion) = tasks.recv().await.expect("task dispatched");
    assert_eq!(completion.connection_state(), ConnectionState::Open);

    drop(client);
    wait_for_state(&completion, ConnectionState::PeerClosed).await;

    let outcome = completion.succeed(task);
    assert_eq!(outcome, WriteOutcome::PeerClosed);
    assert_eq!(outcome.to_string(), "Connection ended by client.");

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn reset_connection_is_torn_down_alone() {
    let (handler, mut tasks) = holding_handler();
    let (mut server, addr) = start(loopback_config(), handler).await;

    let mut reset = TcpStream::connect(addr).await.expect("client should connect");
    reset
        .set_linger(Some(Duration::ZERO))
        .expect("SO_LINGER should be settable");
    reset
        .write_all(b"{\"taskId\":\"in-flight\"}\n")
        .await
        .expect("client write should succeed");
    let (task, completion) = tasks.recv().await.expect("task dispatched");

    // Zero linger turns the close into a reset.
    drop(reset);
    let deadline = Instant::now() + REPLY_TIMEOUT;
    while completion.connection_state() == ConnectionState::Open {
        assert!(Instant::now() < deadline, "reset was never noticed");
        sleep(Duration::from_millis(10)).await;
    }

    let outcome = completion.succeed(task);
    assert!(
        matches!(outcome, WriteOutcome::ConnectionLost | WriteOutcome::PeerClosed),
        "{outcome:?}"
    );

    let mut other = Client::connect(addr).await;
    other.send(json!({"taskId": "survivor"})).await;
    let (task, completion) = tasks.recv().await.expect("second task dispatched");
    assert_eq!(completion.succeed(task), WriteOutcome::Written);
    assert_eq!(other.recv().await["taskId"], "survivor");

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn dropped_completion_does_not_block_later_replies() {
    let (handler, mut tasks) = holding_handler();
    let (mut server, addr) = start(loopback_config(), handler).await;
    let mut client = Client::connect(addr).await;

    client.send(json!({"taskId": "skipped"})).await;
    client.send(json!({"taskId": "kept"})).await;

    let (_, skipped) = tasks.recv().await.expect("first task");
    let (kept, kept_done) = tasks.recv().await.expect("second task");
    assert_eq!(kept_done.succeed(kept), WriteOutcome::Written);
    client.expect_no_reply(Duration::from_millis(100)).await;

    drop(skipped);
    assert_eq!(client.recv().await["taskId"], "kept");

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn pending_reply_limit_pauses_reading() {
    let config = ServerConfig {
        max_pending_replies: 2,
        ..loopback_config()
    };
    let (handler, mut tasks) = holding_handler();
    let (mut server, addr) = start(config, handler).await;
    let mut client = Client::connect(addr).await;

    for id in ["a", "b", "c"] {
        client.send(json!({"taskId": id})).await;
    }

    let (a, a_done) = tasks.recv().await.expect("first task");
    let (b, b_done) = tasks.recv().await.expect("second task");
    sleep(Duration::from_millis(200)).await;
    assert!(tasks.try_recv().is_err(), "third task read past the limit");

    a_done.succeed(a);
    assert_eq!(client.recv().await["taskId"], "a");
    let (c, c_done) = timeout(REPLY_TIMEOUT, tasks.recv())
        .await
        .expect("third task after a slot frees")
        .expect("handler channel open");

    b_done.succeed(b);
    c_done.succeed(c);
    assert_eq!(client.recv().await["taskId"], "b");
    assert_eq!(client.recv().await["taskId"], "c");

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn oversized_frame_closes_only_that_connection() {
    let config = ServerConfig {
        frame: FrameConfig {
            max_frame_size: 64,
            ..FrameConfig::default()
        },
        ..loopback_config()
    };
    let (mut server, addr) = start(config, echo_handler()).await;
    let mut offender = Client::connect(addr).await;
    let mut bystander = Client::connect(addr).await;

    offender.send_raw(&"x".repeat(256)).await;
    offender.expect_closed().await;

    bystander.send(json!({"taskId": "fine"})).await;
    assert_eq!(bystander.recv().await["taskId"], "fine");

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn serves_many_connections_concurrently() {
    let (mut server, addr) = start(loopback_config(), echo_handler()).await;

    let mut clients = tokio::task::JoinSet::new();
    for i in 0..50 {
        clients.spawn(async move {
            let mut client = Client::connect(addr).await;
            let id = format!("conn-{i}");
            client.send(json!({"taskId": id, "taskType": "data"})).await;
            let reply = client.recv().await;
            assert_eq!(reply["taskId"], id.as_str());
        });
    }
    while let Some(joined) = clients.join_next().await {
        joined.expect("client task should succeed");
    }

    server.stop().await.expect("server should stop");
}

#[tokio::test]
async fn stop_closes_open_connections() {
    let (handler, mut tasks) = holding_handler();
    let (mut server, addr) = start(loopback_config(), handler).await;
    let mut client = Client::connect(addr).await;

    client.send(json!({"taskId": "inflight"})).await;
    let (task, completion) = tasks.recv().await.expect("task dispatched");

    server.stop().await.expect("server should stop");
    assert!(!server.is_running());
    client.expect_closed().await;

    assert_eq!(completion.succeed(task), WriteOutcome::ConnectionLost);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn start_twice_and_stop_twice_are_rejected() {
    let mut server = TaskServer::new(loopback_config());
    server.start(echo_handler()).await.expect("first start");
    assert!(matches!(
        server.start(echo_handler()).await,
        Err(taskrelay_server::ServerError::AlreadyRunning)
    ));

    server.stop().await.expect("first stop");
    assert!(matches!(
        server.stop().await,
        Err(taskrelay_server::ServerError::NotRunning)
    ));
}
