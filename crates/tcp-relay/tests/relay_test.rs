//! End-to-end tests: a real client, the relay, and a local upstream on
//! loopback sockets.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use session_log::{EventKind, LogLevel, LogRecord, LogSink, SessionLogger};
use smtp_inspect::{LineInspector, Observation};
use tcp_relay::{
    Acceptor, ChunkInspector, Direction, Relay, RelayConfig, SessionId, SessionIdError,
    SessionIdSource, DEFAULT_CHUNK_SIZE,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);

struct Options {
    session_ids: SessionIdSource,
    /// Accept calls that fail before the real listener is consulted.
    accept_failures: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            session_ids: SessionId::generate,
            accept_failures: 0,
        }
    }
}

/// Fails the first `remaining` accepts, then defers to a real listener.
struct FailingFirst {
    inner: TcpListener,
    remaining: AtomicUsize,
}

impl Acceptor for FailingFirst {
    fn accept(
        &self,
    ) -> Pin<Box<dyn Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send + '_>> {
        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Box::pin(std::future::ready(Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection aborted before accept",
            ))));
        }
        Acceptor::accept(&self.inner)
    }
}

struct Harness {
    relay_addr: SocketAddr,
    logger: SessionLogger,
    log_path: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl Harness {
    async fn start(upstream_addr: String, inspector: Arc<dyn ChunkInspector>) -> Self {
        Self::start_with(upstream_addr, inspector, Options::default()).await
    }

    async fn start_with(
        upstream_addr: String,
        inspector: Arc<dyn ChunkInspector>,
        options: Options,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("smtp-proxy.log");
        let (sink, _writer) = LogSink::start(&log_path).await.unwrap();
        let logger = SessionLogger::new(sink, false);

        let relay = Relay::new(RelayConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            upstream_addr,
            chunk_size: DEFAULT_CHUNK_SIZE,
            inspector,
            logger: logger.clone(),
            session_ids: options.session_ids,
        });
        let listener = relay.bind().await.unwrap();
        let relay_addr = listener.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if options.accept_failures == 0 {
                relay.serve(listener, shutdown).await;
            } else {
                let flaky = FailingFirst {
                    inner: listener,
                    remaining: AtomicUsize::new(options.accept_failures),
                };
                relay.serve(flaky, shutdown).await;
            }
        });

        Self {
            relay_addr,
            logger,
            log_path,
            shutdown: Some(tx),
            server,
            _dir: dir,
        }
    }

    async fn records(&self) -> Vec<LogRecord> {
        self.logger.flush().await;
        read_records(&self.log_path)
    }

    /// Poll the log until `count` records of `event` are present.
    async fn wait_for(&self, event: EventKind, count: usize) -> Vec<LogRecord> {
        tokio::time::timeout(WAIT, async {
            loop {
                let records = self.records().await;
                if records.iter().filter(|r| r.event == event).count() >= count {
                    return records;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {count} {event:?} record(s)"))
    }
}

fn read_records(path: &Path) -> Vec<LogRecord> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn line_inspector() -> Arc<dyn ChunkInspector> {
    Arc::new(LineInspector::new().unwrap())
}

async fn upstream_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

async fn read_exact_within(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(WAIT, stream.read_exact(&mut buf))
        .await
        .expect("timed out reading")
        .unwrap();
    buf
}

/// Read until EOF or error; returns true if the stream ended within `WAIT`.
async fn closes_within(stream: &mut TcpStream) -> bool {
    let mut sink = Vec::new();
    tokio::time::timeout(WAIT, async {
        loop {
            let mut buf = [0u8; 1024];
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => sink.extend_from_slice(&buf[..n]),
            }
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn mail_from_is_logged_and_forwarded_verbatim() {
    let (upstream, upstream_addr) = upstream_listener().await;
    let harness = Harness::start(upstream_addr, line_inspector()).await;

    let mut client = TcpStream::connect(harness.relay_addr).await.unwrap();
    let (mut server, _) = upstream.accept().await.unwrap();

    let command = b"MAIL FROM:<a@example.com>\r\n";
    client.write_all(command).await.unwrap();
    let received = read_exact_within(&mut server, command.len()).await;
    assert_eq!(received, command);

    let records = harness.wait_for(EventKind::CommandObserved, 1).await;
    let observed: Vec<_> = records
        .iter()
        .filter(|r| r.event == EventKind::CommandObserved)
        .collect();
    assert_eq!(observed.len(), 1);
    assert!(observed[0].message.contains("<a@example.com>"));
    assert_eq!(
        observed[0].direction.as_deref(),
        Some(Direction::ClientToUpstream.to_string().as_str())
    );

    let opened = records
        .iter()
        .find(|r| r.event == EventKind::SessionOpened)
        .expect("session opened record");
    assert_eq!(opened.session_id, observed[0].session_id);
}

#[tokio::test]
async fn long_sender_line_is_observed_whole() {
    let (upstream, upstream_addr) = upstream_listener().await;
    let harness = Harness::start(upstream_addr, line_inspector()).await;

    let mut client = TcpStream::connect(harness.relay_addr).await.unwrap();
    let (mut server, _) = upstream.accept().await.unwrap();

    let sender = format!("<{}@example.com>", "a".repeat(400));
    let line = format!("MAIL FROM:{sender} SIZE=1024\r\n");
    assert!(line.len() > 64 && line.len() <= DEFAULT_CHUNK_SIZE);

    client.write_all(line.as_bytes()).await.unwrap();
    assert_eq!(
        read_exact_within(&mut server, line.len()).await,
        line.as_bytes()
    );

    let records = harness.wait_for(EventKind::CommandObserved, 1).await;
    let observed = records
        .iter()
        .find(|r| r.event == EventKind::CommandObserved)
        .unwrap();
    assert!(observed.message.contains(&sender), "{}", observed.message);
    assert!(observed.message.ends_with("SIZE=1024"));
}

#[tokio::test]
async fn relays_arbitrary_bytes_in_both_directions() {
    let (upstream, upstream_addr) = upstream_listener().await;
    let harness = Harness::start(upstream_addr, line_inspector()).await;

    let mut client = TcpStream::connect(harness.relay_addr).await.unwrap();
    let (mut server, _) = upstream.accept().await.unwrap();

    // Larger than a chunk and covering every byte value.
    let upload: Vec<u8> = (0..64 * 1024).map(|i| (i * 7 % 256) as u8).collect();
    let download: Vec<u8> = (0..48 * 1024).map(|i| (255 - i % 256) as u8).collect();

    let up = upload.clone();
    let writer = tokio::spawn(async move {
        client.write_all(&up).await.unwrap();
        client
    });
    assert_eq!(read_exact_within(&mut server, upload.len()).await, upload);
    let mut client = writer.await.unwrap();

    server.write_all(&download).await.unwrap();
    assert_eq!(read_exact_within(&mut client, download.len()).await, download);
}

#[tokio::test]
async fn server_greeting_reaches_client_before_client_speaks() {
    let (upstream, upstream_addr) = upstream_listener().await;
    let harness = Harness::start(upstream_addr, line_inspector()).await;

    let mut client = TcpStream::connect(harness.relay_addr).await.unwrap();
    let (mut server, _) = upstream.accept().await.unwrap();

    let greeting = b"220 mx.example.com ESMTP\r\n";
    server.write_all(greeting).await.unwrap();
    assert_eq!(read_exact_within(&mut client, greeting.len()).await, greeting);

    client.write_all(b"EHLO client.example.com\r\n").await.unwrap();
    assert_eq!(
        read_exact_within(&mut server, 25).await,
        b"EHLO client.example.com\r\n"
    );
}

#[tokio::test]
async fn client_eof_closes_upstream_silently() {
    let (upstream, upstream_addr) = upstream_listener().await;
    let harness = Harness::start(upstream_addr, line_inspector()).await;

    let mut client = TcpStream::connect(harness.relay_addr).await.unwrap();
    let (mut server, _) = upstream.accept().await.unwrap();

    client.write_all(b"QUIT\r\n").await.unwrap();
    assert_eq!(read_exact_within(&mut server, 6).await, b"QUIT\r\n");
    client.shutdown().await.unwrap();

    assert!(closes_within(&mut server).await, "upstream side was not closed");

    let records = harness.wait_for(EventKind::SessionClosed, 1).await;
    assert!(
        records.iter().all(|r| r.level != LogLevel::Error),
        "clean EOF must not produce error records: {records:?}"
    );
}

#[tokio::test]
async fn upstream_close_closes_client() {
    let (upstream, upstream_addr) = upstream_listener().await;
    let harness = Harness::start(upstream_addr.clone(), line_inspector()).await;

    let mut client = TcpStream::connect(harness.relay_addr).await.unwrap();
    let (server, _) = upstream.accept().await.unwrap();
    drop(server);

    assert!(closes_within(&mut client).await, "client side was not closed");
    let records = harness.wait_for(EventKind::SessionClosed, 1).await;
    let closed = records
        .iter()
        .find(|r| r.event == EventKind::SessionClosed)
        .unwrap();
    assert_eq!(closed.details["upstream_addr"], upstream_addr.as_str());
}

#[tokio::test]
async fn dial_failure_aborts_only_that_session() {
    // Reserve a port, then free it so nothing listens there.
    let (reserved, dead_addr) = upstream_listener().await;
    drop(reserved);

    let harness = Harness::start(dead_addr, line_inspector()).await;

    for _ in 0..2 {
        let mut client = TcpStream::connect(harness.relay_addr).await.unwrap();
        assert!(closes_within(&mut client).await, "client was not closed");
    }

    let records = harness.wait_for(EventKind::SessionAborted, 2).await;
    assert!(records
        .iter()
        .filter(|r| r.event == EventKind::SessionAborted)
        .all(|r| r.level == LogLevel::Error && r.message.contains("error dialing upstream")));
    assert!(!records.iter().any(|r| r.event == EventKind::UpstreamConnected));
}

fn entropy_unavailable() -> Result<SessionId, SessionIdError> {
    Err(SessionIdError::Entropy(rand::Error::new(io::Error::new(
        io::ErrorKind::Other,
        "entropy pool unavailable",
    ))))
}

#[tokio::test]
async fn id_failure_aborts_session_without_dialing() {
    let (upstream, upstream_addr) = upstream_listener().await;
    let options = Options {
        session_ids: entropy_unavailable,
        ..Options::default()
    };
    let harness = Harness::start_with(upstream_addr, line_inspector(), options).await;

    let mut client = TcpStream::connect(harness.relay_addr).await.unwrap();
    assert!(closes_within(&mut client).await, "client was not closed");

    let records = harness.wait_for(EventKind::SessionAborted, 1).await;
    let aborted = records
        .iter()
        .find(|r| r.event == EventKind::SessionAborted)
        .unwrap();
    assert_eq!(aborted.level, LogLevel::Error);
    assert!(aborted.message.contains("unable to generate session id"));
    assert!(aborted.session_id.is_none());
    assert!(!records.iter().any(|r| r.event == EventKind::SessionOpened));

    let dialed = tokio::time::timeout(Duration::from_millis(200), upstream.accept()).await;
    assert!(dialed.is_err(), "upstream was dialed without a session id");
}

#[tokio::test]
async fn accept_errors_are_logged_and_skipped() {
    let (upstream, upstream_addr) = upstream_listener().await;
    let options = Options {
        accept_failures: 2,
        ..Options::default()
    };
    let harness = Harness::start_with(upstream_addr, line_inspector(), options).await;

    let mut client = TcpStream::connect(harness.relay_addr).await.unwrap();
    let (mut server, _) = upstream.accept().await.unwrap();
    client.write_all(b"EHLO client\r\n").await.unwrap();
    assert_eq!(read_exact_within(&mut server, 13).await, b"EHLO client\r\n");

    let records = harness.wait_for(EventKind::AcceptFailed, 2).await;
    let failed: Vec<_> = records
        .iter()
        .filter(|r| r.event == EventKind::AcceptFailed)
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed
        .iter()
        .all(|r| r.level == LogLevel::Error && r.message.contains("connection aborted")));
    assert!(records.iter().any(|r| r.event == EventKind::SessionOpened));
}

/// Panics whenever a chunk contains `BOOM`.
struct TripwireInspector {
    inner: LineInspector,
}

impl ChunkInspector for TripwireInspector {
    fn inspect(&self, chunk: &[u8], direction: Direction) -> Option<Observation> {
        if chunk.windows(4).any(|w| w == b"BOOM") {
            panic!("tripwire hit");
        }
        ChunkInspector::inspect(&self.inner, chunk, direction)
    }
}

#[tokio::test]
async fn fault_in_one_session_leaves_others_running() {
    let (upstream, upstream_addr) = upstream_listener().await;
    let inspector = Arc::new(TripwireInspector {
        inner: LineInspector::new().unwrap(),
    });
    let harness = Harness::start(upstream_addr, inspector).await;

    let mut healthy = TcpStream::connect(harness.relay_addr).await.unwrap();
    let (mut healthy_server, _) = upstream.accept().await.unwrap();
    let mut faulty = TcpStream::connect(harness.relay_addr).await.unwrap();
    let (mut faulty_server, _) = upstream.accept().await.unwrap();

    faulty.write_all(b"BOOM\r\n").await.unwrap();
    assert!(closes_within(&mut faulty).await, "faulty client not closed");
    assert!(closes_within(&mut faulty_server).await, "faulty upstream not closed");

    healthy.write_all(b"RCPT TO:<b@example.org>\r\n").await.unwrap();
    assert_eq!(
        read_exact_within(&mut healthy_server, 25).await,
        b"RCPT TO:<b@example.org>\r\n"
    );
    healthy_server.write_all(b"250 OK\r\n").await.unwrap();
    assert_eq!(read_exact_within(&mut healthy, 8).await, b"250 OK\r\n");

    let records = harness.wait_for(EventKind::PumpPanicked, 1).await;
    let panicked = records
        .iter()
        .find(|r| r.event == EventKind::PumpPanicked)
        .unwrap();
    assert!(panicked.message.contains("tripwire hit"));
    assert!(panicked.session_id.is_some());
}

#[tokio::test]
async fn shutdown_stops_accept_loop() {
    let (_upstream, upstream_addr) = upstream_listener().await;
    let mut harness = Harness::start(upstream_addr, line_inspector()).await;

    harness.shutdown.take().unwrap().send(()).unwrap();
    tokio::time::timeout(WAIT, &mut harness.server)
        .await
        .expect("serve did not return after shutdown")
        .unwrap();

    let records = harness.records().await;
    assert!(records.iter().any(|r| r.event == EventKind::Listening));
}
