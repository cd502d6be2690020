use std::net::SocketAddr;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use imprint::network::{RequestHeader, ResponseHeader, StatusCode, RESPONSE_HEADER_SIZE};
use imprint::processor::{CaptionStamp, TransformError, Transformer, WorkerPool, STAMP_MARKER};
use imprint::service::setup_local_tracing;
use imprint::{Client, Server, ServerConfig};
use parking_lot::Mutex;
use rstest::{fixture, rstest};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time;

#[fixture]
fn setup() {
    setup_local_tracing().expect("failed to setup tracing");
}

struct Failing;

impl Transformer for Failing {
    fn transform(&self, _caption: &[u8], _image: Bytes) -> Result<Bytes, TransformError> {
        Err(TransformError::Failed("unsupported image".to_string()))
    }
}

struct TestServer {
    addr: SocketAddr,
    pool: Arc<WorkerPool>,
    // keeps the shutdown channels open for the lifetime of the test
    _notify_shutdown: broadcast::Sender<()>,
    _shutdown_complete_rx: mpsc::Receiver<()>,
}

async fn start_server(
    config: ServerConfig,
    capacity: usize,
    workers: usize,
    transformer: Arc<dyn Transformer>,
) -> TestServer {
    let (notify_shutdown, _) = broadcast::channel(1);
    let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel(1);
    let pool = Arc::new(WorkerPool::new(
        capacity,
        workers,
        transformer,
        notify_shutdown.clone(),
        shutdown_complete_tx.clone(),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Server::new(listener, &config, pool.clone(), shutdown_complete_tx);
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    TestServer {
        addr,
        pool,
        _notify_shutdown: notify_shutdown,
        _shutdown_complete_rx: shutdown_complete_rx,
    }
}

async fn stamping_server() -> TestServer {
    start_server(ServerConfig::default(), 16, 2, Arc::new(CaptionStamp)).await
}

async fn read_response_header(stream: &mut TcpStream) -> ResponseHeader {
    let mut header = [0u8; RESPONSE_HEADER_SIZE];
    time::timeout(Duration::from_secs(5), stream.read_exact(&mut header))
        .await
        .unwrap()
        .unwrap();
    ResponseHeader::read_from(&mut &header[..]).unwrap()
}

async fn assert_closed(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    let read = time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, 0);
}

fn request_header(caption_size: u32, image_size: u32) -> BytesMut {
    let mut buffer = BytesMut::new();
    RequestHeader::new(caption_size, image_size).write_to(&mut buffer);
    buffer
}

#[rstest]
#[tokio::test]
async fn test_round_trip_stamps_caption(_setup: ()) {
    let server = stamping_server().await;
    let image: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

    let response = Client::connect(server.addr)
        .await
        .unwrap()
        .request(b"hello", &image)
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::Ok);
    assert!(response.image.starts_with(&image));
    let trailer = &response.image[image.len()..];
    assert!(trailer.starts_with(STAMP_MARKER));
    assert!(trailer.ends_with(b"hello"));
}

#[rstest]
#[tokio::test]
async fn test_empty_caption_returns_image(_setup: ()) {
    let server = stamping_server().await;

    let response = Client::connect(server.addr)
        .await
        .unwrap()
        .request(b"", &[7, 7, 7])
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(&response.image[..], &[7, 7, 7]);
}

#[rstest]
#[tokio::test]
async fn test_caption_over_limit(_setup: ()) {
    let server = stamping_server().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    // the server answers after the header alone
    stream.write_all(&request_header(513, 4)).await.unwrap();

    let header = read_response_header(&mut stream).await;
    assert_eq!(header, ResponseHeader::status_only(StatusCode::Limit));
    assert_closed(&mut stream).await;
}

#[rstest]
#[tokio::test]
async fn test_configured_image_limit(_setup: ()) {
    let mut config = ServerConfig::default();
    config.limits.max_image_size = 16;
    let server = start_server(config, 4, 1, Arc::new(CaptionStamp)).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(&request_header(0, 17)).await.unwrap();
    let header = read_response_header(&mut stream).await;
    assert_eq!(header.status, StatusCode::Limit);

    // exactly at the limit is served
    let response = Client::connect(server.addr)
        .await
        .unwrap()
        .request(b"", &[1u8; 16])
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::Ok);
}

#[rstest]
#[tokio::test]
async fn test_busy_when_queue_is_full(_setup: ()) {
    // no workers: the single queue slot stays taken
    let server = start_server(ServerConfig::default(), 1, 0, Arc::new(CaptionStamp)).await;

    let mut first = TcpStream::connect(server.addr).await.unwrap();
    first.write_all(&request_header(0, 2)).await.unwrap();
    first.write_all(&[1, 2]).await.unwrap();

    time::timeout(Duration::from_secs(5), async {
        while server.pool.queued() < 1 {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let response = Client::connect(server.addr)
        .await
        .unwrap()
        .request(b"caption", &[3, 4])
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::Busy);
    assert!(response.image.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_truncated_request_gets_one_error(_setup: ()) {
    let server = stamping_server().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    stream.write_all(&request_header(0, 10)).await.unwrap();
    stream.write_all(&[1, 2, 3]).await.unwrap();
    stream.shutdown().await.unwrap();

    let header = read_response_header(&mut stream).await;
    assert_eq!(header, ResponseHeader::status_only(StatusCode::Error));
    assert_closed(&mut stream).await;
}

#[rstest]
#[tokio::test]
async fn test_failed_transformation_gets_error(_setup: ()) {
    let server = start_server(ServerConfig::default(), 4, 1, Arc::new(Failing)).await;

    let response = Client::connect(server.addr)
        .await
        .unwrap()
        .request(b"x", &[1, 2, 3])
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::Error);
    assert!(response.image.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_idle_connection_is_closed(_setup: ()) {
    let mut config = ServerConfig::default();
    config.network.io_timeout = 1;
    let server = start_server(config, 4, 1, Arc::new(CaptionStamp)).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    // a timed out connection is closed without a response
    assert_closed(&mut stream).await;
}

/// Reports each transformation it starts, then holds it until the test
/// opens the gate.
struct Gate {
    started: mpsc::UnboundedSender<()>,
    release: Mutex<std_mpsc::Receiver<()>>,
}

impl Transformer for Gate {
    fn transform(&self, _caption: &[u8], image: Bytes) -> Result<Bytes, TransformError> {
        let _ = self.started.send(());
        let _ = self.release.lock().recv();
        Ok(image)
    }
}

async fn wait_for_queued(pool: &WorkerPool, expected: usize) {
    time::timeout(Duration::from_secs(5), async {
        while pool.queued() != expected {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[rstest]
#[tokio::test]
async fn test_shutdown_answers_queued_request_with_error(_setup: ()) {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = std_mpsc::channel();
    let gate = Gate {
        started: started_tx,
        release: Mutex::new(release_rx),
    };
    let server = start_server(ServerConfig::default(), 4, 1, Arc::new(gate)).await;

    // the only worker picks this one up and blocks
    let mut running = TcpStream::connect(server.addr).await.unwrap();
    running.write_all(&request_header(0, 2)).await.unwrap();
    running.write_all(&[1, 2]).await.unwrap();
    time::timeout(Duration::from_secs(5), started_rx.recv())
        .await
        .unwrap()
        .unwrap();

    let mut queued = TcpStream::connect(server.addr).await.unwrap();
    queued.write_all(&request_header(0, 2)).await.unwrap();
    queued.write_all(&[3, 4]).await.unwrap();
    wait_for_queued(&server.pool, 1).await;

    server.pool.shutdown();
    release_tx.send(()).unwrap();

    let header = read_response_header(&mut queued).await;
    assert_eq!(header, ResponseHeader::status_only(StatusCode::Error));
    assert_closed(&mut queued).await;

    // the request already running still gets its result
    let header = read_response_header(&mut running).await;
    assert_eq!(header, ResponseHeader::ok(2));
}

#[rstest]
#[tokio::test]
async fn test_concurrent_clients(_setup: ()) {
    let server = stamping_server().await;

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let addr = server.addr;
        handles.push(tokio::spawn(async move {
            let caption = format!("client-{}", i);
            let response = Client::connect(addr)
                .await
                .unwrap()
                .request(caption.as_bytes(), &[i; 32])
                .await
                .unwrap();
            assert_eq!(response.status, StatusCode::Ok);
            assert!(response.image.starts_with(&[i; 32]));
            assert!(response.image.ends_with(caption.as_bytes()));
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}
