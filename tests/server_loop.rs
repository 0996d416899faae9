//! End-to-end serve loop tests over a channel-backed mock transport
//!
//! The mock link feeds scripted byte runs (or I/O errors) into the engine
//! and captures every reply frame it writes, so the full
//! receive → assemble → validate → dispatch → reply cycle is exercised
//! without a serial device.

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rtusrv::frame::encode_adu;
use rtusrv::{
    ConnectionState, PortOpener, Result as RtuResult, RtuError, RtuLink, RtuServer, ServerConfig,
};

/// Bytes flow in via `rx`, reply frames are captured via `tx`
struct MockLink {
    rx: mpsc::UnboundedReceiver<io::Result<Vec<u8>>>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl RtuLink for MockLink {
    async fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.rx.recv().await {
            Some(Ok(data)) => {
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            },
            Some(Err(e)) => Err(e),
            // Script exhausted: behave like a silent line
            None => std::future::pending().await,
        }
    }

    async fn write_all_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        let _ = self.tx.send(data.to_vec());
        Ok(())
    }
}

struct MockOpener {
    links: Mutex<VecDeque<MockLink>>,
}

impl MockOpener {
    fn new(links: Vec<MockLink>) -> Self {
        Self {
            links: Mutex::new(links.into_iter().collect()),
        }
    }
}

#[async_trait]
impl PortOpener for MockOpener {
    type Link = MockLink;

    async fn open(&self) -> RtuResult<MockLink> {
        self.links
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RtuError::transport("no link available"))
    }
}

type LinkInput = mpsc::UnboundedSender<io::Result<Vec<u8>>>;
type LinkOutput = mpsc::UnboundedReceiver<Vec<u8>>;

fn mock_link() -> (MockLink, LinkInput, LinkOutput) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    (
        MockLink {
            rx: in_rx,
            tx: out_tx,
        },
        in_tx,
        out_rx,
    )
}

fn test_config() -> ServerConfig {
    ServerConfig {
        read_timeout_ms: 50,
        reconnect_interval_ms: 10,
        ..Default::default()
    }
}

async fn expect_reply(out_rx: &mut LinkOutput) -> Vec<u8> {
    tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
        .await
        .expect("timed out waiting for reply")
        .expect("reply channel closed")
}

async fn expect_no_reply(out_rx: &mut LinkOutput) {
    let outcome = tokio::time::timeout(Duration::from_millis(100), out_rx.recv()).await;
    assert!(outcome.is_err(), "unexpected reply: {:?}", outcome);
}

#[tokio::test]
async fn test_read_holding_registers_end_to_end() {
    let (link, in_tx, mut out_rx) = mock_link();
    let mut server = RtuServer::new(test_config(), MockOpener::new(vec![link]));
    server.store_mut().set_holding_register(0, 1234).unwrap();
    server.connect().await.unwrap();

    in_tx
        .send(Ok(encode_adu(1, &[0x03, 0x00, 0x00, 0x00, 0x01])))
        .unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let task = tokio::spawn(async move {
        server.serve(stop).await;
        server
    });

    let reply = expect_reply(&mut out_rx).await;
    assert_eq!(reply, encode_adu(1, &[0x03, 0x02, 0x04, 0xD2]));

    cancel.cancel();
    let server = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("serve loop did not stop")
        .unwrap();

    let stats = server.stats();
    assert_eq!(stats.frames_received, 1);
    assert_eq!(stats.replies_sent, 1);
    assert_eq!(stats.exception_replies, 0);
    assert_eq!(stats.crc_errors, 0);
}

#[tokio::test]
async fn test_write_then_read_coil_cycle() {
    let (link, in_tx, mut out_rx) = mock_link();
    let mut server = RtuServer::new(test_config(), MockOpener::new(vec![link]));
    server.connect().await.unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let task = tokio::spawn(async move {
        server.serve(stop).await;
        server
    });

    // Switch coil 0 on, then read it back in a second request
    let write = encode_adu(1, &[0x05, 0x00, 0x00, 0xFF, 0x00]);
    in_tx.send(Ok(write.clone())).unwrap();
    assert_eq!(expect_reply(&mut out_rx).await, write);

    in_tx
        .send(Ok(encode_adu(1, &[0x01, 0x00, 0x00, 0x00, 0x01])))
        .unwrap();
    assert_eq!(
        expect_reply(&mut out_rx).await,
        encode_adu(1, &[0x01, 0x01, 0x01])
    );

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_corrupted_crc_gets_no_reply() {
    let (link, in_tx, mut out_rx) = mock_link();
    let mut server = RtuServer::new(test_config(), MockOpener::new(vec![link]));
    server.connect().await.unwrap();

    let mut corrupted = encode_adu(1, &[0x03, 0x00, 0x00, 0x00, 0x01]);
    let len = corrupted.len();
    corrupted[len - 1] ^= 0xFF;
    in_tx.send(Ok(corrupted)).unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let task = tokio::spawn(async move {
        server.serve(stop).await;
        server
    });

    expect_no_reply(&mut out_rx).await;

    cancel.cancel();
    let server = task.await.unwrap();
    let stats = server.stats();
    assert_eq!(stats.crc_errors, 1);
    assert_eq!(stats.replies_sent, 0);
    // The corrupted request must not have touched the store
    assert_eq!(server.store().holding_register(0).unwrap(), 0);
}

#[tokio::test]
async fn test_frame_for_other_slave_is_ignored() {
    let (link, in_tx, mut out_rx) = mock_link();
    let mut server = RtuServer::new(test_config(), MockOpener::new(vec![link]));
    server.connect().await.unwrap();

    in_tx
        .send(Ok(encode_adu(2, &[0x05, 0x00, 0x00, 0xFF, 0x00])))
        .unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let task = tokio::spawn(async move {
        server.serve(stop).await;
        server
    });

    expect_no_reply(&mut out_rx).await;

    cancel.cancel();
    let server = task.await.unwrap();
    let stats = server.stats();
    assert_eq!(stats.dropped_frames, 1);
    assert_eq!(stats.replies_sent, 0);
    assert!(!server.store().coil(0).unwrap());
}

#[tokio::test]
async fn test_unsupported_function_code_is_answered_with_exception() {
    let (link, in_tx, mut out_rx) = mock_link();
    let mut server = RtuServer::new(test_config(), MockOpener::new(vec![link]));
    server.connect().await.unwrap();

    in_tx
        .send(Ok(encode_adu(1, &[0x99, 0x00, 0x00])))
        .unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let task = tokio::spawn(async move {
        server.serve(stop).await;
        server
    });

    let reply = expect_reply(&mut out_rx).await;
    assert_eq!(reply, encode_adu(1, &[0x99 | 0x80, 0x01]));

    cancel.cancel();
    let server = task.await.unwrap();
    assert_eq!(server.stats().exception_replies, 1);
}

#[tokio::test]
async fn test_noise_burst_is_discarded() {
    let (link, in_tx, mut out_rx) = mock_link();
    let mut server = RtuServer::new(test_config(), MockOpener::new(vec![link]));
    server.connect().await.unwrap();

    // Two bytes of line noise, then silence
    in_tx.send(Ok(vec![0xFF, 0x13])).unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let task = tokio::spawn(async move {
        server.serve(stop).await;
        server
    });

    expect_no_reply(&mut out_rx).await;

    cancel.cancel();
    let server = task.await.unwrap();
    let stats = server.stats();
    assert_eq!(stats.frames_received, 0);
    assert_eq!(stats.replies_sent, 0);
}

#[tokio::test]
async fn test_transport_failure_recovers_onto_new_link() {
    let (first, first_tx, _first_out) = mock_link();
    let (second, second_tx, mut second_out) = mock_link();
    let mut server = RtuServer::new(test_config(), MockOpener::new(vec![first, second]));
    server.store_mut().set_input_register(0, 42).unwrap();
    server.connect().await.unwrap();
    assert_eq!(server.connection_state(), ConnectionState::Connected);

    // The live link dies mid-receive
    first_tx
        .send(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")))
        .unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let task = tokio::spawn(async move {
        server.serve(stop).await;
        server
    });

    // After recovery the server answers requests arriving on the new link
    second_tx
        .send(Ok(encode_adu(1, &[0x04, 0x00, 0x00, 0x00, 0x01])))
        .unwrap();
    let reply = expect_reply(&mut second_out).await;
    assert_eq!(reply, encode_adu(1, &[0x04, 0x02, 0x00, 0x2A]));

    cancel.cancel();
    let server = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("serve loop did not stop")
        .unwrap();

    assert_eq!(server.connection_state(), ConnectionState::Connected);
    assert_eq!(server.stats().reconnects, 1);
}

#[tokio::test]
async fn test_identical_requests_yield_identical_replies() {
    let (link, in_tx, mut out_rx) = mock_link();
    let mut server = RtuServer::new(test_config(), MockOpener::new(vec![link]));
    server.store_mut().set_input_register(7, 0x1234).unwrap();
    server.connect().await.unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let task = tokio::spawn(async move {
        server.serve(stop).await;
        server
    });

    let request = encode_adu(1, &[0x04, 0x00, 0x00, 0x00, 0x0A]);
    in_tx.send(Ok(request.clone())).unwrap();
    let first = expect_reply(&mut out_rx).await;

    in_tx.send(Ok(request)).unwrap();
    let second = expect_reply(&mut out_rx).await;

    assert_eq!(first, second);

    cancel.cancel();
    task.await.unwrap();
}
