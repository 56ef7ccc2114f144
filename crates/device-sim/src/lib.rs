//! In-process stand-in for the companion device.
//!
//! [`SimulatedDevice`] implements [`Transport`] and reproduces the firmware's
//! side of the protocol: it validates START, enforces chunk ordering,
//! acknowledges chunks and, on END, assembles the file and checks it against
//! the announced digest prefix. Status notifications are delivered to
//! subscribers synchronously from inside the write call that caused them.
//!
//! [`DeviceBehavior`] injects the faults real devices exhibit.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use talkbox_protocol::constants::{MAX_FILE_SIZE, chunk_size_for_mtu};
use talkbox_protocol::{
    ChunkFrame, FailureKind, RemoteFailure, StartFrame, StatusEvent, is_end_frame,
};
use talkbox_transfer::{
    BoxFuture, DeviceHandle, StatusHandler, Subscription, Transport, TransportError, digest_hex,
};
use tracing::{debug, info, warn};

/// Faults and firmware quirks to emulate.
#[derive(Debug, Clone, Default)]
pub struct DeviceBehavior {
    /// `connect` fails with [`TransportError::DeviceNotFound`].
    pub connect_fails: bool,
    /// Every START is answered with `start_error`.
    pub reject_start: bool,
    /// START is accepted but never acknowledged.
    pub silent_start: bool,
    /// The chunk with this sequence number is answered with `chunk_error`.
    pub fail_chunk_at: Option<u32>,
    /// Acknowledge with the legacy `{"event":"ack","seq":n}` form on even
    /// sequence numbers only, as older firmware does.
    pub legacy_acks: bool,
    /// One stored byte is flipped, so END yields `hash_mismatch`.
    pub corrupt_storage: bool,
    /// END is accepted but `stored` is never sent.
    pub silent_store: bool,
    /// `stored` is sent twice.
    pub duplicate_stored: bool,
    /// Removing a subscription reports an error (it is still removed).
    pub unsubscribe_fails: bool,
}

/// A file the device has committed to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub data: Vec<u8>,
    pub digest_hex: String,
}

/// Transfer the device is currently receiving.
struct Incoming {
    start: StartFrame,
    expected_seq: u32,
    data: Vec<u8>,
}

#[derive(Default)]
struct Subscribers {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, StatusHandler)>>,
}

impl Subscribers {
    fn lock(&self) -> MutexGuard<'_, Vec<(u64, StatusHandler)>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Emulated device reachable over an emulated link.
pub struct SimulatedDevice {
    name: String,
    mtu: u32,
    behavior: DeviceBehavior,
    connected: AtomicBool,
    subscribers: Arc<Subscribers>,
    incoming: Mutex<Option<Incoming>>,
    stored: Mutex<Vec<StoredFile>>,
    chunk_writes: AtomicU64,
}

impl SimulatedDevice {
    /// A well-behaved, disconnected device that negotiates `mtu`.
    pub fn new(name: impl Into<String>, mtu: u32) -> Self {
        Self::with_behavior(name, mtu, DeviceBehavior::default())
    }

    pub fn with_behavior(name: impl Into<String>, mtu: u32, behavior: DeviceBehavior) -> Self {
        Self {
            name: name.into(),
            mtu,
            behavior,
            connected: AtomicBool::new(false),
            subscribers: Arc::default(),
            incoming: Mutex::new(None),
            stored: Mutex::new(Vec::new()),
            chunk_writes: AtomicU64::new(0),
        }
    }

    /// Drops the link. Any transfer in progress is discarded.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.incoming_lock().take();
        info!(device = %self.name, "link dropped");
    }

    /// Files stored so far, oldest first.
    pub fn stored_files(&self) -> Vec<StoredFile> {
        self.stored.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of status subscriptions still registered.
    pub fn active_subscriptions(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Number of chunk frames received, valid or not.
    pub fn chunk_writes(&self) -> u64 {
        self.chunk_writes.load(Ordering::SeqCst)
    }

    /// Sends a raw notification to every subscriber.
    pub fn emit(&self, payload: &[u8]) {
        let handlers: Vec<StatusHandler> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(payload);
        }
    }

    fn notify(&self, event: StatusEvent) {
        debug!(event = event.tag(), "device notification");
        self.emit(&event.encode());
    }

    fn fail(&self, kind: FailureKind, msg: &str) {
        self.notify(StatusEvent::Failed(RemoteFailure {
            kind,
            message: Some(msg.to_string()),
        }));
    }

    fn incoming_lock(&self) -> MutexGuard<'_, Option<Incoming>> {
        self.incoming.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    /// Handles a write on the control characteristic (START or END).
    fn on_control_write(&self, raw: &[u8]) {
        if is_end_frame(raw) {
            self.on_end();
            return;
        }

        let start = match StartFrame::decode(raw) {
            Ok(start) => start,
            Err(e) => {
                warn!(error = %e, "rejecting malformed START");
                self.fail(FailureKind::StartError, "invalid frame");
                return;
            }
        };
        if self.behavior.reject_start {
            self.fail(FailureKind::StartError, "busy");
            return;
        }
        if start.total_size == 0 || start.total_size > MAX_FILE_SIZE {
            self.fail(FailureKind::StartError, "invalid size");
            return;
        }

        info!(
            chunks = start.total_chunks,
            size = start.total_size,
            chunk_size = start.chunk_size,
            "START accepted"
        );
        *self.incoming_lock() = Some(Incoming {
            start,
            expected_seq: 0,
            data: Vec::with_capacity(start.total_size as usize),
        });
        if !self.behavior.silent_start {
            self.notify(StatusEvent::StartAck);
        }
    }

    fn on_chunk_write(&self, raw: &[u8]) {
        self.chunk_writes.fetch_add(1, Ordering::SeqCst);
        let frame = match ChunkFrame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "rejecting malformed chunk");
                self.fail(FailureKind::ChunkError, "invalid frame");
                return;
            }
        };

        let ack = {
            let mut incoming = self.incoming_lock();
            match incoming.as_mut() {
                None => Err("no transfer"),
                Some(transfer)
                    if frame.seq != transfer.expected_seq
                        || self.behavior.fail_chunk_at == Some(frame.seq) =>
                {
                    warn!(seq = frame.seq, expected = transfer.expected_seq, "chunk rejected");
                    Err("seq mismatch")
                }
                Some(transfer) => {
                    transfer.data.extend_from_slice(frame.payload);
                    transfer.expected_seq += 1;
                    Ok(transfer.expected_seq)
                }
            }
        };

        let received_count = match ack {
            Ok(count) => count,
            Err(msg) => {
                self.fail(FailureKind::ChunkError, msg);
                return;
            }
        };
        if self.behavior.legacy_acks {
            if frame.seq % 2 == 0 {
                let legacy = serde_json::json!({ "event": "ack", "seq": frame.seq });
                self.emit(legacy.to_string().as_bytes());
            }
        } else {
            self.notify(StatusEvent::ChunkAck {
                seq: frame.seq,
                received_count,
            });
        }
    }

    fn on_end(&self) {
        let Some(mut transfer) = self.incoming_lock().take() else {
            self.fail(FailureKind::AssembleError, "no transfer");
            return;
        };

        if transfer.data.len() != transfer.start.total_size as usize {
            warn!(
                expected = transfer.start.total_size,
                got = transfer.data.len(),
                "assembled size mismatch"
            );
            self.fail(FailureKind::AssembleError, "size mismatch");
            return;
        }
        if self.behavior.corrupt_storage {
            if let Some(byte) = transfer.data.first_mut() {
                *byte ^= 0xff;
            }
        }

        let digest = digest_hex(&transfer.data);
        if !digest.starts_with(&transfer.start.digest_prefix_hex()) {
            warn!(digest = %digest, "digest prefix mismatch");
            self.notify(StatusEvent::Failed(RemoteFailure {
                kind: FailureKind::HashMismatch,
                message: None,
            }));
            return;
        }

        info!(bytes = transfer.data.len(), digest = %digest, "file stored");
        self.stored
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(StoredFile {
                data: transfer.data,
                digest_hex: digest.clone(),
            });

        if self.behavior.silent_store {
            return;
        }
        let stored = StatusEvent::Stored { digest_hex: digest };
        if self.behavior.duplicate_stored {
            self.notify(stored.clone());
        }
        self.notify(stored);
    }
}

impl Transport for SimulatedDevice {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connect(&self) -> BoxFuture<'_, Result<DeviceHandle, TransportError>> {
        Box::pin(async move {
            if self.behavior.connect_fails {
                return Err(TransportError::DeviceNotFound);
            }
            self.connected.store(true, Ordering::SeqCst);
            info!(device = %self.name, mtu = self.mtu, "link up");
            Ok(DeviceHandle {
                id: format!("sim-{}", self.name.to_lowercase()),
                name: self.name.clone(),
                mtu: self.mtu,
            })
        })
    }

    fn chunk_size(&self) -> u32 {
        chunk_size_for_mtu(self.mtu)
    }

    fn write_start<'a>(&'a self, frame: &'a [u8]) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            self.ensure_connected()?;
            self.on_control_write(frame);
            Ok(())
        })
    }

    fn write_chunk<'a>(&'a self, frame: &'a [u8]) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            self.ensure_connected()?;
            self.on_chunk_write(frame);
            Ok(())
        })
    }

    fn write_end<'a>(&'a self, frame: &'a [u8]) -> BoxFuture<'a, Result<(), TransportError>> {
        // END shares the control characteristic with START.
        self.write_start(frame)
    }

    fn subscribe_status(
        &self,
        handler: StatusHandler,
    ) -> Result<Box<dyn Subscription>, TransportError> {
        self.ensure_connected()?;
        let id = self.subscribers.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().push((id, handler));
        debug!(id, "status subscriber added");
        Ok(Box::new(SimSubscription {
            id,
            subscribers: Arc::clone(&self.subscribers),
            fail: self.behavior.unsubscribe_fails,
        }))
    }
}

struct SimSubscription {
    id: u64,
    subscribers: Arc<Subscribers>,
    fail: bool,
}

impl Subscription for SimSubscription {
    fn remove(&mut self) -> Result<(), TransportError> {
        self.subscribers.lock().retain(|(id, _)| *id != self.id);
        if self.fail {
            return Err(TransportError::Link("unsubscribe rejected".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use talkbox_transfer::{NoopObserver, SessionObserver, TransferError, TransferSession};
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    fn sample(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i * 7 % 256) as u8).collect()
    }

    async fn send(device: &SimulatedDevice, path: &Path) -> Result<String, TransferError> {
        let observer: Arc<dyn SessionObserver> = Arc::new(NoopObserver);
        TransferSession::new(device, path, observer)
            .run()
            .await
            .map(|report| report.stored_digest)
    }

    fn recorded(
        device: &SimulatedDevice,
    ) -> (Arc<Mutex<Vec<StatusEvent>>>, Box<dyn Subscription>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let handler: StatusHandler = Arc::new(move |raw: &[u8]| {
            sink.lock().unwrap().push(StatusEvent::decode(raw).unwrap());
        });
        let subscription = device.subscribe_status(handler).unwrap();
        (events, subscription)
    }

    #[tokio::test(start_paused = true)]
    async fn stores_file_and_reports_digest() {
        let dir = TempDir::new().unwrap();
        let data = sample(5000);
        let path = create_test_file(dir.path(), "tts_1.wav", &data);
        let device = SimulatedDevice::new("Talkbox", 247);

        let digest = send(&device, &path).await.unwrap();

        let stored = device.stored_files();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].data, data);
        assert_eq!(digest, digest_hex(&data));
        assert_eq!(device.chunk_writes(), 5000u64.div_ceil(183));
        assert_eq!(device.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_acks_still_complete() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "memo.json", &sample(1000));
        let device = SimulatedDevice::with_behavior(
            "Talkbox",
            23,
            DeviceBehavior {
                legacy_acks: true,
                ..Default::default()
            },
        );

        assert!(send(&device, &path).await.is_ok());
    }

    #[tokio::test]
    async fn legacy_ack_only_on_even_sequences() {
        let device = SimulatedDevice::with_behavior(
            "Talkbox",
            23,
            DeviceBehavior {
                legacy_acks: true,
                ..Default::default()
            },
        );
        device.connect().await.unwrap();
        let (events, _sub) = recorded(&device);

        let data = sample(400);
        let start = StartFrame::new(3, 400, 180, &digest_hex(&data)).unwrap();
        device.write_start(&start.encode()).await.unwrap();
        for (seq, payload) in data.chunks(180).enumerate() {
            let frame = ChunkFrame::new(seq as u32, payload).encode();
            device.write_chunk(&frame).await.unwrap();
        }

        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                StatusEvent::StartAck,
                StatusEvent::ChunkAck {
                    seq: 0,
                    received_count: 1
                },
                StatusEvent::ChunkAck {
                    seq: 2,
                    received_count: 3
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_file_is_rejected_at_start() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.wav", b"");
        let device = SimulatedDevice::new("Talkbox", 23);

        match send(&device, &path).await {
            Err(TransferError::StartRejected(f)) => {
                assert_eq!(f.kind, FailureKind::StartError);
                assert_eq!(f.message.as_deref(), Some("invalid size"));
            }
            other => panic!("expected StartRejected, got {other:?}"),
        }
        assert!(device.stored_files().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_chunk_is_rejected() {
        let device = SimulatedDevice::new("Talkbox", 23);
        device.connect().await.unwrap();
        let (events, _sub) = recorded(&device);

        let data = sample(400);
        let start = StartFrame::new(3, 400, 180, &digest_hex(&data)).unwrap();
        device.write_start(&start.encode()).await.unwrap();
        let frame = ChunkFrame::new(1, &data[180..360]).encode();
        device.write_chunk(&frame).await.unwrap();

        let events = events.lock().unwrap().clone();
        assert!(matches!(
            events.last(),
            Some(StatusEvent::Failed(RemoteFailure {
                kind: FailureKind::ChunkError,
                ..
            }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn corrupted_storage_reports_hash_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "a.wav", &sample(700));
        let device = SimulatedDevice::with_behavior(
            "Talkbox",
            23,
            DeviceBehavior {
                corrupt_storage: true,
                ..Default::default()
            },
        );

        let err = send(&device, &path).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::StoreFailed(RemoteFailure {
                kind: FailureKind::HashMismatch,
                ..
            })
        ));
        assert!(device.stored_files().is_empty());
        assert_eq!(device.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_with_odd_message_ends_store_wait() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "a.wav", &sample(700));
        let device = SimulatedDevice::with_behavior(
            "Talkbox",
            23,
            DeviceBehavior {
                silent_store: true,
                ..Default::default()
            },
        );

        let started = tokio::time::Instant::now();
        let (result, ()) = tokio::join!(send(&device, &path), async {
            tokio::time::sleep(Duration::from_millis(400)).await;
            device.emit(br#"{"event":"assemble_error","msg":17}"#);
        });

        match result {
            Err(TransferError::StoreFailed(f)) => {
                assert_eq!(f.kind, FailureKind::AssembleError);
                assert_eq!(f.message.as_deref(), Some("17"));
            }
            other => panic!("expected StoreFailed, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(device.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_start_times_out() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "a.wav", &sample(300));
        let device = SimulatedDevice::with_behavior(
            "Talkbox",
            23,
            DeviceBehavior {
                silent_start: true,
                ..Default::default()
            },
        );

        let err = send(&device, &path).await.unwrap_err();

        assert!(matches!(err, TransferError::StartAckTimeout));
        assert_eq!(device.chunk_writes(), 0);
        assert_eq!(device.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_stored_completes_once() {
        #[derive(Default)]
        struct Progress(Mutex<Vec<u8>>);

        impl SessionObserver for Progress {
            fn on_progress(&self, percent: u8) {
                self.0.lock().unwrap().push(percent);
            }
            fn on_state_change(&self, _label: &str) {}
        }

        let dir = TempDir::new().unwrap();
        let data = sample(600);
        let path = create_test_file(dir.path(), "a.wav", &data);
        let device = SimulatedDevice::with_behavior(
            "Talkbox",
            23,
            DeviceBehavior {
                duplicate_stored: true,
                ..Default::default()
            },
        );
        let progress = Arc::new(Progress::default());

        let report = TransferSession::new(&device, &path, progress.clone())
            .run()
            .await
            .unwrap();

        assert!(report.digest_confirmed());
        let reported = progress.0.lock().unwrap().clone();
        assert_eq!(reported.iter().filter(|&&p| p == 100).count(), 1);
        assert_eq!(device.stored_files().len(), 1);
        assert_eq!(device.stored_files()[0].data, data);
        assert_eq!(device.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_chunk_stops_the_stream() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "a.wav", &sample(1000));
        let device = SimulatedDevice::with_behavior(
            "Talkbox",
            23,
            DeviceBehavior {
                fail_chunk_at: Some(1),
                ..Default::default()
            },
        );

        let err = send(&device, &path).await.unwrap_err();
        assert!(matches!(err, TransferError::TransferAborted(_)));
        assert_eq!(device.chunk_writes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "a.wav", &sample(300));
        let device = SimulatedDevice::with_behavior(
            "Talkbox",
            23,
            DeviceBehavior {
                unsubscribe_fails: true,
                ..Default::default()
            },
        );

        assert!(send(&device, &path).await.is_ok());
        assert_eq!(device.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn writes_require_a_link() {
        let device = SimulatedDevice::new("Talkbox", 23);
        assert!(matches!(
            device.write_chunk(&[0, 0, 0, 0]).await,
            Err(TransportError::NotConnected)
        ));
        device.connect().await.unwrap();
        device.disconnect();
        assert!(!device.is_connected());
        assert!(matches!(
            device.write_end(&[0x02]).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn end_without_start_fails_assembly() {
        let device = SimulatedDevice::new("Talkbox", 23);
        device.connect().await.unwrap();
        let (events, _sub) = recorded(&device);

        device.write_end(&[0x02]).await.unwrap();

        assert!(matches!(
            events.lock().unwrap().last(),
            Some(StatusEvent::Failed(RemoteFailure {
                kind: FailureKind::AssembleError,
                ..
            }))
        ));
    }
}
