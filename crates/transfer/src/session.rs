//! Single-file transfer state machine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use talkbox_protocol::{ChunkFrame, RemoteFailure, encode_end_frame};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::chunker::ChunkReader;
use crate::meta::{ChunkPlan, FileMeta, compute_meta_with};
use crate::progress::SessionObserver;
use crate::router::StatusRouter;
use crate::transport::{
    StatusHandler, SubscriptionGuard, SubscriptionSlot, Transport, TransportError,
};
use crate::types::{SessionState, TransferReport};
use crate::{
    END_SETTLE_DELAY, START_ACK_POLL_INTERVAL, START_ACK_TIMEOUT, STORE_POLL_INTERVAL,
    STORE_TIMEOUT, TransferError,
};

/// Result of polling the router for a latch.
enum WaitOutcome {
    Ready,
    Failed(RemoteFailure),
    TimedOut,
}

/// One attempt to deliver one file to the device.
///
/// A session is consumed by [`run`](Self::run); retrying means building a
/// new session, which recomputes the file metadata.
pub struct TransferSession<'a> {
    transport: &'a dyn Transport,
    path: PathBuf,
    total_chunks: Option<u32>,
    observer: Arc<dyn SessionObserver>,
}

impl<'a> TransferSession<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        path: impl Into<PathBuf>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            transport,
            path: path.into(),
            total_chunks: None,
            observer,
        }
    }

    /// Fixes the chunk count instead of the chunk size; the chunk size is
    /// then derived from the file size.
    pub fn with_total_chunks(mut self, total_chunks: u32) -> Self {
        self.total_chunks = Some(total_chunks);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs the transfer to `Done` or `Error`.
    pub async fn run(self) -> Result<TransferReport, TransferError> {
        let result = self.drive().await;
        match &result {
            Ok(report) => {
                self.enter(SessionState::Done);
                info!(
                    file = %report.meta.filename,
                    bytes = report.meta.size_bytes,
                    chunks = report.meta.total_chunks,
                    confirmed = report.digest_confirmed(),
                    "transfer complete"
                );
            }
            Err(e) => {
                self.enter(SessionState::Error);
                error!(path = %self.path.display(), error = %e, "transfer failed");
            }
        }
        result
    }

    async fn drive(&self) -> Result<TransferReport, TransferError> {
        self.enter(SessionState::Prep);
        self.observer.on_progress(0);
        let plan = match self.total_chunks {
            Some(count) => ChunkPlan::TotalChunks(count),
            None => ChunkPlan::ChunkSize(self.transport.chunk_size()),
        };
        let meta = compute_meta_with(&self.path, plan).await?;
        let start = meta.start_frame()?.encode();
        debug!(
            file = %meta.filename,
            size = meta.size_bytes,
            chunks = meta.total_chunks,
            chunk_size = meta.chunk_size,
            digest = %meta.digest_hex,
            "prepared file"
        );

        if !self.transport.is_connected() {
            self.enter(SessionState::Connect);
            let device = self
                .transport
                .connect()
                .await
                .map_err(TransferError::ConnectFailed)?;
            info!(device = %device.name, mtu = device.mtu, "connected");
        }

        let slot = SubscriptionSlot::default();
        let router = Arc::new(StatusRouter::new(
            meta.total_chunks,
            Arc::clone(&self.observer),
            slot.clone(),
        ));
        let _guard = SubscriptionGuard::new(slot.clone());
        let handler: StatusHandler = {
            let router = Arc::clone(&router);
            Arc::new(move |payload: &[u8]| router.route(payload))
        };
        let subscription = self
            .transport
            .subscribe_status(handler)
            .map_err(TransferError::Subscribe)?;
        slot.fill(subscription);

        self.enter(SessionState::SendStart);
        self.transport
            .write_start(&start)
            .await
            .map_err(write_error)?;
        let start_sent = Instant::now();

        self.enter(SessionState::WaitStartAck);
        match wait_for(
            &router,
            StatusRouter::start_acked,
            start_sent,
            START_ACK_TIMEOUT,
            START_ACK_POLL_INTERVAL,
        )
        .await
        {
            WaitOutcome::Ready => {}
            WaitOutcome::Failed(failure) => return Err(TransferError::StartRejected(failure)),
            WaitOutcome::TimedOut => return Err(TransferError::StartAckTimeout),
        }

        self.enter(SessionState::SendChunks);
        self.send_chunks(&meta, &router).await?;

        tokio::time::sleep(END_SETTLE_DELAY).await;
        self.enter(SessionState::SendEnd);
        self.transport
            .write_end(&encode_end_frame())
            .await
            .map_err(write_error)?;
        let end_sent = Instant::now();

        self.enter(SessionState::WaitStored);
        match wait_for(
            &router,
            StatusRouter::is_done,
            end_sent,
            STORE_TIMEOUT,
            STORE_POLL_INTERVAL,
        )
        .await
        {
            WaitOutcome::Ready => {}
            WaitOutcome::Failed(failure) => return Err(TransferError::StoreFailed(failure)),
            WaitOutcome::TimedOut => return Err(TransferError::StoreTimeout),
        }

        router.complete_progress();
        Ok(TransferReport {
            meta,
            stored_digest: router.stored_digest(),
        })
    }

    async fn send_chunks(&self, meta: &FileMeta, router: &StatusRouter) -> Result<(), TransferError> {
        let mut reader = ChunkReader::open(&self.path, meta.chunk_size).await?;
        if reader.file_size() != meta.size_bytes {
            return Err(TransferError::Metadata(format!(
                "{} changed size after preparation: {} -> {} bytes",
                self.path.display(),
                meta.size_bytes,
                reader.file_size()
            )));
        }

        while let Some(chunk) = reader.next_chunk().await? {
            if let Some(failure) = router.failure() {
                return Err(TransferError::TransferAborted(failure));
            }
            let frame = ChunkFrame::new(chunk.sequence, &chunk.payload).encode();
            self.transport
                .write_chunk(&frame)
                .await
                .map_err(write_error)?;
            debug!(seq = chunk.sequence, len = chunk.payload.len(), "chunk written");
        }
        Ok(())
    }

    fn enter(&self, state: SessionState) {
        debug!(state = %state, "session state");
        self.observer.on_state_change(state.label());
    }
}

fn write_error(e: TransportError) -> TransferError {
    match e {
        TransportError::NotConnected => TransferError::NotConnected,
        other => TransferError::Write(other),
    }
}

/// Polls `ready` until it holds, a failure is latched, or `timeout` has
/// elapsed since `since`.
async fn wait_for(
    router: &StatusRouter,
    ready: fn(&StatusRouter) -> bool,
    since: Instant,
    timeout: Duration,
    interval: Duration,
) -> WaitOutcome {
    loop {
        if ready(router) {
            return WaitOutcome::Ready;
        }
        if let Some(failure) = router.failure() {
            return WaitOutcome::Failed(failure);
        }
        if since.elapsed() > timeout {
            return WaitOutcome::TimedOut;
        }
        tokio::time::sleep(interval).await;
    }
}
