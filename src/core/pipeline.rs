//! Transfer pipeline
//!
//! Runs one transfer through `Idle → Opening → Copying → Finalizing` and ends
//! in exactly one [`TransferOutcome`]. Failed attempts with a retryable kind
//! restart the whole transfer from the first byte after a backoff; there is no
//! range resume.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::core::config::TransferConfig;
use crate::core::error::{Error, ErrorKind};
use crate::core::retry::{RetryPolicy, RetryState};
use crate::core::sink::{DataSink, SinkWriter};
use crate::core::source::DataSource;
use crate::core::stream::{DataStream, ProgressCallback};

/// Observer notified on every state transition with (transfer_id, new_state)
pub type StateObserver = Arc<dyn Fn(&str, TransferState) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Opening,
    Copying,
    Finalizing,
    Succeeded,
    Failed,
    Cancelled,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferState::Succeeded | TransferState::Failed | TransferState::Cancelled
        )
    }
}

/// Terminal result of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Succeeded {
        bytes: u64,
        attempts: u32,
    },
    Failed {
        kind: ErrorKind,
        message: String,
        attempts: u32,
    },
    Cancelled {
        attempts: u32,
    },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            TransferOutcome::Succeeded { attempts, .. }
            | TransferOutcome::Failed { attempts, .. }
            | TransferOutcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn state(&self) -> TransferState {
        match self {
            TransferOutcome::Succeeded { .. } => TransferState::Succeeded,
            TransferOutcome::Failed { .. } => TransferState::Failed,
            TransferOutcome::Cancelled { .. } => TransferState::Cancelled,
        }
    }

    /// Failure for a request that never got to run
    pub fn rejected(err: &Error) -> Self {
        TransferOutcome::Failed {
            kind: err.kind(),
            message: err.to_string(),
            attempts: 0,
        }
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferOutcome::Succeeded { bytes, attempts } => {
                write!(f, "succeeded: {bytes} bytes in {attempts} attempt(s)")
            }
            TransferOutcome::Failed {
                kind,
                message,
                attempts,
            } => write!(f, "failed after {attempts} attempt(s) [{kind}]: {message}"),
            TransferOutcome::Cancelled { attempts } => {
                write!(f, "cancelled during attempt {attempts}")
            }
        }
    }
}

/// Why an attempt stopped early
enum Interrupt {
    Cancelled,
    Failed(Error),
}

pub struct TransferPipeline {
    chunk_size: usize,
    retry: RetryPolicy,
    progress: Option<ProgressCallback>,
    observer: Option<StateObserver>,
}

impl TransferPipeline {
    pub fn new(config: &TransferConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            retry: RetryPolicy::from_config(config),
            progress: None,
            observer: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_state_observer(mut self, observer: StateObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run the transfer until it succeeds, fails for good, or is cancelled
    pub async fn run(
        &self,
        transfer_id: &str,
        source: &dyn DataSource,
        sink: &dyn DataSink,
        cancel: &CancellationToken,
    ) -> TransferOutcome {
        let mut retry = RetryState::default();

        let outcome = loop {
            let attempt = retry.begin_attempt();
            self.enter(transfer_id, TransferState::Idle);

            match self.attempt(transfer_id, source, sink, cancel).await {
                Ok(bytes) => {
                    break TransferOutcome::Succeeded {
                        bytes,
                        attempts: attempt,
                    }
                }
                Err(Interrupt::Cancelled) => break TransferOutcome::Cancelled { attempts: attempt },
                Err(Interrupt::Failed(err)) => {
                    let kind = err.kind();
                    if !self.retry.should_retry(attempt, kind) {
                        break TransferOutcome::Failed {
                            kind,
                            message: err.to_string(),
                            attempts: attempt,
                        };
                    }

                    let delay = self.retry.backoff_delay(attempt);
                    warn!(
                        "[{transfer_id}] Attempt {attempt}/{} failed: {err}. Restarting in {delay:?}",
                        self.retry.max_attempts()
                    );
                    retry.record_backoff(delay);

                    let slept = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => false,
                        _ = tokio::time::sleep(delay) => true,
                    };
                    if !slept {
                        break TransferOutcome::Cancelled { attempts: attempt };
                    }
                }
            }
        };

        match &outcome {
            TransferOutcome::Succeeded { .. } => info!("[{transfer_id}] Transfer {outcome}"),
            TransferOutcome::Failed { .. } => error!("[{transfer_id}] Transfer {outcome}"),
            TransferOutcome::Cancelled { .. } => info!("[{transfer_id}] Transfer {outcome}"),
        }
        if !retry.total_backoff.is_zero() {
            debug!("[{transfer_id}] Spent {:?} in backoff", retry.total_backoff);
        }
        self.enter(transfer_id, outcome.state());
        outcome
    }

    /// One pass from opening the source to closing both ends
    async fn attempt(
        &self,
        transfer_id: &str,
        source: &dyn DataSource,
        sink: &dyn DataSink,
        cancel: &CancellationToken,
    ) -> Result<u64, Interrupt> {
        self.enter(transfer_id, TransferState::Opening);

        // Source first, so a doomed transfer never starts an upload
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = source.open() => Some(result),
        };
        let mut stream = match opened {
            None => return Err(Interrupt::Cancelled),
            Some(result) => result.map_err(Interrupt::Failed)?,
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = sink.open(stream.metadata()) => Some(result),
        };
        let mut writer = match opened {
            None => {
                release(transfer_id, None, stream).await;
                return Err(Interrupt::Cancelled);
            }
            Some(Err(e)) => {
                release(transfer_id, None, stream).await;
                return Err(Interrupt::Failed(e));
            }
            Some(Ok(writer)) => writer,
        };

        self.enter(transfer_id, TransferState::Copying);
        let total = stream.metadata().content_length.unwrap_or(0);
        let mut buffer = vec![0u8; self.chunk_size];
        let mut transferred = 0u64;

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = read_chunk(&mut stream, &mut buffer) => Some(result),
            };
            let n = match read {
                None => {
                    release(transfer_id, Some(writer), stream).await;
                    return Err(Interrupt::Cancelled);
                }
                Some(Err(e)) => {
                    release(transfer_id, Some(writer), stream).await;
                    return Err(Interrupt::Failed(Error::StreamInterrupted(format!(
                        "Source read failed after {transferred} bytes: {e}"
                    ))));
                }
                Some(Ok(0)) => break,
                Some(Ok(n)) => n,
            };

            let chunk = Bytes::copy_from_slice(&buffer[..n]);
            let written = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = writer.write(chunk) => Some(result),
            };
            match written {
                None => {
                    release(transfer_id, Some(writer), stream).await;
                    return Err(Interrupt::Cancelled);
                }
                Some(Err(e)) => {
                    release(transfer_id, Some(writer), stream).await;
                    return Err(Interrupt::Failed(e));
                }
                Some(Ok(())) => {}
            }

            transferred += n as u64;
            if let Some(ref progress) = self.progress {
                progress(transferred, total);
            }
        }

        self.enter(transfer_id, TransferState::Finalizing);

        // A close cut short by cancellation drops the writer, which aborts the upload
        let closed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = writer.close() => Some(result),
        };
        let Some(sink_result) = closed else {
            release(transfer_id, None, stream).await;
            return Err(Interrupt::Cancelled);
        };
        let source_result = stream.close().await;

        sink_result.and(source_result).map_err(Interrupt::Failed)?;
        Ok(transferred)
    }

    fn enter(&self, transfer_id: &str, state: TransferState) {
        debug!("[{transfer_id}] -> {state:?}");
        if let Some(ref observer) = self.observer {
            observer(transfer_id, state);
        }
    }
}

/// Fill `buffer` from the stream; returns fewer bytes only at end of stream
async fn read_chunk(stream: &mut DataStream, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = stream.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Release both ends of an abandoned attempt
async fn release(transfer_id: &str, writer: Option<Box<dyn SinkWriter>>, stream: DataStream) {
    if let Some(writer) = writer {
        writer.abort().await;
    }
    if let Err(e) = stream.close().await {
        debug!("[{transfer_id}] Error closing source stream: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Result;
    use crate::core::stream::StreamMetadata;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, ReadBuf};

    /// How one `open` of the mock source behaves
    #[derive(Clone)]
    enum Script {
        Serve,
        FailOpen(ErrorKind),
        /// Serve this many bytes, then report a broken connection
        BreakAfter(usize),
        /// Serve this many bytes, then never produce more
        StallAfter(usize),
    }

    struct ScriptedReader {
        data: Arc<Vec<u8>>,
        pos: usize,
        limit: Option<usize>,
        stall: bool,
        released: Arc<AtomicUsize>,
    }

    impl AsyncRead for ScriptedReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let end = self.limit.unwrap_or(self.data.len()).min(self.data.len());
            if self.pos >= end {
                if self.stall {
                    return Poll::Pending;
                }
                if self.limit.is_some() {
                    return Poll::Ready(Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    )));
                }
                return Poll::Ready(Ok(()));
            }
            // Small uneven reads to exercise chunk filling
            let n = (end - self.pos).min(buf.remaining()).min(10_000);
            let start = self.pos;
            buf.put_slice(&self.data[start..start + n]);
            self.pos += n;
            Poll::Ready(Ok(()))
        }
    }

    impl Drop for ScriptedReader {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockSource {
        data: Arc<Vec<u8>>,
        scripts: Mutex<VecDeque<Script>>,
        opens: AtomicUsize,
        released: Arc<AtomicUsize>,
    }

    impl MockSource {
        fn new(data: Vec<u8>, scripts: Vec<Script>) -> Self {
            Self {
                data: Arc::new(data),
                scripts: Mutex::new(scripts.into()),
                opens: AtomicUsize::new(0),
                released: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DataSource for MockSource {
        async fn open(&self) -> Result<DataStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::Serve);
            let (limit, stall) = match script {
                Script::Serve => (None, false),
                Script::FailOpen(kind) => return Err(error_of(kind)),
                Script::BreakAfter(n) => (Some(n), false),
                Script::StallAfter(n) => (Some(n), true),
            };
            let reader = ScriptedReader {
                data: Arc::clone(&self.data),
                pos: 0,
                limit,
                stall,
                released: Arc::clone(&self.released),
            };
            let metadata = StreamMetadata::default()
                .with_content_type("application/octet-stream")
                .with_content_length(self.data.len() as u64);
            Ok(DataStream::new(metadata, Box::new(reader)))
        }
    }

    struct MockWriter {
        buffer: Vec<u8>,
        close_result: Option<ErrorKind>,
        committed: Arc<Mutex<Vec<Vec<u8>>>>,
        written: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl Drop for MockWriter {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SinkWriter for MockWriter {
        async fn write(&mut self, chunk: Bytes) -> Result<()> {
            self.buffer.extend_from_slice(&chunk);
            self.written.fetch_add(chunk.len(), Ordering::SeqCst);
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            if let Some(kind) = self.close_result {
                return Err(error_of(kind));
            }
            self.committed.lock().unwrap().push(self.buffer.clone());
            Ok(())
        }

        async fn abort(self: Box<Self>) {}
    }

    #[derive(Default)]
    struct MockSink {
        close_results: Mutex<VecDeque<Option<ErrorKind>>>,
        open_failure: Option<ErrorKind>,
        committed: Arc<Mutex<Vec<Vec<u8>>>>,
        written: Arc<AtomicUsize>,
        opens: AtomicUsize,
        released: Arc<AtomicUsize>,
        seen_content_type: Mutex<Option<String>>,
    }

    impl MockSink {
        fn committed(&self) -> Vec<Vec<u8>> {
            self.committed.lock().unwrap().clone()
        }

        fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DataSink for MockSink {
        async fn open(&self, metadata: &StreamMetadata) -> Result<Box<dyn SinkWriter>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if let Some(kind) = self.open_failure {
                return Err(error_of(kind));
            }
            *self.seen_content_type.lock().unwrap() = metadata.content_type.clone();
            Ok(Box::new(MockWriter {
                buffer: Vec::new(),
                close_result: self.close_results.lock().unwrap().pop_front().flatten(),
                committed: Arc::clone(&self.committed),
                written: Arc::clone(&self.written),
                released: Arc::clone(&self.released),
            }))
        }
    }

    fn error_of(kind: ErrorKind) -> Error {
        match kind {
            ErrorKind::InvalidAddress => Error::InvalidAddress("bad address".to_string()),
            ErrorKind::ClientError => Error::ClientError {
                status: Some(404),
                message: "not found".to_string(),
            },
            ErrorKind::TransientError => Error::TransientError {
                status: Some(503),
                message: "unavailable".to_string(),
            },
            ErrorKind::TimeoutError => Error::TimeoutError("too slow".to_string()),
            ErrorKind::StreamInterrupted => Error::StreamInterrupted("reset".to_string()),
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn pipeline(max_attempts: u32) -> TransferPipeline {
        let config = TransferConfig {
            chunk_size: 64 * 1024,
            max_attempts,
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(5),
            ..Default::default()
        };
        TransferPipeline::new(&config)
    }

    #[tokio::test]
    async fn test_bytes_arrive_in_order() {
        let data = payload(1024 * 1024 + 123);
        let source = MockSource::new(data.clone(), vec![]);
        let sink = MockSink::default();

        let outcome = pipeline(3)
            .run("tx-fidelity", &source, &sink, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            TransferOutcome::Succeeded {
                bytes: data.len() as u64,
                attempts: 1
            }
        );
        assert_eq!(sink.committed(), vec![data]);
        assert_eq!(source.released(), 1);
        assert_eq!(sink.released(), 1);
        assert_eq!(
            sink.seen_content_type.lock().unwrap().as_deref(),
            Some("application/octet-stream")
        );
    }

    #[tokio::test]
    async fn test_empty_source_succeeds() {
        let source = MockSource::new(Vec::new(), vec![]);
        let sink = MockSink::default();

        let outcome = pipeline(3)
            .run("tx-empty", &source, &sink, &CancellationToken::new())
            .await;

        assert_eq!(outcome, TransferOutcome::Succeeded { bytes: 0, attempts: 1 });
        assert_eq!(sink.committed(), vec![Vec::<u8>::new()]);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let data = payload(200_000);
        let source = MockSource::new(data.clone(), vec![Script::FailOpen(ErrorKind::TransientError)]);
        let sink = MockSink::default();

        let outcome = pipeline(3)
            .run("tx-retry", &source, &sink, &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(source.opens(), 2);
        assert_eq!(sink.opens.load(Ordering::SeqCst), 1);
        assert_eq!(sink.committed(), vec![data]);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let source = MockSource::new(payload(10), vec![Script::FailOpen(ErrorKind::ClientError)]);
        let sink = MockSink::default();

        let outcome = pipeline(5)
            .run("tx-4xx", &source, &sink, &CancellationToken::new())
            .await;

        match outcome {
            TransferOutcome::Failed { kind, attempts, .. } => {
                assert_eq!(kind, ErrorKind::ClientError);
                assert_eq!(attempts, 1);
            }
            other => panic!("Expected failure, got {other:?}"),
        }
        assert_eq!(source.opens(), 1);
        assert_eq!(sink.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_address_is_not_retried() {
        let source = MockSource::new(payload(10), vec![]);
        let sink = MockSink {
            open_failure: Some(ErrorKind::InvalidAddress),
            ..Default::default()
        };

        let outcome = pipeline(5)
            .run("tx-invalid", &source, &sink, &CancellationToken::new())
            .await;

        assert_eq!(outcome.state(), TransferState::Failed);
        assert_eq!(outcome.attempts(), 1);
        // The source opened first and must have been released
        assert_eq!(source.released(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_last_error() {
        let source = MockSource::new(
            payload(10),
            vec![Script::FailOpen(ErrorKind::TransientError); 4],
        );
        let sink = MockSink::default();

        let outcome = pipeline(4)
            .run("tx-down", &source, &sink, &CancellationToken::new())
            .await;

        match outcome {
            TransferOutcome::Failed { kind, attempts, message } => {
                assert_eq!(kind, ErrorKind::TransientError);
                assert_eq!(attempts, 4);
                assert!(message.contains("unavailable"));
            }
            other => panic!("Expected failure, got {other:?}"),
        }
        assert_eq!(source.opens(), 4);
    }

    #[tokio::test]
    async fn test_restart_after_interruption_rereads_from_start() {
        let data = payload(500_000);
        let source = MockSource::new(data.clone(), vec![Script::BreakAfter(150_000)]);
        let sink = MockSink::default();

        let outcome = pipeline(3)
            .run("tx-restart", &source, &sink, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            TransferOutcome::Succeeded {
                bytes: data.len() as u64,
                attempts: 2
            }
        );
        // Only the complete second attempt was committed: no duplicated or missing prefix
        assert_eq!(sink.committed(), vec![data]);
        assert_eq!(source.released(), 2);
        assert_eq!(sink.released(), 2);
    }

    #[tokio::test]
    async fn test_sink_close_failure_is_reported_and_source_released() {
        let source = MockSource::new(payload(1000), vec![]);
        let sink = MockSink {
            close_results: Mutex::new(vec![Some(ErrorKind::ClientError)].into()),
            ..Default::default()
        };

        let outcome = pipeline(3)
            .run("tx-rejected", &source, &sink, &CancellationToken::new())
            .await;

        assert_eq!(outcome.state(), TransferState::Failed);
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(source.released(), 1);
        assert_eq!(sink.released(), 1);
        assert!(sink.committed().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_copy_releases_both_ends() {
        let source = Arc::new(MockSource::new(payload(1_000_000), vec![Script::StallAfter(300_000)]));
        let sink = Arc::new(MockSink::default());
        let cancel = CancellationToken::new();

        let handle = {
            let (source, sink, cancel) = (Arc::clone(&source), Arc::clone(&sink), cancel.clone());
            tokio::spawn(async move {
                pipeline(3)
                    .run("tx-cancel", source.as_ref(), sink.as_ref(), &cancel)
                    .await
            })
        };

        // Wait until some chunks reached the sink
        while sink.written.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, TransferOutcome::Cancelled { attempts: 1 });
        assert_eq!(source.released(), 1);
        assert_eq!(sink.released(), 1);
        assert!(sink.committed().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let source = MockSource::new(payload(10), vec![Script::FailOpen(ErrorKind::TimeoutError)]);
        let sink = MockSink::default();
        let cancel = CancellationToken::new();

        let slow_retry = RetryPolicy::new(3, Duration::from_secs(30), Duration::from_secs(60));
        let pipeline = pipeline(3).with_retry_policy(slow_retry);
        let run = pipeline.run("tx-backoff", &source, &sink, &cancel);

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        };
        let (outcome, _) = tokio::join!(run, canceller);

        assert_eq!(outcome, TransferOutcome::Cancelled { attempts: 1 });
        assert_eq!(source.opens(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let source = MockSource::new(payload(10), vec![]);
        let sink = MockSink::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = pipeline(3).run("tx-early", &source, &sink, &cancel).await;

        assert_eq!(outcome.state(), TransferState::Cancelled);
        assert_eq!(source.opens(), 0);
    }

    #[tokio::test]
    async fn test_state_transitions_and_progress() {
        let data = payload(150_000);
        let source = MockSource::new(data.clone(), vec![]);
        let sink = MockSink::default();

        let states = Arc::new(Mutex::new(Vec::new()));
        let progress = Arc::new(Mutex::new(Vec::new()));
        let observer: StateObserver = {
            let states = Arc::clone(&states);
            Arc::new(move |_, state| states.lock().unwrap().push(state))
        };
        let callback: ProgressCallback = {
            let progress = Arc::clone(&progress);
            Arc::new(move |done, total| progress.lock().unwrap().push((done, total)))
        };

        let outcome = pipeline(3)
            .with_state_observer(observer)
            .with_progress(callback)
            .run("tx-states", &source, &sink, &CancellationToken::new())
            .await;
        assert!(outcome.is_success());

        assert_eq!(
            *states.lock().unwrap(),
            vec![
                TransferState::Idle,
                TransferState::Opening,
                TransferState::Copying,
                TransferState::Finalizing,
                TransferState::Succeeded,
            ]
        );
        // 64KB chunks: 65536, 131072, 150000
        let total = data.len() as u64;
        assert_eq!(
            *progress.lock().unwrap(),
            vec![(65_536, total), (131_072, total), (150_000, total)]
        );
    }

    #[test]
    fn test_outcome_display() {
        let outcome = TransferOutcome::Failed {
            kind: ErrorKind::TransientError,
            message: "Transient error: down".to_string(),
            attempts: 3,
        };
        assert_eq!(
            outcome.to_string(),
            "failed after 3 attempt(s) [TransientError]: Transient error: down"
        );
        assert!(TransferState::Cancelled.is_terminal());
        assert!(!TransferState::Copying.is_terminal());
    }
}
