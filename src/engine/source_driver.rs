//! Drives one [`StreamSession`] for one worker: connects, reads, and reconnects with a
//! bounded retry budget and fixed backoff. All blocking calls run on the blocking pool
//! and race against the worker's cancellation token.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::camera_config::CameraId;
use crate::engine::capture_source::{redact_url, Frame, SourceConnector, StreamSession};
use crate::engine::worker_registry::{WorkerRole, WorkerStatus, WorkerStatusCell};
use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Consecutive failures after which the worker gives up.
    pub max_retries: u32,
    /// Fixed wait between a failure and the next open.
    pub backoff: Duration,
    /// Upper bound on a single open or read call.
    pub io_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_secs(5),
            io_timeout: Some(Duration::from_secs(10)),
        }
    }
}

pub enum Blocking<T> {
    Done(T),
    Cancelled,
    TimedOut,
}

/// Runs `work` on the blocking pool. On cancellation or timeout the closure is left to
/// finish in the background; anything it owns is dropped there.
pub async fn run_blocking<T, F>(
    cancel: &CancellationToken,
    limit: Option<Duration>,
    work: F,
) -> Result<Blocking<T>, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    let deadline = async move {
        match limit {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(Blocking::Cancelled),
        joined = handle => Ok(Blocking::Done(joined?)),
        _ = deadline => Ok(Blocking::TimedOut),
    }
}

/// Sleeps for `duration` unless cancelled first. Returns false when cancelled.
pub async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Sleeps out the rest of one loop period that began at `period_start`.
pub async fn pace(cancel: &CancellationToken, period_start: Instant, period: Duration) -> bool {
    match period.checked_sub(period_start.elapsed()) {
        Some(rest) if !rest.is_zero() => sleep_or_cancel(cancel, rest).await,
        _ => !cancel.is_cancelled(),
    }
}

async fn close_session(session: Box<dyn StreamSession>) {
    let closed = tokio::task::spawn_blocking(move || {
        let mut session = session;
        session.close();
    })
    .await;
    if let Err(e) = closed {
        warn!("Closing stream session panicked: {}", e);
    }
}

pub struct SourceDriver {
    camera_id: CameraId,
    role: WorkerRole,
    url: Arc<str>,
    connector: Arc<dyn SourceConnector>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    status: WorkerStatusCell,
    session: Option<Box<dyn StreamSession>>,
    retry_count: u32,
}

impl SourceDriver {
    pub fn new(
        camera_id: CameraId,
        role: WorkerRole,
        url: &str,
        connector: Arc<dyn SourceConnector>,
        policy: RetryPolicy,
        cancel: CancellationToken,
        status: WorkerStatusCell,
    ) -> Self {
        SourceDriver {
            camera_id,
            role,
            url: Arc::from(url),
            connector,
            policy,
            cancel,
            status,
            session: None,
            retry_count: 0,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Next frame, reconnecting as needed.
    ///
    /// `Ok(None)` means the worker was cancelled. `Err` is terminal: the retry budget is
    /// spent, or the failure cannot be fixed by retrying.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, AppError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let session = match self.session.take() {
                Some(session) => session,
                None => match self.connect().await? {
                    Some(session) => session,
                    None => return Ok(None),
                },
            };

            let outcome = run_blocking(&self.cancel, self.policy.io_timeout, move || {
                let mut session = session;
                let result = session.read_frame();
                (session, result)
            })
            .await?;

            match outcome {
                Blocking::Cancelled => {
                    debug!(
                        "[{} {}] Cancelled during read; in-flight read abandoned.",
                        self.role, self.camera_id
                    );
                    return Ok(None);
                }
                Blocking::TimedOut => {
                    let err = AppError::Read {
                        camera_id: self.camera_id,
                        details: format!(
                            "read did not complete within {:?}",
                            self.policy.io_timeout.unwrap_or_default()
                        ),
                    };
                    if !self.register_failure(err).await? {
                        return Ok(None);
                    }
                }
                Blocking::Done((session, Ok(frame))) => {
                    if frame.is_degenerate() {
                        close_session(session).await;
                        return Err(AppError::DegenerateSource {
                            camera_id: self.camera_id,
                            width: frame.width,
                            height: frame.height,
                        });
                    }
                    self.session = Some(session);
                    return Ok(Some(frame));
                }
                Blocking::Done((session, Err(err))) => {
                    close_session(session).await;
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if !self.register_failure(err).await? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn connect(&mut self) -> Result<Option<Box<dyn StreamSession>>, AppError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            self.status.set_status(WorkerStatus::Connecting);
            let connect_start = Instant::now();
            let connector = self.connector.clone();
            let url = self.url.clone();
            let camera_id = self.camera_id;
            debug!("[{} {}] Opening source {}", self.role, camera_id, redact_url(&url));

            let outcome = run_blocking(&self.cancel, self.policy.io_timeout, move || {
                connector.open(camera_id, &url)
            })
            .await?;
            match outcome {
                Blocking::Cancelled => return Ok(None),
                Blocking::TimedOut => {
                    let err = AppError::Connect {
                        camera_id,
                        details: format!(
                            "open did not complete within {:?}",
                            self.policy.io_timeout.unwrap_or_default()
                        ),
                    };
                    if !self.register_failure(err).await? {
                        return Ok(None);
                    }
                }
                Blocking::Done(Ok(session)) => {
                    if let Some((width, height)) = session.dimensions() {
                        if width == 0 || height == 0 {
                            close_session(session).await;
                            return Err(AppError::DegenerateSource { camera_id, width, height });
                        }
                    }
                    info!(
                        "🔗 [{} {}] Connected to source in {:?} ({:?})",
                        self.role, camera_id, connect_start.elapsed(), session.dimensions()
                    );
                    self.retry_count = 0;
                    self.status.set_retry_count(0);
                    self.status.set_status(WorkerStatus::Active);
                    return Ok(Some(session));
                }
                Blocking::Done(Err(err)) => {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if !self.register_failure(err).await? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Counts one failure. Returns `Err` once the budget is spent, `Ok(false)` if
    /// cancelled during backoff, `Ok(true)` when the caller should try again.
    async fn register_failure(&mut self, err: AppError) -> Result<bool, AppError> {
        self.retry_count += 1;
        self.status.set_retry_count(self.retry_count);
        self.status.record_error(&err);
        if self.retry_count >= self.policy.max_retries {
            error!(
                "❌ [{} {}] Max retries reached ({}), giving up: {}",
                self.role, self.camera_id, self.policy.max_retries, err
            );
            return Err(err);
        }
        warn!(
            "🔁 [{} {}] {}. Retrying in {:?} (attempt {}/{})",
            self.role,
            self.camera_id,
            err,
            self.policy.backoff,
            self.retry_count,
            self.policy.max_retries
        );
        self.status.set_status(WorkerStatus::Connecting);
        Ok(sleep_or_cancel(&self.cancel, self.policy.backoff).await)
    }

    /// Closes the current session, if any, on the blocking pool.
    pub async fn shutdown(mut self) {
        if let Some(session) = self.session.take() {
            close_session(session).await;
        }
    }
}

impl Drop for SourceDriver {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(move || session.close());
                }
                Err(_) => session.close(),
            }
        }
    }
}

/// Opens `url` once and reads a single frame; used by diagnostics. No retries.
pub async fn probe_source(
    connector: Arc<dyn SourceConnector>,
    camera_id: CameraId,
    url: &str,
    limit: Duration,
) -> Result<(u32, u32), AppError> {
    let url = url.to_string();
    let never = CancellationToken::new();
    let outcome = run_blocking(&never, Some(limit), move || -> Result<(u32, u32), AppError> {
        let mut session = connector.open(camera_id, &url)?;
        let frame = session.read_frame();
        session.close();
        let frame = frame?;
        if frame.is_degenerate() {
            return Err(AppError::DegenerateSource {
                camera_id,
                width: frame.width,
                height: frame.height,
            });
        }
        Ok((frame.width, frame.height))
    })
    .await?;
    match outcome {
        Blocking::Done(result) => result,
        Blocking::Cancelled | Blocking::TimedOut => Err(AppError::Connect {
            camera_id,
            details: format!("probe did not complete within {:?}", limit),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::capture_source::fakes::{Script, ScriptedConnector};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(40),
            io_timeout: Some(Duration::from_secs(2)),
        }
    }

    fn driver(
        connector: Arc<ScriptedConnector>,
        policy: RetryPolicy,
    ) -> (SourceDriver, CancellationToken, WorkerStatusCell) {
        let cancel = CancellationToken::new();
        let status = WorkerStatusCell::new();
        let d = SourceDriver::new(
            1,
            WorkerRole::Capture,
            "fake://cam",
            connector,
            policy,
            cancel.clone(),
            status.clone(),
        );
        (d, cancel, status)
    }

    #[tokio::test]
    async fn gives_up_after_max_retries_with_backoff() {
        let connector = Arc::new(ScriptedConnector::new(Script::Unreachable));
        let (mut d, _cancel, status) = driver(connector.clone(), fast_policy());
        let started = Instant::now();
        let err = d.next_frame().await.unwrap_err();
        assert!(matches!(err, AppError::Connect { .. }));
        assert_eq!(connector.open_count(), 3);
        // Two backoff waits separate the three attempts.
        assert!(started.elapsed() >= Duration::from_millis(80));
        assert_eq!(status.snapshot().retry_count, 3);
        assert!(status.snapshot().last_error.is_some());
    }

    #[tokio::test]
    async fn degenerate_source_is_not_retried() {
        let connector = Arc::new(ScriptedConnector::new(Script::Degenerate));
        let (mut d, _cancel, _status) = driver(connector.clone(), fast_policy());
        let err = d.next_frame().await.unwrap_err();
        assert!(matches!(err, AppError::DegenerateSource { width: 0, height: 0, .. }));
        assert_eq!(connector.open_count(), 1);
    }

    #[tokio::test]
    async fn successful_connect_resets_retry_count() {
        let connector = Arc::new(ScriptedConnector::new(Script::FramesThenFail(2)));
        let (mut d, _cancel, status) = driver(connector.clone(), fast_policy());
        // Each session yields two frames, then fails once and reconnects.
        for _ in 0..6 {
            assert!(d.next_frame().await.unwrap().is_some());
        }
        assert_eq!(connector.open_count(), 3);
        assert_eq!(d.retry_count(), 0);
        assert_eq!(status.status(), WorkerStatus::Active);
        d.shutdown().await;
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let connector = Arc::new(ScriptedConnector::new(Script::Unreachable));
        let policy = RetryPolicy { backoff: Duration::from_secs(30), ..fast_policy() };
        let (mut d, cancel, _status) = driver(connector, policy);
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let started = Instant::now();
        assert!(d.next_frame().await.unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancellation_abandons_a_stuck_read() {
        let connector = Arc::new(ScriptedConnector::new(Script::Stuck(Duration::from_millis(500))));
        let policy = RetryPolicy { io_timeout: None, ..fast_policy() };
        let (mut d, cancel, _status) = driver(connector, policy);
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let started = Instant::now();
        assert!(d.next_frame().await.unwrap().is_none());
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn slow_reads_count_as_failures() {
        let connector = Arc::new(ScriptedConnector::new(Script::Stuck(Duration::from_millis(300))));
        let policy = RetryPolicy {
            max_retries: 1,
            io_timeout: Some(Duration::from_millis(30)),
            ..fast_policy()
        };
        let (mut d, _cancel, _status) = driver(connector, policy);
        let err = d.next_frame().await.unwrap_err();
        let AppError::Read { ref details, .. } = err else {
            panic!("expected a read error, got {:?}", err);
        };
        assert!(details.contains("did not complete"));
    }

    #[tokio::test]
    async fn probe_reports_frame_dimensions() {
        let connector: Arc<dyn SourceConnector> = Arc::new(ScriptedConnector::new(Script::Frames));
        let dims = probe_source(connector, 2, "fake://cam", Duration::from_secs(1)).await;
        assert_eq!(dims.unwrap(), (4, 2));
        let unreachable: Arc<dyn SourceConnector> =
            Arc::new(ScriptedConnector::new(Script::Unreachable));
        assert!(probe_source(unreachable, 2, "fake://cam", Duration::from_secs(1)).await.is_err());
    }
}
