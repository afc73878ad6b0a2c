// ── Polling coordinator ──
//
// Owns the session, the discovered kiln and the published status. One
// background task drives sequential polls on a fixed interval; readers
// only ever touch the `ArcSwap`, never the network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kiln_api::{Credentials, KilnClient, SessionToken};

use crate::config::CoordinatorConfig;
use crate::error::CoreError;
use crate::model::{KilnInfo, Lifecycle, PollFailure, PollStatus, Snapshot};
use crate::sensor::DataProvider;
use crate::source::TelemetrySource;
use crate::stream::StatusStream;

/// Longest refresh interval accepted by [`Coordinator::start`] and
/// [`Coordinator::set_interval`].
pub const MAX_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// ── Coordinator ──────────────────────────────────────────────────────

/// Periodic poller for one kiln.
///
/// Cheaply cloneable; all clones share the same state and background
/// task. Build with [`Coordinator::builder`] or [`Coordinator::new`],
/// then call [`start()`](Self::start).
pub struct Coordinator<S: TelemetrySource = KilnClient> {
    inner: Arc<Inner<S>>,
}

impl<S: TelemetrySource> Clone for Coordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S> {
    source: S,
    credentials: Credentials,
    min_spacing: Duration,
    session: Mutex<Option<SessionToken>>,
    kiln: ArcSwapOption<KilnInfo>,
    status: ArcSwap<PollStatus>,
    updates: watch::Sender<Arc<PollStatus>>,
    lifecycle: watch::Sender<Lifecycle>,
    interval: watch::Sender<Duration>,
    in_flight: AtomicBool,
    /// When the most recent poll completed, for the minimum-spacing guard.
    last_finished: std::sync::Mutex<Option<Instant>>,
    task: Mutex<Option<PollTask>>,
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Builder for a [`Coordinator`].
pub struct CoordinatorBuilder<S> {
    source: S,
    credentials: Credentials,
    config: CoordinatorConfig,
    kiln: Option<KilnInfo>,
    token: Option<SessionToken>,
}

impl<S: TelemetrySource> CoordinatorBuilder<S> {
    #[must_use]
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Poll a known kiln instead of discovering the first one on the account.
    #[must_use]
    pub fn kiln(mut self, kiln: KilnInfo) -> Self {
        self.kiln = Some(kiln);
        self
    }

    /// Reuse a session obtained elsewhere (e.g. during setup validation).
    #[must_use]
    pub fn token(mut self, token: SessionToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn build(self) -> Coordinator<S> {
        let initial = Arc::new(PollStatus::uninitialized());
        let (updates, _) = watch::channel(Arc::clone(&initial));
        let (lifecycle, _) = watch::channel(Lifecycle::Idle);
        let (interval, _) = watch::channel(self.config.interval);

        Coordinator {
            inner: Arc::new(Inner {
                source: self.source,
                credentials: self.credentials,
                min_spacing: self.config.min_spacing,
                session: Mutex::new(self.token),
                kiln: ArcSwapOption::from(self.kiln.map(Arc::new)),
                status: ArcSwap::new(initial),
                updates,
                lifecycle,
                interval,
                in_flight: AtomicBool::new(false),
                last_finished: std::sync::Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }
}

impl<S: TelemetrySource> Coordinator<S> {
    pub fn builder(source: S, credentials: Credentials) -> CoordinatorBuilder<S> {
        CoordinatorBuilder {
            source,
            credentials,
            config: CoordinatorConfig::default(),
            kiln: None,
            token: None,
        }
    }

    pub fn new(source: S, credentials: Credentials, config: CoordinatorConfig) -> Self {
        Self::builder(source, credentials).config(config).build()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Begin the periodic cycle. The first poll runs immediately.
    ///
    /// Returns [`CoreError::AlreadyRunning`] if a cycle is active; use
    /// [`set_interval`](Self::set_interval) to retune a running one.
    pub async fn start(&self, interval: Duration) -> Result<(), CoreError> {
        validate_interval(interval)?;

        let mut task = self.inner.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return Err(CoreError::AlreadyRunning);
        }

        self.inner.interval.send_replace(interval);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_task(self.clone(), cancel.clone()));
        *task = Some(PollTask { cancel, handle });

        self.set_lifecycle(Lifecycle::Running);
        info!(
            email = self.inner.credentials.email(),
            interval_secs = interval.as_secs(),
            "polling started"
        );
        Ok(())
    }

    /// Cancel the periodic cycle, aborting any poll it has in flight, and
    /// wait for the task to exit. Calling it again is a no-op.
    pub async fn stop(&self) {
        let Some(PollTask { cancel, handle }) = self.inner.task.lock().await.take() else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "poll task ended abnormally");
        }

        self.set_lifecycle(Lifecycle::Stopped);
        info!(email = self.inner.credentials.email(), "polling stopped");
    }

    /// Change the refresh interval. A running cycle picks it up without
    /// restarting; the next poll is one new interval from now.
    pub fn set_interval(&self, interval: Duration) -> Result<(), CoreError> {
        validate_interval(interval)?;
        self.inner.interval.send_if_modified(|current| {
            let changed = *current != interval;
            *current = interval;
            changed
        });
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        *self.inner.interval.borrow()
    }

    fn set_lifecycle(&self, next: Lifecycle) {
        self.inner.lifecycle.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        });
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Run a single poll and publish its outcome.
    ///
    /// On failure the previous snapshot stays published with the failure
    /// recorded next to it. Returns [`CoreError::PollInFlight`] without
    /// touching any state if another poll is running.
    pub async fn poll_once(&self) -> Result<Arc<Snapshot>, CoreError> {
        let Some(_guard) = InFlightGuard::acquire(&self.inner.in_flight) else {
            debug!("poll skipped: another poll is in flight");
            return Err(CoreError::PollInFlight);
        };

        let attempted_at = Utc::now();
        let result = self.fetch_snapshot().await;
        self.inner.mark_finished();

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                let next = self
                    .inner
                    .status
                    .load()
                    .succeeded(Arc::clone(&snapshot), attempted_at);
                self.inner.publish(next);
                debug!(
                    temperature = snapshot.temperature,
                    status = %snapshot.status,
                    "poll succeeded"
                );
                Ok(snapshot)
            }
            Err(e) => {
                let failure = PollFailure::from_error(&e, Utc::now());
                let next = self.inner.status.load().failed(failure);
                let failures = next.consecutive_failures;
                self.inner.publish(next);
                warn!(error = %e, consecutive_failures = failures, "poll failed");
                Err(e)
            }
        }
    }

    /// One attempt, plus exactly one retry after re-authenticating if the
    /// session was rejected.
    async fn fetch_snapshot(&self) -> Result<Snapshot, CoreError> {
        match self.try_fetch().await {
            Err(e) if e.is_auth_expired() => {
                info!("session expired, re-authenticating");
                self.clear_session().await;
                let retried = self.try_fetch().await;
                if retried.as_ref().is_err_and(CoreError::is_auth_expired) {
                    self.clear_session().await;
                }
                retried
            }
            other => other,
        }
    }

    async fn try_fetch(&self) -> Result<Snapshot, CoreError> {
        let token = self.session_token().await?;
        let kiln = self.ensure_kiln(&token).await?;
        let raw = self
            .inner
            .source
            .fetch_status(&token, &kiln.kiln_id)
            .await?;
        Snapshot::from_payload(&raw, Utc::now())
    }

    async fn session_token(&self) -> Result<SessionToken, CoreError> {
        let mut session = self.inner.session.lock().await;
        if let Some(token) = session.as_ref() {
            return Ok(token.clone());
        }

        let token = self.inner.source.authenticate(&self.inner.credentials).await?;
        debug!(email = token.email(), "authenticated");
        *session = Some(token.clone());
        Ok(token)
    }

    async fn clear_session(&self) {
        *self.inner.session.lock().await = None;
    }

    async fn ensure_kiln(&self, token: &SessionToken) -> Result<Arc<KilnInfo>, CoreError> {
        if let Some(kiln) = self.inner.kiln.load_full() {
            return Ok(kiln);
        }

        let kilns = self.inner.source.list_kilns(token).await?;
        let Some(first) = kilns.into_iter().next() else {
            return Err(CoreError::NoKilns {
                email: self.inner.credentials.email().to_owned(),
            });
        };

        let kiln = Arc::new(first);
        info!(kiln = %kiln.name, kiln_id = %kiln.kiln_id, "discovered kiln");
        self.inner.kiln.store(Some(Arc::clone(&kiln)));
        Ok(kiln)
    }

    // ── Readers ──────────────────────────────────────────────────────

    /// Latest published status. Never blocks on I/O.
    pub fn current(&self) -> Arc<PollStatus> {
        self.inner.status.load_full()
    }

    /// Subscribe to every status publish.
    pub fn subscribe(&self) -> StatusStream {
        StatusStream::new(self.inner.updates.subscribe())
    }

    pub fn lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.inner.lifecycle.subscribe()
    }

    /// The configured or discovered kiln, if known yet.
    pub fn kiln(&self) -> Option<Arc<KilnInfo>> {
        self.inner.kiln.load_full()
    }

    pub fn email(&self) -> &str {
        self.inner.credentials.email()
    }
}

impl<S: TelemetrySource> DataProvider for Coordinator<S> {
    fn current(&self) -> Arc<PollStatus> {
        Coordinator::current(self)
    }

    fn kiln(&self) -> Option<Arc<KilnInfo>> {
        Coordinator::kiln(self)
    }
}

impl<S> Inner<S> {
    /// Store first, then notify; the old status is dropped afterwards.
    fn publish(&self, next: PollStatus) {
        let next = Arc::new(next);
        self.status.store(Arc::clone(&next));
        self.updates.send_replace(next);
    }

    fn mark_finished(&self) {
        *self
            .last_finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    fn finished_recently(&self) -> bool {
        self.last_finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|at| at.elapsed() < self.min_spacing)
    }
}

// ── In-flight guard ──────────────────────────────────────────────────

/// Holds the in-flight flag for the lifetime of one poll. Released on
/// drop, including when the poll future is cancelled mid-request.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ── Background task ──────────────────────────────────────────────────

fn validate_interval(interval: Duration) -> Result<(), CoreError> {
    if interval.is_zero() {
        return Err(CoreError::Config {
            message: "refresh interval must be greater than zero".into(),
        });
    }
    if interval > MAX_INTERVAL {
        return Err(CoreError::Config {
            message: format!(
                "refresh interval must be at most {}s",
                MAX_INTERVAL.as_secs()
            ),
        });
    }
    Ok(())
}

fn ticker(period: Duration, first: Instant) -> Interval {
    let mut interval = tokio::time::interval_at(first, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// First tick of a retuned cycle: one period from now, or as far out as
/// the clock allows.
fn next_deadline(now: Instant, period: Duration) -> Instant {
    now.checked_add(period)
        .or_else(|| now.checked_add(MAX_INTERVAL))
        .unwrap_or(now)
}

/// Marks the coordinator stopped however the poll task ends, including
/// by panic.
struct StoppedOnExit<'a> {
    lifecycle: &'a watch::Sender<Lifecycle>,
}

impl Drop for StoppedOnExit<'_> {
    fn drop(&mut self) {
        self.lifecycle.send_if_modified(|current| {
            let changed = *current != Lifecycle::Stopped;
            *current = Lifecycle::Stopped;
            changed
        });
    }
}

async fn poll_task<S: TelemetrySource>(coordinator: Coordinator<S>, cancel: CancellationToken) {
    let _stopped = StoppedOnExit {
        lifecycle: &coordinator.inner.lifecycle,
    };
    let mut periods = coordinator.inner.interval.subscribe();
    let mut interval = ticker(*periods.borrow_and_update(), Instant::now());

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Ok(()) = periods.changed() => {
                let period = *periods.borrow_and_update();
                debug!(interval_secs = period.as_secs(), "refresh interval changed");
                interval = ticker(period, next_deadline(Instant::now(), period));
            }
            _ = interval.tick() => {
                if coordinator.inner.finished_recently() {
                    debug!("tick skipped: previous poll finished moments ago");
                } else {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        _ = coordinator.poll_once() => {}
                    }
                }
            }
        }
    }

    debug!("poll task exiting");
}
