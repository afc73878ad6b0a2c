#![allow(clippy::unwrap_used, clippy::float_cmp)]
// Coordinator tests: a scripted in-memory source under paused time for
// scheduling behavior, and wiremock for the full client path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use secrecy::SecretString;
use serde_json::json;
use tokio::time::sleep;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kiln_api::{Credentials, Endpoints, KilnClient, KilnInfo, RawPayload, SessionToken};
use kiln_core::setup::{self, SetupError};
use kiln_core::{
    Coordinator, CoordinatorConfig, CoreError, DataProvider, FailureKind, Lifecycle, MAX_INTERVAL,
    PollState, SensorKind, SensorValue, TelemetrySource, sensors_for,
};

// ── Scripted source ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Step {
    Reading(f64, &'static str),
    Expired,
    Unreachable,
}

#[derive(Default)]
struct Script {
    steps: Mutex<VecDeque<Step>>,
    kilns: Vec<KilnInfo>,
    reject_login: bool,
    fetch_delay: Duration,
    logins: AtomicUsize,
    listings: AtomicUsize,
    fetches: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[derive(Clone)]
struct Scripted(Arc<Script>);

impl Scripted {
    fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self::with(Script {
            steps: Mutex::new(steps.into_iter().collect()),
            kilns: vec![studio_kiln()],
            ..Script::default()
        })
    }

    fn with(script: Script) -> Self {
        Self(Arc::new(script))
    }

    fn logins(&self) -> usize {
        self.0.logins.load(Ordering::SeqCst)
    }

    fn fetches(&self) -> usize {
        self.0.fetches.load(Ordering::SeqCst)
    }
}

impl TelemetrySource for Scripted {
    async fn authenticate(&self, credentials: &Credentials) -> Result<SessionToken, kiln_api::Error> {
        let n = self.0.logins.fetch_add(1, Ordering::SeqCst) + 1;
        if self.0.reject_login {
            return Err(kiln_api::Error::Authentication {
                message: "invalid credentials".into(),
            });
        }
        Ok(SessionToken::new(credentials.email(), format!("tok-{n}")))
    }

    async fn list_kilns(&self, _token: &SessionToken) -> Result<Vec<KilnInfo>, kiln_api::Error> {
        self.0.listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.0.kilns.clone())
    }

    async fn fetch_status(
        &self,
        _token: &SessionToken,
        _kiln_id: &str,
    ) -> Result<RawPayload, kiln_api::Error> {
        self.0.fetches.fetch_add(1, Ordering::SeqCst);
        let now_active = self.0.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.max_active.fetch_max(now_active, Ordering::SeqCst);

        if !self.0.fetch_delay.is_zero() {
            sleep(self.0.fetch_delay).await;
        }

        self.0.active.fetch_sub(1, Ordering::SeqCst);
        let step = self.0.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reading(temperature, status)) => Ok(payload(temperature, status)),
            Some(Step::Expired) => Err(kiln_api::Error::SessionExpired),
            Some(Step::Unreachable) | None => Err(kiln_api::Error::Server { status: 503 }),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn credentials() -> Credentials {
    Credentials::new("potter@example.com", SecretString::from("glaze".to_string()))
}

fn studio_kiln() -> KilnInfo {
    KilnInfo {
        kiln_id: "k-1".into(),
        serial_number: Some("SN-100".into()),
        name: "Studio".into(),
    }
}

fn payload(temperature: f64, status: &str) -> RawPayload {
    RawPayload::new(json!({
        "list": { "temperature": temperature, "kilnStatus": status },
        "settings": { "firmwareVersion": "1.2.3", "numFirings": 5, "numZones": 3 }
    }))
}

fn coordinator(source: &Scripted) -> Coordinator<Scripted> {
    Coordinator::new(source.clone(), credentials(), CoordinatorConfig::default())
}

// ── Scheduling ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_stale_snapshot_served_until_next_success() {
    let source = Scripted::new([
        Step::Reading(212.0, "firing"),
        Step::Unreachable,
        Step::Reading(1800.0, "cooling"),
    ]);
    let coord = coordinator(&source);
    coord.start(Duration::from_secs(60)).await.unwrap();

    // t=1: first poll ran immediately
    sleep(Duration::from_secs(1)).await;
    let status = coord.current();
    assert_eq!(status.state, PollState::Fresh);
    let snap = status.snapshot.clone().unwrap();
    assert_eq!(snap.temperature, 212.0);
    assert_eq!(snap.status, "firing");
    assert_eq!(snap.firmware_version, "1.2.3");
    assert_eq!((snap.firing_count, snap.zone_count), (5, 3));
    assert!(!status.last_poll_failed());

    // t=61: second poll failed, t=0 values still served
    sleep(Duration::from_secs(60)).await;
    let status = coord.current();
    assert_eq!(status.state, PollState::Stale);
    assert!(Arc::ptr_eq(status.snapshot.as_ref().unwrap(), &snap));
    assert_eq!(
        status.last_error.as_ref().map(|f| f.kind),
        Some(FailureKind::Network)
    );
    assert_eq!(status.consecutive_failures, 1);

    // t=121: recovered
    sleep(Duration::from_secs(60)).await;
    let status = coord.current();
    assert_eq!(status.state, PollState::Fresh);
    let snap = status.snapshot.clone().unwrap();
    assert_eq!(snap.temperature, 1800.0);
    assert_eq!(snap.status, "cooling");
    assert!(status.last_error.is_none());
    assert_eq!(status.consecutive_failures, 0);

    coord.stop().await;
    assert_eq!(source.fetches(), 3);
    assert_eq!(source.logins(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_polls_never_overlap() {
    let source = Scripted::with(Script {
        steps: Mutex::new(std::iter::repeat_n(Step::Reading(900.0, "firing"), 10).collect()),
        kilns: vec![studio_kiln()],
        fetch_delay: Duration::from_secs(90),
        ..Script::default()
    });
    let coord = coordinator(&source);
    coord.start(Duration::from_secs(60)).await.unwrap();

    // Polls start at t=0, t=120 and t=240; the late tick at t=90 and
    // t=210 lands right after a poll finished and is skipped.
    sleep(Duration::from_secs(300)).await;
    coord.stop().await;

    assert_eq!(source.0.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(source.fetches(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_manual_poll_during_flight_is_rejected() {
    let source = Scripted::with(Script {
        steps: Mutex::new([Step::Reading(500.0, "heating")].into()),
        kilns: vec![studio_kiln()],
        fetch_delay: Duration::from_secs(30),
        ..Script::default()
    });
    let coord = coordinator(&source);

    let running = tokio::spawn({
        let coord = coord.clone();
        async move { coord.poll_once().await }
    });
    sleep(Duration::from_secs(1)).await;

    let result = coord.poll_once().await;
    assert!(
        matches!(result, Err(CoreError::PollInFlight)),
        "expected PollInFlight, got: {result:?}"
    );
    assert_eq!(coord.current().state, PollState::Uninitialized);

    let first = running.await.unwrap().unwrap();
    assert_eq!(first.temperature, 500.0);
    assert_eq!(source.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_aborts_in_flight_poll_and_is_idempotent() {
    let source = Scripted::with(Script {
        steps: Mutex::new([Step::Reading(70.0, "idle")].into()),
        kilns: vec![studio_kiln()],
        fetch_delay: Duration::from_secs(30),
        ..Script::default()
    });
    let coord = coordinator(&source);
    let lifecycle = coord.lifecycle();
    assert_eq!(*lifecycle.borrow(), Lifecycle::Idle);

    coord.start(Duration::from_secs(60)).await.unwrap();
    assert_eq!(*lifecycle.borrow(), Lifecycle::Running);
    let again = coord.start(Duration::from_secs(60)).await;
    assert!(
        matches!(again, Err(CoreError::AlreadyRunning)),
        "expected AlreadyRunning, got: {again:?}"
    );

    sleep(Duration::from_secs(5)).await;
    coord.stop().await;
    coord.stop().await;
    assert_eq!(*lifecycle.borrow(), Lifecycle::Stopped);

    // The aborted poll published nothing and released the in-flight flag.
    assert_eq!(coord.current().state, PollState::Uninitialized);
    sleep(Duration::from_secs(120)).await;
    assert_eq!(source.fetches(), 1);

    let snap = coord.poll_once().await.unwrap();
    assert_eq!(snap.status, "idle");

    coord.start(Duration::from_secs(60)).await.unwrap();
    assert_eq!(*lifecycle.borrow(), Lifecycle::Running);
    coord.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_set_interval_retunes_running_cycle() {
    let source = Scripted::new(std::iter::repeat_n(Step::Reading(100.0, "idle"), 5));
    let coord = coordinator(&source);
    coord.start(Duration::from_secs(600)).await.unwrap();

    sleep(Duration::from_secs(1)).await;
    assert_eq!(source.fetches(), 1);

    coord.set_interval(Duration::from_secs(10)).unwrap();
    assert_eq!(coord.interval(), Duration::from_secs(10));
    sleep(Duration::from_secs(12)).await;
    assert_eq!(source.fetches(), 2);

    assert!(matches!(
        coord.set_interval(Duration::ZERO),
        Err(CoreError::Config { .. })
    ));
    coord.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_oversized_interval_is_rejected_and_cycle_keeps_running() {
    let source = Scripted::new(std::iter::repeat_n(Step::Reading(100.0, "idle"), 20));
    let coord = coordinator(&source);
    coord.start(Duration::from_secs(60)).await.unwrap();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(source.fetches(), 1);

    assert!(matches!(
        coord.set_interval(Duration::MAX),
        Err(CoreError::Config { .. })
    ));
    assert_eq!(coord.interval(), Duration::from_secs(60));

    coord.set_interval(MAX_INTERVAL).unwrap();
    sleep(Duration::from_secs(1)).await;
    coord.set_interval(Duration::from_secs(60)).unwrap();
    sleep(Duration::from_secs(600)).await;

    assert!(
        source.fetches() >= 10,
        "cycle stalled after {} fetches",
        source.fetches()
    );
    assert_eq!(*coord.lifecycle().borrow(), Lifecycle::Running);
    coord.stop().await;
    assert_eq!(*coord.lifecycle().borrow(), Lifecycle::Stopped);
}

// ── Re-authentication ───────────────────────────────────────────────

#[tokio::test]
async fn test_single_expiry_reauthenticates_and_succeeds() {
    let source = Scripted::new([Step::Expired, Step::Reading(212.0, "firing")]);
    let coord = coordinator(&source);

    let snap = coord.poll_once().await.unwrap();
    assert_eq!(snap.temperature, 212.0);
    assert_eq!(source.logins(), 2);
    assert_eq!(source.fetches(), 2);
    assert_eq!(coord.current().state, PollState::Fresh);
}

#[tokio::test]
async fn test_repeated_expiry_fails_without_looping() {
    let source = Scripted::new([Step::Expired, Step::Expired, Step::Reading(212.0, "firing")]);
    let coord = coordinator(&source);

    let result = coord.poll_once().await;
    assert!(
        matches!(result, Err(CoreError::SessionExpired)),
        "expected SessionExpired, got: {result:?}"
    );
    assert_eq!(source.logins(), 2);
    assert_eq!(source.fetches(), 2);

    let status = coord.current();
    assert_eq!(status.state, PollState::Unavailable);
    assert!(status.snapshot.is_none());
    assert_eq!(
        status.last_error.as_ref().map(|f| f.kind),
        Some(FailureKind::AuthExpired)
    );

    // Next scheduled poll starts from a fresh login.
    coord.poll_once().await.unwrap();
    assert_eq!(source.logins(), 3);
}

#[tokio::test]
async fn test_rejected_login_is_auth_failure() {
    let source = Scripted::with(Script {
        reject_login: true,
        kilns: vec![studio_kiln()],
        ..Script::default()
    });
    let coord = coordinator(&source);

    let result = coord.poll_once().await;
    assert!(
        matches!(result, Err(CoreError::AuthenticationFailed { .. })),
        "expected AuthenticationFailed, got: {result:?}"
    );
    assert_eq!(
        coord.current().last_error.as_ref().map(|f| f.kind),
        Some(FailureKind::Auth)
    );
    assert_eq!(source.fetches(), 0);
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_kiln_is_discovered_once() {
    let source = Scripted::new([Step::Reading(70.0, "idle"), Step::Reading(71.0, "idle")]);
    let coord = coordinator(&source);
    assert!(coord.kiln().is_none());

    coord.poll_once().await.unwrap();
    coord.poll_once().await.unwrap();

    assert_eq!(coord.kiln().map(|k| k.kiln_id.clone()).as_deref(), Some("k-1"));
    assert_eq!(source.0.listings.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_account_is_protocol_failure() {
    let source = Scripted::with(Script::default());
    let coord = coordinator(&source);

    let result = coord.poll_once().await;
    assert!(
        matches!(result, Err(CoreError::NoKilns { .. })),
        "expected NoKilns, got: {result:?}"
    );
    assert_eq!(
        coord.current().last_error.as_ref().map(|f| f.kind),
        Some(FailureKind::Protocol)
    );
}

// ── Readers ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_subscribers_see_every_publish() {
    let source = Scripted::new([Step::Reading(300.0, "heating"), Step::Unreachable]);
    let coord = coordinator(&source);
    let mut updates = coord.subscribe();
    assert_eq!(coord.current().state, PollState::Uninitialized);

    coord.poll_once().await.unwrap();
    let status = updates.changed().await.unwrap();
    assert_eq!(status.state, PollState::Fresh);

    let _ = coord.poll_once().await;
    let mut stream = updates.into_stream();
    let status = stream.next().await.unwrap();
    assert_eq!(status.state, PollState::Stale);
}

#[tokio::test]
async fn test_sensors_read_through_data_provider() {
    let source = Scripted::new([Step::Reading(1220.5, "firing")]);
    let coord = coordinator(&source);
    let provider: Arc<dyn DataProvider> = Arc::new(coord.clone());
    let sensors = sensors_for(&provider);
    assert!(sensors.iter().all(|s| !s.available()));

    coord.poll_once().await.unwrap();

    let temperature = sensors
        .iter()
        .find(|s| s.description().kind == SensorKind::Temperature)
        .unwrap();
    assert_eq!(temperature.native_value(), Some(SensorValue::Float(1220.5)));
    assert_eq!(temperature.name(), "Studio Temperature");
    assert_eq!(temperature.unique_id(), "SN-100_temperature");
    assert!(sensors.iter().all(|s| s.available()));
}

// ── Setup ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_setup_rejects_bad_credentials() {
    let source = Scripted::with(Script {
        reject_login: true,
        ..Script::default()
    });

    let result = setup::validate(&source, &credentials()).await;
    assert!(
        matches!(result, Err(SetupError::InvalidAuth)),
        "expected InvalidAuth, got: {result:?}"
    );
}

#[tokio::test]
async fn test_setup_session_is_reused_by_coordinators() {
    let source = Scripted::new([Step::Reading(70.0, "idle")]);
    let info = setup::validate(&source, &credentials()).await.unwrap();
    assert_eq!(info.title, "Kiln Monitor (potter@example.com)");
    assert_eq!(info.kilns.len(), 1);

    let coords = setup::coordinators_for(
        &source,
        &credentials(),
        &CoordinatorConfig::default(),
        &info,
    );
    assert_eq!(coords.len(), 1);
    coords[0].poll_once().await.unwrap();

    assert_eq!(source.logins(), 1);
    assert_eq!(source.0.listings.load(Ordering::SeqCst), 1);
}

// ── End to end over HTTP ────────────────────────────────────────────

async fn mount_login(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "authentication_token": "tok-1" })),
        )
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_settings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/kilns/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "kiln_id": "k-1", "serial_number": "SN-100", "name": "Studio" }
        ])))
        .mount(server)
        .await;
}

fn http_coordinator(server: &MockServer) -> Coordinator {
    let endpoints = Endpoints::from_base(&server.uri()).unwrap();
    let client = KilnClient::with_client(reqwest::Client::new(), endpoints);
    Coordinator::new(client, credentials(), CoordinatorConfig::default())
}

#[tokio::test]
async fn test_http_poll_publishes_snapshot() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_settings(&server).await;
    Mock::given(method("POST"))
        .and(path("/kilns/data"))
        .and(header("auth-token", "binst-cookie=tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "list": { "temperature": "1850", "kilnStatus": "Firing" },
            "settings": { "firmwareVersion": "2.0.1", "numFirings": "41", "numZones": 3 }
        }])))
        .mount(&server)
        .await;

    let coord = http_coordinator(&server);
    let snap = coord.poll_once().await.unwrap();

    assert_eq!(snap.temperature, 1850.0);
    assert_eq!(snap.firing_count, 41);
    assert_eq!(coord.kiln().map(|k| k.name.clone()).as_deref(), Some("Studio"));
}

#[tokio::test]
async fn test_http_expired_session_relogs_once() {
    let server = MockServer::start().await;
    mount_login(&server, 2).await;
    mount_settings(&server).await;
    Mock::given(method("POST"))
        .and(path("/kilns/data"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/kilns/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "list": { "temperature": 212, "kilnStatus": "Idle" },
            "settings": { "firmwareVersion": "2.0.1", "numFirings": 41, "numZones": 3 }
        }])))
        .mount(&server)
        .await;

    let coord = http_coordinator(&server);
    let snap = coord.poll_once().await.unwrap();
    assert_eq!(snap.status, "Idle");
}

#[tokio::test]
async fn test_http_outage_keeps_last_snapshot() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_settings(&server).await;
    Mock::given(method("POST"))
        .and(path("/kilns/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "list": { "temperature": 640, "kilnStatus": "Firing" },
            "settings": { "firmwareVersion": "2.0.1", "numFirings": 41, "numZones": 3 }
        }])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/kilns/data"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let coord = http_coordinator(&server);
    coord.poll_once().await.unwrap();
    let result = coord.poll_once().await;
    assert!(
        matches!(result, Err(CoreError::ConnectionFailed { .. })),
        "expected ConnectionFailed, got: {result:?}"
    );

    let status = coord.current();
    assert_eq!(status.state, PollState::Stale);
    assert_eq!(status.snapshot.as_ref().map(|s| s.temperature), Some(640.0));
}

#[tokio::test]
async fn test_http_malformed_payload_is_protocol_failure() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_settings(&server).await;
    Mock::given(method("POST"))
        .and(path("/kilns/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "list": { "temperature": 640, "kilnStatus": "Firing" },
            "settings": { "firmwareVersion": "2.0.1", "numFirings": 41, "numZones": 3 }
        }])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/kilns/data"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>Scheduled maintenance</body></html>"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/kilns/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "list": { "kilnStatus": "Firing" },
            "settings": { "firmwareVersion": "2.0.1", "numFirings": 41, "numZones": 3 }
        }])))
        .mount(&server)
        .await;

    let coord = http_coordinator(&server);
    let good = coord.poll_once().await.unwrap();

    for _ in 0..2 {
        let result = coord.poll_once().await;
        assert!(
            matches!(result, Err(CoreError::Protocol { .. })),
            "expected Protocol, got: {result:?}"
        );

        let status = coord.current();
        assert_eq!(status.state, PollState::Stale);
        assert!(Arc::ptr_eq(status.snapshot.as_ref().unwrap(), &good));
        assert_eq!(
            status.last_error.as_ref().map(|f| f.kind),
            Some(FailureKind::Protocol)
        );
    }
    assert_eq!(coord.current().consecutive_failures, 2);
}

#[tokio::test]
async fn test_transport_timeout_is_network_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let err = client
        .get(format!("{}/slow", server.uri()))
        .send()
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let core = CoreError::from(kiln_api::Error::Transport(err));
    match &core {
        CoreError::ConnectionFailed { reason } => assert!(reason.starts_with("timed out")),
        other => panic!("expected ConnectionFailed, got: {other:?}"),
    }
    assert_eq!(core.kind(), Some(FailureKind::Network));
}
