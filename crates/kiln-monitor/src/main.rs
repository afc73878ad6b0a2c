// kiln-monitor: validates the configured account, polls every kiln on it,
// and logs each sensor reading until interrupted.

use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use kiln_api::KilnClient;
use kiln_core::{Coordinator, DataProvider, KilnSensor, PollState, PollStatus, sensors_for, setup};

const DEFAULT_FILTER: &str = "kiln_monitor=info,kiln_core=info,kiln_api=warn";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    setup_tracing();

    let path = kiln_config::config_path();
    let settings = kiln_config::load_from(&path)
        .wrap_err_with(|| format!("loading settings from {}", path.display()))?;
    let credentials = kiln_config::resolve_credentials(&settings)?;
    let client = KilnClient::new(settings.endpoints()?, &settings.transport())?;

    let info = match setup::validate(&client, &credentials).await {
        Ok(info) => info,
        Err(e) => {
            error!(key = e.key(), error = %e, "setup failed");
            return Err(e.into());
        }
    };
    info!(title = %info.title, kilns = info.kilns.len(), "setup complete");

    let coordinators =
        setup::coordinators_for(&client, &credentials, &settings.coordinator_config(), &info);
    let interval = settings.update_interval();

    let mut reporters = Vec::with_capacity(coordinators.len());
    for coordinator in &coordinators {
        coordinator.start(interval).await?;
        reporters.push(tokio::spawn(report(coordinator.clone())));
    }

    tokio::signal::ctrl_c()
        .await
        .wrap_err("waiting for shutdown signal")?;
    info!("shutting down");

    for coordinator in &coordinators {
        coordinator.stop().await;
    }
    for reporter in reporters {
        reporter.abort();
    }
    Ok(())
}

/// Log to stderr. `KILN_LOG_JSON=1` switches to one JSON object per line.
fn setup_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("KILN_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

/// Follow one coordinator and log what its sensors would show.
async fn report(coordinator: Coordinator) {
    let mut updates = coordinator.subscribe();
    let provider: Arc<dyn DataProvider> = Arc::new(coordinator);
    let sensors = sensors_for(&provider);

    while let Some(status) = updates.changed().await {
        match status.state {
            PollState::Fresh => log_readings(&sensors),
            PollState::Stale => log_stale(&status),
            PollState::Unavailable => warn!(
                error = status.last_error.as_ref().map_or("", |f| f.message.as_str()),
                "no readings available yet"
            ),
            PollState::Uninitialized => {}
        }
    }
}

fn log_readings(sensors: &[KilnSensor]) {
    for sensor in sensors {
        let Some(value) = sensor.native_value() else {
            continue;
        };
        info!(
            sensor = %sensor.name(),
            unique_id = %sensor.unique_id(),
            value = %value,
            unit = sensor.description().unit.unwrap_or_default(),
            "reading"
        );
    }
}

fn log_stale(status: &PollStatus) {
    let age = status
        .age()
        .map(|d| humantime::format_duration(Duration::from_secs(d.as_secs())).to_string())
        .unwrap_or_default();
    warn!(
        age = %age,
        consecutive_failures = status.consecutive_failures,
        error = status.last_error.as_ref().map_or("", |f| f.message.as_str()),
        "serving stale readings"
    );
}
