//! Service wiring: the clinic database (in-process, or written through to
//! Postgres when `DATABASE_URL` is set), the system clock, and the
//! notification bus every committed operation publishes to.

use std::sync::Arc;
use std::thread;

use anyhow::Context;
use tracing::{info, warn};

use clinicflow_core::SystemClock;
use clinicflow_events::{EventBus, InMemoryEventBus};
use clinicflow_infra::{
    ClinicEvent, ClinicServices, Database, DurableStore, PostgresConfig, PostgresStore, ServiceError,
    ServiceResult,
};

use crate::config::ApiConfig;

pub type ClinicBus = Arc<InMemoryEventBus<ClinicEvent>>;

pub type AppServices = ClinicServices<ClinicBus>;

pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let database = match &config.database {
        Some(postgres) => open_postgres(postgres).await?,
        None => {
            info!("DATABASE_URL not set; clinic state is kept in memory only");
            Database::new()
        }
    };
    Ok(services_over(database, config))
}

/// Services over an in-process database, for tests and local runs.
pub fn build_in_memory_services(config: &ApiConfig) -> AppServices {
    services_over(Database::new(), config)
}

fn services_over(database: Database, config: &ApiConfig) -> AppServices {
    let bus: ClinicBus = Arc::new(InMemoryEventBus::new());
    spawn_notification_log(&bus);
    ClinicServices::new(
        Arc::new(database),
        Arc::new(SystemClock),
        bus,
        config.workflow.clone(),
    )
}

async fn open_postgres(config: &PostgresConfig) -> anyhow::Result<Database> {
    let store = PostgresStore::connect(config)
        .await
        .context("failed to connect to Postgres")?;
    let durable: Arc<dyn DurableStore> = Arc::new(store);
    // Loading blocks on the pool.
    let database = tokio::task::spawn_blocking(move || Database::open(durable))
        .await
        .context("clinic state loader panicked")?
        .context("failed to load clinic state from Postgres")?;
    info!("clinic state backed by Postgres");
    Ok(database)
}

/// Run a workflow call on the blocking pool.
///
/// Services take the store lock, retry on conflicts and may wait on Postgres,
/// so they never run on an async worker thread.
pub async fn run<T, F>(services: &Arc<AppServices>, call: F) -> ServiceResult<T>
where
    T: Send + 'static,
    F: FnOnce(&AppServices) -> ServiceResult<T> + Send + 'static,
{
    let services = Arc::clone(services);
    tokio::task::spawn_blocking(move || call(&services))
        .await
        .unwrap_or_else(|e| Err(ServiceError::Aborted(e.to_string())))
}

/// Log every committed event as a dispatched notification.
///
/// Runs on its own thread for the life of the bus.
fn spawn_notification_log(bus: &ClinicBus) {
    let subscription = bus.subscribe();
    let spawned = thread::Builder::new()
        .name("clinic-notifications".to_string())
        .spawn(move || {
            while let Ok(envelope) = subscription.recv() {
                info!(
                    event_type = envelope.event_type(),
                    subject_id = %envelope.subject_id(),
                    "notification dispatched"
                );
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "notification log not started");
    }
}
