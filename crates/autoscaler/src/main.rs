//! Node autoscaler
//!
//! Polls cluster usage, keeps an hourly history, serves it over HTTP and
//! provisions a new worker when the cluster runs hot. Run a single instance
//! per cluster: two loops would provision twice.

use anyhow::{Context, Result};
use node_autoscaler::{api, config::AutoscalerConfig};
use scaler_lib::{
    clock::{Clock, SystemClock},
    control::ControlLoopBuilder,
    health::HealthRegistry,
    metrics::{HttpMetricsSource, MetricsQueryService},
    observability::{ScalerMetrics, StructuredLogger},
    provisioning::{
        AnsibleBootstrapper, CreateRequest, DigitalOceanProvider, HostRegistry, PollSettings,
        ProvisioningController,
    },
    scaling::ScalingPolicy,
    store::RedbSampleStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AUTOSCALER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

fn build_provisioner(
    config: &AutoscalerConfig,
    clock: Arc<dyn Clock>,
    logger: StructuredLogger,
) -> Result<ProvisioningController> {
    let token = config.provider.token.clone().unwrap_or_default();
    let provider = DigitalOceanProvider::new(&config.provider.api_url, token, PROVIDER_TIMEOUT)?;

    let bootstrapper = AnsibleBootstrapper::new(
        config.provisioning.ansible_binary.clone(),
        config.provisioning.hosts_file.clone(),
        config.provisioning.playbooks.clone(),
    );

    let template = CreateRequest::template(
        config.provider.region.clone(),
        config.provider.size.clone(),
        config.provider.image_id,
        config.provider.ssh_key_ids.clone(),
        config.provider.private_networking,
    );

    Ok(ProvisioningController::new(
        Arc::new(provider),
        HostRegistry::new(&config.provisioning.hosts_file),
        Arc::new(bootstrapper),
        clock,
        template,
    )
    .with_poll_settings(PollSettings {
        interval: config.status_interval(),
        attempt_budget: config.provisioning.attempt_budget,
    })
    .with_logger(logger))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting node-autoscaler");

    let config = match AutoscalerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Refusing to start");
            return Err(e.into());
        }
    };
    info!(
        api_port = config.api_port,
        store = %config.store_path.display(),
        scaling_enabled = config.scaling.enabled,
        "Autoscaler configured"
    );

    let store = Arc::new(
        RedbSampleStore::open(&config.store_path)
            .with_context(|| format!("Failed to open store at {}", config.store_path.display()))?,
    );
    let source = Arc::new(HttpMetricsSource::new(
        &config.metrics_source.base_url,
        config.source_timeout(),
    )?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = ScalerMetrics::new();
    let logger = StructuredLogger::new(
        std::env::var("HOSTNAME").unwrap_or_else(|_| "node-autoscaler".to_string()),
    );
    logger.log_startup(AUTOSCALER_VERSION, config.scaling.enabled);

    let mut builder = ControlLoopBuilder::new()
        .source(source)
        .store(store.clone())
        .clock(clock.clone())
        .interval(config.poll_interval())
        .policy(ScalingPolicy::new(
            config.scaling.cpu_threshold,
            config.scaling.mem_threshold,
        ))
        .scaling_enabled(config.scaling.enabled)
        .health(health_registry.clone())
        .metrics(metrics.clone())
        .logger(logger.clone());
    if config.scaling.enabled {
        builder = builder.provisioner(build_provisioner(&config, clock.clone(), logger.clone())?);
    }
    let control = builder.build()?;

    let query = Arc::new(MetricsQueryService::new(store, clock));
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        query,
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let control_handle = tokio::spawn(control.run(shutdown_tx.subscribe()));

    let mut api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    control_handle.await?;
    api_handle.await??;

    info!("Shutdown complete");
    Ok(())
}
