use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use talos_mock::amqp::{
    run_consumer, run_heartbeat, AmqpBus, HeartbeatPublisher, LogPublisher, ResultPublisher,
    WirePublisher,
};
use talos_mock::config;
use talos_mock::dispatch::Dispatcher;
use talos_mock::protocol::TaskType;
use talos_mock::scenario::ScenarioSelector;
use talos_mock::simulators::{
    CcSimulator, ConsolidationSimulator, EvaporationSimulator, PhotoSimulator, SetupSimulator,
    SimContext,
};
use talos_mock::world::WorldModel;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "talos_mock=info".into()),
        )
        .init();

    info!("Mock robot worker starting...");

    // Load configuration
    let config_path = std::env::var("MOCK_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let mock_config = config::load_config(&config_path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        config::MockConfig::default()
    });
    info!(
        robot_id = %mock_config.robot_id,
        multiplier = mock_config.behavior.base_delay_multiplier,
        failure_rate = mock_config.behavior.failure_rate,
        timeout_rate = mock_config.behavior.timeout_rate,
        "configuration loaded"
    );

    // Connect to the broker; a failure here is fatal (non-zero exit)
    let bus: Arc<AmqpBus> = Arc::new(
        AmqpBus::connect(&mock_config.amqp)
            .await
            .context("fatal: could not reach the AMQP broker")?,
    );
    let wire: Arc<dyn WirePublisher> = bus.clone();

    // Domain components
    let world = Arc::new(WorldModel::new());
    let scenario = ScenarioSelector::new(&mock_config.behavior);

    let results = ResultPublisher::new(Arc::clone(&wire), &mock_config.robot_id);
    let log = LogPublisher::new(Arc::clone(&wire), &mock_config.robot_id);
    let heartbeats = HeartbeatPublisher::new(Arc::clone(&wire), &mock_config.robot_id);

    let ctx = Arc::new(SimContext::new(
        mock_config.robot_id.clone(),
        mock_config.behavior.clone(),
        Arc::clone(&world),
        log,
    ));

    let mut dispatcher = Dispatcher::new(Arc::clone(&world), scenario, results, ctx);
    let setup = Arc::new(SetupSimulator);
    let photo = Arc::new(PhotoSimulator);
    let cc = Arc::new(CcSimulator);
    let consolidation = Arc::new(ConsolidationSimulator);
    let evaporation = Arc::new(EvaporationSimulator);
    dispatcher.register_simulator(TaskType::SetupCartridges, setup.clone());
    dispatcher.register_simulator(TaskType::SetupTubeRack, setup);
    dispatcher.register_simulator(TaskType::TakePhoto, photo);
    dispatcher.register_simulator(TaskType::StartCc, cc.clone());
    dispatcher.register_simulator(TaskType::TerminateCc, cc);
    dispatcher.register_simulator(TaskType::CollectFractions, consolidation);
    dispatcher.register_simulator(TaskType::StartEvaporation, evaporation);
    let dispatcher = Arc::new(dispatcher);

    let shutdown = CancellationToken::new();

    // Heartbeat loop (background task)
    let heartbeat_handle = tokio::spawn(run_heartbeat(
        Arc::clone(&world),
        heartbeats,
        mock_config.robot_id.clone(),
        mock_config.behavior.heartbeat_interval_seconds,
        shutdown.clone(),
    ));

    // Cancel everything on SIGINT/SIGTERM
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    // Consume commands until shutdown; broker-level failures bubble up
    let (channel, queue_name) = bus
        .command_channel(&mock_config.robot_id, mock_config.amqp.prefetch)
        .await?;
    info!("Mock robot worker ready - waiting for commands...");
    let consume_result = run_consumer(
        channel,
        queue_name,
        Arc::clone(&dispatcher),
        shutdown.clone(),
    )
    .await;

    // Orderly shutdown: stop the beacon, cancel long-running simulations,
    // close the connection
    shutdown.cancel();
    let _ = heartbeat_handle.await;
    dispatcher.shutdown(Duration::from_secs(10)).await;
    if let Err(e) = bus.close().await {
        tracing::warn!(error = %e, "error closing AMQP connection");
    }

    consume_result?;
    info!("Mock robot worker shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
