use std::sync::Arc;

use clap::Parser;

#[derive(Parser)]
#[command(name = "sluice-server", about = "Kafka to Cassandra ingestion server")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, default_value = "config.toml", env = "SLUICE_CONFIG")]
    config: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!(config = %cli.config, "loading configuration");
    let config = match sluice_engine::config::SluiceConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let source = Arc::new(source_kafka::KafkaSource::new(
        &config.source.brokers,
        &config.source.topic,
        config.source.poll_timeout(),
    ));

    tracing::info!(nodes = ?config.sink.nodes, "connecting to sink");
    let sink = match sink_cassandra::CassandraSink::connect(
        &config.sink.nodes,
        &config.sink.keyspace,
        &config.sink.table,
        config.sink.replication_factor,
    )
    .await
    {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to sink");
            std::process::exit(1);
        }
    };

    tracing::info!(
        brokers = %config.source.brokers,
        topic = %config.source.topic,
        "bootstrapping engine"
    );
    let engine = match sluice_engine::engine::Engine::bootstrap(&config, source, sink).await {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "failed to bootstrap engine");
            std::process::exit(1);
        }
    };

    tracing::info!(
        partitions = engine.partition_count(),
        "sluice-server started, press Ctrl+C to stop"
    );

    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to register SIGTERM handler");
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down...");
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received, shutting down...");
        }
    }

    engine.shutdown().await;
}
