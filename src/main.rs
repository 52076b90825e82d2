use audit_log_collector::monitoring::{EventReporter, PollEventType};
use audit_log_collector::writer::{spawn_consumer, TempFileWriter};
use audit_log_collector::{
    queue, Cli, CollectorConfig, CollectorError, DirectorySink, FileCheckpointStore,
    HttpLogClient, LogFetcher, LogPoller, PollerConfig,
};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const NOISY_CRATES: &str = "hyper=off,reqwest=warn";

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose {
            "audit_log_collector=debug"
        } else {
            "info"
        };
        EnvFilter::new(format!("{level},{NOISY_CRATES}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            init_logging(verbose);
            error!(stage = e.stage(), error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    init_logging(config.verbose);

    match run(config).await {
        Ok(()) => {
            info!("Shutting down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(stage = e.stage(), error = %e, "Collector stopped");
            ExitCode::FAILURE
        }
    }
}

/// Wire the components together and supervise the poll loop and the writer
/// task. Returns `Ok` only on Ctrl-C.
async fn run(config: CollectorConfig) -> Result<(), CollectorError> {
    info!(
        domain = %config.domain,
        schedule = ?config.schedule,
        state_path = %config.state_path.display(),
        output_dir = %config.output_dir.display(),
        "Starting audit log collector"
    );

    let (reporter, events) = EventReporter::new(&config.monitoring);
    if let Some(mut events) = events {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event.event_type {
                    PollEventType::RateLimited { attempt, delay } => {
                        warn!(attempt = attempt, delay = ?delay, "Rate limited")
                    }
                    other => info!(event = ?other, "Poll event"),
                }
            }
        });
    }

    let client = HttpLogClient::from_config(&config)?.with_reporter(reporter.clone());
    let fetcher = LogFetcher::new(client, config.page_limit).with_reporter(reporter.clone());
    let store = FileCheckpointStore::new(&config.state_path);
    let sink = DirectorySink::new(&config.output_dir);

    let writer = TempFileWriter::new(&config.tmp_dir)
        .await
        .map_err(CollectorError::TempFile)?
        .shared();
    let (producer, consumer) = queue::bounded(config.queue_capacity);
    let mut consumer_handle = spawn_consumer(consumer, writer.clone());

    let poller = LogPoller::new(
        PollerConfig::from(&config),
        fetcher,
        store,
        sink,
        writer,
        producer,
    )
    .with_reporter(reporter);

    tokio::select! {
        result = poller.run() => result,
        joined = &mut consumer_handle => {
            // The consumer only ends on its own after a write failure
            joined??;
            Err(CollectorError::Consumer("event consumer exited unexpectedly".to_string()))
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| CollectorError::Other(e.into()))?;
            info!("Received Ctrl-C");
            Ok(())
        }
    }
}
