//! clinicsync-client CLI entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinicsync_client::cli::{Cli, Commands, OutputFormat};
use clinicsync_client::output::{format_output, pretty};
use clinicsync_client::{
    Config, Evictor, EvictorSettings, FileStateStorage, HttpTransport, MutationCoordinator,
    Persister, Prefetcher, QueryClient, QueryClientOptions, RefreshScheduler, TokioTimer,
};
use clinicsync_core::cache::{collection_key, entity_key, list_key, QueryKey};
use clinicsync_core::clock::SystemClock;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if cli.quiet {
                    "clinicsync_client=warn".into()
                } else {
                    "clinicsync_client=info".into()
                }
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config {
        base_url: cli.base_url.clone(),
        ..Config::from_env()
    };
    let transport = Arc::new(HttpTransport::new(&config.base_url));
    let client = QueryClient::with_clock(
        transport.clone(),
        Arc::new(SystemClock),
        QueryClientOptions::from(&config),
    );
    let persister = config
        .persist_path
        .as_ref()
        .map(|path| Persister::new(client.clone(), Arc::new(FileStateStorage::new(path))));
    if let Some(persister) = &persister {
        persister.restore().await?;
    }

    match cli.command {
        Commands::Get {
            class,
            id,
            collection,
            prefetch,
        } => {
            let key = match (id.as_deref(), collection) {
                (None, _) => list_key(class),
                (Some(id), None) => entity_key(class, id),
                (Some(id), Some(collection)) => collection_key(class, id, collection),
            };
            let data = client.read(&key).await?;
            print_record(&key, &data, cli.format);
            if let (true, Some(id)) = (prefetch, id.as_deref()) {
                let report = Prefetcher::new(client.clone()).on_navigate(class, id).await;
                tracing::info!(
                    fetched = report.fetched.len(),
                    failed = report.failed.len(),
                    "Prefetched related data"
                );
            }
        }
        Commands::Update { class, id, patch } => {
            let coordinator = MutationCoordinator::new(client.clone(), transport.clone());
            let data = coordinator.update(class, &id, patch).await?;
            if !cli.quiet {
                print_record(&entity_key(class, &id), &data, cli.format);
            }
        }
        Commands::Create { class, body } => {
            let coordinator = MutationCoordinator::new(client.clone(), transport.clone());
            let data = coordinator.create(class, body).await?;
            let id = data
                .get("id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("?");
            print_record(&entity_key(class, id), &data, cli.format);
        }
        Commands::Delete { class, id } => {
            let coordinator = MutationCoordinator::new(client.clone(), transport.clone());
            coordinator.delete(class, &id).await?;
            if !cli.quiet {
                println!("Deleted {} {}", class, id);
            }
        }
        Commands::Watch { class, id, every } => {
            let key = entity_key(class, &id);
            let _observer = client.observe(key.clone());
            client.read(&key).await?;

            let timer = Arc::new(TokioTimer);
            let scheduler = RefreshScheduler::new(Arc::new(client.clone()), timer.clone());
            scheduler.start();
            let evictor = Arc::new(Evictor::new(
                client.clone(),
                EvictorSettings::from(&config),
                timer,
            ));
            evictor.start();

            if !cli.quiet {
                println!("Watching {}... (Ctrl+C to stop)", key);
            }
            let mut ticker = tokio::time::interval(Duration::from_secs(every.max(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Some(data) = client.peek(&key).data() {
                            print_record(&key, data, cli.format);
                        }
                    }
                    _ = signal::ctrl_c() => break,
                }
            }
            scheduler.stop();
            evictor.stop();
        }
        Commands::Stats => {
            let evictor = Evictor::new(
                client.clone(),
                EvictorSettings::from(&config),
                Arc::new(TokioTimer),
            );
            let report = evictor.run_once();
            let stats = client.stats();
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    format_output(
                        &serde_json::json!({ "stats": stats, "cleanup": report }),
                        cli.format
                    )
                ),
                OutputFormat::Pretty => {
                    println!("{}", pretty::format_stats(&stats));
                    println!("{}", pretty::format_cleanup(&report));
                }
            }
        }
        Commands::Clear => {
            if let Some(persister) = &persister {
                persister.clear().await?;
            }
            if !cli.quiet {
                println!("Cleared persisted cache state");
            }
            return Ok(());
        }
    }

    if let Some(persister) = &persister {
        persister.save().await?;
    }
    Ok(())
}

fn print_record(key: &QueryKey, data: &serde_json::Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", format_output(data, format)),
        OutputFormat::Pretty => println!("{}", pretty::format_record(key, data)),
    }
}
