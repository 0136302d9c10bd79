//! IIIF Streamer - image derivatives from pyramidal and flat sources.
//!
//! This binary wires the configured resolver, processors and cache into an
//! [`ImageService`] and runs one command against it.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::AsyncWrite;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iiif_streamer::{
    config::{Command, Config},
    create_s3_client, FilesystemResolver, ImageService, OperationList, Resolver, S3Resolver,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let service = match build_service(&config).await {
        Ok(service) => service,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match &config.command {
        Command::Render { request, output } => {
            run_render(&service, request, output.as_deref()).await
        }
        Command::Info { identifier } => run_info(&service, identifier).await,
        Command::Compliance { identifier } => run_compliance(&service, identifier).await,
        Command::Purge { identifier } => run_purge(&service, identifier).await,
        Command::Flush => run_flush(&service).await,
        Command::FlushExpired => run_flush_expired(&service).await,
    }
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so rendered images can be written to stdout.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "iiif_streamer=debug"
    } else {
        "iiif_streamer=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn build_service(config: &Config) -> Result<ImageService, String> {
    let resolver: Arc<dyn Resolver> = match (&config.source_root, &config.s3_bucket) {
        (Some(root), _) => {
            info!("Sources: {}", root.display());
            Arc::new(FilesystemResolver::new(root))
        }
        (None, Some(bucket)) => {
            info!(
                "Sources: s3://{}/{}",
                bucket,
                config.s3_prefix.as_deref().unwrap_or("")
            );
            let client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;
            let resolver = S3Resolver::new(client, bucket.as_str());
            match &config.s3_prefix {
                Some(prefix) => Arc::new(resolver.with_prefix(prefix.as_str())),
                None => Arc::new(resolver),
            }
        }
        (None, None) => return Err("no source location configured".to_string()),
    };

    let mut service = ImageService::new(resolver, config.build_registry()?)
        .with_settings(config.service_settings());
    if let Some(cache) = config.build_cache() {
        service = service.with_cache(cache);
    }
    Ok(service)
}

// =============================================================================
// Commands
// =============================================================================

async fn run_render(service: &ImageService, request: &str, output: Option<&Path>) -> ExitCode {
    let ops = match OperationList::parse(request) {
        Ok(ops) => ops,
        Err(e) => {
            error!("{} ({})", e, e.status_code());
            return ExitCode::FAILURE;
        }
    };

    let rendered = match output {
        Some(path) => match tokio::fs::File::create(path).await {
            Ok(mut file) => render_into(service, &ops, &mut file).await,
            Err(e) => {
                error!("Failed to create {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => render_into(service, &ops, &mut tokio::io::stdout()).await,
    };

    if rendered {
        return ExitCode::SUCCESS;
    }
    if let Some(path) = output {
        // Do not leave a truncated image behind.
        let _ = tokio::fs::remove_file(path).await;
    }
    ExitCode::FAILURE
}

async fn render_into<W>(service: &ImageService, ops: &OperationList, sink: &mut W) -> bool
where
    W: AsyncWrite + Unpin + Send,
{
    match service.render_to(ops, sink).await {
        Ok(outcome) => {
            info!(
                "Rendered {} ({}, {} bytes, cache {})",
                ops,
                outcome.media_type,
                outcome.bytes,
                if outcome.cache_hit { "hit" } else { "miss" }
            );
            true
        }
        Err(e) => {
            error!("{} ({})", e, e.status_code());
            false
        }
    }
}

async fn run_info(service: &ImageService, identifier: &str) -> ExitCode {
    let size = match service.get_size(identifier).await {
        Ok(size) => size,
        Err(e) => {
            error!("{} ({})", e, e.status_code());
            return ExitCode::FAILURE;
        }
    };

    let json = serde_json::json!({
        "identifier": identifier,
        "width": size.width,
        "height": size.height,
    });
    match serde_json::to_string_pretty(&json) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize size: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_compliance(service: &ImageService, identifier: &str) -> ExitCode {
    match service.compliance_level(identifier).await {
        Ok(level) => {
            println!("{}", level);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{} ({})", e, e.status_code());
            ExitCode::FAILURE
        }
    }
}

async fn run_purge(service: &ImageService, identifier: &str) -> ExitCode {
    match service.purge(identifier).await {
        Ok(()) => {
            info!("Purged {}", identifier);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Purge failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_flush(service: &ImageService) -> ExitCode {
    match service.flush().await {
        Ok(()) => {
            info!("Cache flushed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Flush failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_flush_expired(service: &ImageService) -> ExitCode {
    match service.flush_expired().await {
        Ok(removed) => {
            info!("Removed {} expired entries", removed);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Flush failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
