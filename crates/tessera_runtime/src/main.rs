//! Tessera Runtime
//!
//! Boots the lifecycle services from a settings file (first argument, or
//! defaults) and runs until interrupted.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tessera_core::Namespace;
use tessera_services::{Services, Settings};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("Tessera v{}", tessera_core::VERSION);
    let settings = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => Settings::load(&path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => {
            tracing::info!("no settings file given, using defaults");
            Settings::default()
        }
    };

    let services = Services::start(&settings).context("starting services")?;
    for name in &settings.property_bags {
        match Namespace::from_name(name) {
            Some(ns) => {
                services.host_property_bag(ns);
            }
            None => tracing::warn!(namespace = %name, "unknown namespace in settings"),
        }
    }
    tracing::info!(
        metrics = tessera_metrics::ENABLED,
        namespaces = ?services.plugins.namespaces(),
        "runtime ready"
    );

    wait_for_interrupt()?;

    if settings.report_metrics {
        services.report_metrics();
    }
    services.shutdown();
    Ok(())
}

fn wait_for_interrupt() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("waiting for interrupt")?;
    tracing::info!("interrupt received, shutting down");
    Ok(())
}
