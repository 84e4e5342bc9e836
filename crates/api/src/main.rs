use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use cmsgate_api::config::{AppConfig, DEFAULT_CONFIG_PATH};
use cmsgate_auth::CredentialStore;
use cmsgate_infra::InMemoryCredentialStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cmsgate_observability::init();

    let config_path =
        std::env::var("CMSGATE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {config_path}"))?;

    if !config.auth.cookie_secure {
        tracing::warn!("session cookie is not marked Secure; use only for local development");
    }

    let store = credential_store(&config).await?;
    let bind_addr = config.bind_addr.clone();

    let state = cmsgate_api::app::build_services(config, store)
        .await
        .context("failed to build application")?;
    let _reaper = cmsgate_api::app::spawn_session_reaper(&state);
    let app = cmsgate_api::app::router_with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}

#[cfg(feature = "postgres")]
async fn credential_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
    if let Some(url) = &config.database_url {
        let store = cmsgate_infra::PostgresCredentialStore::connect(url)
            .await
            .context("failed to connect to postgres")?;
        tracing::info!("using postgres credential store");
        return Ok(Arc::new(store));
    }
    tracing::warn!("no database_url configured; using in-memory credential store");
    Ok(Arc::new(InMemoryCredentialStore::new()))
}

#[cfg(not(feature = "postgres"))]
async fn credential_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
    if config.database_url.is_some() {
        tracing::warn!("database_url ignored: built without the `postgres` feature");
    }
    tracing::warn!("using in-memory credential store");
    Ok(Arc::new(InMemoryCredentialStore::new()))
}
