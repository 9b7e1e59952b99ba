//! Startup wiring: store, catalog, tools, provider and pipeline.

use anyhow::{Context, Result};
use concierge_providers::{
    ModelChunk, ModelProvider, OpenAICompatibleProvider, ScriptedProvider,
};
use concierge_runtime::ChatPipeline;
use concierge_store::{CatalogItem, CommerceStore, MemoryStore, OwnerLocks, SqliteStore};
use concierge_tools::{commerce_registry, CommerceDeps, ToolDispatcher, TracingAuditLogger};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{AppConfig, ModelConfig, ProviderKind, StoreConfig, StoreKind};

/// Shared state behind every route.
pub struct AppState {
    pub pipeline: Arc<ChatPipeline>,
    pub store: Arc<dyn CommerceStore>,
    /// Shared with the cart tools so HTTP mutations queue behind tool calls.
    pub locks: OwnerLocks,
}

pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn CommerceStore>> {
    match config.kind {
        StoreKind::Memory => {
            info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::Sqlite => {
            if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            info!(path = %config.path.display(), "Opening SQLite store");
            let store = SqliteStore::open(&config.path)
                .with_context(|| format!("Failed to open {}", config.path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

pub fn load_catalog(path: &Path) -> Result<Vec<CatalogItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Invalid catalog {}", path.display()))
}

pub fn provider_from_config(config: &ModelConfig) -> Result<Arc<dyn ModelProvider>> {
    match config.provider {
        ProviderKind::OpenAI => {
            let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
            if api_key.is_none() {
                warn!(
                    env = %config.api_key_env,
                    "No API key set; requests go out unauthenticated"
                );
            }
            let provider = OpenAICompatibleProvider::new(
                config.base_url.clone(),
                api_key,
                config.model.clone(),
                Duration::from_secs(config.timeout_secs),
            )?;
            info!(
                model = %config.model,
                base_url = %config.base_url,
                "Using OpenAI-compatible provider"
            );
            Ok(Arc::new(provider))
        }
        ProviderKind::Scripted => {
            info!("Using scripted provider");
            Ok(Arc::new(ScriptedProvider::repeating(vec![
                ModelChunk::TextDelta(
                    "The concierge is running offline and cannot take requests right now.".into(),
                ),
                ModelChunk::Finish("stop".into()),
            ])))
        }
    }
}

/// Build the state with an explicit provider.
pub async fn build_state(
    config: &AppConfig,
    provider: Arc<dyn ModelProvider>,
) -> Result<AppState> {
    let store = open_store(&config.store)?;

    if let Some(seed) = &config.catalog.seed {
        let items = load_catalog(seed)?;
        info!(items = items.len(), "Seeding catalog");
        store.seed_catalog(items).await?;
    }

    let locks = OwnerLocks::new(config.lock_timeout());
    let mut registry = commerce_registry(CommerceDeps {
        store: store.clone(),
        locks: locks.clone(),
    })?;
    for (tool, required) in &config.tools.approval {
        registry
            .set_requires_approval(tool, *required)
            .with_context(|| format!("tools.approval names unknown tool '{}'", tool))?;
    }
    info!(tools = registry.count(), "Tool registry ready");

    let dispatcher = Arc::new(ToolDispatcher::new(
        Arc::new(registry),
        Arc::new(TracingAuditLogger),
    ));
    let pipeline = Arc::new(ChatPipeline::new(
        provider,
        dispatcher,
        config.pipeline_config()?,
    ));

    Ok(AppState {
        pipeline,
        store,
        locks,
    })
}

pub async fn bootstrap(config: &AppConfig) -> Result<AppState> {
    let provider = provider_from_config(&config.model)?;
    build_state(config, provider).await
}
