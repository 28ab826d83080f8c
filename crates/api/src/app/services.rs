//! Infrastructure wiring: verifier, state store, resolver.

use std::sync::Arc;

use anyhow::Context;

use authgate_auth::{
    AuthorizationResolver, JwtVerifier, PermissionMatcher, ResolverConfig, StateReader,
    StateWriter, TokenVerifier,
};
use authgate_infra::config::GatewayConfig;
use authgate_infra::state_store::{InMemoryStateStore, RedisStateStore};

use crate::app::AppState;
use crate::cors::CorsPolicy;

/// Build application state from configuration.
///
/// Fails only on unusable key material or an invalid store URL. An
/// unreachable store is logged and tolerated: resolution falls back per fact.
pub async fn build_state(config: &GatewayConfig) -> anyhow::Result<AppState> {
    let verifier = JwtVerifier::from_pem_file(
        config.key_family,
        &config.public_key_path,
        config.issuer.clone(),
    )
    .with_context(|| {
        format!(
            "failed to load verification key from {}",
            config.public_key_path.display()
        )
    })?
    .with_leeway(config.leeway_secs);

    let verifier: Arc<dyn TokenVerifier> = Arc::new(verifier);
    let matcher = PermissionMatcher::with_superuser_namespaces(config.superuser_namespaces.clone());
    let cors = CorsPolicy::new(config.cors_allowed_origins.clone());
    if config.allows_any_origin() {
        tracing::info!("CORS allows any origin");
    }

    match &config.redis {
        Some(settings) => {
            let store = RedisStateStore::new(settings).context("invalid REDIS_URL")?;
            if let Err(err) = store.establish().await {
                tracing::warn!(error = %err, "state store unreachable at startup; retrying in the background, resolution falls back meanwhile");
            } else {
                tracing::info!(db = settings.db, "state store connected");
            }
            Ok(assemble(
                verifier,
                Arc::new(store),
                config.resolver,
                matcher,
                config.admin_permission.clone(),
                cors,
            ))
        }
        None => {
            tracing::warn!("REDIS_URL not set; using in-memory state store (dev only)");
            Ok(assemble(
                verifier,
                Arc::new(InMemoryStateStore::new()),
                config.resolver,
                matcher,
                config.admin_permission.clone(),
                cors,
            ))
        }
    }
}

/// Wire one store into both the read path (resolver) and the admin write path.
pub fn assemble<S>(
    verifier: Arc<dyn TokenVerifier>,
    store: Arc<S>,
    resolver_config: ResolverConfig,
    matcher: PermissionMatcher,
    admin_permission: String,
    cors: CorsPolicy,
) -> AppState
where
    S: StateReader + StateWriter + 'static,
{
    let reader: Arc<dyn StateReader> = store.clone();
    let writer: Arc<dyn StateWriter> = store;

    AppState {
        resolver: Arc::new(AuthorizationResolver::new(verifier, reader, resolver_config)),
        writer,
        matcher: Arc::new(matcher),
        admin_permission,
        cors,
    }
}
