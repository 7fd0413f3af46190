//! Service graph wiring shared by the server, the admin CLI and tests

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::analytics::{
    AggregationEngine, AnalyticsService, Classifier, ClickRecorder, StatsReportBuilder,
};
use crate::api::{create_api_router, AppState};
use crate::auth::AuthService;
use crate::config::Config;
use crate::links::LinkResolver;
use crate::redirect::{create_redirect_router, RedirectState};
use crate::storage::{Backend, CachedStorage};

#[derive(Clone)]
pub struct Services {
    pub links: LinkResolver,
    pub analytics: Arc<AnalyticsService>,
}

impl Services {
    pub fn new(config: &Config, backend: Backend) -> Self {
        let cached = Arc::new(CachedStorage::new(
            backend.links,
            config.links.cache_max_entries,
            config.links.cache_ttl_secs,
        ));

        let engine = Arc::new(
            AggregationEngine::new(backend.clicks.clone())
                .with_deadline(Duration::from_secs(config.analytics.query_timeout_secs)),
        );
        let analytics = AnalyticsService::new(
            Classifier::new().with_degraded_referrers(config.analytics.degrade_invalid_referrer),
            ClickRecorder::new(backend.clicks),
            Arc::new(StatsReportBuilder::new(
                engine,
                config.analytics.export_dir.clone(),
            )),
        );

        Self {
            links: LinkResolver::new(cached),
            analytics: Arc::new(analytics),
        }
    }
}

pub fn api_router(config: &Config, services: &Services) -> Router {
    let auth_service = Arc::new(AuthService::new(config.auth.api_keys.clone()));
    if auth_service.is_enabled() {
        info!("API key authentication enabled ({} keys)", config.auth.api_keys.len());
    } else {
        info!("Authentication is disabled - all API requests are allowed");
    }

    let state = Arc::new(AppState {
        links: services.links.clone(),
        analytics: Arc::clone(&services.analytics),
        link_config: config.links.clone(),
    });
    create_api_router(state, auth_service)
}

pub fn redirect_router(config: &Config, services: &Services) -> Router {
    let state = Arc::new(RedirectState {
        links: services.links.clone(),
        analytics: Arc::clone(&services.analytics),
        analytics_config: config.analytics.clone(),
        default_redirect_url: config.links.default_redirect_url.clone(),
    });
    create_redirect_router(state)
}
