//! HTTP API Layer
//!
//! This crate provides the REST API for the shared bill ledger using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for bills, conflicts, the ledger and
//!   creation sessions
//! - **Ledgers**: Live per-participant read models fed by the change stream
//! - **Middleware**: Actor extraction, tracing, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::new(store, clock, config);
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod ledgers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use core_kernel::{Clock, ParticipantId};
use domain_bill::{BillCommandService, BillStorePort};
use domain_session::FileSessionStore;

use crate::config::ApiConfig;
use crate::handlers::{bills, conflicts, health, ledger, session};
use crate::ledgers::LedgerRegistry;
use crate::middleware::{actor_middleware, audit_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub bills: Arc<BillCommandService>,
    pub ledgers: LedgerRegistry,
    pub store: Arc<dyn BillStorePort>,
    pub clock: Arc<dyn Clock>,
    pub config: ApiConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn BillStorePort>, clock: Arc<dyn Clock>, config: ApiConfig) -> Self {
        let bills = Arc::new(BillCommandService::with_config(
            store.clone(),
            clock.clone(),
            config.command_config(),
        ));
        let ledgers = LedgerRegistry::new(store.clone());
        Self {
            bills,
            ledgers,
            store,
            clock,
            config,
        }
    }

    /// Each participant keeps one creation session in their own directory
    pub fn session_store(&self, actor: ParticipantId) -> FileSessionStore {
        FileSessionStore::new(
            self.config.session_dir.join(actor.to_string()),
            self.config.recovery_policy(),
            self.clock.clone(),
        )
    }
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    // Public routes (no actor required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let bill_routes = Router::new()
        .route("/", post(bills::create_bill))
        .route(
            "/:id",
            get(bills::get_bill)
                .put(bills::update_bill)
                .delete(bills::delete_bill),
        )
        .route("/:id/activities", get(bills::list_activities));

    let conflict_routes = Router::new()
        .route("/", get(conflicts::list_conflicts))
        .route("/:id/resolve", post(conflicts::resolve_conflict));

    let session_routes = Router::new()
        .route(
            "/",
            get(session::load_session)
                .put(session::save_session)
                .delete(session::discard_session),
        )
        .route("/commit", post(session::commit_session));

    // Routes acting on behalf of a participant
    let api_routes = Router::new()
        .nest("/bills", bill_routes)
        .nest("/conflicts", conflict_routes)
        .nest("/session", session_routes)
        .route("/ledger", get(ledger::get_ledger))
        .layer(axum_middleware::from_fn_with_state(state.clone(), audit_middleware))
        .layer(axum_middleware::from_fn(actor_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
