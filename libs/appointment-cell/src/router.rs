// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // Guest requests carry no credentials; everything else is authenticated.
    let public_routes =
        Router::new().route("/request/guest", post(handlers::guest_request_appointment));

    let protected_routes = Router::new()
        .route("/", get(handlers::list_appointments))
        .route("/", post(handlers::create_appointment))
        .route("/request", post(handlers::request_appointment))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}", put(handlers::update_appointment))
        .route("/{appointment_id}", delete(handlers::delete_appointment))
        .route("/{appointment_id}/respond", post(handlers::respond_to_request))
        .route("/{appointment_id}/book", post(handlers::book_slot))
        .route("/{appointment_id}/cancel", post(handlers::cancel_booking))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
