use crate::{accounts, api, auth::auth_middleware, state::SharedState};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub const API_PREFIX: &str = "/api";

fn task_routes(state: SharedState) -> Router {
    Router::new()
        .route("/tasks", get(api::list_tasks).post(api::create_task))
        .route(
            "/tasks/:id",
            get(api::get_task).put(api::update_task).delete(api::delete_task),
        )
        .route("/auth/delete/:uid", delete(accounts::delete_account))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

fn public_routes(state: SharedState) -> Router {
    Router::new()
        .route("/auth/register", post(accounts::register))
        .route("/auth/verify", post(accounts::verify))
        .route("/identity/signup", post(accounts::sign_up))
        .route("/identity/signin", post(accounts::sign_in))
        .route("/identity/signout", post(accounts::sign_out))
        .route("/health", get(accounts::health))
        .with_state(state)
}

/// All API routes, nested under `/api`. No CORS or tracing layers.
pub fn map_routes(state: SharedState) -> Router {
    let api = Router::new()
        .merge(public_routes(state.clone()))
        .merge(task_routes(state));
    Router::new().nest(API_PREFIX, api)
}

/// `map_routes` plus the layers the server binary runs with.
pub fn app(state: SharedState) -> Router {
    map_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
