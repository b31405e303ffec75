use axum::{routing::get, Router};

use crate::handlers::config_handlers;
use crate::state::AppState;

/// `/:key` is a shortcode on GET and a config id on PUT/DELETE.
pub fn config_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(config_handlers::list_configs).post(config_handlers::create_config),
        )
        .route(
            "/:key",
            get(config_handlers::get_config)
                .put(config_handlers::update_config)
                .delete(config_handlers::deactivate_config),
        )
}
