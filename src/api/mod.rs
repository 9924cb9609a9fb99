//! API endpoint modules.

pub mod artifacts;
pub mod batches;
pub mod health;
pub mod openapi;
pub mod test_runs;
pub mod websocket;


use actix_web::web;

pub use health::configure_health_routes;
pub use openapi::ApiDoc;
pub use websocket::configure_routes as configure_websocket_routes;

/// Register every REST route under the caller's scope. Batch routes are
/// registered ahead of `/test-runs/{id}/...` so literal segments win.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.configure(configure_health_routes)
        .configure(batches::configure_routes)
        .configure(test_runs::configure_routes)
        .configure(artifacts::configure_routes);
}
