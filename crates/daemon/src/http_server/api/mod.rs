use axum::Router;
use http::header::{ACCEPT, CONTENT_TYPE, ORIGIN};
use http::{HeaderName, Method};
use tower_http::cors::{Any, CorsLayer};

pub mod client;
pub mod relay;

use crate::http_server::{DECRYPTION_KEY_HEADER, DOWNLOAD_TOKEN_HEADER, UPLOAD_TOKEN_HEADER};
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    let cors_layer = CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::POST])
        .allow_headers(vec![
            ACCEPT,
            CONTENT_TYPE,
            ORIGIN,
            HeaderName::from_static(UPLOAD_TOKEN_HEADER),
            HeaderName::from_static(DOWNLOAD_TOKEN_HEADER),
        ])
        .expose_headers(vec![HeaderName::from_static(DECRYPTION_KEY_HEADER)])
        .allow_origin(Any)
        .allow_credentials(false);

    relay::router(state.clone())
        .with_state(state)
        .layer(cors_layer)
}
