use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

const OPENAPI_PATH: &str = "/api-doc/openapi.json";

/// Swagger UI at `/docs`, stamped with the crate version.
pub fn router(state: SharedState) -> Router<SharedState> {
    let mut doc = ApiDoc::openapi();
    doc.info.title = "Estimation room API".to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();

    let ui: Router<SharedState> = SwaggerUi::new("/docs").url(OPENAPI_PATH, doc).into();
    ui.with_state(state)
}
