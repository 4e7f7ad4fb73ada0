use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a config summary; the bearer token is never
/// included.
pub(crate) fn handler(state: &AppState) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "coze-relay is running",
        "config": {
            "upstream_api_url": config.upstream.api_url,
            "bot_id": config.upstream.bot_id,
            "log_level": config.features.log_level,
        }
    }))
}
