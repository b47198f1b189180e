pub mod gateway;
pub mod handlers;
pub mod webhook;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
