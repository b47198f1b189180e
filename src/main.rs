mod app;
mod auth;
mod config;
mod db;
mod error;
mod extract;
mod orders;
mod payments;
mod state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "storefront=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    db::migrate(&app_state.db).await?;
    auth::services::ensure_admin(&app_state.db, app_state.config.admin.as_ref()).await?;

    let config = app_state.config.clone();
    let app = app::build_app(app_state)?;
    app::serve(app, &config).await
}
