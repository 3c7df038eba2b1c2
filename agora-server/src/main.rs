use std::{net::SocketAddr, sync::Arc, time::Duration};

use agora_core::Forum;
use anyhow::Context;
use axum::{
    error_handling::HandleErrorLayer,
    routing::{get, post},
    BoxError, Router,
};
use structopt::StructOpt;
use tower::ServiceBuilder;

mod db;
mod error;
mod extractors;
mod fuzz;
mod handlers;
mod tests;

use db::PostgresStore;
use error::Error;
use extractors::AppState;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, StructOpt)]
#[structopt(name = "agora-server", about = "Forum and social feed server")]
struct Opt {
    /// PostgreSQL connection string
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    /// Address to listen on
    #[structopt(long, env = "AGORA_LISTEN", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Maximum number of pooled database connections
    #[structopt(long, env = "AGORA_MAX_CONNECTIONS", default_value = "8")]
    max_connections: u32,

    /// Seconds after which a request is abandoned
    #[structopt(long, env = "AGORA_REQUEST_TIMEOUT_SECS", default_value = "30")]
    request_timeout_secs: u64,
}

async fn create_sqlx_pool(db_url: &str, max_connections: u32) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .with_context(|| format!("opening database {db_url:?}"))
}

async fn handle_timeout(err: BoxError) -> Error {
    if err.is::<tower::timeout::error::Elapsed>() {
        Error::timed_out()
    } else {
        Error::Core(anyhow::anyhow!("unhandled middleware error: {err}").into())
    }
}

pub fn app(forum: Forum, request_timeout: Duration) -> Router {
    Router::new()
        .route(
            "/api/threads",
            get(handlers::list_threads).post(handlers::create_thread),
        )
        .route(
            "/api/threads/:id",
            get(handlers::get_thread)
                .put(handlers::update_thread)
                .delete(handlers::delete_thread),
        )
        .route("/api/threads/:id/upvote", post(handlers::upvote_thread))
        .route("/api/threads/:id/downvote", post(handlers::downvote_thread))
        .route("/api/threads/:id/comments", post(handlers::comment_thread))
        .route(
            "/api/comments/:id",
            axum::routing::put(handlers::update_comment).delete(handlers::delete_comment),
        )
        .route("/api/comments/:id/comments", post(handlers::reply_comment))
        .route("/api/comments/:id/upvote", post(handlers::upvote_comment))
        .route("/api/comments/:id/downvote", post(handlers::downvote_comment))
        .route("/api/feed/:username", get(handlers::feed))
        .layer(
            ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(HandleErrorLayer::new(handle_timeout))
                .timeout(request_timeout),
        )
        .with_state(AppState { forum })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed listening for ctrl-c, shutting down");
    }
    tracing::info!("received ctrl-c, shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let opt = Opt::from_args();

    let pool = create_sqlx_pool(&opt.database_url, opt.max_connections).await?;
    MIGRATOR
        .run(&pool)
        .await
        .context("running pending migrations")?;

    let store = Arc::new(PostgresStore::new(pool.clone()));
    let forum = Forum::new(store.clone(), store);
    let app = app(forum, Duration::from_secs(opt.request_timeout_secs));

    tracing::info!(listen = %opt.listen, "starting server");
    axum::Server::bind(&opt.listen)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum webserver")?;

    pool.close().await;
    tracing::info!("database pool closed");
    Ok(())
}
