mod config;
mod controller;
mod database;
mod errors;
mod fixtures;
mod images;
mod models;
mod routes;
mod storage;
mod utils;

#[cfg(test)]
mod tests;

#[macro_use]
extern crate tracing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::middleware::{NormalizePath, Tracing, TrailingSlash};
use poem::{EndpointExt, Route, Server};
use poem_openapi::OpenApiService;
use strum::{Display, EnumString};

use crate::config::RuntimeConfig;
use crate::controller::PatientController;
use crate::images::ImageResolver;
use crate::routes::PatientApi;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Copy, Clone, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct ServerConfig {
    #[clap(short, long, default_value = "127.0.0.1", env)]
    /// The binding host address of the server.
    host: String,

    #[clap(short, long, default_value = "8000", env)]
    port: u16,

    #[clap(long, default_value = "http://127.0.0.1:8000", env)]
    /// The external URL that would be used to access the server if applicable.
    ///
    /// This only affects the documentation.
    external_url: String,

    #[clap(long, env)]
    /// The file path to the runtime config file.
    config_file: PathBuf,

    #[clap(long, default_value = "info", env)]
    /// The log level filter.
    log_level: LogLevel,

    #[clap(long, default_value = "/ui", env)]
    /// The url path to serve the API docs on.
    docs_url: String,
}

/// Connects every backend named in the runtime config.
pub async fn build_controller(cfg: &RuntimeConfig) -> Result<PatientController> {
    let storage = cfg.images.backend.connect(&cfg.images.bucket).await?;
    let database = cfg.database.connect().await?;

    let images = ImageResolver::new(
        cfg.images.bucket.clone(),
        cfg.images.on_malformed_key,
        storage,
    );

    Ok(PatientController::new(database, images))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: ServerConfig = ServerConfig::parse();

    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", format!("{},poem=info,scylla=info", args.log_level));
    }
    tracing_subscriber::fmt::init();

    let cfg = RuntimeConfig::from_file(&args.config_file).await?;
    let controller = Arc::new(build_controller(&cfg).await?);

    if let Some(fixtures) = cfg.fixtures.as_ref() {
        fixtures::populate_fixtures(&controller, &fixtures.dataset).await?;
    }

    let bind = format!("{}:{}", args.host, args.port);

    let api_service = OpenApiService::new(
        PatientApi::new(controller),
        "Patient Records API",
        env!("CARGO_PKG_VERSION"),
    )
    .server(format!("{}/v1", args.external_url));
    let ui = api_service.redoc();
    let app = Route::new()
        .nest("/v1", api_service)
        .nest(args.docs_url.as_str(), ui)
        .with(NormalizePath::new(TrailingSlash::Trim))
        .with(Tracing);

    info!("serving requests @ http://{}", bind);
    info!("patient records @ http://{}/v1/patients/", bind);
    info!("api docs @ http://{}{}", bind, &args.docs_url);

    Server::new(TcpListener::bind(bind))
        .run_with_graceful_shutdown(
            app,
            async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutting down");
            },
            Some(Duration::from_secs(2)),
        )
        .await?;

    Ok(())
}
