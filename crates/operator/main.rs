use std::path::PathBuf;

use actix_web::{get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder};
use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ssp::controllers::ssp_controller::{self, State};
use ssp::util::{config, config::OperatorConfig, telemetry};

#[derive(Parser, Debug)]
#[command(name = "operator", version, about = "Reconciles SSP resources")]
struct Args {
    /// Template validator image
    #[arg(long, env = "VALIDATOR_IMAGE", default_value = config::DEFAULT_VALIDATOR_IMAGE)]
    validator_image: String,

    /// Directory holding the common templates bundle
    #[arg(long, env = "TEMPLATES_BUNDLE_DIR", default_value = config::DEFAULT_TEMPLATES_BUNDLE_DIR)]
    templates_bundle_dir: PathBuf,

    /// Version reported in the SSP status
    #[arg(long, env = "OPERATOR_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    operator_version: String,

    /// Address of the metrics and health endpoints
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log as JSON lines
    #[arg(long, env = "LOG_FORMAT", default_value = "text", value_parser = ["text", "json"])]
    log_format: String,
}

impl Args {
    fn config(&self) -> OperatorConfig {
        OperatorConfig {
            validator_image: self.validator_image.clone(),
            templates_bundle_dir: self.templates_bundle_dir.clone(),
            operator_version: self.operator_version.clone(),
        }
    }
}

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&metrics, &mut buffer) {
        Ok(()) => HttpResponse::Ok().body(buffer),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

/// Cancels in-flight cluster calls once the process is asked to stop.
async fn cancel_on_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown requested, cancelling in-flight reconciliations");
    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init(args.log_format == "json")?;

    // Initialize Kubernetes controller state
    let state = State::new(args.config());
    tokio::spawn(cancel_on_signal(state.shutdown_token()));
    let controller = ssp_controller::run(state.clone());

    // Start web server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
            .service(metrics)
    })
    .bind(&args.metrics_addr)?
    .shutdown_timeout(5);

    // Both runtimes implements graceful shutdown, so poll until both are done
    let (controller, server) = tokio::join!(controller, server.run());
    controller?;
    server?;
    Ok(())
}
