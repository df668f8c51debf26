use actix_web::middleware::{from_fn, Logger};
use actix_web::{web, App, HttpServer};
use clap::Parser;
use log::{error, info, warn};

use restfs::api;
use restfs::app_state::AppState;
use restfs::config::{AppConfig, Cli};
use restfs::logging::{self, ACCESS_TARGET};
use restfs::middleware::{cors, request_metrics};
use restfs::service::trigger::spawn_interval;
use restfs::{signals, telemetry};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    let config = match AppConfig::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let log_handle = match logging::init(&config.logging) {
        Ok(handle) => Some(handle),
        Err(e) => {
            let _ = env_logger::try_init();
            warn!("Falling back to env_logger: {}", e);
            None
        }
    };

    let (app_state, gc_worker) = AppState::from_config(config.clone())?;
    gc_worker.start_background();
    if config.gc.run_on_start {
        app_state.gc_trigger.request_run();
    }
    spawn_interval(app_state.gc_trigger.clone(), config.gc.interval());
    signals::spawn_handlers(log_handle, app_state.gc_trigger.clone())?;

    if let Some(listen) = &config.metrics.listen {
        match telemetry::init_metrics() {
            Ok(handle) => {
                actix_web::rt::spawn(telemetry::metrics_server(listen, handle)?);
            }
            Err(e) => error!("Failed to install prometheus recorder: {}", e),
        }
    }
    if !config.cors.origins.is_empty() {
        info!("CORS Origins: {}", config.cors.origins.join(","));
    }

    let cors_config = web::Data::new(config.cors.clone());
    let state = web::Data::new(app_state);

    info!("Server started at {}", config.server.listen);
    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(cors_config.clone())
            .wrap(from_fn(cors))
            .wrap(from_fn(request_metrics))
            .wrap(Logger::default().log_target(ACCESS_TARGET))
            .configure(api::configure)
    })
    .shutdown_timeout(config.server.graceful_timeout);
    if config.server.workers > 0 {
        server = server.workers(config.server.workers);
    }

    server.bind(config.server.listen.as_str())?.run().await?;
    info!("Server stopped");
    Ok(())
}
