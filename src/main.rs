use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use ventilation_controller::{config, controller, hardware, telemetry};

use config::Config;
use controller::VentilationController;
use telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let telemetry = init_tracing().context("initialising logging")?;

    let result = run().await;
    if let Err(e) = &result {
        error!(error = ?e, "ventilation controller failed");
    }

    // flush exported logs on every exit path
    telemetry.shutdown();
    result
}

async fn run() -> Result<()> {
    let cfg = Config::load().context("loading configuration")?;
    info!(
        hub = %cfg.hub.mode,
        rooms = cfg.rooms.len(),
        fan = %cfg.fan.entity_id,
        "starting ventilation controller"
    );

    let hub = hardware::create_hub(&cfg).context("creating hub client")?;
    let tick_seconds = cfg.controller.tick_seconds;
    let controller = VentilationController::new(hub, Arc::new(cfg));

    if tick_seconds == 0 {
        let report = controller.run_cycle().await;
        if report.writes_failed > 0 {
            warn!(failed = report.writes_failed, "cycle finished with failed writes");
        }
        return Ok(());
    }

    tokio::select! {
        _ = controller.run(tick_seconds) => {}
        _ = telemetry::shutdown_signal() => {}
    }

    info!("shutdown complete");
    Ok(())
}
