use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::sync::watch;
use tracing::{info, warn};

use powermon_control::Scheduler;
use powermon_core::{PowerAction, PowermonConfig};
use powermon_fleet::{FleetController, TcpCommandChannel};
use powermon_telemetry::SnmpSource;

fn load(path: &Path) -> anyhow::Result<PowermonConfig> {
    PowermonConfig::from_file(path)
        .with_context(|| format!("loading config from {}", path.display()))
}

fn build_fleet(config: &PowermonConfig) -> FleetController {
    let channel = Arc::new(TcpCommandChannel::from_config(&config.commands));
    FleetController::new(config.workers.clone(), channel)
}

pub async fn run(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    info!(config = %path.display(), "powermond starting");

    let telemetry = Arc::new(SnmpSource::new(&config.telemetry)?);
    info!(
        agent = telemetry.agent(),
        oid = %telemetry.oid(),
        "telemetry source ready"
    );

    let fleet = build_fleet(&config);
    if config.startup.enable_on_start {
        fleet.set_all(PowerAction::Enable);
    }

    let mut scheduler = Scheduler::new(telemetry, fleet, config.thresholds);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("installing CTRL+C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    loop_handle.await?;
    info!("powermond stopped");
    Ok(())
}

pub fn check(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    let t = &config.thresholds;

    println!("config OK: {}", path.display());
    println!(
        "  thresholds: high {} W, low {} W",
        t.high_watts, t.low_watts
    );
    println!(
        "  cooldown:   {:?} ({} ticks of {:?})",
        t.cooldown,
        t.cooldown_ticks(),
        t.sample_interval
    );
    println!(
        "  telemetry:  {} {:?} community={} oid={} timeout={:?}",
        config.telemetry.address(),
        config.telemetry.version,
        config.telemetry.community,
        config.telemetry.oid,
        config.telemetry.timeout
    );
    println!(
        "  commands:   {}[{}, 0|1] connect={:?} reply={:?}",
        config.commands.method,
        config.commands.target_index,
        config.commands.connect_timeout,
        config.commands.reply_timeout
    );
    println!("  enable on start: {}", config.startup.enable_on_start);
    println!("  workers ({}):", config.workers.len());
    for worker in &config.workers {
        println!("    {worker}");
    }
    Ok(())
}

pub async fn sample(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    let source = SnmpSource::new(&config.telemetry)?;
    let watts = source
        .get()
        .await
        .with_context(|| format!("sampling {}", source.agent()))?;

    let t = &config.thresholds;
    let band = if watts >= t.high_watts {
        "at or above high limit"
    } else if watts <= t.low_watts {
        "at or below low limit"
    } else {
        "within dead band"
    };
    println!("load power: {watts} W ({band})");
    Ok(())
}

pub async fn switch(path: &Path, action: PowerAction) -> anyhow::Result<()> {
    let config = load(path)?;
    let fleet = build_fleet(&config);

    let reports = fleet.send_all(action).await;
    let mut failed = 0usize;
    for report in &reports {
        match &report.result {
            Ok(()) => println!("{:<16} {}", report.worker, action),
            Err(e) => {
                failed += 1;
                warn!(worker = %report.worker, error = %e, "command not delivered");
                println!("{:<16} FAILED: {e}", report.worker);
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} workers did not receive {action}", reports.len());
    }
    Ok(())
}
