use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use log::info;
use tokio_util::sync::CancellationToken;

use scalewave::cache::RedisCache;
use scalewave::cli::{Args, Commands};
use scalewave::config::AppConfig;
use scalewave::metrics::PrometheusMetrics;
use scalewave::platform::{KubePlatform, PlatformAdapter};
use scalewave::registry::OptimizerScheduler;
use scalewave::types::Service;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Run { controller } => {
            let config = controller.into_app_config()?;
            run_controller(config).await?;
        }
        Commands::Optimize { service, controller } => {
            let config = controller.into_app_config()?;
            run_single_optimization(&service, config).await?;
        }
    }

    Ok(())
}

async fn connect(
    config: &AppConfig,
) -> Result<(Arc<KubePlatform>, Arc<PrometheusMetrics>, Arc<RedisCache>)> {
    print!("🔗 Connecting to cluster... ");
    let platform = match KubePlatform::connect_with_timeout(
        config.kubeconfig_path.as_deref(),
        config.namespace.clone(),
        config.gpu_revision_marker.clone(),
        config.adapter_timeout(),
    )
    .await
    {
        Ok(p) => {
            println!("{}", "✅ Success".bright_green());
            p
        }
        Err(e) => {
            println!("{}", "❌ Failed".bright_red());
            return Err(e);
        }
    };

    print!("🔗 Connecting to state cache... ");
    let cache = match RedisCache::connect(&config.cache_url).await {
        Ok(c) => {
            println!("{}", "✅ Success".bright_green());
            c
        }
        Err(e) => {
            println!("{}", "❌ Failed".bright_red());
            return Err(e);
        }
    };

    let metrics = PrometheusMetrics::with_timeout(
        config.prometheus_url.clone(),
        config.master_node_instance.clone(),
        config.adapter_timeout(),
    );

    Ok((Arc::new(platform), Arc::new(metrics), Arc::new(cache)))
}

async fn run_controller(config: AppConfig) -> Result<()> {
    println!("{}", "⚖️  ScaleWave - Autoscaling & Traffic-Split Controller".bright_cyan().bold());
    println!("{}", "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_cyan());
    info!("starting observer loop");

    println!("📋 {}", "Configuration:".bright_yellow().bold());
    println!("   Observer frequency: {}", config.observer_frequency.bright_green());
    println!(
        "   Panic/stable timers: {}s / {}s",
        config.panic_timer_secs, config.stable_timer_secs
    );
    println!("   Adjustment factor: {}", config.adjustment_factor.to_string().bright_green());
    println!();

    let (platform, metrics, cache) = connect(&config).await?;
    let config = Arc::new(config);
    let scheduler = Arc::new(OptimizerScheduler::new(
        platform.clone(),
        cache.clone(),
        config.clone(),
    ));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    println!("🔍 Observing services...");
    scalewave::observer::run(platform, metrics, cache, scheduler, config, cancel).await;

    println!("{}", "🎉 Observer loop stopped.".bright_green().bold());
    Ok(())
}

async fn run_single_optimization(service_name: &str, config: AppConfig) -> Result<()> {
    println!("{}", "⚖️  ScaleWave - Manual Optimizer Pass".bright_cyan().bold());
    println!("{}", "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_cyan());

    let (platform, _metrics, cache) = connect(&config).await?;

    print!("🔍 Discovering service {service_name}... ");
    let services = platform.as_ref().list_services().await?;
    let service: Service = match services.into_iter().find(|s| s.name == service_name) {
        Some(s) => {
            println!("{}", "✅ Found".bright_green());
            s
        }
        None => {
            println!("{}", "❌ Not found".bright_red());
            anyhow::bail!("service {service_name} not found");
        }
    };

    println!("⚙️  Running optimizer...");
    let cancel = CancellationToken::new();
    match scalewave::optimizer::run_optimizer(&service, platform.as_ref(), cache.as_ref(), &config, cancel)
        .await
    {
        Ok(()) => {
            println!("{}", "🎉 Optimizer run committed a new traffic split!".bright_green().bold());
            Ok(())
        }
        Err(e) => {
            println!("{}", "❌ Failed".bright_red());
            Err(e.into())
        }
    }
}
