//! camwatch launcher CLI
//!
//! Usage:
//!   camwatch_launch configs/cameras.yaml
//!   camwatch_launch configs/cameras.yaml --cameras camera-1,camera-2
//!   camwatch_launch configs/cameras.yaml --dry-run

use camwatch::config::Config;
use camwatch_launch::{cli::log_filter, LaunchArgs, LaunchPlan, Outcome, Supervisor, SupervisorConfig};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(log_filter(&args.log_level));
    env_logger::init_from_env(env);

    // Load cameras file
    log::info!("Loading cameras file: {}", args.config);
    let config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load cameras file: {}", e);
            std::process::exit(1);
        }
    };

    // Validate only mode
    if args.validate {
        println!("Cameras file '{}' is valid", args.config);
        println!(
            "  Broker: {}:{} (topic: {})",
            config.broker.host, config.broker.port, config.broker.topic
        );
        println!("  Model: {}", config.model.path.display());
        println!("  FPS: {}", config.worker.fps);
        println!("  Cameras: {}", config.cameras.len());
        for camera in &config.cameras {
            println!("    {} (port {}): {}", camera.id, camera.port, camera.source);
        }
        return;
    }

    let node_binary = match args.node_binary() {
        Ok(path) => path,
        Err(e) => {
            log::error!("Failed to locate camwatch_node: {}", e);
            std::process::exit(1);
        }
    };

    let plan = match LaunchPlan::build(
        &config,
        &node_binary.to_string_lossy(),
        args.cameras.as_deref(),
    ) {
        Ok(plan) => plan,
        Err(e) => {
            log::error!("Failed to build launch plan: {}", e);
            std::process::exit(1);
        }
    };

    // Dry run mode
    if args.dry_run {
        println!("{}", plan);
        return;
    }

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    // Set up Ctrl+C handler
    {
        let shutdown_tx = shutdown_tx.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            log::info!("Received Ctrl+C, stopping all cameras...");
            let _ = shutdown_tx.send(());
        }) {
            log::error!("Error setting Ctrl+C handler: {}", e);
            std::process::exit(1);
        }
    }

    let mut supervisor = Supervisor::new(SupervisorConfig::default());
    for process in plan.process_configs() {
        supervisor.add(process);
    }

    if let Err(e) = supervisor.spawn_all() {
        log::error!("Launch failed: {}", e);
        supervisor.shutdown().await;
        std::process::exit(1);
    }
    log::info!("Press Ctrl+C to stop all cameras");

    // Wait for shutdown signal or all workers to exit
    match supervisor.run(shutdown_rx).await {
        Outcome::AllExited => {}
        Outcome::Interrupted => supervisor.shutdown().await,
    }

    log::info!("camwatch launcher exiting");
}
