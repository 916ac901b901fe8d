use anyhow::{anyhow, Context};
use argh::FromArgs;
use camwatch::{
    config::{Config, WorkerConfig},
    detect::load_detector,
    endpoint,
    service::ServiceError,
    stream::StreamSink,
    CameraService, FrameSource, MqttPublisher, Worker, WorkerIdentity,
};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(FromArgs)]
/// Count objects on one camera feed and publish the counts over MQTT
struct Args {
    /// worker configuration as JSON, as handed over by camwatch_launch
    #[argh(option)]
    worker_config: Option<String>,

    /// path to a cameras YAML file, used together with --camera
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// id of the camera to run from --config
    #[argh(option)]
    camera: Option<String>,

    /// log level: error, warn, info, debug, trace (default: info)
    #[argh(option, default = "String::from(\"info\")")]
    log_level: String,
}

fn load_worker_config(args: &Args) -> anyhow::Result<WorkerConfig> {
    if let Some(json) = &args.worker_config {
        return WorkerConfig::from_json(json).context("Invalid --worker-config");
    }

    let (Some(path), Some(camera_id)) = (&args.config, &args.camera) else {
        return Err(anyhow!(
            "either --worker-config or both --config and --camera are required"
        ));
    };
    let config = Config::from_file(path)
        .with_context(|| format!("Failed to load config from '{}'", path))?;
    let camera = config
        .camera(camera_id)
        .ok_or_else(|| anyhow!("Camera '{}' not found in {}", camera_id, path))?;
    Ok(config.worker_config(camera))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_worker_config(&args)?;
    let camera_id = config.camera.id.clone();

    // Create shutdown channel
    let shutdown_tx = tokio::sync::watch::Sender::new(());

    // Ctrl+C and SIGTERM
    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received shutdown signal");
            shutdown_tx.send(()).ok();
        }
    })?;

    // Loaded once, shared by every iteration
    let detector = load_detector(&config.model)?;
    log::info!(
        "[{}] Loaded model {} ({})",
        camera_id,
        config.model.path.display(),
        detector.name()
    );

    let source = FrameSource::open(&config.camera.source, config.worker.retry.clone())
        .with_context(|| format!("Failed to open source for camera {}", camera_id))?;

    let publisher = MqttPublisher::connect(&camera_id, &config.broker).await;

    let mut worker = Worker::new(WorkerIdentity::from(&config), source, detector, publisher);
    let mut service = CameraService::new(camera_id.clone());
    if config.worker.stream_endpoint {
        let stream = StreamSink::new();
        worker = worker.with_stream(stream.clone());
        service = service.with_stream(stream);
    }
    let service = Arc::new(service);
    service.start(worker.run());

    let port = config.camera.port;
    let server = endpoint::serve(
        service.clone(),
        &config.worker.bind_host,
        port,
        std::future::pending::<()>(),
    );
    let mut shutdown_rx = shutdown_tx.subscribe();
    let shutdown = async move {
        shutdown_rx.changed().await.ok();
    };

    match service.run_until(server, shutdown).await {
        Ok(()) => {
            log::info!("[{}] Shut down", camera_id);
            Ok(())
        }
        Err(e @ (ServiceError::Endpoint(_) | ServiceError::EndpointStopped)) => {
            Err(e).with_context(|| format!("Endpoint for camera {} on port {}", camera_id, port))
        }
        Err(e) => Err(e).with_context(|| format!("Worker loop for camera {} ended", camera_id)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Args = argh::from_env();

    let env = env_logger::Env::default().default_filter_or(&args.log_level);
    env_logger::init_from_env(env);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
