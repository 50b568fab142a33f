use std::io;
use std::sync::Arc;

use tch::Device;
use tokio::net::TcpListener;

use server::config::ServerConfig;
use server::model::{HeadClassifier, TorchClassifier};
use server::{ServiceContext, session};

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    if let Ok(current_dir) = std::env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = ServerConfig::from_env();

    // Inference requires a CUDA device; its absence is a startup failure,
    // not something to degrade around at request time.
    if !tch::Cuda::is_available() {
        log::error!("CUDA is not available; head-CT inference requires a CUDA device");
        return Err(io::Error::new(
            io::ErrorKind::Other,
            "CUDA is not available",
        ));
    }
    let device = Device::Cuda(0);

    let classifier: Option<Box<dyn HeadClassifier>> =
        match TorchClassifier::load(&config.model_path, device) {
            Ok(classifier) => {
                log::info!(
                    "Model loaded from {} on {}",
                    config.model_path,
                    classifier.device_label()
                );
                Some(Box::new(classifier))
            }
            Err(e) => {
                // Keep serving; every request gets an explicit error reply.
                log::error!("Failed to load model from {}: {}", config.model_path, e);
                None
            }
        };
    let ctx = Arc::new(ServiceContext { classifier });

    let listener = TcpListener::bind(&config.bind_addr).await?;
    log::info!("Analysis server listening on {}", config.bind_addr);

    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(session::handle_connection(stream, Arc::clone(&ctx)));
    }
}
