pub mod args;

use args::Args;
use clap::Parser;
use loader::{ImageLoader, ImageRequest};
use loader_config::LoaderConfig;
use shared::image::format_image_size;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Usage errors exit with status 2
    let args = Args::parse();

    let mut config = LoaderConfig::load();
    if let Some(scale) = args.scale {
        config.device_scale_factor = scale;
    }

    if args.save_config {
        match config.save() {
            Ok(()) => info!("Saved configuration"),
            Err(e) => warn!("Failed to save configuration: {}", e),
        }
    }

    let loader = match ImageLoader::from_config(&config) {
        Ok(loader) => loader,
        Err(e) => {
            error!("Failed to set up loader: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let request = ImageRequest::parse(&args.url, args.target_size);
    let Some(bitmap) = loader.load(&request).await else {
        error!("No image loaded from {}", args.url);
        return ExitCode::FAILURE;
    };

    info!(
        "Loaded {}x{} bitmap ({})",
        bitmap.width,
        bitmap.height,
        format_image_size(bitmap.byte_len() as u64)
    );

    let saved = bitmap
        .to_rgba_image()
        .map_err(|e| e.to_string())
        .and_then(|image| {
            image
                .save_with_format(&args.out, image::ImageFormat::Png)
                .map_err(|e| e.to_string())
        });

    match saved {
        Ok(()) => {
            info!("Wrote {:?}", args.out);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to write {:?}: {}", args.out, e);
            ExitCode::FAILURE
        }
    }
}
