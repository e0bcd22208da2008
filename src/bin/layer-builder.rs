use std::path::Path;

use anyhow::{bail, Context, Result};
use layer_builder::{load_build_config, parse_creation_time, LayerBuilder};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "Usage:\n  layer-builder build <layers.toml|layers.json> <out_dir>\n  layer-builder platforms <layers.toml|layers.json>"
}

fn main() -> Result<()> {
    init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [build, config, out_dir] if build == "build" => {
            build_layers(Path::new(config), Path::new(out_dir))
        }
        [platforms, config] if platforms == "platforms" => print_platforms(Path::new(config)),
        _ => bail!(usage()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn build_layers(config_path: &Path, out_dir: &Path) -> Result<()> {
    let config = load_build_config(config_path)?;

    if let Some(raw) = config.creation_time.as_deref() {
        let (created, err) = parse_creation_time(raw);
        match err {
            Some(err) => tracing::warn!(%err, "using current time as creation time"),
            None => tracing::info!(%created, "creation time"),
        }
    }

    let archives = LayerBuilder::new(out_dir)
        .with_global_properties(config.layers.properties.clone())
        .build(&config.layers.entries)
        .with_context(|| {
            format!(
                "building layers from '{}' into '{}'",
                config_path.display(),
                out_dir.display()
            )
        })?;

    for archive in archives {
        println!("{}", archive.display());
    }
    Ok(())
}

fn print_platforms(config_path: &Path) -> Result<()> {
    let config = load_build_config(config_path)?;
    for platform in config.resolved_platforms() {
        println!("{}", platform);
    }
    Ok(())
}
