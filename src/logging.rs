use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Once;
use std::thread;

use anyhow::Context;
use env_logger::{Builder, Target};
use log::{Record, debug, warn};
use memtrack_shared::LayerConfig;

use crate::layer;

static INIT: Once = Once::new();

/// Loads the layer configuration and installs the logger. Only the first call does anything.
pub fn init() {
    INIT.call_once(|| {
        let (config, config_error) = match LayerConfig::load() {
            Ok(config) => (config, None),
            Err(err) => (LayerConfig::from_env().unwrap_or_default(), Some(err)),
        };

        if let Err(err) = init_logger(&config) {
            let fallback = LayerConfig {
                log_file: None,
                ..config.clone()
            };
            if init_logger(&fallback).is_ok() {
                warn!("Logging to stderr instead: {err:#}");
            }
        }
        if let Some(err) = config_error {
            warn!("Ignoring the settings file: {err:#}");
        }
        debug!("Layer configuration: {config:?}");

        if !layer().set_config(config) {
            debug!("Configuration was already in place, keeping it");
        }
    });
}

fn init_logger(config: &LayerConfig) -> anyhow::Result<()> {
    let mut builder = Builder::new();
    builder.parse_filters(&config.log_level);
    match &config.log_file {
        Some(path) => {
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.target(Target::Pipe(Box::new(log_file)));
        }
        None => {
            builder.target(Target::Stderr);
        }
    }
    builder.format(|buf, record| write_record(buf, record));

    // The application may have installed its own logger, our records go there then
    if builder.try_init().is_err() {
        debug!("A logger is already installed, keeping it");
    }

    Ok(())
}

fn write_record(buf: &mut impl Write, record: &Record<'_>) -> io::Result<()> {
    writeln!(
        buf,
        "[{:<5}] {}: {}",
        record.level(),
        thread::current().name().unwrap_or("<unnamed>"),
        record.args()
    )
}
