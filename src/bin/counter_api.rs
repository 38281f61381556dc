//! counter_api - HTTP upload service for line-crossing counts.
//!
//! This daemon:
//! 1. Loads the class table and detector once
//! 2. Opens the result store
//! 3. Serves uploads until Ctrl-C, counting each video and persisting its result

use anyhow::Result;
use std::sync::mpsc;

use line_counter::{
    api::{ApiConfig, ApiServer},
    config::CounterConfig,
    detect::build_backend,
    storage::SqliteResultStore,
    ClassTable, CounterContext, UploadService,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = CounterConfig::load()?;
    let classes = ClassTable::load(&config.classes_path)?;
    log::info!(
        "loaded {} classes from {}",
        classes.len(),
        config.classes_path.display()
    );
    let backend = build_backend(&config.model)?;
    log::info!("detector backend: {}", backend.name());
    let context =
        CounterContext::new(backend, classes).with_tracker_config(config.tracker.clone());
    let store = SqliteResultStore::open(&config.db_path)?;

    let mut service = UploadService::new(context, Box::new(store), config.count_options());
    if let Some(dir) = &config.api.upload_dir {
        std::fs::create_dir_all(dir)?;
        service = service.with_upload_dir(dir);
    }

    let api_config = ApiConfig {
        addr: config.api.addr.clone(),
        max_upload_bytes: config.api.max_upload_bytes,
    };
    let api_handle = ApiServer::new(api_config, service).spawn()?;
    log::info!(
        "counter_api running. serving {} on {}",
        config.db_path,
        api_handle.addr
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("counter_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;
    Ok(())
}
