mod commands;
mod db;
pub mod gate;
pub mod models;
mod settings;
pub mod source;
pub mod sync;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use commands::{dispatch, render_gate, render_slots, Command, HELP};
use gate::GateSimulator;
pub use settings::{Settings, SourceKind};
use source::{build_source, LocalSource};
use sync::SlotSynchronizer;

pub(crate) struct AppState {
    pub(crate) sync: SlotSynchronizer,
    pub(crate) gate: GateSimulator,
    pub(crate) local: Option<Arc<LocalSource>>,
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("parkwatch starting up...");

    let settings = Settings::from_env().context("invalid configuration")?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(serve(settings))
}

async fn serve(settings: Settings) -> Result<()> {
    let built = build_source(&settings)?;
    info!(
        "using {:?} source for table '{}'",
        settings.source, settings.table_name
    );

    let app = AppState {
        sync: SlotSynchronizer::new(built.as_source()),
        gate: GateSimulator::new(settings.gate.clone()),
        local: built.local(),
    };

    let mut slots_rx = app.sync.observe().await?;
    let slot_printer = tokio::spawn(async move {
        while slots_rx.changed().await.is_ok() {
            let state = slots_rx.borrow_and_update().clone();
            if !state.is_loading {
                info!("slots updated\n{}", render_slots(&state));
            }
        }
    });

    let mut gate_rx = app.gate.subscribe();
    let gate_info = app.gate.info().clone();
    let gate_printer = tokio::spawn(async move {
        while gate_rx.changed().await.is_ok() {
            let session = gate_rx.borrow_and_update().clone();
            info!("gate updated\n{}", render_gate(&session, &gate_info));
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(err) => {
                warn!("{err}");
                continue;
            }
        };
        match dispatch(&app, command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => error!("command failed: {err:?}"),
        }
    }

    slot_printer.abort();
    gate_printer.abort();
    app.sync.teardown().await;
    info!("parkwatch stopped");
    Ok(())
}
