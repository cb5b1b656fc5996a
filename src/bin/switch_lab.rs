//! Lab harness for the quickswitch engine.
//!
//! Runs the engine against an in-process simulated host so the learning and
//! fallback behavior can be exercised from a terminal: which keys the host
//! accepts is configurable, state persists to a JSON file between runs, and
//! the inspection surface (snapshot/map/clear/switch) is exposed as
//! subcommands.

use anyhow::{bail, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use quickswitch::host::{parse_switcher_label, HostState, NavState, SelectionIndicator};
use quickswitch::labels::LabelCatalog;
use quickswitch::store::JsonFileStore;
use quickswitch::SwitchEngine;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "switch_lab", about = "Drive the quickswitch engine against a simulated host")]
struct Cli {
    /// Path of the persistent state file
    #[arg(long, default_value = "quickswitch-state.json")]
    state: PathBuf,

    /// Optional labels.json override file for the label catalog
    #[arg(long)]
    labels: Option<PathBuf>,

    /// KEY=LABEL pair the simulated host accepts (repeatable). Defaults to
    /// the first fallback key of every catalog label.
    #[arg(long = "accept", value_name = "KEY=LABEL")]
    accept: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Switch to a label and report the outcome
    Switch { label: String },
    /// Print the engine snapshot
    State,
    /// Dump the learned associations
    Map,
    /// Clear the learned associations
    Clear,
}

/// Simulated host: honors a replaced model parameter after a short delay,
/// but only for keys it knows, exactly like the real host ignoring an
/// unrecognized parameter value.
struct SimHost {
    accepted: HashMap<String, String>,
    aria: Mutex<Option<String>>,
    param: Mutex<Option<String>>,
}

impl SimHost {
    fn new(accepted: HashMap<String, String>) -> Arc<Self> {
        Arc::new(Self {
            accepted,
            aria: Mutex::new(None),
            param: Mutex::new(None),
        })
    }
}

impl HostState for SimHost {
    fn current_label(&self) -> Option<String> {
        let aria = self.aria.lock().unwrap().clone()?;
        parse_switcher_label(&aria)
    }
}

#[async_trait]
impl NavState for SimHost {
    fn model_param(&self) -> Option<String> {
        self.param.lock().unwrap().clone()
    }

    fn replace_model_param(&self, key: &str) {
        *self.param.lock().unwrap() = Some(key.to_string());
    }

    async fn emit_refresh_signals(&self) {
        // The simulated re-render takes a beat, so confirmation really does
        // come from the poll loop.
        tokio::time::sleep(Duration::from_millis(80)).await;
        let param = self.param.lock().unwrap().clone();
        if let Some(label) = param.and_then(|key| self.accepted.get(&key).cloned()) {
            *self.aria.lock().unwrap() =
                Some(format!("Model switcher, current model is {label}"));
        }
    }

    fn at_neutral_view(&self) -> bool {
        true
    }
}

impl SelectionIndicator for SimHost {
    fn resync(&self, active_label: Option<&str>) {
        debug!(active = active_label.unwrap_or("<none>"), "indicator resync");
    }
}

fn accepted_keys(cli: &Cli, catalog: &LabelCatalog) -> Result<HashMap<String, String>> {
    if cli.accept.is_empty() {
        return Ok(catalog
            .entries()
            .iter()
            .filter_map(|entry| {
                entry
                    .fallbacks
                    .first()
                    .map(|key| (key.clone(), entry.label.clone()))
            })
            .collect());
    }
    let mut accepted = HashMap::new();
    for pair in &cli.accept {
        let Some((key, label)) = pair.split_once('=') else {
            bail!("--accept expects KEY=LABEL, got {pair:?}");
        };
        accepted.insert(key.to_string(), label.to_string());
    }
    Ok(accepted)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let catalog = LabelCatalog::load(cli.labels.as_deref());
    if let Some(err) = catalog.error() {
        eprintln!("warning: label overrides ignored: {err}");
    }

    let host = SimHost::new(accepted_keys(&cli, &catalog)?);
    let store = Arc::new(JsonFileStore::new(&cli.state));
    let engine = SwitchEngine::new(
        store,
        host.clone(),
        host.clone(),
        host.clone(),
        catalog,
    );

    match &cli.command {
        Command::Switch { label } => {
            let outcome = engine.switch_to(label).await;
            println!("{outcome:?}");
            println!("{}", serde_json::to_string_pretty(&engine.snapshot())?);
        }
        Command::State => {
            println!("{}", serde_json::to_string_pretty(&engine.snapshot())?);
        }
        Command::Map => {
            println!("{}", serde_json::to_string_pretty(&engine.dump_associations())?);
        }
        Command::Clear => {
            engine.clear_associations()?;
            println!("associations cleared");
        }
    }

    Ok(())
}
