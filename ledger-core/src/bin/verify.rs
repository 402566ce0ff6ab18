//! Verifies every stored replica chain

use anyhow::Context;
use smartlog_ledger::{ChainStore, Config, Error};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::var("SMARTLOG_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {path}"))?,
        Err(_) => Config::from_env()?,
    };

    let store = ChainStore::open(&config)?;
    let replicas = store.list()?;
    if replicas.is_empty() {
        tracing::warn!("No stored chains under {:?}", config.data_dir);
        return Ok(());
    }

    let mut failures = 0;
    for name in replicas {
        let Some(chain) = store.load(&name)? else {
            continue;
        };
        match chain.verify() {
            Ok(()) => tracing::info!(
                replica = %name,
                blocks = chain.len(),
                tip = %chain.tip_hash(),
                "Chain intact"
            ),
            Err(Error::TamperedBlock { sequence }) => {
                failures += 1;
                tracing::error!(replica = %name, sequence, "Chain tampered");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} tampered chain(s) found");
    }
    Ok(())
}
