// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

#[macro_use]
extern crate slog;

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use vote_ledger::storage::{FileStorage, MemStorage, Storage};
use vote_ledger::{default_logger, server, Config, VoteLedger};

const USAGE: &str = "usage: vote-ledger-server [--config <file>] [--listen <addr>] [--data-dir <dir>]";

#[tokio::main]
async fn main() -> Result<()> {
    let logger = default_logger();

    let mut config_path: Option<PathBuf> = None;
    let mut listen_override: Option<String> = None;
    let mut data_dir_override: Option<PathBuf> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next().map(PathBuf::from),
            "--listen" => listen_override = args.next(),
            "--data-dir" => data_dir_override = args.next().map(PathBuf::from),
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            _ => return Err(anyhow!("unknown arg {}\n{}", arg, USAGE)),
        }
    }

    let mut cfg = match &config_path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(addr) = listen_override {
        cfg.listen_addr = addr;
    }
    if let Some(dir) = data_dir_override {
        cfg.data_dir = Some(dir);
    }
    cfg.validate().context("invalid config")?;

    match cfg.data_dir.clone() {
        Some(dir) => {
            let store = FileStorage::open(&dir, cfg.sync_writes, &logger)
                .with_context(|| format!("failed to open vote log in {}", dir.display()))?;
            run(cfg, store, &logger).await
        }
        None => {
            warn!(logger, "no data dir configured, votes are kept in memory only");
            run(cfg, MemStorage::new(), &logger).await
        }
    }
}

async fn run<T>(cfg: Config, store: T, logger: &slog::Logger) -> Result<()>
where
    T: Storage + Send + Sync + 'static,
{
    let ledger = Arc::new(VoteLedger::new(store, logger).context("failed to load ledger")?);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(logger, "failed to listen for ctrl-c"; "err" => %e);
            std::future::pending::<()>().await;
        }
        info!(logger, "shutting down");
    };
    server::serve(&cfg, ledger, shutdown, logger).await?;
    Ok(())
}
