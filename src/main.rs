//! Spread Scanner - Scan Orchestration Engine
//!
//! Batch price scanner for a DEX/CEX arbitrage dashboard. Every invocation is
//! one execution context of the shared store named in the config file.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tracing_subscriber::{fmt, EnvFilter};

use spread_scanner::adapters::cli::{
    CliApp, Command, ForceStopCmd, ImportCmd, ScanCmd, StatusCmd, StopCmd, WalletsCmd,
};
use spread_scanner::adapters::{HttpPriceSource, JsonFileStore, TracingSink};
use spread_scanner::application::{
    update_wallets, BatchScanOrchestrator, CatalogRepository, RunStateController, ScanSettings,
    ScanStatus, ScannerSettings,
};
use spread_scanner::config::{load_config, Config};
use spread_scanner::domain::{RunState, Scope};
use spread_scanner::ports::{get_or, ScanSink, SharedStateStore, SourceRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (API keys go here, not in the config)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    let config = load_config(config_path(&app.command))
        .with_context(|| format!("Failed to load configuration from {}", config_path(&app.command).display()))?;
    init_logging(app.verbose, app.debug, &config.logging.level)?;

    match app.command {
        Command::Scan(cmd) => scan_command(cmd, config).await,
        Command::Stop(cmd) => stop_command(cmd, config).await,
        Command::ForceStop(cmd) => force_stop_command(cmd, config).await,
        Command::Status(cmd) => status_command(cmd, config).await,
        Command::Wallets(cmd) => wallets_command(cmd, config).await,
        Command::Import(cmd) => import_command(cmd, config).await,
    }
}

fn config_path(command: &Command) -> &Path {
    match command {
        Command::Scan(cmd) => &cmd.config,
        Command::Stop(cmd) => &cmd.config,
        Command::ForceStop(cmd) => &cmd.config,
        Command::Status(cmd) => &cmd.config,
        Command::Wallets(cmd) => &cmd.config,
        Command::Import(cmd) => &cmd.config,
    }
}

fn init_logging(verbose: bool, debug: bool, level: &str) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    fmt().with_env_filter(filter).with_target(false).init();
    Ok(())
}

/// Everything one execution context needs
struct Session {
    store: JsonFileStore,
    shared: Arc<dyn SharedStateStore>,
    sink: Arc<dyn ScanSink>,
    controller: Arc<RunStateController>,
    catalogs: CatalogRepository,
}

fn open_session(config: &Config) -> Session {
    let path = config.store.get_path();
    tracing::debug!("Using store {}", path.display());

    let store = JsonFileStore::new(path);
    let shared: Arc<dyn SharedStateStore> = Arc::new(store.clone());
    let sink: Arc<dyn ScanSink> = Arc::new(TracingSink::new());
    let controller = Arc::new(
        RunStateController::new(shared.clone(), sink.clone(), config.chain_config())
            .with_banner_seed(config.banner.seed.clone()),
    );
    let catalogs = CatalogRepository::new(shared.clone());

    Session {
        store,
        shared,
        sink,
        controller,
        catalogs,
    }
}

fn parse_scope(raw: &str) -> Result<Scope> {
    raw.parse::<Scope>().map_err(anyhow::Error::msg)
}

/// Scopes named on the command line, else the chains saved in the settings
fn scan_scopes(cmd: &ScanCmd, stored: &ScannerSettings) -> Result<Vec<Scope>> {
    let mut scopes: Vec<Scope> = Vec::new();
    if cmd.multichain {
        scopes.push(Scope::Multichain);
    }

    let chains = if cmd.chains.is_empty() && !cmd.multichain {
        &stored.chains
    } else {
        &cmd.chains
    };

    for raw in chains {
        let scope = parse_scope(raw)?;
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    Ok(scopes)
}

async fn scan_command(cmd: ScanCmd, config: Config) -> Result<()> {
    let session = open_session(&config);
    let stored = session
        .catalogs
        .load_settings()
        .await
        .context("Failed to load scanner settings")?;
    let scopes = scan_scopes(&cmd, &stored)?;
    if scopes.is_empty() {
        bail!("No scopes to scan: pass --chain/--multichain or save chains in the scanner settings");
    }

    let mut sources = SourceRegistry::new();
    for source_config in config.source_configs() {
        let exchange = source_config.exchange.clone();
        let source = HttpPriceSource::new(source_config)
            .with_context(|| format!("Failed to create price source for {}", exchange))?;
        sources.register(Arc::new(source));
    }
    let mut settings = config.scan_settings()?;
    if config.scan.exchanges.is_empty() && !stored.exchanges.is_empty() {
        settings.exchanges = stored.exchanges.iter().map(|e| e.to_uppercase()).collect();
    }

    let poller = session
        .store
        .spawn_poller(Duration::from_millis(config.store.poll_interval_ms));
    let watcher = session.controller.spawn_watcher();

    let orchestrator = Arc::new(BatchScanOrchestrator::new(
        session.controller.clone(),
        sources,
        session.sink.clone(),
    ));

    // Setup Ctrl+C handler
    let controller = session.controller.clone();
    let stop_scopes = scopes.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        for scope in &stop_scopes {
            controller.stop_soft(scope).await;
        }
    });

    let mut tasks = JoinSet::new();
    for scope in scopes {
        tasks.spawn(scan_scope(
            orchestrator.clone(),
            session.catalogs.clone(),
            scope,
            settings.clone(),
            cmd.continuous,
        ));
    }

    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("{:#}", e);
                failed += 1;
            }
            Err(e) => {
                tracing::error!("Scan task failed: {}", e);
                failed += 1;
            }
        }
    }

    poller.abort();
    watcher.abort();

    if failed > 0 {
        bail!("{} scope(s) failed", failed);
    }
    tracing::info!("Spread scanner stopped");
    Ok(())
}

/// One scope: load, scan, write prices back; repeat when continuous
async fn scan_scope(
    orchestrator: Arc<BatchScanOrchestrator>,
    catalogs: CatalogRepository,
    scope: Scope,
    settings: ScanSettings,
    continuous: bool,
) -> Result<()> {
    loop {
        let mut tokens = catalogs
            .load(&scope)
            .await
            .with_context(|| format!("Failed to load catalog for {}", scope))?;
        if tokens.is_empty() {
            tracing::warn!("Catalog for {} is empty, nothing to scan", scope);
            return Ok(());
        }

        let outcome = orchestrator
            .run(&scope, &mut tokens, &settings)
            .await
            .with_context(|| format!("Scan of {} not started", scope))?;

        catalogs
            .save_prices(&scope, &tokens)
            .await
            .with_context(|| format!("Failed to save prices for {}", scope))?;

        if !continuous || outcome.status == ScanStatus::Cancelled {
            return Ok(());
        }
    }
}

async fn stop_command(cmd: StopCmd, config: Config) -> Result<()> {
    let scope = parse_scope(&cmd.scope)?;
    let session = open_session(&config);

    if cmd.hard {
        session.controller.stop_hard(&scope).await;
    } else {
        session.controller.stop_soft(&scope).await;
    }

    println!("Stop requested for {}", scope);
    Ok(())
}

async fn force_stop_command(cmd: ForceStopCmd, config: Config) -> Result<()> {
    let scope = parse_scope(&cmd.scope)?;
    let session = open_session(&config);

    session.controller.force_stop(&scope).await;

    println!("Run-state of {} cleared", scope);
    Ok(())
}

async fn status_command(cmd: StatusCmd, config: Config) -> Result<()> {
    let session = open_session(&config);
    session.controller.reseed_from_store().await;

    let scopes = std::iter::once(Scope::Multichain)
        .chain(config.chain_config().chain_ids().map(Scope::chain))
        .collect::<Vec<_>>();

    let mut rows = Vec::with_capacity(scopes.len());
    for scope in &scopes {
        let state = get_or(session.shared.as_ref(), &scope.run_state_key(), RunState::idle())
            .await
            .with_context(|| format!("Failed to read run-state of {}", scope))?;
        let tokens = session
            .catalogs
            .load(scope)
            .await
            .with_context(|| format!("Failed to load catalog for {}", scope))?;
        rows.push((scope, state.is_running(), tokens.len()));
    }
    let banner = session.controller.banner_text().await;

    match cmd.format.as_str() {
        "json" => {
            let scopes: Vec<serde_json::Value> = rows
                .iter()
                .map(|(scope, running, tokens)| {
                    serde_json::json!({
                        "scope": scope.id(),
                        "running": running,
                        "tokens": tokens,
                    })
                })
                .collect();
            let status = serde_json::json!({ "banner": banner, "scopes": scopes });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        _ => {
            println!("Store: {}", session.store.path().display());
            println!(
                "Banner: {}",
                if banner.is_empty() { "(idle)" } else { banner.as_str() }
            );
            println!();
            println!("{:<16} {:<8} {:>8}", "SCOPE", "RUN", "TOKENS");
            for (scope, running, tokens) in &rows {
                println!(
                    "{:<16} {:<8} {:>8}",
                    scope.id(),
                    if *running { "YES" } else { "NO" },
                    tokens
                );
            }
        }
    }

    Ok(())
}

async fn wallets_command(cmd: WalletsCmd, config: Config) -> Result<()> {
    let session = open_session(&config);

    if let Some(ref file) = cmd.file {
        session
            .catalogs
            .import_wallet_file(file)
            .await
            .with_context(|| format!("Failed to import wallet status from {}", file.display()))?;
    }

    let report = update_wallets(&session.controller, &session.catalogs)
        .await
        .context("Wallet update failed")?;

    for scope in &report.stopped {
        println!("Stopped {} before merging", scope);
    }
    for (scope, merge) in &report.merged {
        println!(
            "{}: {} matched, {} missed",
            scope,
            merge.matched_count(),
            merge.missed_count()
        );
        if cmd.show_misses {
            for miss in &merge.missed {
                println!(
                    "  {} on {} ({}): {:?}",
                    miss.token_id, miss.exchange, miss.chain, miss.reason
                );
            }
        }
    }
    if report.merged.is_empty() {
        println!("Nothing merged");
    }

    Ok(())
}

async fn import_command(cmd: ImportCmd, config: Config) -> Result<()> {
    let scope = parse_scope(&cmd.scope)?;
    let session = open_session(&config);

    let count = session
        .catalogs
        .import_file(&scope, &cmd.file)
        .await
        .with_context(|| format!("Failed to import {}", cmd.file.display()))?;

    println!("Imported {} tokens into {}", count, scope);
    Ok(())
}
