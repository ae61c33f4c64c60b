//! OTAFlow CLI - Main entry point for CLI binary
//!
//! This binary provides the `otaflow-cli` tool for checking and flashing
//! controller firmware.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use otaflow_lib::engine::{
    cli::formatter::{format_size, CliFormatter},
    cli::{Cli, Commands, ConfigAction, OutputFormat},
    config::{Config, ConfigError},
    device::DeviceClient,
    locks::{LockGuard, LockType, OperationLock},
    updater::{
        self, selector::matches_architecture, ConfirmationGate, ReleaseCatalog, ReleaseFeed,
        SessionObserver, SessionState, UpdateSession,
    },
};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run_cli(cli) {
        CliFormatter::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "otaflow_lib=debug,otaflow_cli=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_cli(cli: Cli) -> Result<()> {
    let dir = cli.get_dir();
    let json = cli.format == OutputFormat::Json;

    match &cli.command {
        Commands::Init => cmd_init(&cli, &dir, json),
        Commands::Check => cmd_check(&cli, &dir, json),
        Commands::Install { yes } => cmd_install(&cli, &dir, *yes, json),
        Commands::Releases => cmd_releases(&cli, &dir, json),
        Commands::Device => cmd_device(&cli, &dir, json),
        Commands::Config { action } => cmd_config(&cli, action, &dir, json),
    }
}

/// Config from disk with command-line overrides applied. A missing file is
/// fine when `--device` is given.
fn load_config(cli: &Cli, dir: &Path) -> Result<Config> {
    let mut config = match Config::load(dir) {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) if cli.device.is_some() => Config::default_for_device(""),
        Err(ConfigError::NotFound(path)) => {
            bail!(
                "No config at {} (run `otaflow-cli init --device <url>` or pass --device)",
                path.display()
            )
        }
        Err(e) => return Err(e.into()),
    };
    cli.apply_overrides(&mut config);
    Ok(config)
}

/// Ask the device for its architecture when none is configured
async fn resolve_architecture(config: &mut Config) {
    if config
        .device
        .architecture
        .as_deref()
        .is_some_and(|a| !a.trim().is_empty())
    {
        return;
    }

    let client = match config.http_client() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Cannot build HTTP client for device probe");
            return;
        }
    };
    match DeviceClient::new(client, &config.device.url).stats().await {
        Ok(stats) => {
            debug!(arch = %stats.arch, "Architecture reported by device");
            config.device.architecture = Some(stats.arch);
        }
        Err(e) => warn!(error = %e, "Could not read architecture from device"),
    }
}

fn cmd_init(cli: &Cli, dir: &Path, json: bool) -> Result<()> {
    let url = cli
        .device
        .as_deref()
        .ok_or_else(|| anyhow!("--device is required"))?;
    if Config::path(dir).exists() {
        bail!("Config already exists: {}", Config::path(dir).display());
    }

    std::fs::create_dir_all(dir)?;
    let mut config = Config::default_for_device(url);
    cli.apply_overrides(&mut config);
    config.save(dir)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "success": true,
                "config": Config::path(dir).display().to_string(),
                "device": config.device.url,
            })
        );
    } else {
        CliFormatter::success(&format!("Created {}", Config::path(dir).display()));
        CliFormatter::kv("Device", &config.device.url);
        CliFormatter::kv("Channel", &config.update.channel.to_string());
    }
    Ok(())
}

fn print_snapshot(session: &UpdateSession, json: bool) -> Result<()> {
    let snapshot = session.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    CliFormatter::header("Firmware");
    CliFormatter::state(snapshot.state, &snapshot.status);
    CliFormatter::kv(
        "Installed",
        snapshot.local_version.as_deref().unwrap_or("unknown"),
    );
    if let Some(remote) = &snapshot.remote_version {
        CliFormatter::kv("Latest", remote);
    }
    if let Some(asset) = &snapshot.selected_asset {
        CliFormatter::kv("Asset", &format!("{} ({})", asset.name, format_size(asset.size)));
    }
    if let Some(label) = snapshot.action_label() {
        CliFormatter::kv("Action", label);
    }
    Ok(())
}

fn failed(session: &UpdateSession) -> anyhow::Error {
    let snapshot = session.snapshot();
    anyhow!(snapshot.failure.unwrap_or(snapshot.status))
}

#[tokio::main]
async fn cmd_check(cli: &Cli, dir: &Path, json: bool) -> Result<()> {
    let mut config = load_config(cli, dir)?;
    resolve_architecture(&mut config).await;

    let session = updater::session_from_config(&config)?;
    let state = session.check().await?;
    print_snapshot(&session, json)?;

    if state == SessionState::Failed {
        return Err(failed(&session));
    }
    Ok(())
}

/// Terminal side of a running install: progress bar, flash lock and the
/// Ctrl-C guard
struct TerminalObserver {
    bar: ProgressBar,
    locks: OperationLock,
    flash_lock: Mutex<Option<LockGuard>>,
    guard_armed: Arc<AtomicBool>,
    json: bool,
}

impl TerminalObserver {
    fn new(dir: &Path, json: bool) -> Self {
        let bar = if json {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(100)
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("   {spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self {
            bar,
            locks: OperationLock::new(dir),
            flash_lock: Mutex::new(None),
            guard_armed: Arc::new(AtomicBool::new(false)),
            json,
        }
    }

    fn flashing(&self) -> bool {
        self.guard_armed.load(Ordering::SeqCst)
    }
}

impl SessionObserver for TerminalObserver {
    fn on_status(&self, message: &str) {
        if self.flashing() {
            self.bar.set_message(message.to_string());
        } else if !self.json {
            CliFormatter::info(message);
        }
    }

    fn on_progress(&self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }

    fn on_flash_started(&self) {
        self.guard_armed.store(true, Ordering::SeqCst);
        match self.locks.acquire(LockType::Flash) {
            Ok(guard) => {
                *self.flash_lock.lock().unwrap_or_else(|e| e.into_inner()) = Some(guard);
            }
            Err(e) => warn!(error = %e, "Flashing without a directory lock"),
        }
        self.bar.reset();
    }

    fn on_flash_finished(&self, _success: bool) {
        self.bar.finish_and_clear();
        self.flash_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.guard_armed.store(false, Ordering::SeqCst);
    }
}

/// Keep Ctrl-C from killing the process mid-flash
fn spawn_interrupt_guard(armed: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if armed.load(Ordering::SeqCst) {
                CliFormatter::warning(
                    "Update in progress. Interrupting now can leave the device unbootable; wait for it to finish.",
                );
            } else {
                std::process::exit(130);
            }
        }
    });
}

async fn prompt_yes_no(message: String, json: bool) -> bool {
    tokio::task::spawn_blocking(move || {
        let question = format!("{} [y/N] ", message);
        if json {
            eprint!("{}", question);
            let _ = std::io::stderr().flush();
        } else {
            print!("{}", question);
            let _ = std::io::stdout().flush();
        }

        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    })
    .await
    .unwrap_or(false)
}

async fn answer_confirmation(gate: &ConfirmationGate, yes: bool, json: bool) {
    let message = gate.next_request().await;
    let accepted = yes || prompt_yes_no(message, json).await;
    if let Err(e) = gate.resolve(accepted) {
        warn!(error = %e, "Confirmation was withdrawn");
    }
}

#[tokio::main]
async fn cmd_install(cli: &Cli, dir: &Path, yes: bool, json: bool) -> Result<()> {
    let mut config = load_config(cli, dir)?;
    resolve_architecture(&mut config).await;

    let observer = Arc::new(TerminalObserver::new(dir, json));
    spawn_interrupt_guard(Arc::clone(&observer.guard_armed));

    let session = updater::session_from_config(&config)?.with_observer(observer.clone());

    match session.check().await? {
        SessionState::Available(_) => {}
        SessionState::Failed => {
            print_snapshot(&session, json)?;
            return Err(failed(&session));
        }
        _ => return print_snapshot(&session, json),
    }
    if !json {
        print_snapshot(&session, json)?;
    }

    let gate = session.gate();
    let finished = Notify::new();
    let (state, _) = tokio::join!(
        async {
            let state = session.request_install().await;
            finished.notify_one();
            state
        },
        async {
            tokio::select! {
                () = answer_confirmation(&gate, yes, json) => {}
                () = finished.notified() => {}
            }
        }
    );
    let state = state?;

    if json {
        print_snapshot(&session, json)?;
    }
    match state {
        SessionState::Succeeded => {
            if !json {
                CliFormatter::success(&session.snapshot().status);
            }
            Ok(())
        }
        SessionState::Failed => Err(failed(&session)),
        _ => {
            if !json {
                CliFormatter::info("Update cancelled");
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn cmd_releases(cli: &Cli, dir: &Path, json: bool) -> Result<()> {
    let mut config = load_config(cli, dir)?;
    resolve_architecture(&mut config).await;
    let architecture = config.device.architecture.clone().unwrap_or_default();

    let catalog = ReleaseCatalog::new(
        config.http_client()?,
        &config.update.release_url,
        &config.update.fallback_release_url,
    )
    .with_user_agent(&config.http.user_agent);
    let releases = catalog.fetch_releases().await?;

    let rows: Vec<_> = releases
        .iter()
        .map(|r| {
            let asset = r
                .assets
                .iter()
                .find(|a| !architecture.is_empty() && matches_architecture(a, &architecture));
            (r, asset)
        })
        .collect();

    if json {
        let list: Vec<_> = rows
            .iter()
            .map(|(r, asset)| {
                serde_json::json!({
                    "tag": r.tag,
                    "prerelease": r.prerelease,
                    "assets": r.assets.len(),
                    "firmware": asset.map(|a| a.name.clone()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    CliFormatter::header(&format!("Releases ({})", releases.len()));
    CliFormatter::table_header(&["Tag", "Pre", "Firmware", "Size"]);
    for (release, asset) in rows {
        let size = asset.map(|a| format_size(a.size)).unwrap_or_default();
        CliFormatter::table_row(&[
            &release.tag,
            if release.prerelease { "yes" } else { "no" },
            asset.map(|a| a.name.as_str()).unwrap_or("-"),
            &size,
        ]);
    }
    if architecture.is_empty() {
        CliFormatter::warning("Architecture unknown; firmware column left empty");
    }
    Ok(())
}

#[tokio::main]
async fn cmd_device(cli: &Cli, dir: &Path, json: bool) -> Result<()> {
    let config = load_config(cli, dir)?;
    let stats = DeviceClient::new(config.http_client()?, &config.device.url)
        .stats()
        .await
        .with_context(|| format!("Reading stats from {}", config.device.url))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        CliFormatter::header(&stats.device);
        CliFormatter::kv("IP", &stats.ip);
        CliFormatter::kv("Architecture", &stats.arch);
        CliFormatter::kv("RSSI", &stats.rssi);
        CliFormatter::kv("Uptime", &format!("{}s", stats.uptime));
        CliFormatter::kv("Free heap", &stats.heap);
        CliFormatter::kv("FPS", &format!("{} ({} skipped)", stats.fps, stats.skipped));
    }
    Ok(())
}

fn cmd_config(cli: &Cli, action: &ConfigAction, dir: &Path, json: bool) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(cli, dir)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                CliFormatter::header("Configuration");
                CliFormatter::kv("Device", &config.device.url);
                CliFormatter::kv(
                    "Architecture",
                    config.device.architecture.as_deref().unwrap_or("(ask device)"),
                );
                CliFormatter::kv(
                    "Firmware",
                    config.device.firmware_version.as_deref().unwrap_or("unknown"),
                );
                CliFormatter::kv("Channel", &config.update.channel.to_string());
                CliFormatter::kv("Releases", &config.update.release_url);
                CliFormatter::kv("Fallback", &config.update.fallback_release_url);
                CliFormatter::kv("Download proxy", &config.update.download_proxy_url);
                CliFormatter::kv("User agent", &config.http.user_agent);
            }
        }
        ConfigAction::Set { key, value } => {
            let _guard = OperationLock::new(dir)
                .acquire(LockType::ConfigSave)
                .context("Config is locked")?;

            let mut config = Config::load(dir)?;
            config.set(key, value)?;
            config.save(dir)?;

            if json {
                println!("{}", serde_json::json!({ "success": true, "key": key, "value": value }));
            } else {
                CliFormatter::success(&format!("{} = {}", key, value));
            }
        }
    }
    Ok(())
}
