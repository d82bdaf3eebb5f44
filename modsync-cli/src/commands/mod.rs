//! Command dispatch: builds the engine and runs one subcommand.

use console::style;
use modsync::{
    ConfigFile, EngineConfig, HtmlCatalogProvider, InstallReport, SyncEngine, SyncReport,
};

use crate::args::{Cli, Commands, ConfigAction};
use crate::error::CliError;
use crate::progress::ProgressRenderer;

fn build_engine(cli: &Cli, concurrency: usize) -> SyncEngine<HtmlCatalogProvider> {
    let mut config = EngineConfig::new(&cli.catalog_url).with_max_concurrency(concurrency);
    if let Some(data_dir) = &cli.data_dir {
        config = config
            .with_downloads_dir(data_dir.join("downloads"))
            .with_data_dir(data_dir.clone());
    }
    SyncEngine::new(HtmlCatalogProvider::new(&cli.catalog_url), config)
}

/// Run the selected subcommand, or the unattended flow for
/// `--auto-sync`.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.auto_sync {
        return run_auto_sync(cli);
    }

    match &cli.command {
        Some(Commands::Sync { concurrency }) => run_sync(cli, *concurrency),
        Some(Commands::Install { all, files }) => run_install(cli, *all, files),
        Some(Commands::Reinstall { files }) => run_reinstall(cli, files),
        Some(Commands::List) => run_list(cli),
        Some(Commands::Config { action }) => run_config(cli, action.as_ref()),
        None => Err(CliError::Usage(
            "no command given; try `modsync sync` or `modsync --help`".to_string(),
        )),
    }
}

fn run_sync(cli: &Cli, concurrency: usize) -> Result<(), CliError> {
    let engine = build_engine(cli, concurrency);
    let renderer = ProgressRenderer::new();

    let report = engine.sync(&renderer)?;
    renderer.finish();
    print_sync_summary(&report);

    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::PartialFailure(report.failed.len()))
    }
}

fn run_install(cli: &Cli, all: bool, files: &[String]) -> Result<(), CliError> {
    if !all && files.is_empty() {
        return Err(CliError::Usage(
            "nothing to install; name files or pass --all".to_string(),
        ));
    }

    let engine = build_engine(cli, 1);
    let report = if all {
        engine.install_all()?
    } else {
        engine.install(files)?
    };
    print_install_summary(&report);

    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::PartialFailure(report.failed.len()))
    }
}

fn run_reinstall(cli: &Cli, files: &[String]) -> Result<(), CliError> {
    let engine = build_engine(cli, 1);
    let renderer = ProgressRenderer::new();

    let report = engine.reinstall(files, &renderer)?;
    renderer.finish();
    print_sync_summary(&report);

    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::PartialFailure(report.failed.len()))
    }
}

fn run_list(cli: &Cli) -> Result<(), CliError> {
    let engine = build_engine(cli, 1);
    let listings = engine.list_downloads()?;

    if listings.is_empty() {
        println!("download cache is empty");
        return Ok(());
    }

    for listing in listings {
        let hash = listing
            .content_hash
            .as_deref()
            .map(|h| &h[..12.min(h.len())])
            .unwrap_or("-");
        let when = listing
            .downloaded_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<40} {:>12} {:>14} {}",
            listing.filename,
            format_size(listing.size_bytes),
            hash,
            when
        );
    }
    Ok(())
}

fn run_config(cli: &Cli, action: Option<&ConfigAction>) -> Result<(), CliError> {
    let engine = build_engine(cli, 1);
    let config_path = engine.config().config_path();

    match action {
        None | Some(ConfigAction::Show) => {
            let config = ConfigFile::load(&config_path)?;
            println!("config:      {}", config_path.display());
            println!("destination: {}", config.destination_path.display());
            println!("downloads:   {}", engine.config().downloads_dir().display());
            println!(
                "lastChecked: {}",
                config
                    .last_checked
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string())
            );
            Ok(())
        }
        Some(ConfigAction::SetDestination { path }) => {
            let config = ConfigFile::load(&config_path)?.with_destination(path.clone());
            config.save(&config_path)?;
            println!("destination set to {}", path.display());
            Ok(())
        }
    }
}

/// Unattended sync plus install-all, no prompts. Failures exit
/// non-zero but never interrupt the remaining files.
fn run_auto_sync(cli: &Cli) -> Result<(), CliError> {
    let engine = build_engine(cli, 1);
    let renderer = ProgressRenderer::new();

    let sync_report = engine.sync(&renderer)?;
    renderer.finish();
    print_sync_summary(&sync_report);

    let install_report = engine.install_all()?;
    print_install_summary(&install_report);

    let failures = sync_report.failed.len() + install_report.failed.len();
    if failures == 0 {
        Ok(())
    } else {
        Err(CliError::PartialFailure(failures))
    }
}

fn print_sync_summary(report: &SyncReport) {
    println!(
        "{} {} downloaded, {} skipped, {} failed",
        style("sync:").bold(),
        report.downloaded.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for (filename, reason) in &report.failed {
        println!("  {} {}: {}", style("failed").red(), filename, reason);
    }
}

fn print_install_summary(report: &InstallReport) {
    println!(
        "{} {} installed, {} unchanged, {} failed",
        style("install:").bold(),
        report.installed.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for (filename, reason) in &report.failed {
        println!("  {} {}: {}", style("failed").red(), filename, reason);
    }
}

/// Human-readable byte count (binary units).
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
