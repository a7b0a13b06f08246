use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use larder_core::error::ReconcileError;
use larder_core::models::{ReconciliationResult, Strategy};
use larder_core::service::LarderService;
use larder_core::snapshot::Snapshot;

fn with_code(e: ReconcileError) -> anyhow::Error {
    anyhow!("{} ({})", e, e.code())
}

/// Write a snapshot of the whole store to `path`. Returns the item count.
pub(crate) fn write_snapshot(svc: &LarderService, path: &Path) -> Result<usize> {
    let snapshot = svc.export()?;
    let json = snapshot.to_json()?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
    tracing::info!(path = %path.display(), items = snapshot.items.len(), "snapshot written");
    Ok(snapshot.items.len())
}

/// Read the snapshot at `path` and reconcile it, or only preview the result
/// when `dry_run` is set.
pub(crate) fn run_import(
    svc: &LarderService,
    path: &Path,
    strategy: Strategy,
    dry_run: bool,
) -> Result<ReconciliationResult> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open snapshot {}", path.display()))?;
    let snapshot = Snapshot::from_reader(BufReader::new(file)).map_err(with_code)?;

    let result = if dry_run {
        svc.preview_import(&snapshot, strategy)
    } else {
        svc.import(&snapshot, strategy)
    };
    result.map_err(with_code)
}

pub(crate) fn cmd_backup_export(svc: &LarderService, file: Option<&Path>, json: bool) -> Result<()> {
    let Some(path) = file else {
        println!("{}", svc.export_json()?);
        return Ok(());
    };

    let count = write_snapshot(svc, path)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "file": path.display().to_string(), "items": count })
        );
    } else {
        println!("Exported {count} items to {}", path.display());
    }

    Ok(())
}

pub(crate) fn cmd_backup_import(
    svc: &LarderService,
    file: &Path,
    strategy: &str,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let strategy: Strategy = strategy.parse()?;
    let result = run_import(svc, file, strategy, dry_run)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let verb = if dry_run { "Would import" } else { "Imported" };
    println!(
        "{verb} {} ({strategy}): {} new, {} updated, {} skipped of {} in snapshot",
        file.display(),
        result.imported,
        result.updated,
        result.skipped,
        result.total_in_snapshot
    );
    if !result.rejected.is_empty() {
        eprintln!("Rejected {} invalid items:", result.rejected.len());
        for rejection in &result.rejected {
            eprintln!(
                "  item {} ({}): {}",
                rejection.index, rejection.id, rejection.reason
            );
        }
    }

    Ok(())
}
