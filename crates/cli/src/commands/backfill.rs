//! Synthetic history backfill against a local store

use anyhow::{Context, Result};
use colored::Colorize;
use rand::rngs::StdRng;
use rand::SeedableRng;
use scaler_lib::{
    backfill::{backfill_hours, Backfill},
    metrics::{HttpMetricsSource, RollupEngine},
    store::RedbSampleStore,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::output::{format_epoch, print_info, print_success, print_warning, OutputFormat};

const SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Write synthetic hourly rollups for every resource the source reports
pub async fn run_backfill(
    store_path: &Path,
    source_url: &str,
    hours: u32,
    format: OutputFormat,
) -> Result<()> {
    let store = Arc::new(
        RedbSampleStore::open(store_path)
            .with_context(|| format!("Failed to open store at {}", store_path.display()))?,
    );
    let source = Arc::new(
        HttpMetricsSource::new(source_url, SOURCE_TIMEOUT).context("Invalid metrics source URL")?,
    );
    let engine = Arc::new(RollupEngine::new(store));

    let now = chrono::Utc::now().timestamp();
    let buckets = backfill_hours(now, hours);
    if let (OutputFormat::Table, Some(first), Some(last)) = (format, buckets.first(), buckets.last())
    {
        print_info(&format!(
            "Backfilling {} hours ({} to {}) into {}",
            buckets.len(),
            format_epoch(*first),
            format_epoch(*last),
            store_path.display()
        ));
    }

    let mut rng = StdRng::from_entropy();
    let report = Backfill::new(source, engine)
        .run(now, hours, &mut rng)
        .await
        .context("Backfill failed")?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "resources": report.resources,
                "written": report.written,
                "already_present": report.already_present,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => {
            if report.resources == 0 {
                print_warning("Metrics source reported no resources");
                return Ok(());
            }
            print_success(&format!(
                "Wrote {} rollups for {} resources",
                report.written.to_string().green(),
                report.resources
            ));
            if report.already_present > 0 {
                print_info(&format!(
                    "Kept {} existing rollups",
                    report.already_present
                ));
            }
        }
    }

    Ok(())
}
