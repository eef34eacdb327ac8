pub mod junit;
pub mod summary;
pub mod types;

pub use types::{RunRecord, RunReport};

use anyhow::{Context, Result};
use std::path::Path;

/// Load a stored run record (or a bare run) from disk
pub fn load_record(path: &Path) -> Result<RunRecord> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read results file: {}", path.display()))?;
    RunRecord::from_json(&content)
        .with_context(|| format!("Failed to parse run results: {}", path.display()))
}

/// Write a run record as pretty JSON
pub fn save_record(record: &RunRecord, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write results file: {}", path.display()))
}

/// Generate report from stored run results. Formats: `json` (computed
/// views), `junit` and `summary`. Without `output` the report goes to stdout.
pub fn generate_report(results_path: &Path, format: &str, output: Option<&Path>) -> Result<()> {
    let record = load_record(results_path)?;

    let rendered = match format {
        "json" => serde_json::to_string_pretty(&RunReport::new(&record))?,
        "junit" => junit::generate_junit_xml(&record)?,
        "summary" => summary::render(&record.view()),
        _ => anyhow::bail!("Unknown format: {}", format),
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            println!("Report saved to: {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
