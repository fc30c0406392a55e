pub mod datetime;

use std::fs;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Local};
use tracing::info;

/// Copy the previous run's `*.xml` output files into a subdirectory named
/// after the newest file's modification time, `%Y%m%d%H%M%S` in local time.
pub fn backup_output_files(output_directory: &Path) -> Result<()> {
    let mut latest_modification: Option<DateTime<Local>> = None;

    for entry in fs::read_dir(output_directory)? {
        let entry = entry?;
        if entry.path().extension().is_some_and(|ext| ext == "xml") {
            let modified: DateTime<Local> = entry.metadata()?.modified()?.into();
            if latest_modification.is_none_or(|latest| modified > latest) {
                latest_modification = Some(modified);
            }
        }
    }

    let Some(latest_modification) = latest_modification else {
        return Ok(());
    };

    let backup_directory =
        output_directory.join(latest_modification.format("%Y%m%d%H%M%S").to_string());
    fs::create_dir_all(&backup_directory)?;

    for entry in fs::read_dir(output_directory)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "xml") {
            if let Some(file_name) = path.file_name() {
                fs::copy(&path, backup_directory.join(file_name))?;
            }
        }
    }

    info!(
        "Backed up previous XMLTV output to {}",
        backup_directory.display()
    );

    Ok(())
}
