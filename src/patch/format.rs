use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{AppError, Result};

/// Run the configured formatter over written files, one invocation per extension.
///
/// `formatters` maps an extension (no dot) to an argv; the group's paths,
/// relative to `root`, are appended. Extensions without a formatter are left
/// untouched.
pub async fn format_changed(
    root: &Path,
    paths: &[PathBuf],
    formatters: &HashMap<String, Vec<String>>,
) -> Result<()> {
    let mut groups: BTreeMap<&str, Vec<&PathBuf>> = BTreeMap::new();
    for path in paths {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            groups.entry(ext).or_default().push(path);
        }
    }

    for (ext, files) in groups {
        let Some((program, args)) = formatters.get(ext).and_then(|argv| argv.split_first()) else {
            continue;
        };

        tracing::info!(formatter = %program, ext, files = files.len(), "Formatting changed files");
        let output = Command::new(program)
            .args(args)
            .args(files)
            .current_dir(root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AppError::Format(format!("failed to run {program}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Format(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!(formatter = %program, output = %stdout.trim(), "Formatter output");
        }
    }

    Ok(())
}
