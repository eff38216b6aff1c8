use anyhow::{bail, Context};
use codescout::SearchMatch;
use std::ffi::OsStr;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const HEADER: &str = "File Path,File Name,Line,Content,Match";

/// Upper bound on numbered-name probing before giving up
const MAX_NAME_PROBES: usize = 1000;

/// Writes matches as CSV to `requested`, or to the nearest numbered
/// variant ("report_1.csv") when that name is taken. Returns the path
/// actually written.
pub fn write_csv(matches: &[SearchMatch], requested: &Path) -> anyhow::Result<PathBuf> {
    let destination = unique_destination(requested)?;

    let mut csv = String::with_capacity(HEADER.len() + 1 + matches.len() * 64);
    csv.push_str(HEADER);
    csv.push('\n');
    for m in matches {
        writeln!(
            csv,
            "{},{},{},{},{}",
            escape(&m.file_path.display().to_string()),
            escape(&m.file_name),
            m.line_number,
            escape(&m.line_content),
            escape(&m.matched_text)
        )?;
    }

    fs::write(&destination, csv)
        .with_context(|| format!("failed to write {}", destination.display()))?;
    Ok(destination)
}

fn unique_destination(requested: &Path) -> anyhow::Result<PathBuf> {
    if !requested.exists() {
        return Ok(requested.to_path_buf());
    }
    let stem = requested
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("export");
    let extension = requested.extension().and_then(OsStr::to_str);
    for n in 1..=MAX_NAME_PROBES {
        let name = match extension {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        };
        let candidate = requested.with_file_name(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    bail!(
        "no free export name near {} after {} attempts",
        requested.display(),
        MAX_NAME_PROBES
    );
}

/// Quotes a field only when it contains a comma, quote, or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
