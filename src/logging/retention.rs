use crate::error::{Error, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Tail of a rotated name once `{stem}.` is stripped
static ROTATED_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})_\d{6}(?:\.\d+)?\.log(?:\.zip|\.gz|\.zst)?$")
        .unwrap()
});

/// Deletes rotated siblings of `active` that are older than `retention_days`.
///
/// Age is taken from the rotation time embedded in the rotated file name,
/// which is when its last record could have been written. Returns the number
/// of files removed.
/// A retention of zero keeps everything.
pub fn sweep(active: &Path, retention_days: u32, now: DateTime<Local>) -> Result<usize> {
    if retention_days == 0 {
        return Ok(0);
    }

    let Some(stem) = active.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return Ok(0);
    };
    let dir = match active.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let prefix = format!("{stem}.");
    let cutoff = now - chrono::Duration::days(i64::from(retention_days));
    let mut removed = 0;

    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        let Some(rotated_at) = rotated_stamp(&prefix, &name).and_then(parse_stamp) else {
            continue;
        };

        if rotated_at < cutoff {
            let path = entry.path();
            fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            debug!("Removed expired log file: {}", path.display());
            removed += 1;
        }
    }

    Ok(removed)
}

fn rotated_stamp<'a>(prefix: &str, name: &'a str) -> Option<&'a str> {
    let tail = name.strip_prefix(prefix)?;
    ROTATED_TAIL
        .captures(tail)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn parse_stamp(stamp: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d_%H-%M-%S").ok()?;
    Local.from_local_datetime(&naive).earliest()
}
