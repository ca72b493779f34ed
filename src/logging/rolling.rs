use super::compression::Compression;
use super::retention;
use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

/// Timestamp layout embedded in rotated file names
pub(crate) const ROTATED_STAMP: &str = "%Y-%m-%d_%H-%M-%S_%6f";

/// Source of wall-clock time for rotation, retention and record stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to. Used to replay rotation schedules
/// deterministically.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }

    pub fn set(&self, to: DateTime<Local>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock()
    }
}

/// When a sink closes its current file and starts a new one.
///
/// Parses from `"daily"`, `"hourly"`, `"never"` or any humantime duration
/// such as `"12h"` or `"1day"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Rotation {
    Never,
    Hourly,
    Daily,
    Every(Duration),
}

impl Rotation {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Rotation::Never => None,
            Rotation::Hourly => Some(Duration::from_secs(60 * 60)),
            Rotation::Daily => Some(Duration::from_secs(24 * 60 * 60)),
            Rotation::Every(d) => Some(*d),
        }
    }

    /// A file opened at `opened_at` is due once a full interval has elapsed.
    pub fn is_due(&self, opened_at: DateTime<Local>, now: DateTime<Local>) -> bool {
        let Some(interval) = self.interval() else {
            return false;
        };
        now.signed_duration_since(opened_at)
            .to_std()
            .map(|elapsed| elapsed >= interval)
            .unwrap_or(false)
    }
}

impl FromStr for Rotation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(Rotation::Never),
            "hourly" => Ok(Rotation::Hourly),
            "daily" => Ok(Rotation::Daily),
            other => match humantime::parse_duration(other) {
                Ok(d) if !d.is_zero() => Ok(Rotation::Every(d)),
                _ => Err(Error::InvalidRotation(s.to_string())),
            },
        }
    }
}

impl TryFrom<String> for Rotation {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Rotation> for String {
    fn from(value: Rotation) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rotation::Never => f.write_str("never"),
            Rotation::Hourly => f.write_str("hourly"),
            Rotation::Daily => f.write_str("daily"),
            Rotation::Every(d) => write!(f, "{}", humantime::format_duration(*d)),
        }
    }
}

/// Everything a rolling file needs to know about its sink.
#[derive(Debug, Clone, Copy)]
pub struct FilePolicy {
    pub rotation: Rotation,
    pub retention_days: u32,
    pub compression: Compression,
}

struct State {
    file: Option<File>,
    opened_at: DateTime<Local>,
}

struct Shared {
    path: PathBuf,
    policy: FilePolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

/// Append-only log file that rotates, compresses and prunes itself.
///
/// Cloning shares the same underlying file.
#[derive(Clone)]
pub struct RollingFile {
    shared: Arc<Shared>,
}

impl RollingFile {
    /// Opens (or creates) `path` for appending and sweeps expired rotations.
    pub fn open(path: impl Into<PathBuf>, policy: FilePolicy, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.into();
        let now = clock.now();
        let file = open_append(&path)?;
        retention::sweep(&path, policy.retention_days, now)?;

        Ok(Self {
            shared: Arc::new(Shared {
                path,
                policy,
                clock,
                state: Mutex::new(State {
                    file: Some(file),
                    opened_at: now,
                }),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn policy(&self) -> &FilePolicy {
        &self.shared.policy
    }

    fn write_record(&self, buf: &[u8]) -> io::Result<usize> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        let now = shared.clock.now();

        if shared.policy.rotation.is_due(state.opened_at, now) {
            self.rotate(&mut state, now).map_err(io::Error::other)?;
        }

        match state.file.as_mut() {
            Some(file) => file.write(buf),
            None => {
                // A previous rotation failed to reopen; try again.
                let mut file = open_append(&shared.path).map_err(io::Error::other)?;
                let n = file.write(buf)?;
                state.file = Some(file);
                state.opened_at = now;
                Ok(n)
            }
        }
    }

    /// Always starts a new period, even when the old file cannot be moved
    /// aside. Only failing to reopen the active file is an error; compression
    /// and retention failures go to stderr.
    fn rotate(&self, state: &mut State, now: DateTime<Local>) -> Result<()> {
        let shared = &*self.shared;

        if let Some(mut file) = state.file.take() {
            if let Err(e) = file.flush() {
                eprintln!("Failed to flush {}: {}", shared.path.display(), e);
            }
        }

        let rotated = rotated_path(&shared.path, now);
        let renamed = fs::rename(&shared.path, &rotated);

        state.opened_at = now;
        state.file = Some(open_append(&shared.path)?);

        match renamed {
            Ok(()) => {
                if let Err(e) = shared.policy.compression.compress(&rotated) {
                    eprintln!("Failed to compress {}: {}", rotated.display(), e);
                }
            }
            Err(e) => eprintln!("Failed to rotate {}: {}", shared.path.display(), e),
        }

        if let Err(e) = retention::sweep(&shared.path, shared.policy.retention_days, now) {
            eprintln!("Failed to prune old logs of {}: {}", shared.path.display(), e);
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        match self.shared.state.lock().file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for RollingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollingFile")
            .field("path", &self.shared.path)
            .field("policy", &self.shared.policy)
            .finish()
    }
}

pub struct RollingWriter<'a> {
    file: &'a RollingFile,
}

impl Write for RollingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_record(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl<'a> MakeWriter<'a> for RollingFile {
    type Writer = RollingWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RollingWriter { file: self }
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io(path, e))
}

/// `dir/2024_info.log` rotated at T becomes `dir/2024_info.<T>.log`.
fn rotated_path(active: &Path, rotated_at: DateTime<Local>) -> PathBuf {
    let stem = active
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamp = rotated_at.format(ROTATED_STAMP);

    let mut candidate = active.with_file_name(format!("{stem}.{stamp}.log"));
    let mut n = 2;
    while candidate.exists() || has_compressed_sibling(&candidate) {
        candidate = active.with_file_name(format!("{stem}.{stamp}.{n}.log"));
        n += 1;
    }
    candidate
}

fn has_compressed_sibling(path: &Path) -> bool {
    ["zip", "gz", "zst"].iter().any(|ext| {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(ext);
        Path::new(&name).exists()
    })
}
