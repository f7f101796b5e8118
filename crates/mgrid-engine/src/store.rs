//! On-disk result streams, failure/timeout logs, and postmortem markers.
//!
//! Every artifact lives under `<directory>/<prefix>.*`. Chain streams are
//! append-only JSONL: one fully serialized batch per line, written with a
//! single `write_all`, so a reader scanning after a crash sees either the
//! previous complete state or the new one. A truncated trailing line is
//! ignored on read.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use mgrid_core::{ErrorInfo, GridError};
use mgrid_grid::GridSpace;
use serde::{Deserialize, Serialize};

use crate::balance::AssignmentTable;
use crate::checkpoint::WriteDiscipline;
use crate::hash::stable_hash_string;

fn io_error(code: &str, err: impl ToString, path: &Path) -> GridError {
    GridError::Io(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// Parameter-space descriptor written once at sweep start.
///
/// Restart reconciliation refuses prior output whose descriptor disagrees
/// with the current grid on dimensionality or axis identity. Axis *values*
/// are deliberately absent: pruning or reordering values between runs is
/// legal and handled by tolerant coordinate lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamInfo {
    /// Parameter names in axis order.
    pub axis_names: Vec<String>,
    /// Log-space flags in axis order.
    pub log_flags: Vec<bool>,
    /// Number of parameter dimensions.
    pub ndim: usize,
    /// Whether the grid was structured.
    pub structured: bool,
    /// Identity hash over `(axis_names, log_flags, structured)`.
    pub grid_hash: String,
}

impl ParamInfo {
    /// Builds the descriptor for the given space.
    pub fn describe(space: &GridSpace) -> Result<Self, GridError> {
        let axis_names = space.axis_names();
        let log_flags = space.log_flags();
        let structured = space.is_structured();
        let grid_hash = stable_hash_string(&(&axis_names, &log_flags, structured))?;
        Ok(Self {
            ndim: axis_names.len(),
            axis_names,
            log_flags,
            structured,
            grid_hash,
        })
    }
}

/// One persisted attempt: stored parameter vector plus payload.
///
/// `payload: None` is the blank sentinel recorded for timed-out and failed
/// attempts, distinguishing "ran, not available" from "never attempted"
/// while keeping the stream rectangular.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRecord {
    /// Stored-space parameter values in axis order.
    pub params: Vec<f64>,
    /// Payload fields for successful attempts, `None` otherwise.
    pub payload: Option<Vec<f64>>,
}

/// One failure-log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailRecord {
    /// Stored-space parameter values of the failing point.
    pub params: Vec<f64>,
    /// Coarse failure kind (error type name or "panic").
    pub kind: String,
    /// Diagnostic message from the simulator.
    pub message: String,
}

/// One timeout-log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutRecord {
    /// Stored-space parameter values of the abandoned point.
    pub params: Vec<f64>,
}

/// Last-attempted-point marker, overwritten per attempt.
///
/// Postmortem only: a marker with `finished_at: None` identifies the point
/// a dead worker was computing. Never consulted by resume logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflightMarker {
    /// Stored-space parameter values of the attempt.
    pub params: Vec<f64>,
    /// RFC 3339 timestamp taken before invoking the simulator.
    pub started_at: String,
    /// RFC 3339 timestamp of the terminal outcome, if reached.
    pub finished_at: Option<String>,
}

/// Path layout and serialization for one worker's view of the output.
#[derive(Debug, Clone)]
pub struct OutputStore {
    directory: PathBuf,
    prefix: String,
    rank: usize,
    discipline: WriteDiscipline,
}

impl OutputStore {
    /// Creates a store handle for the given rank.
    pub fn new(
        directory: impl Into<PathBuf>,
        prefix: impl Into<String>,
        rank: usize,
        discipline: WriteDiscipline,
    ) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            rank,
            discipline,
        }
    }

    fn path(&self, suffix: &str) -> PathBuf {
        self.directory.join(format!("{}.{suffix}", self.prefix))
    }

    fn ranked(&self, rank: usize, suffix: &str) -> PathBuf {
        self.path(&format!("{rank:03}.{suffix}"))
    }

    /// Parameter-space descriptor path.
    pub fn pinfo_path(&self) -> PathBuf {
        self.path("pinfo.json")
    }

    /// Chain stream this worker appends to.
    pub fn chain_path(&self) -> PathBuf {
        match self.discipline {
            WriteDiscipline::Sharded => self.ranked(self.rank, "chain.jsonl"),
            WriteDiscipline::Shared => self.path("chain.jsonl"),
        }
    }

    /// Chain stream of a specific rank under the sharded discipline.
    pub fn chain_path_for(&self, rank: usize) -> PathBuf {
        match self.discipline {
            WriteDiscipline::Sharded => self.ranked(rank, "chain.jsonl"),
            WriteDiscipline::Shared => self.path("chain.jsonl"),
        }
    }

    /// Failure log path for this worker.
    pub fn fail_path(&self) -> PathBuf {
        self.ranked(self.rank, "fail.jsonl")
    }

    /// Timeout log path for this worker.
    pub fn timeout_path(&self) -> PathBuf {
        self.ranked(self.rank, "timeout.jsonl")
    }

    /// In-flight marker path for this worker.
    pub fn inflight_path(&self) -> PathBuf {
        self.ranked(self.rank, "inflight.json")
    }

    /// Assignment-table history path.
    pub fn load_path(&self) -> PathBuf {
        self.path("load.jsonl")
    }

    /// True when output from a prior run exists under this prefix.
    pub fn has_prior_output(&self) -> bool {
        self.pinfo_path().exists()
    }

    /// Prepares the destination for a fresh sweep.
    ///
    /// Runner duty, performed once before any worker starts: creates the
    /// directory, removes stale artifacts when overwriting, writes the
    /// descriptor, and touches the chain stream(s).
    pub fn prepare(&self, space: &GridSpace, world: usize, overwrite: bool) -> Result<(), GridError> {
        fs::create_dir_all(&self.directory)
            .map_err(|err| io_error("store-mkdir", err, &self.directory))?;
        if overwrite {
            self.remove_artifacts()?;
        }
        let info = ParamInfo::describe(space)?;
        self.write_pinfo(&info)?;
        match self.discipline {
            WriteDiscipline::Shared => {
                touch(&self.path("chain.jsonl"))?;
            }
            WriteDiscipline::Sharded => {
                for rank in 0..world {
                    touch(&self.ranked(rank, "chain.jsonl"))?;
                }
            }
        }
        Ok(())
    }

    /// Deletes every artifact under the prefix, including rank-suffixed
    /// shards from a prior pool of any size. A survivor from a larger pool
    /// would make a later restart misread the prior worker count.
    fn remove_artifacts(&self) -> Result<(), GridError> {
        let marker = format!("{}.", self.prefix);
        let entries = fs::read_dir(&self.directory)
            .map_err(|err| io_error("store-scan", err, &self.directory))?;
        for entry in entries {
            let entry = entry.map_err(|err| io_error("store-scan", err, &self.directory))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&marker) {
                continue;
            }
            let stale = name.ends_with("chain.jsonl")
                || name.ends_with("fail.jsonl")
                || name.ends_with("timeout.jsonl")
                || name.ends_with("inflight.json")
                || name.ends_with("pinfo.json")
                || name.ends_with("load.jsonl");
            if stale {
                let path = entry.path();
                fs::remove_file(&path).map_err(|err| io_error("store-clobber", err, &path))?;
            }
        }
        Ok(())
    }

    /// Writes the parameter-space descriptor.
    pub fn write_pinfo(&self, info: &ParamInfo) -> Result<(), GridError> {
        let path = self.pinfo_path();
        let json = serde_json::to_string_pretty(info)
            .map_err(|err| io_error("pinfo-serialize", err, &path))?;
        fs::write(&path, json).map_err(|err| io_error("pinfo-write", err, &path))
    }

    /// Loads the parameter-space descriptor of a prior run.
    pub fn read_pinfo(&self) -> Result<ParamInfo, GridError> {
        let path = self.pinfo_path();
        let contents =
            fs::read_to_string(&path).map_err(|err| io_error("pinfo-read", err, &path))?;
        serde_json::from_str(&contents).map_err(|err| io_error("pinfo-parse", err, &path))
    }

    /// Appends one batch of chain records as a single line.
    pub fn append_chain(&self, batch: &[ChainRecord]) -> Result<(), GridError> {
        let path = self.chain_path();
        let mut line = serde_json::to_vec(batch).map_err(|err| io_error("chain-serialize", err, &path))?;
        line.push(b'\n');
        append_all(&path, &line)
    }

    /// Reads every chain record of the given stream, oldest first.
    ///
    /// A missing stream reads as empty; a malformed *final* line is dropped
    /// as a crash-truncated flush, while corruption elsewhere is an error.
    pub fn read_chain(&self, path: &Path) -> Result<Vec<ChainRecord>, GridError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents =
            fs::read_to_string(path).map_err(|err| io_error("chain-read", err, path))?;
        let lines: Vec<&str> = contents.lines().filter(|line| !line.trim().is_empty()).collect();
        let mut records = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            match serde_json::from_str::<Vec<ChainRecord>>(line) {
                Ok(batch) => records.extend(batch),
                // Interrupted final flush; the batch never completed.
                Err(_) if index + 1 == lines.len() => break,
                Err(err) => return Err(io_error("chain-parse", err, path)),
            }
        }
        Ok(records)
    }

    /// Appends failure-log entries, one line each, in a single write.
    pub fn append_failures(&self, records: &[FailRecord]) -> Result<(), GridError> {
        self.append_log(&self.fail_path(), records)
    }

    /// Appends timeout-log entries, one line each, in a single write.
    pub fn append_timeouts(&self, records: &[TimeoutRecord]) -> Result<(), GridError> {
        self.append_log(&self.timeout_path(), records)
    }

    fn append_log<T: Serialize>(&self, path: &Path, records: &[T]) -> Result<(), GridError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buffer = Vec::new();
        for record in records {
            let mut line =
                serde_json::to_vec(record).map_err(|err| io_error("log-serialize", err, path))?;
            line.push(b'\n');
            buffer.extend(line);
        }
        append_all(path, &buffer)
    }

    /// Reads a JSONL log back, oldest entry first.
    pub fn read_log<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>, GridError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(path).map_err(|err| io_error("log-read", err, path))?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(|err| io_error("log-parse", err, path)))
            .collect()
    }

    /// Overwrites this worker's in-flight marker.
    pub fn write_inflight(&self, marker: &InflightMarker) -> Result<(), GridError> {
        let path = self.inflight_path();
        let json = serde_json::to_string_pretty(marker)
            .map_err(|err| io_error("inflight-serialize", err, &path))?;
        fs::write(&path, json).map_err(|err| io_error("inflight-write", err, &path))
    }

    /// Appends the agreed assignment table to the load history.
    pub fn append_load(&self, table: &AssignmentTable) -> Result<(), GridError> {
        let path = self.load_path();
        let mut line =
            serde_json::to_vec(table).map_err(|err| io_error("load-serialize", err, &path))?;
        line.push(b'\n');
        append_all(&path, &line)
    }
}

fn touch(path: &Path) -> Result<(), GridError> {
    if !path.exists() {
        File::create(path).map_err(|err| io_error("store-touch", err, path))?;
    }
    Ok(())
}

fn append_all(path: &Path, bytes: &[u8]) -> Result<(), GridError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| io_error("append-open", err, path))?;
    file.write_all(bytes)
        .map_err(|err| io_error("append-write", err, path))
}
