//! Per-job resources
//!
//! A [`JobContext`] is created before a job touches the filesystem and is
//! passed to every stage. It holds the lock on the shared temp root, owns the
//! job's working directory (removed on drop unless diagnostics are retained),
//! carries the cancellation token and writes the plain-text job log.

use crate::config::PipelineConfig;
use crate::error::{ProcessError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Paths currently locked by a [`WorkspaceLock`] in this process
static HELD_PATHS: OnceLock<(Mutex<HashSet<PathBuf>>, Condvar)> = OnceLock::new();
static NEXT_JOB: AtomicU64 = AtomicU64::new(0);

fn registry() -> &'static (Mutex<HashSet<PathBuf>>, Condvar) {
    HELD_PATHS.get_or_init(|| (Mutex::new(HashSet::new()), Condvar::new()))
}

/// Exclusive hold on a working path; released on drop
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
}

impl WorkspaceLock {
    /// Block until no other holder has `path`
    pub fn acquire(path: &Path) -> Self {
        let (held, released) = registry();
        let mut paths = held.lock().unwrap_or_else(PoisonError::into_inner);
        if paths.contains(path) {
            debug!(path = %path.display(), "waiting for workspace lock");
        }
        while paths.contains(path) {
            paths = released.wait(paths).unwrap_or_else(PoisonError::into_inner);
        }
        paths.insert(path.to_path_buf());
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn try_acquire(path: &Path) -> Option<Self> {
        let (held, _) = registry();
        let mut paths = held.lock().unwrap_or_else(PoisonError::into_inner);
        paths.insert(path.to_path_buf()).then(|| Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let (held, released) = registry();
        let mut paths = held.lock().unwrap_or_else(PoisonError::into_inner);
        paths.remove(&self.path);
        released.notify_all();
    }
}

/// Cooperative cancellation flag shared between a caller and a job
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub millis: u64,
}

pub struct JobContext {
    id: String,
    work_dir: PathBuf,
    logs_dir: PathBuf,
    cancel: CancellationToken,
    retain: bool,
    log: Mutex<Option<BufWriter<File>>>,
    started_at: DateTime<Local>,
    started: Instant,
    current_stage: Option<(String, Instant)>,
    timings: Vec<StageTiming>,
    _lock: WorkspaceLock,
}

impl JobContext {
    /// Lock the configured temp root and create this job's working directory
    pub fn begin(config: &PipelineConfig, cancel: CancellationToken, retain: bool) -> Result<Self> {
        fs::create_dir_all(&config.temp_dir)?;
        let root = fs::canonicalize(&config.temp_dir)?;
        let lock = WorkspaceLock::acquire(&root);

        let started_at = Local::now();
        let id = format!(
            "job_{}_{}_{}",
            started_at.format("%Y%m%d_%H%M%S"),
            std::process::id(),
            NEXT_JOB.fetch_add(1, Ordering::Relaxed)
        );
        let work_dir = root.join(&id);
        let logs_dir = work_dir.join("logs");
        fs::create_dir_all(&logs_dir)?;

        let context = Self {
            id,
            work_dir,
            logs_dir,
            cancel,
            retain,
            log: Mutex::new(None),
            started_at,
            started: Instant::now(),
            current_stage: None,
            timings: Vec::new(),
            _lock: lock,
        };
        let file = File::create(context.job_log_path())?;
        *context.log.lock().unwrap_or_else(PoisonError::into_inner) = Some(BufWriter::new(file));

        info!(job = %context.id, dir = %context.work_dir.display(), "job started");
        context.log(format_args!("job {} started", context.id));
        Ok(context)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Directory whose contents are archived under `logs/`
    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn job_log_path(&self) -> PathBuf {
        self.logs_dir.join("job.log")
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Append a timestamped line to the job log
    pub fn log(&self, message: impl Display) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(writer) = log.as_mut() {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            if let Err(e) = writeln!(writer, "[{stamp}] {message}") {
                debug!(error = %e, "job log write failed");
            }
        }
    }

    pub fn flush_log(&self) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(writer) = log.as_mut() {
            if let Err(e) = writer.flush() {
                debug!(error = %e, "job log flush failed");
            }
        }
    }

    /// Close the running stage, then start `stage` unless the job was cancelled
    pub fn checkpoint(&mut self, stage: &str) -> Result<()> {
        self.finish_stage();
        if self.is_cancelled() {
            info!(job = %self.id, stage, "job cancelled");
            self.log(format_args!("cancelled before {stage}"));
            return Err(ProcessError::Cancelled {
                stage: stage.to_string(),
            });
        }
        debug!(job = %self.id, stage, "stage started");
        self.log(format_args!("stage {stage}"));
        self.current_stage = Some((stage.to_string(), Instant::now()));
        Ok(())
    }

    pub fn finish_stage(&mut self) {
        if let Some((stage, started)) = self.current_stage.take() {
            let millis = started.elapsed().as_millis() as u64;
            self.log(format_args!("stage {stage} finished in {millis} ms"));
            self.timings.push(StageTiming { stage, millis });
        }
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }
}

impl Drop for JobContext {
    fn drop(&mut self) {
        self.finish_stage();
        let writer = match self.log.get_mut() {
            Ok(log) => log.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(mut writer) = writer {
            let _ = writer.flush();
        }

        if self.retain {
            info!(job = %self.id, dir = %self.work_dir.display(), "retaining job directory");
        } else if let Err(e) = fs::remove_dir_all(&self.work_dir) {
            warn!(job = %self.id, error = %e, "failed to remove job directory");
        } else {
            debug!(job = %self.id, "job directory removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_try_acquire_is_exclusive() {
        let dir = tempdir().unwrap();
        let first = WorkspaceLock::try_acquire(dir.path()).unwrap();
        assert!(WorkspaceLock::try_acquire(dir.path()).is_none());
        drop(first);
        assert!(WorkspaceLock::try_acquire(dir.path()).is_some());
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let held = WorkspaceLock::acquire(&path);
        let entered = Arc::new(AtomicBool::new(false));

        let waiter = {
            let path = path.clone();
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                let _lock = WorkspaceLock::acquire(&path);
                entered.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!entered.load(Ordering::SeqCst));
        drop(held);
        waiter.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[test]
    fn test_context_removes_work_dir() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::rooted_at(dir.path());
        let work_dir = {
            let mut ctx = JobContext::begin(&config, CancellationToken::new(), false).unwrap();
            ctx.checkpoint("decode").unwrap();
            ctx.log("hello");
            ctx.flush_log();
            assert!(ctx.job_log_path().is_file());
            ctx.work_dir().to_path_buf()
        };
        assert!(!work_dir.exists());
        assert!(WorkspaceLock::try_acquire(&fs::canonicalize(&config.temp_dir).unwrap()).is_some());
    }

    #[test]
    fn test_context_retains_when_asked() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::rooted_at(dir.path());
        let ctx = JobContext::begin(&config, CancellationToken::new(), true).unwrap();
        let log = ctx.job_log_path();
        drop(ctx);
        let text = fs::read_to_string(log).unwrap();
        assert!(text.contains("started"));
    }

    #[test]
    fn test_checkpoint_honours_cancellation() {
        let dir = tempdir().unwrap();
        let token = CancellationToken::new();
        let mut ctx = JobContext::begin(&PipelineConfig::rooted_at(dir.path()), token.clone(), false).unwrap();
        ctx.checkpoint("analysis").unwrap();
        token.cancel();
        let err = ctx.checkpoint("simplify").unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled { ref stage } if stage == "simplify"));
        assert_eq!(ctx.timings().len(), 1);
        assert_eq!(ctx.timings()[0].stage, "analysis");
    }
}
