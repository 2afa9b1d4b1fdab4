//! Retopology through an external Instant Meshes compatible binary
//!
//! The binary is treated as a black box behind [`RetopologyBackend`];
//! [`RetopologyInvoker`] builds its parameters and re-validates whatever it
//! returns before the pipeline accepts it.

use crate::analyzer::{MeshAnalyzer, QualityReport};
use crate::context::JobContext;
use crate::error::{ProcessError, Result};
use crate::issue::{Issue, IssueKind};
use crate::request::{ExtraOption, RemeshMode};
use chrono::Local;
use polyreduce_core::TriangleMesh;
use polyreduce_io::{MeshWriter, ObjWriter};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Invocation parameters for one retopology run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetopologyParams {
    pub target_faces: usize,
    pub mode: RemeshMode,
    /// Suggested edge length, recorded in the run log
    pub edge_length: f64,
    pub extra_options: Vec<ExtraOption>,
}

impl RetopologyParams {
    pub fn new(target_faces: usize, mode: RemeshMode, bbox_diagonal: f64) -> Self {
        Self {
            target_faces,
            mode,
            edge_length: suggested_edge_length(bbox_diagonal, target_faces),
            extra_options: Vec::new(),
        }
    }

    pub fn with_extra_options(mut self, options: Vec<ExtraOption>) -> Self {
        self.extra_options = options;
        self
    }

    /// Face count passed to the binary; coarse mode asks for 80% of the target
    pub fn requested_faces(&self) -> usize {
        match self.mode {
            RemeshMode::Coarse => (self.target_faces * 4 / 5).max(1),
            _ => self.target_faces,
        }
    }

    /// Command line for the binary, minus the executable itself
    pub fn arguments(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-i".into(),
            input.into(),
            "-o".into(),
            output.into(),
            "--faces".into(),
            self.requested_faces().to_string().into(),
            "-d".into(),
        ];
        let mode_flags: &[&str] = match self.mode {
            RemeshMode::Balanced => &["-b"],
            RemeshMode::Fine => &["-b", "-c"],
            RemeshMode::Coarse => &[],
            RemeshMode::FixHoles => &["-b", "-s", "2"],
        };
        args.extend(mode_flags.iter().map(OsString::from));
        for option in &self.extra_options {
            args.push(option.flag.clone().into());
            if let Some(value) = &option.value {
                args.push(value.clone().into());
            }
        }
        args
    }
}

/// `diagonal / (sqrt(target) * 10)`, clamped to `[0.001, 0.1 * diagonal]`
pub fn suggested_edge_length(diagonal: f64, target_faces: usize) -> f64 {
    let raw = diagonal / ((target_faces.max(1) as f64).sqrt() * 10.0);
    let upper = (0.1 * diagonal).max(0.001);
    raw.clamp(0.001, upper)
}

/// Something that rebuilds a mesh's connectivity
pub trait RetopologyBackend: Send + Sync {
    fn invoke(
        &self,
        mesh: &TriangleMesh,
        params: &RetopologyParams,
        timeout: Duration,
        ctx: &JobContext,
    ) -> Result<TriangleMesh>;
}

/// Runs the Instant Meshes command-line tool as a subprocess
#[derive(Debug, Clone)]
pub struct InstantMeshesBackend {
    executable: PathBuf,
    poll_interval: Duration,
}

impl InstantMeshesBackend {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn open_run_log(&self, ctx: &JobContext, params: &RetopologyParams, args: &[OsString]) -> Result<File> {
        let now = Local::now();
        let path = ctx
            .logs_dir()
            .join(format!("retopology_{}.log", now.format("%Y%m%d_%H%M%S_%3f")));
        let mut log = OpenOptions::new().create(true).append(true).open(&path)?;
        let command = std::iter::once(self.executable.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(log, "===== {} Instant Meshes Run =====", now.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(log, "Edge length: {:.6}", params.edge_length)?;
        writeln!(log, "Target faces: {}", params.target_faces)?;
        writeln!(log, "Command: {command}")?;
        writeln!(log)?;
        log.flush()?;
        Ok(log)
    }

    fn wait(&self, child: &mut Child, timeout: Duration, ctx: &JobContext) -> Result<std::process::ExitStatus> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(e) => {
                    terminate(child);
                    return Err(ProcessError::ExternalTool(format!("failed to poll process: {e}")));
                }
            }
            if ctx.is_cancelled() {
                warn!(pid = child.id(), "killing retopology process after cancellation");
                terminate(child);
                return Err(ProcessError::Cancelled {
                    stage: "retopology".to_string(),
                });
            }
            if started.elapsed() >= timeout {
                warn!(pid = child.id(), timeout_secs = timeout.as_secs_f64(), "killing retopology process after timeout");
                terminate(child);
                return Err(ProcessError::ExternalToolTimeout {
                    seconds: timeout.as_secs(),
                });
            }
            thread::sleep(self.poll_interval);
        }
    }
}

impl RetopologyBackend for InstantMeshesBackend {
    fn invoke(
        &self,
        mesh: &TriangleMesh,
        params: &RetopologyParams,
        timeout: Duration,
        ctx: &JobContext,
    ) -> Result<TriangleMesh> {
        let input = ctx.work_dir().join("retopology_input.obj");
        let output = ctx.work_dir().join("retopology_output.obj");
        let _scratch = ScratchFiles(vec![input.clone(), output.clone()]);
        ObjWriter::write_mesh(mesh, &input)?;

        let args = params.arguments(&input, &output);
        let log = self.open_run_log(ctx, params, &args)?;
        let mut child = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log)
            .spawn()
            .map_err(|e| {
                ProcessError::ExternalTool(format!("failed to start {}: {e}", self.executable.display()))
            })?;
        info!(pid = child.id(), faces = params.requested_faces(), mode = %params.mode, "retopology started");

        let status = self.wait(&mut child, timeout, ctx)?;
        info!(%status, "retopology finished");
        if !status.success() {
            return Err(ProcessError::ExternalTool(format!(
                "{} exited with {status}",
                self.executable.display()
            )));
        }
        if !output.is_file() {
            return Err(ProcessError::RetopologyRejected("no output file was produced".to_string()));
        }
        polyreduce_io::read_mesh(&output)
            .map_err(|e| ProcessError::RetopologyRejected(format!("output could not be decoded: {e}")))
    }
}

fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(error = %e, "kill failed; process may have exited");
    }
    let _ = child.wait();
}

/// Files removed when the invocation returns, whatever the outcome
struct ScratchFiles(Vec<PathBuf>);

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    debug!(path = %path.display(), error = %e, "scratch file not removed");
                }
            }
        }
    }
}

/// Accepted retopology result
#[derive(Debug, Clone)]
pub struct RetopologyOutcome {
    pub mesh: TriangleMesh,
    pub report: QualityReport,
    pub params: RetopologyParams,
    pub issues: Vec<Issue>,
    pub elapsed: Duration,
}

/// Runs a backend and re-validates its output
pub struct RetopologyInvoker<'a> {
    backend: &'a dyn RetopologyBackend,
    analyzer: &'a MeshAnalyzer,
    timeout: Duration,
}

impl<'a> RetopologyInvoker<'a> {
    pub fn new(backend: &'a dyn RetopologyBackend, analyzer: &'a MeshAnalyzer, timeout: Duration) -> Self {
        Self {
            backend,
            analyzer,
            timeout,
        }
    }

    pub fn run(
        &self,
        mesh: &TriangleMesh,
        input_report: &QualityReport,
        params: RetopologyParams,
        ctx: &JobContext,
    ) -> Result<RetopologyOutcome> {
        let started = Instant::now();
        ctx.log(format_args!(
            "retopology: mode {} target {} edge length {:.6}",
            params.mode, params.target_faces, params.edge_length
        ));

        let result = self.backend.invoke(mesh, &params, self.timeout, ctx)?;
        if result.face_count() == 0 {
            return Err(ProcessError::RetopologyRejected("result has no faces".to_string()));
        }
        let report = self
            .analyzer
            .analyze(&result)
            .map_err(|e| ProcessError::RetopologyRejected(e.to_string()))?;

        let mut issues = Vec::new();
        if !report.descriptor.watertight {
            issues.push(Issue::warning(
                IssueKind::RetopologyNotWatertight,
                format!(
                    "retopology result has {} boundary edges and {} components",
                    report.descriptor.boundary_edges, report.descriptor.components
                ),
            ));
        }
        let input_faces = input_report.descriptor.face_count;
        if result.face_count() > input_faces {
            issues.push(Issue::warning(
                IssueKind::RetopologyIncreasedFaces,
                format!("retopology produced {} faces from {input_faces}", result.face_count()),
            ));
        }

        let elapsed = started.elapsed();
        info!(
            faces = result.face_count(),
            watertight = report.descriptor.watertight,
            elapsed_ms = elapsed.as_millis() as u64,
            "retopology result accepted"
        );
        ctx.log(format_args!(
            "retopology produced {} faces in {} ms",
            result.face_count(),
            elapsed.as_millis()
        ));

        Ok(RetopologyOutcome {
            mesh: result,
            report,
            params,
            issues,
            elapsed,
        })
    }
}
