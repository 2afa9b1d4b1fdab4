//! Progressive simplification
//!
//! Large reductions are split into steps that each keep at least
//! `min_step_ratio` of the faces they start with. Every step goes through a
//! [`MeshSimplifier`]; its output is checked before it replaces the current
//! mesh, so the face count never grows and texture coordinates are only
//! dropped with a recorded warning.

use crate::{MeshSimplifier, ReductionConstraints};
use polyreduce_core::{Error, Result, TriangleMesh};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Tunable step policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveConfig {
    /// Smallest fraction of its input a single step may keep
    pub min_step_ratio: f64,
    /// Accepted overshoot above the target, as a fraction of the target
    pub tolerance_ratio: f64,
    /// Accepted overshoot floor in faces
    pub min_tolerance: usize,
    /// Maximum primitive invocations per run, UV retries included
    pub max_steps: usize,
}

impl Default for ProgressiveConfig {
    fn default() -> Self {
        Self {
            min_step_ratio: 0.5,
            tolerance_ratio: 0.02,
            min_tolerance: 2,
            max_steps: 16,
        }
    }
}

impl ProgressiveConfig {
    pub fn tolerance(&self, target: usize) -> usize {
        let relative = (target as f64 * self.tolerance_ratio).ceil() as usize;
        relative.max(self.min_tolerance)
    }

    /// Target for the next step starting from `current` faces
    pub fn step_target(&self, current: usize, target: usize) -> usize {
        let floor = (current as f64 * self.min_step_ratio).ceil() as usize;
        floor.max(target).min(current)
    }

    /// Step targets an exact primitive would go through
    pub fn plan(&self, current: usize, target: usize) -> Vec<usize> {
        let tolerance = self.tolerance(target);
        let mut steps = Vec::new();
        let mut faces = current;
        while faces > target + tolerance && steps.len() < self.max_steps {
            let next = self.step_target(faces, target);
            if next >= faces {
                break;
            }
            steps.push(next);
            faces = next;
        }
        steps
    }
}

/// One executed reduction step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplificationStep {
    pub index: usize,
    pub input_faces: usize,
    pub target_faces: usize,
    /// `target_faces / input_faces`
    pub ratio: f64,
    pub preserve_boundaries: bool,
    pub preserve_uv: bool,
    pub output_faces: usize,
    pub uv_retained: bool,
    /// The step ran a second time with a gentler target after losing UVs
    pub uv_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    StepBudgetExhausted,
    NoProgress,
    FaceCountIncreased,
}

/// Non-fatal findings of a progressive run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimplificationWarning {
    Stalled {
        reason: StallReason,
        faces: usize,
        target: usize,
        steps: usize,
    },
    UvLost {
        step: usize,
    },
    StepFailed {
        step: usize,
        message: String,
    },
    BelowTarget {
        faces: usize,
        target: usize,
    },
    Interrupted {
        steps: usize,
    },
}

impl fmt::Display for SimplificationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimplificationWarning::Stalled { reason, faces, target, steps } => {
                let why = match reason {
                    StallReason::StepBudgetExhausted => "step budget exhausted",
                    StallReason::NoProgress => "a step removed no faces",
                    StallReason::FaceCountIncreased => "a step increased the face count",
                };
                write!(f, "simplification stalled at {faces} faces (target {target}) after {steps} steps: {why}")
            }
            SimplificationWarning::UvLost { step } => {
                write!(f, "texture coordinates lost in step {step} after fallback retry")
            }
            SimplificationWarning::StepFailed { step, message } => {
                write!(f, "step {step} failed: {message}")
            }
            SimplificationWarning::BelowTarget { faces, target } => {
                write!(f, "primitive returned {faces} faces, below target {target}")
            }
            SimplificationWarning::Interrupted { steps } => {
                write!(f, "interrupted after {steps} steps")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimplificationOutcome {
    pub mesh: TriangleMesh,
    pub steps: Vec<SimplificationStep>,
    pub warnings: Vec<SimplificationWarning>,
    pub tolerance: usize,
}

impl SimplificationOutcome {
    pub fn stalled(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, SimplificationWarning::Stalled { .. } | SimplificationWarning::StepFailed { .. }))
    }

    pub fn interrupted(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, SimplificationWarning::Interrupted { .. }))
    }
}

/// Drives a [`MeshSimplifier`] toward a face budget in bounded steps
pub struct ProgressiveSimplifier<'a> {
    primitive: &'a dyn MeshSimplifier,
    config: ProgressiveConfig,
}

impl<'a> ProgressiveSimplifier<'a> {
    pub fn new(primitive: &'a dyn MeshSimplifier, config: ProgressiveConfig) -> Self {
        Self { primitive, config }
    }

    pub fn config(&self) -> &ProgressiveConfig {
        &self.config
    }

    pub fn run(
        &self,
        mesh: &TriangleMesh,
        target: usize,
        constraints: &ReductionConstraints,
    ) -> Result<SimplificationOutcome> {
        self.run_until(mesh, target, constraints, || false)
    }

    /// Like [`run`](Self::run), checking `interrupted` before every step
    pub fn run_until<F>(
        &self,
        mesh: &TriangleMesh,
        target: usize,
        constraints: &ReductionConstraints,
        mut interrupted: F,
    ) -> Result<SimplificationOutcome>
    where
        F: FnMut() -> bool,
    {
        if mesh.face_count() == 0 {
            return Err(Error::InvalidData("cannot simplify a mesh without faces".into()));
        }
        if target == 0 {
            return Err(Error::InvalidData("target face count must be positive".into()));
        }

        let tolerance = self.config.tolerance(target);
        let uv_required = constraints.preserve_uv && mesh.has_uvs();
        let mut current = mesh.clone();
        let mut steps: Vec<SimplificationStep> = Vec::new();
        let mut warnings = Vec::new();
        let mut invocations = 0usize;

        info!(
            input_faces = mesh.face_count(),
            target,
            tolerance,
            planned_steps = self.config.plan(mesh.face_count(), target).len(),
            "progressive simplification started"
        );

        while current.face_count() > target + tolerance {
            if interrupted() {
                warnings.push(SimplificationWarning::Interrupted { steps: steps.len() });
                break;
            }
            let stalled = |reason| SimplificationWarning::Stalled {
                reason,
                faces: current.face_count(),
                target,
                steps: steps.len(),
            };
            if invocations >= self.config.max_steps {
                warnings.push(stalled(StallReason::StepBudgetExhausted));
                break;
            }

            let index = steps.len() + 1;
            let input_faces = current.face_count();
            let mut step_target = self.config.step_target(input_faces, target);

            invocations += 1;
            let mut result = match self.primitive.reduce(&current, step_target, constraints) {
                Ok(m) => m,
                Err(e) => {
                    warnings.push(SimplificationWarning::StepFailed { step: index, message: e.to_string() });
                    break;
                }
            };

            let mut uv_fallback = false;
            let had_uvs = current.has_uvs();
            if uv_required && had_uvs && !result.has_uvs() && invocations < self.config.max_steps {
                let retry_target = input_faces - (input_faces - step_target) / 2;
                warn!(step = index, step_target, retry_target, "step lost texture coordinates, retrying gentler");
                invocations += 1;
                uv_fallback = true;
                step_target = retry_target;
                result = match self.primitive.reduce(&current, step_target, constraints) {
                    Ok(m) => m,
                    Err(e) => {
                        warnings.push(SimplificationWarning::StepFailed { step: index, message: e.to_string() });
                        break;
                    }
                };
            }

            let output_faces = result.face_count();
            if output_faces > input_faces {
                warnings.push(stalled(StallReason::FaceCountIncreased));
                break;
            }
            if output_faces == input_faces {
                warnings.push(stalled(StallReason::NoProgress));
                break;
            }

            let uv_retained = result.has_uvs();
            if uv_required && had_uvs && !uv_retained {
                warnings.push(SimplificationWarning::UvLost { step: index });
            }

            debug!(step = index, input_faces, step_target, output_faces, uv_retained, "step finished");
            steps.push(SimplificationStep {
                index,
                input_faces,
                target_faces: step_target,
                ratio: step_target as f64 / input_faces as f64,
                preserve_boundaries: constraints.preserve_boundaries,
                preserve_uv: constraints.preserve_uv,
                output_faces,
                uv_retained,
                uv_fallback,
            });
            current = result;
        }

        if current.face_count() < target {
            warnings.push(SimplificationWarning::BelowTarget { faces: current.face_count(), target });
        }
        for w in &warnings {
            warn!(warning = %w, "progressive simplification");
        }
        info!(output_faces = current.face_count(), steps = steps.len(), "progressive simplification finished");

        Ok(SimplificationOutcome {
            mesh: current,
            steps,
            warnings,
            tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EdgeCollapseSimplifier;
    use polyreduce_core::Point3f;
    use std::cell::{Cell, RefCell};

    /// Strip of `n` triangles with UVs
    fn make_strip(n: usize) -> TriangleMesh {
        let mut vertices = Vec::new();
        let mut uvs = Vec::new();
        for i in 0..n + 2 {
            vertices.push(Point3f::new((i / 2) as f32, (i % 2) as f32, 0.0));
            uvs.push([(i / 2) as f32 / n as f32, (i % 2) as f32]);
        }
        let faces = (0..n).map(|i| [i, i + 1, i + 2]).collect();
        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        mesh.set_uvs(uvs);
        mesh
    }

    /// Keeps the first `target` faces
    struct Truncate {
        calls: RefCell<Vec<usize>>,
        drop_uvs_when_ratio_below: f64,
    }

    impl Truncate {
        fn new() -> Self {
            Self { calls: RefCell::new(Vec::new()), drop_uvs_when_ratio_below: 0.0 }
        }
    }

    impl MeshSimplifier for Truncate {
        fn reduce(&self, mesh: &TriangleMesh, target: usize, _: &ReductionConstraints) -> Result<TriangleMesh> {
            self.calls.borrow_mut().push(target);
            let mut out = mesh.clone();
            out.faces.truncate(target);
            if (target as f64 / mesh.face_count() as f64) < self.drop_uvs_when_ratio_below {
                out.uvs = None;
            }
            Ok(out)
        }
    }

    struct Stubborn;

    impl MeshSimplifier for Stubborn {
        fn reduce(&self, mesh: &TriangleMesh, _: usize, _: &ReductionConstraints) -> Result<TriangleMesh> {
            Ok(mesh.clone())
        }
    }

    struct Growing;

    impl MeshSimplifier for Growing {
        fn reduce(&self, mesh: &TriangleMesh, _: usize, _: &ReductionConstraints) -> Result<TriangleMesh> {
            let mut out = mesh.clone();
            out.faces.push(out.faces[0]);
            Ok(out)
        }
    }

    /// Removes a single face per call
    struct Crawling;

    impl MeshSimplifier for Crawling {
        fn reduce(&self, mesh: &TriangleMesh, _: usize, _: &ReductionConstraints) -> Result<TriangleMesh> {
            let mut out = mesh.clone();
            out.faces.pop();
            Ok(out)
        }
    }

    fn uv_constraints() -> ReductionConstraints {
        ReductionConstraints { preserve_boundaries: true, preserve_uv: true }
    }

    #[test]
    fn test_plan_halves_until_target() {
        let config = ProgressiveConfig::default();
        assert_eq!(config.plan(20_000, 5_000), vec![10_000, 5_000]);
        assert_eq!(config.plan(1_000, 900), vec![900]);
        assert!(config.plan(1_000, 990).is_empty());
        assert_eq!(config.plan(10_000, 100).len(), 7);
    }

    #[test]
    fn test_tolerance_has_floor() {
        let config = ProgressiveConfig::default();
        assert_eq!(config.tolerance(10), 2);
        assert_eq!(config.tolerance(5_000), 100);
    }

    #[test]
    fn test_steps_never_remove_more_than_half() {
        let primitive = Truncate::new();
        let simplifier = ProgressiveSimplifier::new(&primitive, ProgressiveConfig::default());
        let mesh = make_strip(1_000);

        let outcome = simplifier.run(&mesh, 100, &uv_constraints()).unwrap();

        assert_eq!(outcome.mesh.face_count(), 100);
        assert!(outcome.warnings.is_empty());
        let mut previous = mesh.face_count();
        for step in &outcome.steps {
            assert!(step.ratio >= 0.5);
            assert!(step.output_faces < previous);
            previous = step.output_faces;
        }
        assert_eq!(*primitive.calls.borrow(), vec![500, 250, 125, 100]);
    }

    #[test]
    fn test_final_count_within_tolerance() {
        let mesh = make_strip(5_000);
        for target in [4_999, 2_500, 1_234, 10] {
            let primitive = Truncate::new();
            let outcome = ProgressiveSimplifier::new(&primitive, ProgressiveConfig::default())
                .run(&mesh, target, &uv_constraints())
                .unwrap();
            let faces = outcome.mesh.face_count();
            assert!(target <= faces && faces <= target + outcome.tolerance, "target {target} got {faces}");
        }
    }

    #[test]
    fn test_uv_loss_retries_once_with_smaller_step() {
        let primitive = Truncate { drop_uvs_when_ratio_below: 0.6, ..Truncate::new() };
        let simplifier = ProgressiveSimplifier::new(&primitive, ProgressiveConfig::default());
        let mesh = make_strip(1_000);

        let outcome = simplifier.run(&mesh, 500, &uv_constraints()).unwrap();

        // 500 drops UVs, retry at 750 keeps them, then 500 again from 750
        assert_eq!(*primitive.calls.borrow(), vec![500, 750, 500]);
        assert!(outcome.steps[0].uv_fallback);
        assert!(outcome.mesh.has_uvs());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_uv_loss_after_retry_is_recorded() {
        let primitive = Truncate { drop_uvs_when_ratio_below: 1.0, ..Truncate::new() };
        let simplifier = ProgressiveSimplifier::new(&primitive, ProgressiveConfig::default());

        let outcome = simplifier.run(&make_strip(100), 60, &uv_constraints()).unwrap();

        assert!(!outcome.mesh.has_uvs());
        assert!(outcome
            .warnings
            .iter()
            .any(|w| matches!(w, SimplificationWarning::UvLost { step: 1 })));
    }

    #[test]
    fn test_uv_loss_without_preserve_flag_is_silent() {
        let primitive = Truncate { drop_uvs_when_ratio_below: 1.0, ..Truncate::new() };
        let constraints = ReductionConstraints { preserve_boundaries: false, preserve_uv: false };
        let outcome = ProgressiveSimplifier::new(&primitive, ProgressiveConfig::default())
            .run(&make_strip(100), 60, &constraints)
            .unwrap();
        assert_eq!(primitive.calls.borrow().len(), 1);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_no_progress_stalls_with_partial_result() {
        let outcome = ProgressiveSimplifier::new(&Stubborn, ProgressiveConfig::default())
            .run(&make_strip(100), 10, &uv_constraints())
            .unwrap();
        assert!(outcome.stalled());
        assert_eq!(outcome.mesh.face_count(), 100);
        assert!(outcome.steps.is_empty());
    }

    #[test]
    fn test_growth_is_rejected() {
        let outcome = ProgressiveSimplifier::new(&Growing, ProgressiveConfig::default())
            .run(&make_strip(100), 10, &uv_constraints())
            .unwrap();
        assert_eq!(outcome.mesh.face_count(), 100);
        assert!(matches!(
            outcome.warnings[0],
            SimplificationWarning::Stalled { reason: StallReason::FaceCountIncreased, .. }
        ));
    }

    #[test]
    fn test_step_budget_exhaustion_keeps_progress() {
        let config = ProgressiveConfig { max_steps: 5, ..ProgressiveConfig::default() };
        let outcome = ProgressiveSimplifier::new(&Crawling, config)
            .run(&make_strip(100), 10, &uv_constraints())
            .unwrap();
        assert_eq!(outcome.steps.len(), 5);
        assert_eq!(outcome.mesh.face_count(), 95);
        assert!(matches!(
            outcome.warnings.last(),
            Some(SimplificationWarning::Stalled { reason: StallReason::StepBudgetExhausted, .. })
        ));
    }

    #[test]
    fn test_interrupt_stops_before_next_step() {
        let primitive = Truncate::new();
        let calls = Cell::new(0);
        let outcome = ProgressiveSimplifier::new(&primitive, ProgressiveConfig::default())
            .run_until(&make_strip(1_000), 100, &uv_constraints(), || {
                calls.set(calls.get() + 1);
                calls.get() > 2
            })
            .unwrap();
        assert_eq!(outcome.steps.len(), 2);
        assert!(outcome.interrupted());
    }

    #[test]
    fn test_target_within_tolerance_runs_no_steps() {
        let primitive = Truncate::new();
        let outcome = ProgressiveSimplifier::new(&primitive, ProgressiveConfig::default())
            .run(&make_strip(101), 100, &uv_constraints())
            .unwrap();
        assert!(outcome.steps.is_empty());
        assert!(primitive.calls.borrow().is_empty());
    }

    #[test]
    fn test_edge_collapse_primitive_end_to_end() {
        let mut vertices = Vec::new();
        let mut uvs = Vec::new();
        let size = 30;
        for y in 0..size {
            for x in 0..size {
                let fx = x as f32 / (size - 1) as f32 * std::f32::consts::PI;
                let fy = y as f32 / (size - 1) as f32 * std::f32::consts::PI;
                vertices.push(Point3f::new(x as f32, y as f32, fx.sin() * fy.sin() * 2.0));
                uvs.push([x as f32 / (size - 1) as f32, y as f32 / (size - 1) as f32]);
            }
        }
        let mut faces = Vec::new();
        for y in 0..size - 1 {
            for x in 0..size - 1 {
                let tl = y * size + x;
                faces.push([tl, tl + size, tl + 1]);
                faces.push([tl + 1, tl + size, tl + size + 1]);
            }
        }
        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        mesh.set_uvs(uvs);

        let primitive = EdgeCollapseSimplifier::new();
        let outcome = ProgressiveSimplifier::new(&primitive, ProgressiveConfig::default())
            .run(&mesh, 400, &uv_constraints())
            .unwrap();

        assert!(outcome.steps.len() >= 2);
        let faces = outcome.mesh.face_count();
        assert!((400..=400 + outcome.tolerance).contains(&faces));
        assert!(outcome.mesh.has_uvs());
    }
}
