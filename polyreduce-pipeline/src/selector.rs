//! Strategy selection
//!
//! [`decide`] is a pure function of the quality report and the request; the
//! dispatch step matches on the returned [`Strategy`].

use crate::analyzer::QualityReport;
use crate::issue::{Issue, IssueKind};
use crate::request::{OperationKind, ProcessingRequest, RemeshMode, RequestedOperation};
use polyreduce_simplification::ReductionConstraints;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Strategy {
    Simplify {
        target_faces: usize,
        constraints: ReductionConstraints,
    },
    Remesh {
        target_faces: usize,
        mode: RemeshMode,
    },
    /// Copy the input through unchanged
    NoOp,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Simplify { .. } => "simplify",
            Strategy::Remesh { .. } => "remesh",
            Strategy::NoOp => "noop",
        }
    }

    pub fn kind(&self) -> Option<OperationKind> {
        match self {
            Strategy::Simplify { .. } => Some(OperationKind::Simplify),
            Strategy::Remesh { .. } => Some(OperationKind::Remesh),
            Strategy::NoOp => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub strategy: Strategy,
    pub justification: String,
    pub issues: Vec<Issue>,
}

/// Choose how to process a mesh
pub fn decide(report: &QualityReport, request: &ProcessingRequest) -> StrategyDecision {
    let descriptor = &report.descriptor;
    let current = descriptor.face_count;
    let target = request.target_faces;

    if target >= current {
        return StrategyDecision {
            strategy: Strategy::NoOp,
            justification: format!(
                "target of {target} faces is not below the current {current}; copying the mesh through"
            ),
            issues: vec![Issue::info(
                IssueKind::NoReductionNeeded,
                format!("mesh already has {current} faces, target is {target}"),
            )],
        };
    }

    let clean = descriptor.watertight && report.is_defect_free();
    let simplify = Strategy::Simplify {
        target_faces: target,
        constraints: ReductionConstraints {
            preserve_boundaries: request.preserve_boundaries,
            preserve_uv: request.preserve_uv,
        },
    };
    let auto_mode = if descriptor.boundary_edges > 0 {
        RemeshMode::FixHoles
    } else {
        RemeshMode::Balanced
    };
    let remesh = Strategy::Remesh {
        target_faces: target,
        mode: request.mode.unwrap_or(auto_mode),
    };

    match request.operation {
        RequestedOperation::Auto if clean => StrategyDecision {
            strategy: simplify,
            justification: format!(
                "mesh is watertight with no topology defects; simplifying {current} -> {target} faces"
            ),
            issues: Vec::new(),
        },
        RequestedOperation::Auto => StrategyDecision {
            justification: format!(
                "mesh needs reconstruction ({}); remeshing with mode {}",
                defect_summary(report),
                mode_of(&remesh)
            ),
            strategy: remesh,
            issues: Vec::new(),
        },
        RequestedOperation::Simplify if clean => StrategyDecision {
            strategy: simplify,
            justification: "simplify requested on a clean watertight mesh".to_string(),
            issues: Vec::new(),
        },
        RequestedOperation::Simplify => {
            let note = format!(
                "forced simplify on a mesh with defects ({}), may fail",
                defect_summary(report)
            );
            StrategyDecision {
                strategy: simplify,
                issues: vec![Issue::warning(IssueKind::ForcedOperation, note.clone())],
                justification: note,
            }
        }
        RequestedOperation::Remesh if clean => {
            let note = "forced remesh on a clean watertight mesh; simplification would keep UVs".to_string();
            StrategyDecision {
                strategy: remesh,
                issues: vec![Issue::warning(IssueKind::ForcedOperation, note.clone())],
                justification: note,
            }
        }
        RequestedOperation::Remesh => StrategyDecision {
            justification: format!(
                "remesh requested ({}); mode {}",
                defect_summary(report),
                mode_of(&remesh)
            ),
            strategy: remesh,
            issues: Vec::new(),
        },
    }
}

fn mode_of(strategy: &Strategy) -> &'static str {
    match strategy {
        Strategy::Remesh { mode, .. } => mode.as_str(),
        _ => "-",
    }
}

fn defect_summary(report: &QualityReport) -> String {
    let d = &report.descriptor;
    let mut parts = Vec::new();
    if d.boundary_edges > 0 {
        parts.push(format!("{} boundary edges in {} holes", d.boundary_edges, d.boundary_loops));
    }
    if d.non_manifold_edges > 0 {
        parts.push(format!("{} non-manifold edges", d.non_manifold_edges));
    }
    if d.components > 1 {
        parts.push(format!("{} components", d.components));
    }
    if d.degenerate_triangles > 0 {
        parts.push(format!("{} degenerate triangles", d.degenerate_triangles));
    }
    if parts.is_empty() {
        "no defects".to_string()
    } else {
        parts.join(", ")
    }
}
