//! Non-fatal findings attached to reports and job results

use polyreduce_simplification::SimplificationWarning;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    BoundaryEdges,
    NonManifoldEdges,
    MultipleComponents,
    DegenerateTriangles,
    EdgeLengthOutliers,
    MissingTexture,
    MissingMaterialLibrary,
    NoReductionNeeded,
    SimplificationStalled,
    SimplificationStepFailed,
    UvLost,
    ForcedOperation,
    RetopologyNotWatertight,
    RetopologyIncreasedFaces,
    ArchiveFailed,
}

impl IssueKind {
    /// Topology defects that steer the selector away from simplification
    pub fn is_defect(self) -> bool {
        matches!(
            self,
            IssueKind::BoundaryEdges
                | IssueKind::NonManifoldEdges
                | IssueKind::MultipleComponents
                | IssueKind::DegenerateTriangles
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Issue {
    pub fn new(kind: IssueKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            location: None,
        }
    }

    pub fn info(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Info, message)
    }

    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, message)
    }

    pub fn error(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, message)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {:?}: {}", self.severity, self.kind, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

impl From<&SimplificationWarning> for Issue {
    fn from(warning: &SimplificationWarning) -> Self {
        let kind = match warning {
            SimplificationWarning::Stalled { .. }
            | SimplificationWarning::BelowTarget { .. }
            | SimplificationWarning::Interrupted { .. } => IssueKind::SimplificationStalled,
            SimplificationWarning::UvLost { .. } => IssueKind::UvLost,
            SimplificationWarning::StepFailed { .. } => IssueKind::SimplificationStepFailed,
        };
        let issue = Issue::warning(kind, warning.to_string());
        match warning {
            SimplificationWarning::UvLost { step } | SimplificationWarning::StepFailed { step, .. } => {
                issue.with_location(format!("step {step}"))
            }
            _ => issue,
        }
    }
}
