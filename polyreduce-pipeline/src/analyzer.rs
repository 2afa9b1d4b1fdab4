//! Mesh quality analysis
//!
//! Topology is measured on welded vertices: every vertex with a bit-identical
//! position maps to the same id, so seams split for texture coordinates do not
//! count as holes. Per-triangle and per-edge metrics run on the rayon pool.

use crate::error::AnalysisError;
use crate::issue::{Issue, IssueKind};
use crate::request::OperationKind;
use polyreduce_core::{Drawable, Point3f, TriangleMesh};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Tunable thresholds for [`MeshAnalyzer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// A triangle is degenerate when its area is at most this times the
    /// squared bounding-box diagonal
    pub degenerate_area_epsilon: f64,
    /// Edges longer than this multiple of the mean edge length are outliers
    pub outlier_factor: f64,
    /// Upper face count of the `low` complexity level
    pub low_complexity_faces: usize,
    /// Upper face count of the `medium` complexity level
    pub medium_complexity_faces: usize,
    /// Above this face count the recommended target starts from one fifth
    pub large_mesh_faces: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            degenerate_area_epsilon: 1e-10,
            outlier_factor: 3.0,
            low_complexity_faces: 5_000,
            medium_complexity_faces: 20_000,
            large_mesh_faces: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Summary of unique edge lengths
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeLengthStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub outliers: usize,
}

impl EdgeLengthStats {
    fn from_lengths(lengths: &[f64], outlier_factor: f64) -> Self {
        if lengths.is_empty() {
            return Self::default();
        }
        let count = lengths.len();
        let mean = lengths.iter().sum::<f64>() / count as f64;
        let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / count as f64;
        let (min, max) = lengths
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &l| (lo.min(l), hi.max(l)));
        let outliers = if mean > 0.0 {
            lengths.iter().filter(|&&l| l > outlier_factor * mean).count()
        } else {
            0
        };

        Self {
            count,
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
            outliers,
        }
    }

    /// Standard deviation over mean; zero for an empty or zero-length set
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean > 0.0 {
            self.std_dev / self.mean
        } else {
            0.0
        }
    }
}

/// Immutable topology snapshot of one mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshDescriptor {
    pub face_count: usize,
    pub vertex_count: usize,
    pub welded_vertex_count: usize,
    /// Edges used by exactly one face
    pub boundary_edges: usize,
    /// Connected groups of boundary edges, one per hole
    pub boundary_loops: usize,
    /// Edges used by more than two faces
    pub non_manifold_edges: usize,
    pub components: usize,
    pub degenerate_triangles: usize,
    pub edge_lengths: EdgeLengthStats,
    pub has_uvs: bool,
    pub bbox_diagonal: f64,
    /// No boundary edges and a single component
    pub watertight: bool,
}

impl MeshDescriptor {
    /// Defects that feed the density term of the score
    pub fn defect_count(&self) -> usize {
        self.boundary_edges
            + self.non_manifold_edges
            + self.degenerate_triangles
            + self.components.saturating_sub(1)
    }

    pub fn defect_density(&self) -> f64 {
        if self.face_count == 0 {
            0.0
        } else {
            self.defect_count() as f64 / self.face_count as f64
        }
    }
}

/// Suggested targets for callers that do not know what to ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionSuggestions {
    pub aggressive: usize,
    pub moderate: usize,
    pub conservative: usize,
}

impl ReductionSuggestions {
    fn for_faces(faces: usize) -> Self {
        Self {
            aggressive: (faces / 10).max(1),
            moderate: (faces / 5).max(1),
            conservative: (faces / 2).max(1),
        }
    }
}

/// Diagnosis produced by [`MeshAnalyzer::analyze`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub descriptor: MeshDescriptor,
    pub recommended_target_faces: usize,
    /// 0 to 100, higher is healthier
    pub quality_score: f64,
    pub complexity: Complexity,
    pub recommended_operation: OperationKind,
    pub reduction_suggestions: ReductionSuggestions,
    pub issues: Vec<Issue>,
}

impl QualityReport {
    /// No issue of a defect kind was found
    pub fn is_defect_free(&self) -> bool {
        !self.issues.iter().any(|i| i.kind.is_defect())
    }

    pub fn issue(&self, kind: IssueKind) -> Option<&Issue> {
        self.issues.iter().find(|i| i.kind == kind)
    }
}

/// Health score in `[0, 100]`
///
/// `100 * (0.40 W + 0.35 D + 0.25 U)` with `W` the watertight flag,
/// `D = 1 / (1 + 10 * defect_density)` and
/// `U = (1 / (1 + cv)) * (1 - outliers / edges)`.
pub fn quality_score(descriptor: &MeshDescriptor) -> f64 {
    let w = if descriptor.watertight { 1.0 } else { 0.0 };
    let d = 1.0 / (1.0 + 10.0 * descriptor.defect_density());
    let stats = &descriptor.edge_lengths;
    let outlier_fraction = if stats.count > 0 {
        (stats.outliers as f64 / stats.count as f64).min(1.0)
    } else {
        0.0
    };
    let u = (1.0 / (1.0 + stats.coefficient_of_variation())) * (1.0 - outlier_fraction);

    (100.0 * (0.40 * w + 0.35 * d + 0.25 * u)).clamp(0.0, 100.0)
}

/// Recommended face budget; never above the current face count
pub fn recommended_target_faces(descriptor: &MeshDescriptor, config: &AnalyzerConfig) -> usize {
    let faces = descriptor.face_count;
    let base = if faces > config.large_mesh_faces { faces / 5 } else { faces };
    let scale = (1.0 / (1.0 + 10.0 * descriptor.defect_density())).clamp(0.5, 1.0);
    ((base as f64 * scale).floor() as usize).clamp(1, faces.max(1))
}

#[derive(Debug, Clone, Default)]
pub struct MeshAnalyzer {
    config: AnalyzerConfig,
}

impl MeshAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn analyze(&self, mesh: &TriangleMesh) -> Result<QualityReport, AnalysisError> {
        check_consistency(mesh)?;

        let (weld, representatives) = weld_positions(&mesh.vertices);
        let welded_count = representatives.len();
        let welded: Vec<[usize; 3]> = mesh.faces.iter().map(|f| f.map(|v| weld[v])).collect();

        let diagonal = mesh.diagonal() as f64;
        let area_floor = self.config.degenerate_area_epsilon * diagonal * diagonal;
        let degenerate_triangles = mesh
            .faces
            .par_iter()
            .zip(welded.par_iter())
            .filter(|(face, ids)| repeats_vertex(ids) || triangle_area(&mesh.vertices, face) <= area_floor)
            .count();

        let mut edge_use: HashMap<(usize, usize), u32> = HashMap::with_capacity(welded.len() * 3 / 2);
        let mut components = DisjointSets::new(welded_count);
        for ids in &welded {
            components.union(ids[0], ids[1]);
            components.union(ids[1], ids[2]);
            if repeats_vertex(ids) {
                continue;
            }
            for (a, b) in [(ids[0], ids[1]), (ids[1], ids[2]), (ids[2], ids[0])] {
                *edge_use.entry(edge_key(a, b)).or_insert(0) += 1;
            }
        }

        let mut used = vec![false; welded_count];
        for ids in &welded {
            for &v in ids {
                used[v] = true;
            }
        }
        let component_count = (0..welded_count)
            .filter(|&v| used[v] && components.find(v) == v)
            .count();

        let mut boundary_edges = 0;
        let mut non_manifold_edges = 0;
        let mut loops = DisjointSets::new(welded_count);
        let mut on_boundary = vec![false; welded_count];
        for (&(a, b), &uses) in &edge_use {
            match uses {
                1 => {
                    boundary_edges += 1;
                    loops.union(a, b);
                    on_boundary[a] = true;
                    on_boundary[b] = true;
                }
                n if n > 2 => non_manifold_edges += 1,
                _ => {}
            }
        }
        let boundary_loops = (0..welded_count)
            .filter(|&v| on_boundary[v] && loops.find(v) == v)
            .count();

        let edges: Vec<(usize, usize)> = edge_use.keys().copied().collect();
        let lengths: Vec<f64> = edges
            .par_iter()
            .map(|&(a, b)| {
                let pa = &mesh.vertices[representatives[a]];
                let pb = &mesh.vertices[representatives[b]];
                (pb - pa).cast::<f64>().norm()
            })
            .collect();
        let edge_lengths = EdgeLengthStats::from_lengths(&lengths, self.config.outlier_factor);

        let descriptor = MeshDescriptor {
            face_count: mesh.face_count(),
            vertex_count: mesh.vertex_count(),
            welded_vertex_count: welded_count,
            boundary_edges,
            boundary_loops,
            non_manifold_edges,
            components: component_count,
            degenerate_triangles,
            edge_lengths,
            has_uvs: mesh.has_uvs(),
            bbox_diagonal: diagonal,
            watertight: boundary_edges == 0 && component_count == 1,
        };

        let issues = self.collect_issues(&descriptor);
        let defect_free = !issues.iter().any(|i| i.kind.is_defect());
        let recommended_operation = if descriptor.watertight && defect_free {
            OperationKind::Simplify
        } else {
            OperationKind::Remesh
        };

        let report = QualityReport {
            recommended_target_faces: recommended_target_faces(&descriptor, &self.config),
            quality_score: quality_score(&descriptor),
            complexity: self.complexity(descriptor.face_count),
            recommended_operation,
            reduction_suggestions: ReductionSuggestions::for_faces(descriptor.face_count),
            issues,
            descriptor,
        };

        info!(
            faces = report.descriptor.face_count,
            vertices = report.descriptor.vertex_count,
            boundary_edges = report.descriptor.boundary_edges,
            components = report.descriptor.components,
            watertight = report.descriptor.watertight,
            score = report.quality_score,
            "mesh analysed"
        );
        debug!(issues = report.issues.len(), edge_mean = edge_lengths.mean, "analysis details");

        Ok(report)
    }

    fn complexity(&self, faces: usize) -> Complexity {
        if faces <= self.config.low_complexity_faces {
            Complexity::Low
        } else if faces <= self.config.medium_complexity_faces {
            Complexity::Medium
        } else {
            Complexity::High
        }
    }

    fn collect_issues(&self, d: &MeshDescriptor) -> Vec<Issue> {
        let mut issues = Vec::new();
        if d.boundary_edges > 0 {
            issues.push(
                Issue::warning(
                    IssueKind::BoundaryEdges,
                    format!("{} boundary edges; the surface is open", d.boundary_edges),
                )
                .with_location(format!("{} holes", d.boundary_loops)),
            );
        }
        if d.non_manifold_edges > 0 {
            issues.push(Issue::warning(
                IssueKind::NonManifoldEdges,
                format!("{} edges are shared by more than two faces", d.non_manifold_edges),
            ));
        }
        if d.components > 1 {
            issues.push(Issue::warning(
                IssueKind::MultipleComponents,
                format!("{} disconnected components", d.components),
            ));
        }
        if d.degenerate_triangles > 0 {
            issues.push(Issue::warning(
                IssueKind::DegenerateTriangles,
                format!("{} triangles have near-zero area", d.degenerate_triangles),
            ));
        }
        if d.edge_lengths.outliers > 0 {
            issues.push(Issue::info(
                IssueKind::EdgeLengthOutliers,
                format!(
                    "{} edges are longer than {}x the mean length {:.6}",
                    d.edge_lengths.outliers, self.config.outlier_factor, d.edge_lengths.mean
                ),
            ));
        }
        issues
    }
}

fn check_consistency(mesh: &TriangleMesh) -> Result<(), AnalysisError> {
    if mesh.faces.is_empty() {
        return Err(AnalysisError::EmptyMesh);
    }
    let vertex_count = mesh.vertex_count();
    for (face, indices) in mesh.faces.iter().enumerate() {
        if let Some(&vertex) = indices.iter().find(|&&v| v >= vertex_count) {
            return Err(AnalysisError::IndexOutOfRange {
                face,
                vertex,
                vertex_count,
            });
        }
    }
    if mesh.uvs.as_ref().is_some_and(|uvs| uvs.len() != vertex_count) {
        return Err(AnalysisError::Inconsistent("uv count differs from vertex count".into()));
    }
    if mesh.normals.as_ref().is_some_and(|n| n.len() != vertex_count) {
        return Err(AnalysisError::Inconsistent("normal count differs from vertex count".into()));
    }
    if mesh
        .face_materials
        .as_ref()
        .is_some_and(|m| m.len() != mesh.face_count())
    {
        return Err(AnalysisError::Inconsistent("material count differs from face count".into()));
    }
    Ok(())
}

/// Map each vertex to a welded id; also returns one source vertex per id
fn weld_positions(vertices: &[Point3f]) -> (Vec<usize>, Vec<usize>) {
    let mut ids: HashMap<[u32; 3], usize> = HashMap::with_capacity(vertices.len());
    let mut representatives = Vec::new();
    let weld = vertices
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let key = [p.x, p.y, p.z].map(|c| if c == 0.0 { 0u32 } else { c.to_bits() });
            *ids.entry(key).or_insert_with(|| {
                representatives.push(i);
                representatives.len() - 1
            })
        })
        .collect();
    (weld, representatives)
}

fn triangle_area(vertices: &[Point3f], face: &[usize; 3]) -> f64 {
    let a = vertices[face[0]].cast::<f64>();
    let b = vertices[face[1]].cast::<f64>();
    let c = vertices[face[2]].cast::<f64>();
    (b - a).cross(&(c - a)).norm() * 0.5
}

fn repeats_vertex(ids: &[usize; 3]) -> bool {
    ids[0] == ids[1] || ids[1] == ids[2] || ids[0] == ids[2]
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

struct DisjointSets {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn regular_tetrahedron() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(1.0, 1.0, 1.0),
                Point3f::new(1.0, -1.0, -1.0),
                Point3f::new(-1.0, 1.0, -1.0),
                Point3f::new(-1.0, -1.0, 1.0),
            ],
            vec![[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]],
        )
    }

    /// Unit cube with every face owning its own four vertices
    fn split_cube() -> TriangleMesh {
        let corners = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ];
        let quads = [
            [0, 3, 2, 1],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [2, 3, 7, 6],
            [1, 2, 6, 5],
            [0, 4, 7, 3],
        ];
        let mut mesh = TriangleMesh::new();
        for quad in quads {
            let base = mesh.vertex_count();
            for c in quad {
                let [x, y, z] = corners[c];
                mesh.add_vertex(Point3f::new(x, y, z));
            }
            mesh.add_face([base, base + 1, base + 2]);
            mesh.add_face([base, base + 2, base + 3]);
        }
        mesh
    }

    fn square() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    fn analyze(mesh: &TriangleMesh) -> QualityReport {
        MeshAnalyzer::default().analyze(mesh).unwrap()
    }

    #[test]
    fn test_regular_tetrahedron_is_perfect() {
        let report = analyze(&regular_tetrahedron());
        let d = &report.descriptor;
        assert!(d.watertight);
        assert_eq!(d.boundary_edges, 0);
        assert_eq!(d.components, 1);
        assert_eq!(d.edge_lengths.count, 6);
        assert_relative_eq!(report.quality_score, 100.0, epsilon = 1e-6);
        assert!(report.issues.is_empty());
        assert_eq!(report.recommended_operation, OperationKind::Simplify);
        assert_eq!(report.complexity, Complexity::Low);
    }

    #[test]
    fn test_split_cube_welds_to_closed_surface() {
        let report = analyze(&split_cube());
        assert_eq!(report.descriptor.vertex_count, 24);
        assert_eq!(report.descriptor.welded_vertex_count, 8);
        assert!(report.descriptor.watertight);
        assert!(report.is_defect_free());
    }

    #[test]
    fn test_open_square() {
        let report = analyze(&square());
        let d = &report.descriptor;
        assert_eq!(d.boundary_edges, 4);
        assert_eq!(d.boundary_loops, 1);
        assert!(!d.watertight);
        let issue = report.issue(IssueKind::BoundaryEdges).unwrap();
        assert_eq!(issue.location.as_deref(), Some("1 holes"));
        assert_eq!(report.recommended_operation, OperationKind::Remesh);
        assert!(report.quality_score < 60.0);
    }

    #[test]
    fn test_disconnected_components() {
        let mut mesh = regular_tetrahedron();
        let offset = mesh.vertex_count();
        for v in regular_tetrahedron().vertices {
            mesh.add_vertex(v + polyreduce_core::Vector3f::new(10.0, 0.0, 0.0));
        }
        for f in regular_tetrahedron().faces {
            mesh.add_face(f.map(|i| i + offset));
        }
        let report = analyze(&mesh);
        assert_eq!(report.descriptor.components, 2);
        assert!(!report.descriptor.watertight);
        assert!(report.issue(IssueKind::MultipleComponents).is_some());
    }

    #[test]
    fn test_non_manifold_edge() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
                Point3f::new(0.5, -1.0, 0.0),
                Point3f::new(0.5, 0.0, 1.0),
            ],
            vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]],
        );
        let report = analyze(&mesh);
        assert_eq!(report.descriptor.non_manifold_edges, 1);
        assert!(report.issue(IssueKind::NonManifoldEdges).is_some());
    }

    #[test]
    fn test_degenerate_triangle_detected() {
        let mut mesh = regular_tetrahedron();
        mesh.add_face([0, 0, 1]);
        let report = analyze(&mesh);
        assert_eq!(report.descriptor.degenerate_triangles, 1);
        assert!(report.descriptor.watertight);
        assert!(!report.is_defect_free());
        assert_eq!(report.recommended_operation, OperationKind::Remesh);
    }

    #[test]
    fn test_issue_order() {
        let mut mesh = square();
        mesh.add_face([0, 0, 1]);
        let report = analyze(&mesh);
        let kinds: Vec<_> = report.issues.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![IssueKind::BoundaryEdges, IssueKind::DegenerateTriangles]);
    }

    #[test]
    fn test_errors() {
        let analyzer = MeshAnalyzer::default();
        assert_eq!(analyzer.analyze(&TriangleMesh::new()), Err(AnalysisError::EmptyMesh));

        let mut mesh = square();
        mesh.faces.push([0, 1, 9]);
        assert_eq!(
            analyzer.analyze(&mesh),
            Err(AnalysisError::IndexOutOfRange {
                face: 2,
                vertex: 9,
                vertex_count: 4
            })
        );
    }

    #[test]
    fn test_edge_length_outliers() {
        let mut lengths = vec![1.0; 20];
        lengths.push(10.0);
        let stats = EdgeLengthStats::from_lengths(&lengths, 3.0);
        assert_eq!(stats.count, 21);
        assert_eq!(stats.outliers, 1);
        assert_relative_eq!(stats.min, 1.0);
        assert_relative_eq!(stats.max, 10.0);
        assert_relative_eq!(stats.mean, 30.0 / 21.0, epsilon = 1e-12);
    }

    #[test]
    fn test_recommended_target() {
        let config = AnalyzerConfig::default();
        let mut d = analyze(&regular_tetrahedron()).descriptor;
        d.face_count = 20_000;
        assert_eq!(recommended_target_faces(&d, &config), 4_000);

        d.boundary_edges = 2_000;
        d.watertight = false;
        // density 0.1 halves the budget
        assert_eq!(recommended_target_faces(&d, &config), 2_000);

        d.face_count = 3;
        d.boundary_edges = 3;
        assert_eq!(recommended_target_faces(&d, &config), 1);
    }

    #[test]
    fn test_reduction_suggestions() {
        let s = ReductionSuggestions::for_faces(10_000);
        assert_eq!((s.aggressive, s.moderate, s.conservative), (1_000, 2_000, 5_000));
        let tiny = ReductionSuggestions::for_faces(3);
        assert_eq!(tiny.aggressive, 1);
    }
}
