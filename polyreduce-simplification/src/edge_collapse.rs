//! Edge collapse simplification
//!
//! Greedy quadric error metric (QEM) decimation over vertex/face incidence
//! lists. Edges are kept in a priority queue keyed by their vertex pair and
//! refreshed around every collapse; stale entries are discarded on pop.
//!
//! Topology is tracked on welded positions. The codec splits a position into
//! one vertex per distinct (position, uv, normal) corner; those corners move
//! together and keep their own attributes. A position is pinned only when its
//! corners carry different UVs, since moving it would tear the texture seam.

use crate::{MeshSimplifier, Quadric, ReductionConstraints};
use polyreduce_core::{to_f64, Drawable, Error, Point3f, Result, TriangleMesh, Vector3f, UV};
use priority_queue::PriorityQueue;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

type EdgeKey = (usize, usize);

#[inline]
fn edge_key(a: usize, b: usize) -> EdgeKey {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[inline]
fn position_bits(p: &Point3f) -> [u32; 3] {
    // Adding zero folds -0.0 into 0.0
    [(p.x + 0.0).to_bits(), (p.y + 0.0).to_bits(), (p.z + 0.0).to_bits()]
}

#[inline]
fn uv_bits(uv: &UV) -> [u32; 2] {
    [uv[0].to_bits(), uv[1].to_bits()]
}

// ============================================================
// Collapse state
// ============================================================

/// A planned collapse of `remove` into `keep`
#[derive(Debug, Clone, Copy)]
struct Candidate {
    keep: usize,
    remove: usize,
    position: Point3f,
    cost: f64,
}

/// Decimation state; "vertex" below means a welded position, "corner" an
/// input vertex with its own attributes.
struct CollapseMesh {
    positions: Vec<Point3f>,
    corner_vertex: Vec<usize>,
    vertex_corners: Vec<Vec<usize>>,
    normals: Option<Vec<Vector3f>>,
    uvs: Option<Vec<UV>>,
    faces: Vec<[usize; 3]>,
    face_corners: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    vertex_faces: Vec<Vec<usize>>,
    vertex_alive: Vec<bool>,
    quadrics: Vec<Quadric>,
    boundary: Vec<bool>,
    pinned: Vec<bool>,
    active_faces: usize,
}

impl CollapseMesh {
    fn build(mesh: &TriangleMesh, constraints: &ReductionConstraints, boundary_weight: f64) -> Self {
        let mut welded: HashMap<[u32; 3], usize> = HashMap::with_capacity(mesh.vertices.len());
        let mut positions = Vec::new();
        let mut vertex_corners: Vec<Vec<usize>> = Vec::new();
        let mut corner_vertex = Vec::with_capacity(mesh.vertices.len());
        for (corner, p) in mesh.vertices.iter().enumerate() {
            let v = *welded.entry(position_bits(p)).or_insert_with(|| {
                positions.push(*p);
                vertex_corners.push(Vec::new());
                positions.len() - 1
            });
            vertex_corners[v].push(corner);
            corner_vertex.push(v);
        }
        let nv = positions.len();
        let faces: Vec<[usize; 3]> = mesh.faces.iter().map(|f| f.map(|c| corner_vertex[c])).collect();

        let mut vertex_faces = vec![Vec::new(); nv];
        let mut edges: HashMap<EdgeKey, (u32, usize)> = HashMap::with_capacity(faces.len() * 2);
        for (fi, face) in faces.iter().enumerate() {
            for j in 0..3 {
                let (a, b) = (face[j], face[(j + 1) % 3]);
                if !face[..j].contains(&a) {
                    vertex_faces[a].push(fi);
                }
                if a != b {
                    edges.entry(edge_key(a, b)).or_insert((0, fi)).0 += 1;
                }
            }
        }

        let face_quadrics: Vec<Quadric> = faces
            .par_iter()
            .map(|f| Quadric::from_triangle(&positions[f[0]], &positions[f[1]], &positions[f[2]]))
            .collect();

        let mut quadrics = vec![Quadric::zero(); nv];
        for (face, q) in faces.iter().zip(&face_quadrics) {
            for (j, &v) in face.iter().enumerate() {
                if !face[..j].contains(&v) {
                    quadrics[v] += *q;
                }
            }
        }

        // Border edges get a perpendicular constraint plane so free borders
        // slide along themselves instead of shrinking inward.
        let face_normals = mesh.calculate_face_normals();
        let mut boundary = vec![false; nv];
        for (&(a, b), &(count, fi)) in &edges {
            if count != 1 {
                continue;
            }
            boundary[a] = true;
            boundary[b] = true;
            let n = face_normals[fi].cast::<f64>();
            let q = Quadric::edge_constraint(&positions[a], &positions[b], &n) * boundary_weight;
            quadrics[a] += q;
            quadrics[b] += q;
        }

        let mut cm = Self {
            positions,
            corner_vertex,
            vertex_corners,
            normals: mesh.normals.clone(),
            uvs: mesh.uvs.clone(),
            face_corners: mesh.faces.clone(),
            faces,
            face_alive: vec![true; mesh.faces.len()],
            vertex_faces,
            vertex_alive: vec![true; nv],
            quadrics,
            boundary,
            pinned: Vec::new(),
            active_faces: mesh.faces.len(),
        };
        cm.pinned = (0..nv)
            .map(|v| !cm.uv_uniform(v) || (constraints.preserve_boundaries && cm.boundary[v]))
            .collect();
        cm
    }

    /// All corners of `v` share one UV (trivially true without UVs)
    fn uv_uniform(&self, v: usize) -> bool {
        let Some(uvs) = &self.uvs else {
            return true;
        };
        let mut corners = self.vertex_corners[v].iter().map(|&c| uv_bits(&uvs[c]));
        match corners.next() {
            Some(first) => corners.all(|bits| bits == first),
            None => true,
        }
    }

    fn vertex_uv(&self, v: usize) -> Option<UV> {
        let uvs = self.uvs.as_ref()?;
        self.vertex_corners[v].first().map(|&c| uvs[c])
    }

    /// `(keep corner, remove corner)` pairs meeting on the collapsing edge
    fn paired_corners(&self, shared: &[usize], keep: usize, remove: usize) -> Vec<(usize, usize)> {
        shared
            .iter()
            .filter_map(|&f| {
                let (face, corners) = (self.faces[f], self.face_corners[f]);
                let k = face.iter().position(|&v| v == keep)?;
                let r = face.iter().position(|&v| v == remove)?;
                Some((corners[k], corners[r]))
            })
            .collect()
    }

    fn live_faces(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.vertex_faces[v]
            .iter()
            .copied()
            .filter(move |&f| self.face_alive[f])
    }

    fn neighbors(&self, v: usize) -> HashSet<usize> {
        self.live_faces(v)
            .flat_map(|f| self.faces[f])
            .filter(|&n| n != v)
            .collect()
    }

    fn shared_faces(&self, a: usize, b: usize) -> Vec<usize> {
        self.live_faces(a)
            .filter(|&f| self.faces[f].contains(&b))
            .collect()
    }

    fn plan(&self, a: usize, b: usize, constraints: &ReductionConstraints, weights: &CostWeights) -> Option<Candidate> {
        if a == b || !self.vertex_alive[a] || !self.vertex_alive[b] {
            return None;
        }
        let q = self.quadrics[a] + self.quadrics[b];
        let (pa, pb) = (self.positions[a], self.positions[b]);

        let (keep, remove, position) = match (self.pinned[a], self.pinned[b]) {
            (true, true) => return None,
            (true, false) => (a, b, pa),
            (false, true) => (b, a, pb),
            (false, false) => {
                let mid = nalgebra::center(&pa, &pb);
                let reach = (pb - pa).norm() * 2.0;
                let optimum = q
                    .minimizer()
                    .map(|p| Point3f::new(p.x as f32, p.y as f32, p.z as f32))
                    .filter(|p| (p - mid).norm() <= reach);
                let position = optimum
                    .into_iter()
                    .chain([pa, pb, mid])
                    .min_by(|x, y| q.evaluate(&to_f64(x)).total_cmp(&q.evaluate(&to_f64(y))))
                    .unwrap_or(mid);
                (a, b, position)
            }
        };

        let mut cost = q.evaluate(&to_f64(&position));
        if constraints.preserve_uv {
            if let (Some(ua), Some(ub)) = (self.vertex_uv(a), self.vertex_uv(b)) {
                let duv = (ua[0] - ub[0]).powi(2) + (ua[1] - ub[1]).powi(2);
                cost += weights.uv * duv as f64 * weights.scale_sq;
            }
        }

        Some(Candidate { keep, remove, position, cost })
    }

    /// Faces removed by the collapse, or `None` when it would break topology,
    /// flip a neighbouring face or tear a UV seam.
    fn check(&self, c: &Candidate, min_normal_dot: f32) -> Option<Vec<usize>> {
        let shared = self.shared_faces(c.keep, c.remove);
        if shared.is_empty() || shared.len() > 2 {
            return None;
        }
        let border_edge = shared.len() == 1;
        if !border_edge && self.boundary[c.keep] && self.boundary[c.remove] {
            return None;
        }

        // Link condition
        let nk = self.neighbors(c.keep);
        let nr = self.neighbors(c.remove);
        let opposite: HashSet<usize> = shared
            .iter()
            .flat_map(|&f| self.faces[f])
            .filter(|&v| v != c.keep && v != c.remove)
            .collect();
        if nk.intersection(&nr).copied().collect::<HashSet<_>>() != opposite {
            return None;
        }
        if !border_edge && nk.union(&nr).count() <= 4 {
            // Closed tetrahedron would fold flat
            return None;
        }

        // A seam vertex absorbs its neighbour only when the edge lies in one chart
        if let (Some(uvs), false) = (&self.uvs, self.uv_uniform(c.keep)) {
            let charts: HashSet<[u32; 2]> = self
                .paired_corners(&shared, c.keep, c.remove)
                .iter()
                .map(|&(k, _)| uv_bits(&uvs[k]))
                .collect();
            if charts.len() != 1 {
                return None;
            }
        }

        for f in self.live_faces(c.keep).chain(self.live_faces(c.remove)) {
            if shared.contains(&f) {
                continue;
            }
            let face = self.faces[f];
            let corner = |v: usize| {
                if v == c.keep || v == c.remove {
                    c.position
                } else {
                    self.positions[v]
                }
            };
            let before = triangle_normal(&self.positions[face[0]], &self.positions[face[1]], &self.positions[face[2]]);
            let after = triangle_normal(&corner(face[0]), &corner(face[1]), &corner(face[2]));
            match (before, after) {
                (_, None) => return None,
                (Some(b), Some(a)) if b.dot(&a) < min_normal_dot => return None,
                _ => {}
            }
        }

        Some(shared)
    }

    fn collapse(&mut self, c: &Candidate, shared: &[usize]) {
        let (keep, remove) = (c.keep, c.remove);
        let pairs = self.paired_corners(shared, keep, remove);
        let keep_uniform = self.uv_uniform(keep);

        for &f in shared {
            self.face_alive[f] = false;
            self.active_faces -= 1;
        }

        let (pk, pr) = (self.positions[keep], self.positions[remove]);
        let edge = pr - pk;
        let len_sq = edge.norm_squared();
        let t = if self.pinned[keep] {
            0.0
        } else if len_sq > 0.0 {
            ((c.position - pk).dot(&edge) / len_sq).clamp(0.0, 1.0)
        } else {
            0.5
        };

        if let Some(uvs) = &mut self.uvs {
            if keep_uniform {
                let (uk, ur) = (
                    uvs[self.vertex_corners[keep][0]],
                    uvs[self.vertex_corners[remove][0]],
                );
                let uv = [uk[0] + (ur[0] - uk[0]) * t, uk[1] + (ur[1] - uk[1]) * t];
                for &corner in self.vertex_corners[keep].iter().chain(&self.vertex_corners[remove]) {
                    uvs[corner] = uv;
                }
            } else if let Some(&(k, _)) = pairs.first() {
                let uv = uvs[k];
                for &corner in &self.vertex_corners[remove] {
                    uvs[corner] = uv;
                }
            }
        }
        if let Some(normals) = &mut self.normals {
            for &(k, r) in &pairs {
                if let Some(n) = (normals[k] + normals[r]).try_normalize(f32::EPSILON) {
                    normals[k] = n;
                    normals[r] = n;
                }
            }
        }
        self.positions[keep] = c.position;

        let corners = std::mem::take(&mut self.vertex_corners[remove]);
        for &corner in &corners {
            self.corner_vertex[corner] = keep;
        }
        self.vertex_corners[keep].extend(corners);

        let moved: Vec<usize> = self.live_faces(remove).collect();
        for f in moved {
            for v in self.faces[f].iter_mut() {
                if *v == remove {
                    *v = keep;
                }
            }
            self.vertex_faces[keep].push(f);
        }
        self.vertex_faces[remove].clear();
        self.vertex_alive[remove] = false;

        let face_alive = &self.face_alive;
        self.vertex_faces[keep].retain(|&f| face_alive[f]);

        let removed_quadric = self.quadrics[remove];
        self.quadrics[keep] += removed_quadric;
        self.boundary[keep] |= self.boundary[remove];
    }

    fn into_mesh(self, source: &TriangleMesh) -> TriangleMesh {
        let faces = self
            .face_corners
            .iter()
            .zip(&self.face_alive)
            .filter(|(_, &alive)| alive)
            .map(|(f, _)| *f)
            .collect();
        let face_materials = source.face_materials.as_ref().map(|fm| {
            fm.iter()
                .zip(&self.face_alive)
                .filter(|(_, &alive)| alive)
                .map(|(m, _)| *m)
                .collect()
        });
        let vertices = self.corner_vertex.iter().map(|&v| self.positions[v]).collect();

        let mut mesh = TriangleMesh {
            vertices,
            faces,
            normals: self.normals,
            uvs: self.uvs,
            material_libs: source.material_libs.clone(),
            materials: source.materials.clone(),
            face_materials,
        };
        mesh.compact();
        mesh
    }
}

fn triangle_normal(a: &Point3f, b: &Point3f, c: &Point3f) -> Option<Vector3f> {
    (b - a).cross(&(c - a)).try_normalize(1e-12)
}

// ============================================================
// Edge Cost for Priority Queue
// ============================================================

#[derive(Debug, Clone, Copy)]
struct EdgeCost {
    cost: f64,
    key: EdgeKey,
}

impl PartialEq for EdgeCost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for EdgeCost {}

impl PartialOrd for EdgeCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCost {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smallest cost first, ties broken by vertex pair
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.key.cmp(&self.key))
    }
}

struct CostWeights {
    uv: f64,
    scale_sq: f64,
}

// ============================================================
// Edge Collapse Simplifier
// ============================================================

/// Edge collapse mesh simplifier using quadric error metrics.
///
/// Reduces exactly to the requested face count when enough legal collapses
/// exist, and never below it.
#[derive(Debug, Clone)]
pub struct EdgeCollapseSimplifier {
    /// Weight of the border constraint planes
    pub boundary_weight: f64,
    /// Weight of UV distance, relative to squared bounding-box diagonal
    pub uv_weight: f64,
    /// Reject collapses that turn a face normal by more than this (cosine)
    pub min_normal_dot: f32,
}

impl Default for EdgeCollapseSimplifier {
    fn default() -> Self {
        Self {
            boundary_weight: 100.0,
            uv_weight: 1e-3,
            min_normal_dot: 0.1,
        }
    }
}

impl EdgeCollapseSimplifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeshSimplifier for EdgeCollapseSimplifier {
    fn reduce(
        &self,
        mesh: &TriangleMesh,
        target_faces: usize,
        constraints: &ReductionConstraints,
    ) -> Result<TriangleMesh> {
        if mesh.is_empty() {
            return Err(Error::InvalidData("Mesh is empty".to_string()));
        }
        if target_faces == 0 {
            return Err(Error::InvalidData("Target face count must be positive".to_string()));
        }
        mesh.validate()?;
        if target_faces >= mesh.face_count() {
            return Ok(mesh.clone());
        }

        let diag = mesh.diagonal() as f64;
        let weights = CostWeights {
            uv: self.uv_weight,
            scale_sq: diag * diag,
        };
        let mut cm = CollapseMesh::build(mesh, constraints, self.boundary_weight);

        let mut queue: PriorityQueue<EdgeKey, EdgeCost> = PriorityQueue::new();
        for face in &cm.faces {
            for j in 0..3 {
                let key = edge_key(face[j], face[(j + 1) % 3]);
                if key.0 == key.1 || queue.get(&key).is_some() {
                    continue;
                }
                if let Some(c) = cm.plan(key.0, key.1, constraints, &weights) {
                    queue.push(key, EdgeCost { cost: c.cost, key });
                }
            }
        }

        let mut collapses = 0usize;
        while cm.active_faces > target_faces {
            let Some((key, _)) = queue.pop() else {
                break;
            };
            let Some(candidate) = cm.plan(key.0, key.1, constraints, &weights) else {
                continue;
            };
            let Some(shared) = cm.check(&candidate, self.min_normal_dot) else {
                continue;
            };
            if cm.active_faces - shared.len() < target_faces {
                continue;
            }

            cm.collapse(&candidate, &shared);
            collapses += 1;

            for n in cm.neighbors(candidate.keep) {
                let key = edge_key(candidate.keep, n);
                match cm.plan(key.0, key.1, constraints, &weights) {
                    Some(c) => {
                        queue.push(key, EdgeCost { cost: c.cost, key });
                    }
                    None => {
                        queue.remove(&key);
                    }
                }
            }
        }

        tracing::debug!(
            input_faces = mesh.face_count(),
            target_faces,
            output_faces = cm.active_faces,
            collapses,
            "edge collapse finished"
        );

        Ok(cm.into_mesh(mesh))
    }
}
