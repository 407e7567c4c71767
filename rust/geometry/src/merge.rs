// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Coplanar face merging.
//!
//! Reduces an over-tessellated polyhedron (many small coplanar triangles or
//! polygons) to a minimal set of planar faces, creating holes where a ring of
//! faces closes around an opening.
//!
//! ## Algorithm
//!
//! 1. Faces are copied into an arena and re-keyed under a tolerance tightened
//!    by [`MERGE_PRECISION_DIGITS`]: merging works on local coordinates that
//!    are smaller than world coordinates.
//! 2. Every vertex gets a bucket of the faces touching it.
//! 3. Each bucket is split into groups of faces with equal normals. Faces
//!    whose normal is undefined join every group as wildcards.
//! 4. Inside a group an anchor face (never a wildcard) walks its edges looking
//!    for a candidate that has the same edge reversed (or forward, in which
//!    case the candidate is reversed). The two boundaries are spliced by
//!    cancelling every coincident opposite edge pair and chaining what is
//!    left into closed loops. The longest loop becomes the outer boundary.
//! 5. A spliced face that fails validation is discarded and the pairing is
//!    never tried again.
//!
//! Faces consumed by a merge forward to the face they became, so a vertex
//! bucket always resolves to live faces and nothing is processed twice.

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{new_key_type, SecondaryMap, SlotMap};
use smallvec::SmallVec;

use crate::face::Face3D;
use crate::polyhedron::Polyhedron;
use crate::primitives::{LineSegment3D, Point3D, PointKey, SegmentKey, Vector3D};
use crate::tolerance::Tolerance;

/// Decimal digits the tolerance is tightened by while merging.
pub const MERGE_PRECISION_DIGITS: u32 = 2;

new_key_type! {
    /// Key of a face in the merge arena.
    pub struct FaceKey;
}

/// Result of a merge pass.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Final faces, in the order of the earliest input face each contains.
    pub faces: Vec<Face3D>,
    /// Number of successful pairwise merges.
    pub merges: usize,
    /// Number of spliced candidates that failed validation.
    pub rejected: usize,
}

/// Merges coplanar, edge-adjacent faces of a polyhedron.
pub fn simplify_and_merge_faces(polyhedron: &Polyhedron, tol: &Tolerance) -> MergeOutcome {
    let mut merger = FaceMerger::new(polyhedron.faces().iter().cloned(), tol);
    merger.run();
    merger.into_outcome()
}

/// Arena-based face merge engine.
#[derive(Debug)]
pub struct FaceMerger {
    base_tol: Tolerance,
    tol: Tolerance,
    faces: SlotMap<FaceKey, Face3D>,
    rank: SecondaryMap<FaceKey, usize>,
    forward: FxHashMap<FaceKey, FaceKey>,
    produced: FxHashSet<FaceKey>,
    vertex_order: Vec<PointKey>,
    faces_per_vertex: FxHashMap<PointKey, SmallVec<[FaceKey; 8]>>,
    rejected_pairs: FxHashSet<(FaceKey, FaceKey)>,
    merges: usize,
    rejected: usize,
}

enum Adjacency {
    Direct,
    Forward,
}

impl FaceMerger {
    pub fn new<I>(faces: I, tol: &Tolerance) -> Self
    where
        I: IntoIterator<Item = Face3D>,
    {
        let local_tol = tol.tightened(MERGE_PRECISION_DIGITS);
        let mut merger = Self {
            base_tol: *tol,
            tol: local_tol,
            faces: SlotMap::with_key(),
            rank: SecondaryMap::new(),
            forward: FxHashMap::default(),
            produced: FxHashSet::default(),
            vertex_order: Vec::new(),
            faces_per_vertex: FxHashMap::default(),
            rejected_pairs: FxHashSet::default(),
            merges: 0,
            rejected: 0,
        };

        for (i, face) in faces.into_iter().enumerate() {
            let face = face.rekeyed(&local_tol);
            let mut touched: SmallVec<[PointKey; 8]> = SmallVec::new();
            for p in face.vertices() {
                let vk = local_tol.point_key(p);
                if !touched.contains(&vk) {
                    touched.push(vk);
                }
            }

            let key = merger.faces.insert(face);
            merger.rank.insert(key, i);
            for vk in touched {
                let bucket = merger.faces_per_vertex.entry(vk).or_default();
                if bucket.is_empty() {
                    merger.vertex_order.push(vk);
                }
                bucket.push(key);
            }
        }
        merger
    }

    /// Runs merge sweeps over every vertex bucket until a sweep finds nothing
    /// more to merge, then strips collinear vertices from merged faces.
    pub fn run(&mut self) {
        let faces_in = self.faces.len();
        let order = std::mem::take(&mut self.vertex_order);
        loop {
            let before = self.merges;
            for vk in &order {
                self.process_bucket(vk);
            }
            if self.merges == before {
                break;
            }
        }
        self.vertex_order = order;
        self.simplify_produced();

        tracing::debug!(
            faces_in,
            faces_out = self.faces.len(),
            merges = self.merges,
            rejected = self.rejected,
            "Merged coplanar faces"
        );
    }

    /// Keys of the surviving faces, in output order.
    pub fn merged_face_keys(&self) -> Vec<FaceKey> {
        let mut keys: Vec<FaceKey> = self.faces.keys().collect();
        keys.sort_by_key(|k| self.rank[*k]);
        keys
    }

    pub fn face(&self, key: FaceKey) -> Option<&Face3D> {
        self.faces.get(key)
    }

    pub fn merges(&self) -> usize {
        self.merges
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Consumes the engine, returning the final faces re-keyed under the
    /// caller's tolerance.
    pub fn into_outcome(self) -> MergeOutcome {
        let faces = self
            .merged_face_keys()
            .into_iter()
            .map(|k| self.faces[k].rekeyed(&self.base_tol))
            .collect();
        MergeOutcome {
            faces,
            merges: self.merges,
            rejected: self.rejected,
        }
    }

    fn resolve(&self, mut key: FaceKey) -> FaceKey {
        while let Some(&next) = self.forward.get(&key) {
            key = next;
        }
        key
    }

    fn process_bucket(&mut self, vk: &PointKey) {
        let Some(bucket) = self.faces_per_vertex.get(vk) else {
            return;
        };
        let mut live: SmallVec<[FaceKey; 8]> = SmallVec::new();
        for &k in bucket {
            let k = self.resolve(k);
            if !live.contains(&k) {
                live.push(k);
            }
        }
        if live.len() < 2 {
            return;
        }
        // keep the bucket small for later sweeps
        self.faces_per_vertex.insert(*vk, live.clone());

        for group in self.group_by_normal(&live) {
            if group.len() >= 2 {
                self.try_merge_faces(group);
            }
        }
    }

    /// Groups faces by normal. Wildcards (undefined normal) join every group.
    fn group_by_normal(&self, keys: &[FaceKey]) -> Vec<Vec<FaceKey>> {
        let mut groups: Vec<(Vector3D, Vec<FaceKey>)> = Vec::new();
        let mut wildcards = Vec::new();
        for &k in keys {
            match self.faces[k].normal() {
                Some(n) => match groups.iter_mut().find(|(gn, _)| self.tol.vectors_eq(gn, &n)) {
                    Some((_, members)) => members.push(k),
                    None => groups.push((n, vec![k])),
                },
                None => wildcards.push(k),
            }
        }
        groups
            .into_iter()
            .map(|(_, mut members)| {
                members.extend_from_slice(&wildcards);
                members
            })
            .collect()
    }

    /// Merges faces of one normal group pairwise until nothing merges.
    fn try_merge_faces(&mut self, mut group: Vec<FaceKey>) {
        loop {
            let mut merged = None;
            'search: for ai in 0..group.len() {
                let anchor = group[ai];
                // consumed by an earlier group of the same bucket
                if !self.faces.contains_key(anchor) || self.faces[anchor].is_degenerate() {
                    continue;
                }
                let anchor_edges: Vec<LineSegment3D> = self.faces[anchor].edges().to_vec();
                for edge in &anchor_edges {
                    let key = edge.directed_key(&self.tol);
                    for (bi, &other) in group.iter().enumerate() {
                        if bi == ai || !self.faces.contains_key(other) {
                            continue;
                        }
                        if self.rejected_pairs.contains(&(anchor, other)) {
                            continue;
                        }
                        let candidate = &self.faces[other];
                        let adjacency = if candidate.has_edge(&key.reversed()) {
                            Adjacency::Direct
                        } else if candidate.has_edge(&key) {
                            Adjacency::Forward
                        } else {
                            continue;
                        };

                        match self.merge_pair(anchor, other, adjacency) {
                            Some(new_key) => {
                                merged = Some((ai, bi, new_key));
                                break 'search;
                            }
                            None => {
                                self.rejected += 1;
                                self.rejected_pairs.insert((anchor, other));
                            }
                        }
                    }
                }
            }

            match merged {
                Some((ai, bi, new_key)) => {
                    group[ai] = new_key;
                    group.remove(bi);
                    group.retain(|k| self.faces.contains_key(*k));
                }
                None => break,
            }
        }
    }

    /// Splices `anchor` and `other`; on success the new face replaces both.
    fn merge_pair(&mut self, anchor: FaceKey, other: FaceKey, adjacency: Adjacency) -> Option<FaceKey> {
        let a = &self.faces[anchor];
        let reversed;
        let b = match adjacency {
            Adjacency::Direct => &self.faces[other],
            Adjacency::Forward => {
                reversed = self.faces[other].reversed();
                &reversed
            }
        };

        let merged = splice(a, b, &self.tol)?;
        if !self.accept(a, b, &merged) {
            return None;
        }

        let rank = self.rank[anchor].min(self.rank[other]);
        self.faces.remove(anchor);
        self.faces.remove(other);
        self.produced.remove(&anchor);
        self.produced.remove(&other);

        let new_key = self.faces.insert(merged);
        self.rank.insert(new_key, rank);
        self.forward.insert(anchor, new_key);
        self.forward.insert(other, new_key);
        self.produced.insert(new_key);
        self.merges += 1;
        Some(new_key)
    }

    /// Validation of a spliced candidate: a valid face with holes inside its
    /// outer loop, facing the anchor's way, and conserving area.
    fn accept(&self, a: &Face3D, b: &Face3D, merged: &Face3D) -> bool {
        if merged.validate(&self.tol).is_err() || !merged.holes_inside_outer() {
            return false;
        }
        let (Some(na), Some(nm)) = (a.normal(), merged.normal()) else {
            return false;
        };
        if na.dot(&nm) <= 0.0 {
            return false;
        }
        let expected = a.area() + b.area();
        (merged.area() - expected).abs() <= self.tol.tol * expected.max(1.0)
    }

    fn simplify_produced(&mut self) {
        let produced: Vec<FaceKey> = self.produced.iter().copied().collect();
        for key in produced {
            let Some(face) = self.faces.get(key) else {
                continue;
            };
            let simplified = face.without_collinear_vertices(&self.tol);
            if simplified.validate(&self.tol).is_ok() {
                self.faces[key] = simplified;
            }
        }
    }
}

/// Joins two faces along every edge they share in opposite directions and
/// rebuilds the boundary. Returns `None` if the remaining fragments do not
/// chain into closed loops.
fn splice(a: &Face3D, b: &Face3D, tol: &Tolerance) -> Option<Face3D> {
    let edges: Vec<LineSegment3D> = a.edges().iter().chain(b.edges()).copied().collect();
    let keys: Vec<SegmentKey> = edges.iter().map(|e| e.directed_key(tol)).collect();

    let mut alive = vec![true; edges.len()];
    let mut pending: FxHashMap<SegmentKey, SmallVec<[usize; 1]>> = FxHashMap::default();
    let mut cancelled = 0;
    for i in 0..edges.len() {
        if let Some(partner) = pending.get_mut(&keys[i].reversed()).and_then(|v| v.pop()) {
            alive[i] = false;
            alive[partner] = false;
            cancelled += 1;
        } else {
            pending.entry(keys[i]).or_default().push(i);
        }
    }
    if cancelled == 0 {
        return None;
    }

    let remaining: Vec<usize> = (0..edges.len()).filter(|&i| alive[i]).collect();
    if remaining.len() < 3 {
        return None;
    }

    let mut by_start: FxHashMap<PointKey, SmallVec<[usize; 2]>> = FxHashMap::default();
    for &i in &remaining {
        by_start.entry(keys[i].start).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut loops: Vec<Vec<Point3D>> = Vec::new();
    for &first in &remaining {
        if used[first] {
            continue;
        }
        used[first] = true;
        let loop_start = keys[first].start;
        let mut points = vec![edges[first].start];
        let mut current = first;
        loop {
            points.push(edges[current].end);
            let end = keys[current].end;
            if end == loop_start {
                break;
            }
            let next = by_start
                .get(&end)?
                .iter()
                .copied()
                .find(|&j| !used[j])?;
            used[next] = true;
            current = next;
        }
        loops.push(points);
    }

    let perimeter = |lp: &[Point3D]| -> f64 { lp.windows(2).map(|w| (w[1] - w[0]).norm()).sum() };
    let outer_idx = loops
        .iter()
        .enumerate()
        .max_by(|(_, x), (_, y)| perimeter(x).total_cmp(&perimeter(y)))
        .map(|(i, _)| i)?;
    let outer = loops.swap_remove(outer_idx);
    Some(Face3D::new(outer, loops, tol))
}
