// Copyright 2017 Matthew Plant. This file is part of collgraph.
//
// collgraph is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// collgraph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with collgraph. If not, see <http://www.gnu.org/licenses/>.

use std::vec::Vec;

use cgmath::{EuclideanSpace, Point3, Vector3};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::bounds::BoundedBy;
use crate::collision::Overlaps;
use crate::error::CollisionError;
use crate::geom::*;
use crate::mesh::CollisionFace;

/// Default maximum depth of a mesh's KD-tree.
pub const DEF_KDTREE_LEVEL: u8 = 12;

/// How a KD-tree node picks its split plane.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KdTreeConcept {
    /// Split at the center of the node's box along its longest axis. A node
    /// stops splitting once neither side separates any triangle.
    Center,
    /// Split at the average triangle center along the axis that duplicates
    /// the fewest triangles. A node stops splitting once either side keeps
    /// every triangle.
    Average,
}

impl Default for KdTreeConcept {
    fn default() -> Self {
        KdTreeConcept::Center
    }
}

/// A static KD-tree over the triangles of a mesh. Built once and never
/// modified; a new tree must be built when the geometry changes.
#[derive(Clone, Debug)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    faces: Vec<CollisionFace>,
    leaf_count: usize,
}

#[derive(Clone, Debug)]
struct KdNode {
    bounds: AABB,
    node_type: KdNodeType,
}

#[derive(Clone, Debug)]
enum KdNodeType {
    Leaf(Vec<usize>),
    Split {
        axis: usize,
        distance: f32,
        near: usize,
        far: usize,
    },
}

impl KdTree {
    /// Builds the tree. The root box is the bounding box of all faces.
    pub fn build(
        faces: Vec<CollisionFace>,
        max_level: u8,
        concept: KdTreeConcept
    ) -> Result<KdTree, CollisionError> {
        let bounds = {
            let mut iter = faces.iter();
            let first = iter.next().ok_or(CollisionError::EmptyMesh)?;
            iter.fold(first.triangle.bounds(), |acc, f| AABB::combine(&acc, &f.triangle.bounds()))
        };
        let mut tree = KdTree {
            nodes: Vec::new(),
            leaf_count: 0,
            faces,
        };
        let all = (0..tree.faces.len()).collect();
        tree.build_node(bounds, all, max_level, concept);
        log::debug!(
            "built kd-tree over {} faces: {} nodes, {} leaves",
            tree.faces.len(), tree.nodes.len(), tree.leaf_count
        );
        Ok(tree)
    }

    fn build_node(
        &mut self,
        bounds: AABB,
        faces: Vec<usize>,
        level: u8,
        concept: KdTreeConcept
    ) -> usize {
        let index = self.nodes.len();
        self.nodes.push(KdNode { bounds, node_type: KdNodeType::Leaf(Vec::new()) });

        let split = if level == 0 || faces.len() <= 1 {
            None
        } else {
            self.choose_split(&bounds, &faces, concept)
        };

        match split {
            None => {
                self.leaf_count += 1;
                self.nodes[index].node_type = KdNodeType::Leaf(faces);
            },
            Some((axis, distance, near_faces, far_faces)) => {
                let (near_box, far_box) = bounds.split(axis, distance);
                let near = self.build_node(near_box, near_faces, level - 1, concept);
                let far = self.build_node(far_box, far_faces, level - 1, concept);
                self.nodes[index].node_type = KdNodeType::Split { axis, distance, near, far };
            },
        }
        index
    }

    /// A triangle goes near if any vertex lies below the split and far if any
    /// vertex lies at or above it. Straddling triangles go both ways.
    fn partition(&self, faces: &[usize], axis: usize, distance: f32) -> (Vec<usize>, Vec<usize>) {
        let mut near = Vec::new();
        let mut far = Vec::new();
        for &f in faces {
            let verts = self.faces[f].triangle.vertices();
            if verts.iter().any(|v| v[axis] < distance) {
                near.push(f);
            }
            if verts.iter().any(|v| v[axis] >= distance) {
                far.push(f);
            }
        }
        (near, far)
    }

    fn choose_split(
        &self,
        bounds: &AABB,
        faces: &[usize],
        concept: KdTreeConcept
    ) -> Option<(usize, f32, Vec<usize>, Vec<usize>)> {
        let n = faces.len();
        match concept {
            KdTreeConcept::Center => {
                let axis = bounds.longest_axis();
                let distance = bounds.c[axis];
                let (near, far) = self.partition(faces, axis, distance);
                if near.len() == n && far.len() == n {
                    None
                } else {
                    Some((axis, distance, near, far))
                }
            },
            KdTreeConcept::Average => {
                let sum = faces.iter().fold(Vector3::new(0.0, 0.0, 0.0), |acc, &f| {
                    acc + self.faces[f].triangle.center().to_vec()
                });
                let average = Point3::from_vec(sum / n as f32);

                let mut best: Option<(usize, Vec<usize>, Vec<usize>)> = None;
                for axis in 0..3 {
                    let (near, far) = self.partition(faces, axis, average[axis]);
                    let total = near.len() + far.len();
                    let better = match best {
                        None => true,
                        Some((best_axis, ref bn, ref bf)) => {
                            let best_total = bn.len() + bf.len();
                            total < best_total
                                || (total == best_total && bounds.r[axis] > bounds.r[best_axis])
                        },
                    };
                    if better {
                        best = Some((axis, near, far));
                    }
                }
                let (axis, near, far) = best?;
                if near.len() == n || far.len() == n {
                    None
                } else {
                    Some((axis, average[axis], near, far))
                }
            },
        }
    }

    /// All faces the tree was built from.
    pub fn faces(&self) -> &[CollisionFace] {
        &self.faces
    }

    pub fn face(&self, index: usize) -> &CollisionFace {
        &self.faces[index]
    }

    /// Bounding box of the whole tree.
    pub fn bounds(&self) -> AABB {
        self.nodes[0].bounds
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn node_bounds(&self, node: usize) -> AABB {
        self.nodes[node].bounds
    }

    /// Face indices stored in a leaf. Internal nodes hold none.
    pub fn leaf_faces(&self, node: usize) -> &[usize] {
        match self.nodes[node].node_type {
            KdNodeType::Leaf(ref faces) => faces,
            KdNodeType::Split { .. } => &[],
        }
    }

    /// Every leaf of the tree in depth first order.
    pub fn leaves(&self) -> Vec<usize> {
        self.collect_leaves(|_| true)
    }

    /// Descends to the leaf whose region contains the point by comparing the
    /// point against each split plane.
    pub fn find_leaf(&self, p: Point3<f32>) -> usize {
        let mut node = 0;
        loop {
            match self.nodes[node].node_type {
                KdNodeType::Leaf(_) => return node,
                KdNodeType::Split { axis, distance, near, far } => {
                    node = if p[axis] < distance { near } else { far };
                },
            }
        }
    }

    /// Leaves whose boxes lie within radius of the point.
    pub fn find_leaf_list_sphere(&self, p: Point3<f32>, radius: f32) -> Vec<usize> {
        let query = Sphere { c: p, r: radius }.bounds();
        let r2 = radius * radius;
        self.collect_leaves(|b| {
            if !query.overlaps(b) {
                return false;
            }
            let d: f32 = b.min_dist(&p);
            d <= r2
        })
    }

    /// Leaves whose boxes the segment passes through.
    pub fn find_leaf_list_segment(&self, seg: &Segment) -> Vec<usize> {
        self.collect_leaves(|b| seg.overlaps(b))
    }

    /// Leaves whose boxes overlap the box enclosing the segment swept by the
    /// radius.
    pub fn find_leaf_list_capsule(&self, seg: &Segment, radius: f32) -> Vec<usize> {
        let query = OBB::from_segment(seg, radius);
        self.collect_leaves(|b| query.overlaps(&OBB::from(*b)))
    }

    /// Sorted, deduplicated face indices of the given leaves. Straddling
    /// triangles are stored in several leaves but reported once.
    pub fn unique_faces(&self, leaves: &[usize]) -> Vec<usize> {
        let mut faces: Vec<usize> = leaves
            .iter()
            .flat_map(|&leaf| self.leaf_faces(leaf).iter().cloned())
            .collect();
        faces.sort_unstable();
        faces.dedup();
        faces
    }

    fn collect_leaves<F: Fn(&AABB) -> bool>(&self, visit: F) -> Vec<usize> {
        let mut leaves = Vec::new();
        let mut stack = SmallVec::<[usize; 64]>::new();
        stack.push(0);
        while let Some(top) = stack.pop() {
            let node = &self.nodes[top];
            if !visit(&node.bounds) {
                continue;
            }
            match node.node_type {
                KdNodeType::Leaf(_) => leaves.push(top),
                KdNodeType::Split { near, far, .. } => {
                    stack.push(far);
                    stack.push(near);
                },
            }
        }
        leaves
    }
}

#[cfg(test)]
mod tests {
    mod kdtree {
        use cgmath::Point3;
        use crate::collision::Overlaps;
        use crate::geom::*;
        use crate::kdtree::*;
        use crate::mesh::{CollisionFace, FaceId};

        /// A flat grid of n by n quads at the given height, two triangles
        /// each. Face indices start at `first`.
        fn grid_at(n: usize, y: f32, first: u32) -> Vec<CollisionFace> {
            let mut faces = Vec::new();
            for i in 0..n {
                for j in 0..n {
                    let (x, z) = (i as f32, j as f32);
                    let a = Point3::new(x, y, z);
                    let b = Point3::new(x, y, z + 1.0);
                    let c = Point3::new(x + 1.0, y, z + 1.0);
                    let d = Point3::new(x + 1.0, y, z);
                    for tri in [Triangle::new(a, b, c), Triangle::new(a, c, d)].iter() {
                        let index = first + faces.len() as u32;
                        faces.push(CollisionFace {
                            id: FaceId { mesh: 0, surface: 0, index },
                            triangle: *tri,
                        });
                    }
                }
            }
            faces
        }

        fn grid(n: usize) -> Vec<CollisionFace> {
            grid_at(n, 0.0, 0)
        }

        #[test]
        fn test_empty_mesh() {
            assert_eq!(
                KdTree::build(Vec::new(), DEF_KDTREE_LEVEL, KdTreeConcept::Center).unwrap_err(),
                CollisionError::EmptyMesh
            );
        }

        #[test]
        fn test_build_center() {
            let tree = KdTree::build(grid(8), 4, KdTreeConcept::Center).unwrap();
            assert!(tree.leaf_count() > 1);
            assert_eq!(tree.node_count(), tree.leaf_count() * 2 - 1);
            // Every face ends up in at least one leaf.
            let all = tree.unique_faces(&tree.leaves());
            assert_eq!(all, (0..tree.faces().len()).collect::<Vec<usize>>());
        }

        #[test]
        fn test_build_average() {
            // Two floors: the height axis separates them without duplicates.
            let mut faces = grid_at(8, 0.0, 0);
            faces.extend(grid_at(8, 4.0, 128));
            let tree = KdTree::build(faces, 4, KdTreeConcept::Average).unwrap();
            assert_eq!(tree.leaf_count(), 2);
            assert_eq!(tree.node_count(), 3);
            let all = tree.unique_faces(&tree.leaves());
            assert_eq!(all.len(), tree.faces().len());

            let upper = tree.find_leaf(Point3::new(1.0, 4.0, 1.0));
            assert_eq!(tree.leaf_faces(upper).len(), 128);
            assert!(tree.leaf_faces(upper).iter().all(|&f| tree.face(f).triangle.a.y == 4.0));
        }

        #[test]
        fn test_average_keeps_flat_mesh_whole() {
            // Every face of a flat mesh lands on the far side of its own
            // height, so the root never splits.
            let tree = KdTree::build(grid(8), 4, KdTreeConcept::Average).unwrap();
            assert_eq!(tree.leaf_count(), 1);
            assert_eq!(tree.leaf_faces(0).len(), 128);
        }

        #[test]
        fn test_level_zero_is_one_leaf() {
            let tree = KdTree::build(grid(4), 0, KdTreeConcept::Center).unwrap();
            assert_eq!(tree.leaf_count(), 1);
            assert_eq!(tree.leaf_faces(0).len(), 32);
        }

        #[test]
        fn test_find_leaf() {
            let tree = KdTree::build(grid(8), 6, KdTreeConcept::Center).unwrap();
            let p = Point3::new(2.5, 0.0, 3.5);
            let leaf = tree.find_leaf(p);
            assert!(tree.leaf_faces(leaf).iter().any(|&f| {
                let closest: Point3<f32> = tree.face(f).triangle.min_dist(&p);
                closest == p
            }));
        }

        #[test]
        fn test_sphere_query() {
            let tree = KdTree::build(grid(8), 6, KdTreeConcept::Center).unwrap();
            let leaves = tree.find_leaf_list_sphere(Point3::new(4.0, 0.25, 4.0), 0.5);
            let faces = tree.unique_faces(&leaves);
            assert!(!faces.is_empty());
            assert!(faces.len() < tree.faces().len());
            // Out of reach above the grid.
            assert!(tree.find_leaf_list_sphere(Point3::new(4.0, 5.0, 4.0), 0.5).is_empty());
        }

        #[test]
        fn test_segment_query_superset_of_brute_force() {
            let tree = KdTree::build(grid(8), 6, KdTreeConcept::Center).unwrap();
            let segs = [
                Segment::new(Point3::new(-1.0, 1.0, -1.0), Point3::new(9.0, -1.0, 9.0)),
                Segment::new(Point3::new(3.5, 2.0, 0.5), Point3::new(3.5, -2.0, 0.5)),
                Segment::new(Point3::new(0.0, 0.0, 4.0), Point3::new(8.0, 0.0, 4.0)),
                Segment::new(Point3::new(20.0, 0.0, 4.0), Point3::new(30.0, 0.0, 4.0)),
            ];
            for seg in segs.iter() {
                let found = tree.find_leaf_list_segment(seg);
                for leaf in tree.leaves() {
                    if seg.overlaps(&tree.node_bounds(leaf)) {
                        assert!(found.contains(&leaf), "leaf {} missing for {:?}", leaf, seg);
                    }
                }
            }
        }

        #[test]
        fn test_capsule_query() {
            let tree = KdTree::build(grid(8), 6, KdTreeConcept::Center).unwrap();
            let seg = Segment::new(Point3::new(1.5, 0.3, 1.5), Point3::new(1.5, 2.3, 1.5));
            let faces = tree.unique_faces(&tree.find_leaf_list_capsule(&seg, 0.5));
            assert!(!faces.is_empty());
            let seg = Segment::new(Point3::new(1.5, 3.0, 1.5), Point3::new(1.5, 5.0, 1.5));
            assert!(tree.find_leaf_list_capsule(&seg, 0.5).is_empty());
        }
    }
}
