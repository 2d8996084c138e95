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

use std::rc::Rc;
use std::vec::Vec;

use cgmath::{InnerSpace, Matrix4, Point3, Transform};
use serde::{Deserialize, Serialize};

use crate::collision::*;
use crate::contact::{CollisionContact, LineContact};
use crate::error::CollisionError;
use crate::geom::*;
use crate::kdtree::{KdTree, KdTreeConcept};

/// Which side of a triangle is visible to collision tests.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaceMode {
    Front,
    Back,
    Both,
}

impl Default for FaceMode {
    fn default() -> Self {
        FaceMode::Front
    }
}

impl FaceMode {
    /// True if a point at p does not see the triangle.
    pub fn culls_point(&self, tri: &Triangle, p: Point3<f32>) -> bool {
        match *self {
            FaceMode::Front => !tri.is_front(p),
            FaceMode::Back => tri.is_front(p),
            FaceMode::Both => false,
        }
    }

    /// True if neither end of the segment sees the triangle.
    pub fn culls_segment(&self, tri: &Triangle, seg: &Segment) -> bool {
        match *self {
            FaceMode::Front => !tri.is_front(seg.a) && !tri.is_front(seg.b),
            FaceMode::Back => tri.is_front(seg.a) && tri.is_front(seg.b),
            FaceMode::Both => false,
        }
    }
}

/// Anything that can hand out triangles grouped in surfaces. Triangle order
/// within a surface is the triangle's identity.
pub trait TriangleSource {
    fn surface_count(&self) -> usize;

    fn surface_triangles(&self, surface: usize) -> Vec<Triangle>;
}

impl TriangleSource for [Triangle] {
    fn surface_count(&self) -> usize {
        1
    }

    fn surface_triangles(&self, _: usize) -> Vec<Triangle> {
        self.to_vec()
    }
}

impl TriangleSource for Vec<Triangle> {
    fn surface_count(&self) -> usize {
        1
    }

    fn surface_triangles(&self, _: usize) -> Vec<Triangle> {
        self.clone()
    }
}

/// An indexed set of vertices.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Surface {
    pub verts: Vec<Point3<f32>>,
    pub faces: Vec<(usize, usize, usize)>,
}

impl Surface {
    pub fn new() -> Self {
        Surface::default()
    }

    pub fn with_capacity(cap_verts: usize, cap_faces: usize) -> Self {
        Surface {
            verts: Vec::with_capacity(cap_verts),
            faces: Vec::with_capacity(cap_faces),
        }
    }

    pub fn push_vert(&mut self, p: Point3<f32>) -> usize {
        let id = self.verts.len();
        self.verts.push(p);
        id
    }

    /// Adds a face referencing three previously pushed vertices.
    pub fn push_face(&mut self, f: (usize, usize, usize)) -> usize {
        let index = self.faces.len();
        self.faces.push(f);
        index
    }

    pub fn triangle(&self, face: usize) -> Triangle {
        let (a, b, c) = self.faces[face];
        Triangle::from((self.verts[a], self.verts[b], self.verts[c]))
    }
}

/// A triangle mesh is a set of surfaces. There are no requirements on the
/// convexity of the mesh.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub surfaces: Vec<Surface>,
}

impl Mesh {
    pub fn new() -> Self {
        Mesh::default()
    }

    pub fn push_surface(&mut self, surface: Surface) -> usize {
        let id = self.surfaces.len();
        self.surfaces.push(surface);
        id
    }
}

impl TriangleSource for Mesh {
    fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    fn surface_triangles(&self, surface: usize) -> Vec<Triangle> {
        let surface = &self.surfaces[surface];
        (0..surface.faces.len()).map(|f| surface.triangle(f)).collect()
    }
}

/// Stable identity of a mesh triangle: which source of a mesh list it came
/// from, which surface of that source, and its index in the surface.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceId {
    pub mesh: u32,
    pub surface: u32,
    pub index: u32,
}

/// A triangle in mesh local space together with its identity.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CollisionFace {
    pub id: FaceId,
    pub triangle: Triangle,
}

/// Flattens every triangle of every source into a face list.
pub fn collect_faces(sources: &[&dyn TriangleSource]) -> Vec<CollisionFace> {
    let mut faces = Vec::new();
    for (mesh, source) in sources.iter().enumerate() {
        for surface in 0..source.surface_count() {
            for (index, triangle) in source.surface_triangles(surface).into_iter().enumerate() {
                faces.push(CollisionFace {
                    id: FaceId {
                        mesh: mesh as u32,
                        surface: surface as u32,
                        index: index as u32,
                    },
                    triangle,
                });
            }
        }
    }
    faces
}

/// The collision geometry of a mesh node: a shared KD tree in mesh local
/// space and the face mode used for culling.
#[derive(Clone, Debug)]
pub struct MeshShape {
    pub tree: Rc<KdTree>,
    pub face_mode: FaceMode,
}

impl MeshShape {
    pub fn new(
        sources: &[&dyn TriangleSource],
        max_level: u8,
        concept: KdTreeConcept,
        face_mode: FaceMode
    ) -> Result<Self, CollisionError> {
        let tree = KdTree::build(collect_faces(sources), max_level, concept)?;
        Ok(MeshShape { tree: Rc::new(tree), face_mode })
    }

    /// Another mesh sharing this mesh's tree.
    pub fn instance(&self, face_mode: FaceMode) -> Self {
        MeshShape {
            tree: Rc::clone(&self.tree),
            face_mode,
        }
    }

    /// The closest visible triangle within the sphere's radius. The sphere is
    /// in world space; `transform` maps mesh local space to world space.
    pub fn sphere_contact(
        &self,
        transform: &Matrix4<f32>,
        inverse: &Matrix4<f32>,
        sphere: &Sphere
    ) -> Option<CollisionContact> {
        let local_r = local_radius(transform, sphere.r)?;
        let local_c = inverse.transform_point(sphere.c);
        let leaves = self.tree.find_leaf_list_sphere(local_c, local_r);

        let r2 = sphere.r * sphere.r;
        let mut best: Option<(f32, usize, Triangle, Point3<f32>)> = None;
        for face in self.tree.unique_faces(&leaves) {
            let tri = self.tree.face(face).triangle.transform(transform);
            if self.face_mode.culls_point(&tri, sphere.c) {
                continue;
            }
            let q: Point3<f32> = tri.min_dist(&sphere.c);
            let d2 = (sphere.c - q).magnitude2();
            if d2 < r2 && best.map_or(true, |(b, ..)| d2 < b) {
                best = Some((d2, face, tri, q));
            }
        }

        let (d2, face, tri, q) = best?;
        surface_contact(sphere.c, q, d2, sphere.r, &tri)
            .map(|c| c.with_face(self.tree.face(face), tri))
    }

    /// The closest visible triangle within the capsule's radius.
    pub fn capsule_contact(
        &self,
        transform: &Matrix4<f32>,
        inverse: &Matrix4<f32>,
        capsule: &Capsule
    ) -> Option<CollisionContact> {
        let local_r = local_radius(transform, capsule.r)?;
        let seg = Segment::from(*capsule);
        let leaves = self.tree.find_leaf_list_capsule(&seg.transform(inverse), local_r);

        let r2 = capsule.r * capsule.r;
        let mut best: Option<(f32, usize, Triangle, Point3<f32>, Point3<f32>)> = None;
        for face in self.tree.unique_faces(&leaves) {
            let tri = self.tree.face(face).triangle.transform(transform);
            if self.face_mode.culls_segment(&tri, &seg) {
                continue;
            }
            let (on_tri, on_seg) = tri.min_dist(&seg);
            let d2 = (on_seg - on_tri).magnitude2();
            if d2 < r2 && best.map_or(true, |(b, ..)| d2 < b) {
                best = Some((d2, face, tri, on_tri, on_seg));
            }
        }

        let (d2, face, tri, on_tri, on_seg) = best?;
        surface_contact(on_seg, on_tri, d2, capsule.r, &tri)
            .map(|c| c.with_face(self.tree.face(face), tri))
    }

    /// Every visible triangle the segment passes through, unsorted. A
    /// triangle is visible to a line when the line's start sees it. Hits on
    /// the back of a triangle report the flipped normal.
    pub fn line_hits(
        &self,
        transform: &Matrix4<f32>,
        inverse: &Matrix4<f32>,
        seg: &Segment
    ) -> Vec<LineContact> {
        let leaves = self.tree.find_leaf_list_segment(&seg.transform(inverse));
        let mut hits = Vec::new();
        for face in self.tree.unique_faces(&leaves) {
            let tri = self.tree.face(face).triangle.transform(transform);
            if self.face_mode.culls_point(&tri, seg.a) {
                continue;
            }
            if let Some(hit) = seg.intersection(&tri) {
                let n = if tri.is_front(seg.a) { hit.n } else { -hit.n };
                hits.push(LineContact {
                    point: hit.p,
                    normal: n,
                    triangle: Some(tri),
                    face: Some(self.tree.face(face).id),
                });
            }
        }
        hits
    }
}

/// Radius of a world space query shape measured in mesh local units. None for a
/// degenerate transform.
fn local_radius(transform: &Matrix4<f32>, r: f32) -> Option<f32> {
    let scale = matrix_scale(transform);
    let min_scale = scale.x.min(scale.y).min(scale.z);
    if min_scale <= COLLISION_EPSILON {
        None
    } else {
        Some(r / min_scale)
    }
}

/// Contact of a point p against its closest point q on a triangle.
/// When p lies on the triangle the triangle's own normal is used.
fn surface_contact(
    p: Point3<f32>,
    q: Point3<f32>,
    d2: f32,
    r: f32,
    tri: &Triangle
) -> Option<CollisionContact> {
    let dist = d2.sqrt();
    let normal = if dist > COLLISION_EPSILON {
        (p - q) / dist
    } else {
        let n = tri.normal();
        if n.magnitude2() <= COLLISION_EPSILON {
            return None;
        }
        n
    };
    Some(CollisionContact::new(q, normal, r - dist))
}

#[cfg(test)]
mod tests {
    mod mesh {
        use cgmath::{InnerSpace, Matrix4, Point3, SquareMatrix, Vector3};
        use crate::geom::*;
        use crate::kdtree::KdTreeConcept;
        use crate::mesh::*;

        /// A 4x4 floor at y = 0 facing up.
        fn floor() -> Mesh {
            let mut surface = Surface::new();
            let a = surface.push_vert(Point3::new(-2.0, 0.0, -2.0));
            let b = surface.push_vert(Point3::new(-2.0, 0.0, 2.0));
            let c = surface.push_vert(Point3::new(2.0, 0.0, 2.0));
            let d = surface.push_vert(Point3::new(2.0, 0.0, -2.0));
            surface.push_face((a, b, c));
            surface.push_face((a, c, d));
            let mut mesh = Mesh::new();
            mesh.push_surface(surface);
            mesh
        }

        fn shape(mode: FaceMode) -> MeshShape {
            let mesh = floor();
            MeshShape::new(&[&mesh as &dyn TriangleSource], 12, KdTreeConcept::Center, mode).unwrap()
        }

        #[test]
        fn test_floor_faces_up() {
            let mesh = floor();
            for tri in mesh.surface_triangles(0) {
                assert_relative_eq!(tri.normal(), Vector3::new(0.0, 1.0, 0.0), epsilon = COLLISION_EPSILON);
            }
        }

        #[test]
        fn test_collect_faces_ids() {
            let mesh = floor();
            let extra = vec![Triangle::new(
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 1.0),
                Point3::new(1.0, 1.0, 0.0),
            )];
            let sources: [&dyn TriangleSource; 2] = [&mesh, &extra];
            let faces = collect_faces(&sources);
            assert_eq!(faces.len(), 3);
            assert_eq!(faces[1].id, FaceId { mesh: 0, surface: 0, index: 1 });
            assert_eq!(faces[2].id, FaceId { mesh: 1, surface: 0, index: 0 });
        }

        #[test]
        fn test_sphere_contact() {
            let shape = shape(FaceMode::Front);
            let id = Matrix4::identity();
            let contact = shape
                .sphere_contact(&id, &id, &Sphere { c: Point3::new(0.5, 0.3, 0.5), r: 0.5 })
                .unwrap();
            assert_relative_eq!(contact.normal, Vector3::new(0.0, 1.0, 0.0), epsilon = COLLISION_EPSILON);
            assert_relative_eq!(contact.impact, 0.2, epsilon = 1e-5);
            assert_relative_eq!(contact.point, Point3::new(0.5, 0.0, 0.5), epsilon = 1e-5);
            assert!(contact.face.is_some());

            // Out of reach.
            assert!(shape.sphere_contact(&id, &id, &Sphere { c: Point3::new(0.5, 0.6, 0.5), r: 0.5 }).is_none());
        }

        #[test]
        fn test_face_modes() {
            let id = Matrix4::identity();
            let below = Sphere { c: Point3::new(0.5, -0.3, 0.5), r: 0.5 };
            assert!(shape(FaceMode::Front).sphere_contact(&id, &id, &below).is_none());
            let back = shape(FaceMode::Back).sphere_contact(&id, &id, &below).unwrap();
            assert_relative_eq!(back.normal, Vector3::new(0.0, -1.0, 0.0), epsilon = COLLISION_EPSILON);
            assert!(shape(FaceMode::Both).sphere_contact(&id, &id, &below).is_some());
        }

        #[test]
        fn test_scaled_transform() {
            let shape = shape(FaceMode::Front);
            let m = Matrix4::from_translation(Vector3::new(0.0, 1.0, 0.0)) * Matrix4::from_scale(2.0);
            let inv = m.invert().unwrap();
            // The floor now spans -4..4 at y = 1.
            let contact = shape
                .sphere_contact(&m, &inv, &Sphere { c: Point3::new(3.5, 1.25, 0.0), r: 0.5 })
                .unwrap();
            assert_relative_eq!(contact.impact, 0.25, epsilon = 1e-5);
            assert_relative_eq!(contact.normal.magnitude(), 1.0, epsilon = 1e-4);
        }

        #[test]
        fn test_capsule_contact() {
            let shape = shape(FaceMode::Front);
            let id = Matrix4::identity();
            let cap = Capsule {
                a: Point3::new(0.0, 0.4, 0.0),
                d: Vector3::new(0.0, 2.0, 0.0),
                r: 0.5,
            };
            let contact = shape.capsule_contact(&id, &id, &cap).unwrap();
            assert_relative_eq!(contact.normal, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-5);
            assert_relative_eq!(contact.impact, 0.1, epsilon = 1e-5);
        }

        #[test]
        fn test_line_hits() {
            let shape = shape(FaceMode::Both);
            let id = Matrix4::identity();
            let down = Segment::new(Point3::new(1.0, 1.0, -0.5), Point3::new(1.0, -1.0, -0.5));
            let hits = shape.line_hits(&id, &id, &down);
            assert_eq!(hits.len(), 1);
            assert_relative_eq!(hits[0].point, Point3::new(1.0, 0.0, -0.5), epsilon = 1e-5);
            assert_relative_eq!(hits[0].normal, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-5);

            // From below the floor is hit on its back.
            let hits = shape.line_hits(&id, &id, &down.reversed());
            assert_relative_eq!(hits[0].normal, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-5);

            // Front only meshes ignore lines from behind.
            let front = shape.instance(FaceMode::Front);
            assert!(front.line_hits(&id, &id, &down.reversed()).is_empty());
        }
    }
}
