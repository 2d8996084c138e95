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

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::vec::Vec;

use cgmath::{EuclideanSpace, Matrix3, Matrix4, Point3, SquareMatrix, Transform, Vector3};

use crate::capsule::*;
use crate::collision::*;
use crate::contact::{CollisionContact, LineContact};
use crate::cuboid::*;
use crate::error::CollisionError;
use crate::geom::*;
use crate::material::MaterialHandle;
use crate::pool::Handle;
use crate::shape::*;
use crate::sphere::*;

pub type NodeHandle = Handle<CollisionNode>;

bitflags::bitflags! {
    /// Per node switches for the collision graph.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct CollisionFlags: u8 {
        /// The node looks for contacts with its rivals.
        const DETECTION        = 0x01;
        /// Detected contacts push the node out of its rivals.
        const RESOLVE          = 0x03;
        /// The node answers line intersection queries.
        const INTERSECTION     = 0x04;
        /// The node is resolved every frame, even when it did not move.
        const PERMANENT_UPDATE = 0x08;
        const FULL             = 0x0F;
    }
}

impl Default for CollisionFlags {
    fn default() -> Self {
        CollisionFlags::FULL
    }
}

/// The external object a collision node takes its transform from.
pub trait SceneNode {
    fn world_transform(&self) -> Matrix4<f32>;

    fn position(&self) -> Point3<f32>;

    fn set_position(&mut self, p: Point3<f32>);

    fn translate(&mut self, v: Vector3<f32>) {
        let p = self.position();
        self.set_position(p + v);
    }
}

pub type SceneNodeRef = Rc<RefCell<dyn SceneNode>>;

/// A minimal scene node: translation, rotation and scale.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BasicSceneNode {
    pub position: Point3<f32>,
    pub rotation: Matrix3<f32>,
    pub scale: Vector3<f32>,
}

impl BasicSceneNode {
    pub fn new(position: Point3<f32>) -> Self {
        BasicSceneNode {
            position,
            rotation: Matrix3::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Wraps the node for sharing with a collision graph.
    pub fn shared(self) -> Rc<RefCell<BasicSceneNode>> {
        Rc::new(RefCell::new(self))
    }
}

impl Default for BasicSceneNode {
    fn default() -> Self {
        BasicSceneNode::new(Point3::origin())
    }
}

impl SceneNode for BasicSceneNode {
    fn world_transform(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position.to_vec())
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    fn position(&self) -> Point3<f32> {
        self.position
    }

    fn set_position(&mut self, p: Point3<f32>) {
        self.position = p;
    }
}

/// A shape attached to a scene node.
///
/// The node does not own its scene node. Once the scene node is dropped the
/// collision node keeps its last cached transform and can no longer move.
pub struct CollisionNode {
    shape: Shape,
    flags: CollisionFlags,
    material: Option<MaterialHandle>,
    scene: Weak<RefCell<dyn SceneNode>>,
    offset: Option<Matrix4<f32>>,
    transform: Matrix4<f32>,
    inverse: Matrix4<f32>,
    prev_position: Point3<f32>,
    controlled: bool,
}

impl CollisionNode {
    pub fn new(shape: Shape, scene: &SceneNodeRef) -> Result<Self, CollisionError> {
        shape.validate()?;
        let mut node = CollisionNode {
            shape,
            flags: CollisionFlags::default(),
            material: None,
            scene: Rc::downgrade(scene),
            offset: None,
            transform: Matrix4::identity(),
            inverse: Matrix4::identity(),
            prev_position: Point3::origin(),
            controlled: false,
        };
        node.update_transformation();
        node.prev_position = node.position();
        Ok(node)
    }

    /// Like `new`, but for a scene node that may already be gone.
    pub fn from_weak(shape: Shape, scene: &Weak<RefCell<dyn SceneNode>>) -> Result<Self, CollisionError> {
        let scene = scene.upgrade().ok_or(CollisionError::DetachedSceneNode)?;
        CollisionNode::new(shape, &scene)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_mut(&mut self) -> &mut Shape {
        &mut self.shape
    }

    pub fn kind(&self) -> ShapeKind {
        self.shape.kind()
    }

    pub fn support(&self) -> ShapeSupport {
        self.shape.support()
    }

    pub fn flags(&self) -> CollisionFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: CollisionFlags) {
        self.flags = flags;
    }

    pub fn material(&self) -> Option<MaterialHandle> {
        self.material
    }

    pub(crate) fn set_material(&mut self, material: Option<MaterialHandle>) {
        self.material = material;
    }

    /// True for nodes driven by a character controller instead of the
    /// graph's scene update.
    pub fn is_controlled(&self) -> bool {
        self.controlled
    }

    pub(crate) fn set_controlled(&mut self, controlled: bool) {
        self.controlled = controlled;
    }

    pub fn scene_node(&self) -> Option<SceneNodeRef> {
        self.scene.upgrade()
    }

    /// An extra transform applied after the scene node's transform.
    pub fn set_offset(&mut self, offset: Option<Matrix4<f32>>) {
        self.offset = offset;
        self.update_transformation();
    }

    pub fn offset(&self) -> Option<Matrix4<f32>> {
        self.offset
    }

    /// Refreshes the cached world transform and its inverse from the scene
    /// node.
    pub fn update_transformation(&mut self) {
        if let Some(scene) = self.scene.upgrade() {
            let base = scene.borrow().world_transform();
            self.transform = match self.offset {
                Some(offset) => base * offset,
                None => base,
            };
            self.inverse = self.transform.invert().unwrap_or_else(Matrix4::identity);
        }
    }

    pub fn transform(&self) -> &Matrix4<f32> {
        &self.transform
    }

    pub fn inverse_transform(&self) -> &Matrix4<f32> {
        &self.inverse
    }

    /// World position of the node's origin.
    pub fn position(&self) -> Point3<f32> {
        Point3::from_vec(self.transform.w.truncate())
    }

    /// Moves the node so its origin ends up at p.
    pub fn set_position(&mut self, p: Point3<f32>, update_prev: bool) {
        let v = p - self.position();
        self.translate(v);
        if update_prev {
            self.update_prev_position();
        }
    }

    pub fn translate(&mut self, v: Vector3<f32>) {
        if let Some(scene) = self.scene.upgrade() {
            scene.borrow_mut().translate(v);
            self.update_transformation();
        }
    }

    pub fn prev_position(&self) -> Point3<f32> {
        self.prev_position
    }

    pub fn update_prev_position(&mut self) {
        self.prev_position = self.position();
    }

    pub fn max_movement(&self) -> f32 {
        self.shape.max_movement(&self.transform)
    }

    /// The node's sphere in world space. The radius is not scaled.
    pub fn world_sphere(&self, radius: f32) -> Sphere {
        Sphere { c: self.position(), r: radius }
    }

    /// The node's axis as a capsule in world space. The axis follows the
    /// transform, the radius is not scaled.
    pub fn world_line(&self, line: &LineShape) -> Capsule {
        let a = self.position();
        let b = self.transform.transform_point(Point3::new(0.0, line.height, 0.0));
        Capsule { a, d: b - a, r: line.radius }
    }

    pub fn world_box(&self, aabb: &AABB) -> OBB {
        OBB::from_transformed_aabb(aabb, &self.transform)
    }

    pub fn world_plane(&self, plane: &Plane) -> Plane {
        plane.transform(&self.transform)
    }

    /// Narrow phase test of this node against a rival. The contact normal
    /// points from the rival towards this node. Pairs without a test report
    /// no contact.
    pub fn check_collision(&self, rival: &CollisionNode) -> Option<CollisionContact> {
        match (&self.shape, &rival.shape) {
            (&Shape::Sphere { radius }, &Shape::Sphere { radius: rival_radius }) => {
                sphere_sphere(&self.world_sphere(radius), &rival.world_sphere(rival_radius))
            },
            (&Shape::Sphere { radius }, &Shape::Capsule(ref line)) => {
                sphere_capsule(&self.world_sphere(radius), &rival.world_line(line))
            },
            (&Shape::Sphere { radius }, &Shape::Cylinder(ref line)) => {
                sphere_cylinder(&self.world_sphere(radius), &rival.world_line(line))
            },
            (&Shape::Sphere { radius }, &Shape::Box(ref aabb)) => {
                sphere_box(&self.world_sphere(radius), &rival.world_box(aabb))
            },
            (&Shape::Sphere { radius }, &Shape::Plane(ref plane)) => {
                sphere_plane(&self.world_sphere(radius), &rival.world_plane(plane))
            },
            (&Shape::Sphere { radius }, &Shape::Mesh(ref mesh)) => {
                mesh.sphere_contact(&rival.transform, &rival.inverse, &self.world_sphere(radius))
            },
            (&Shape::Capsule(ref line), &Shape::Sphere { radius }) => {
                capsule_sphere(&self.world_line(line), &rival.world_sphere(radius))
            },
            (&Shape::Capsule(ref line), &Shape::Capsule(ref rival_line)) => {
                capsule_capsule(&self.world_line(line), &rival.world_line(rival_line))
            },
            (&Shape::Capsule(ref line), &Shape::Box(ref aabb)) => {
                capsule_box(&self.world_line(line), &rival.world_box(aabb))
            },
            (&Shape::Capsule(ref line), &Shape::Plane(ref plane)) => {
                capsule_plane(&self.world_line(line), &rival.world_plane(plane))
            },
            (&Shape::Capsule(ref line), &Shape::Mesh(ref mesh)) => {
                mesh.capsule_contact(&rival.transform, &rival.inverse, &self.world_line(line))
            },
            (&Shape::Box(ref aabb), &Shape::Sphere { radius }) => {
                box_sphere(&self.world_box(aabb), &rival.world_sphere(radius))
            },
            (&Shape::Box(ref aabb), &Shape::Capsule(ref line)) => {
                box_capsule(&self.world_box(aabb), &rival.world_line(line))
            },
            (&Shape::Box(ref aabb), &Shape::Plane(ref plane)) => {
                box_plane(&self.world_box(aabb), &rival.world_plane(plane))
            },
            _ => None,
        }
    }

    /// Every point where the segment enters the node's surface. Cylinders
    /// and cones are never hit.
    pub fn line_hits(&self, seg: &Segment) -> Vec<LineContact> {
        let hit = match self.shape {
            Shape::Sphere { radius } => seg.intersection(&self.world_sphere(radius)),
            Shape::Capsule(ref line) => seg.intersection(&self.world_line(line)),
            Shape::Box(ref aabb) => seg.intersection(&self.world_box(aabb)),
            Shape::Plane(ref plane) => seg.intersection(&self.world_plane(plane)),
            Shape::Mesh(ref mesh) => return mesh.line_hits(&self.transform, &self.inverse, seg),
            Shape::Cylinder(_) | Shape::Cone(_) => None,
        };
        hit.map(|i| LineContact::new(i.p, i.n)).into_iter().collect()
    }
}
