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

use cgmath::{InnerSpace, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::CollisionError;
use crate::geom::*;
use crate::mesh::MeshShape;

bitflags::bitflags! {
    /// Set of rival shape kinds a node knows how to collide with.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ShapeSupport: u8 {
        const SPHERE   = 0x01;
        const CAPSULE  = 0x02;
        const CYLINDER = 0x04;
        const CONE     = 0x08;
        const BOX      = 0x10;
        const PLANE    = 0x20;
        const MESH     = 0x40;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Sphere,
    Capsule,
    Cylinder,
    Cone,
    Box,
    Plane,
    Mesh,
}

impl ShapeKind {
    /// The flag a node has to support to collide with this kind of rival.
    pub fn support_flag(self) -> ShapeSupport {
        match self {
            ShapeKind::Sphere => ShapeSupport::SPHERE,
            ShapeKind::Capsule => ShapeSupport::CAPSULE,
            ShapeKind::Cylinder => ShapeSupport::CYLINDER,
            ShapeKind::Cone => ShapeSupport::CONE,
            ShapeKind::Box => ShapeSupport::BOX,
            ShapeKind::Plane => ShapeSupport::PLANE,
            ShapeKind::Mesh => ShapeSupport::MESH,
        }
    }
}

/// A radius swept along the local Y axis from the node's origin up to
/// `height`. Capsules, cylinders and cones are all described this way.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineShape {
    pub radius: f32,
    pub height: f32,
}

/// Collision geometry of a node, in the node's local space.
#[derive(Clone, Debug)]
pub enum Shape {
    Sphere { radius: f32 },
    Capsule(LineShape),
    Cylinder(LineShape),
    Cone(LineShape),
    /// A local box, usually centered on the origin.
    Box(AABB),
    Plane(Plane),
    Mesh(MeshShape),
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match *self {
            Shape::Sphere { .. } => ShapeKind::Sphere,
            Shape::Capsule(_) => ShapeKind::Capsule,
            Shape::Cylinder(_) => ShapeKind::Cylinder,
            Shape::Cone(_) => ShapeKind::Cone,
            Shape::Box(_) => ShapeKind::Box,
            Shape::Plane(_) => ShapeKind::Plane,
            Shape::Mesh(_) => ShapeKind::Mesh,
        }
    }

    /// Rival kinds this shape has a narrow phase test against. Must agree with
    /// `CollisionNode::check_collision`.
    pub fn support(&self) -> ShapeSupport {
        match *self {
            Shape::Sphere { .. } => {
                ShapeSupport::SPHERE | ShapeSupport::CAPSULE | ShapeSupport::CYLINDER
                    | ShapeSupport::BOX | ShapeSupport::PLANE | ShapeSupport::MESH
            },
            Shape::Capsule(_) => {
                ShapeSupport::SPHERE | ShapeSupport::CAPSULE | ShapeSupport::BOX
                    | ShapeSupport::PLANE | ShapeSupport::MESH
            },
            Shape::Box(_) => ShapeSupport::SPHERE | ShapeSupport::CAPSULE | ShapeSupport::PLANE,
            Shape::Cylinder(_)
            | Shape::Cone(_)
            | Shape::Plane(_)
            | Shape::Mesh(_) => ShapeSupport::empty(),
        }
    }

    /// Checks the construction parameters.
    pub fn validate(&self) -> Result<(), CollisionError> {
        match *self {
            Shape::Sphere { radius } => check_radius(radius),
            Shape::Capsule(line) | Shape::Cylinder(line) | Shape::Cone(line) => {
                check_radius(line.radius)?;
                if line.height < 0.0 || !line.height.is_finite() {
                    Err(CollisionError::InvalidHeight(line.height))
                } else {
                    Ok(())
                }
            },
            Shape::Box(_) | Shape::Plane(_) | Shape::Mesh(_) => Ok(()),
        }
    }

    pub fn radius(&self) -> Option<f32> {
        match *self {
            Shape::Sphere { radius } => Some(radius),
            Shape::Capsule(line) | Shape::Cylinder(line) | Shape::Cone(line) => Some(line.radius),
            Shape::Box(_) | Shape::Plane(_) | Shape::Mesh(_) => None,
        }
    }

    /// Largest distance the shape may travel in one resolution step without
    /// risking passing through thin geometry. Zero means the shape is never
    /// sub-stepped.
    pub fn max_movement(&self, transform: &Matrix4<f32>) -> f32 {
        match *self {
            Shape::Sphere { radius } => radius * 0.8,
            Shape::Capsule(line) | Shape::Cylinder(line) | Shape::Cone(line) => line.radius * 0.8,
            Shape::Box(aabb) => {
                let s = matrix_scale(transform);
                Vector3::new(aabb.r.x * s.x, aabb.r.y * s.y, aabb.r.z * s.z).magnitude()
            },
            Shape::Plane(_) | Shape::Mesh(_) => 0.0,
        }
    }
}

fn check_radius(radius: f32) -> Result<(), CollisionError> {
    if radius > COLLISION_EPSILON && radius.is_finite() {
        Ok(())
    } else {
        Err(CollisionError::InvalidRadius(radius))
    }
}

#[cfg(test)]
mod tests {
    mod shape {
        use cgmath::{Matrix4, Point3, SquareMatrix, Vector3};
        use crate::error::CollisionError;
        use crate::geom::*;
        use crate::shape::*;

        #[test]
        fn test_validate() {
            assert!(Shape::Sphere { radius: 0.5 }.validate().is_ok());
            assert_eq!(
                Shape::Sphere { radius: 0.0 }.validate(),
                Err(CollisionError::InvalidRadius(0.0))
            );
            assert_eq!(
                Shape::Capsule(LineShape { radius: 0.5, height: -1.0 }).validate(),
                Err(CollisionError::InvalidHeight(-1.0))
            );
            assert!(Shape::Cone(LineShape { radius: -0.1, height: 1.0 }).validate().is_err());
        }

        #[test]
        fn test_support() {
            let sphere = Shape::Sphere { radius: 1.0 };
            assert!(sphere.support().contains(ShapeKind::Cylinder.support_flag()));
            assert!(!sphere.support().contains(ShapeKind::Cone.support_flag()));
            let capsule = Shape::Capsule(LineShape { radius: 1.0, height: 1.0 });
            assert!(!capsule.support().contains(ShapeSupport::CYLINDER));
            assert!(Shape::Cylinder(LineShape { radius: 1.0, height: 1.0 }).support().is_empty());
            assert!(Shape::Plane(Plane { n: Vector3::new(0.0, 1.0, 0.0), d: 0.0 }).support().is_empty());
        }

        #[test]
        fn test_max_movement() {
            let id = Matrix4::identity();
            assert_relative_eq!(Shape::Sphere { radius: 0.5 }.max_movement(&id), 0.4, epsilon = COLLISION_EPSILON);
            let b = Shape::Box(AABB { c: Point3::new(0.0, 0.0, 0.0), r: Vector3::new(1.0, 2.0, 2.0) });
            assert_relative_eq!(b.max_movement(&id), 3.0, epsilon = COLLISION_EPSILON);
            assert_relative_eq!(b.max_movement(&Matrix4::from_scale(2.0)), 6.0, epsilon = 1e-5);
            let p = Shape::Plane(Plane { n: Vector3::new(0.0, 1.0, 0.0), d: 0.0 });
            assert_eq!(p.max_movement(&id), 0.0);
        }
    }
}
