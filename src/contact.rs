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

use cgmath::{Point3, Vector3};

use crate::geom::Triangle;
use crate::material::MaterialHandle;
use crate::mesh::{CollisionFace, FaceId};
use crate::node::NodeHandle;

/// The result of a positive narrow phase test between a node and one of its
/// rivals.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CollisionContact {
    /// Contact point on the rival's surface.
    pub point: Point3<f32>,
    /// Unit normal pointing from the rival towards the node.
    pub normal: Vector3<f32>,
    /// Distance the node has to travel along the normal to separate.
    pub impact: f32,
    /// World space triangle of a mesh rival.
    pub triangle: Option<Triangle>,
    /// Identity of the mesh triangle that was hit.
    pub face: Option<FaceId>,
}

impl CollisionContact {
    pub fn new(point: Point3<f32>, normal: Vector3<f32>, impact: f32) -> Self {
        CollisionContact {
            point,
            normal,
            impact,
            triangle: None,
            face: None,
        }
    }

    /// Attach the mesh triangle, in world space, that produced the contact.
    pub fn with_face(self, face: &CollisionFace, world: Triangle) -> Self {
        CollisionContact {
            triangle: Some(world),
            face: Some(face.id),
            ..self
        }
    }

    /// The same contact seen from the rival's side. The normal is flipped and
    /// the point moves to the given location on the other surface.
    pub fn mirrored(self, point: Point3<f32>) -> Self {
        CollisionContact {
            point,
            normal: -self.normal,
            ..self
        }
    }
}

/// A hit of a segment against a single node's surface.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LineContact {
    pub point: Point3<f32>,
    /// Unit surface normal at the hit.
    pub normal: Vector3<f32>,
    pub triangle: Option<Triangle>,
    pub face: Option<FaceId>,
}

impl LineContact {
    pub fn new(point: Point3<f32>, normal: Vector3<f32>) -> Self {
        LineContact {
            point,
            normal,
            triangle: None,
            face: None,
        }
    }
}

/// A segment hit reported by the graph's intersection queries. These are never
/// used for resolution.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntersectionContact {
    pub point: Point3<f32>,
    pub normal: Vector3<f32>,
    /// Squared distance from the start of the queried segment.
    pub distance_sq: f32,
    /// The node that was hit.
    pub node: NodeHandle,
    pub triangle: Option<Triangle>,
    pub face: Option<FaceId>,
}

impl IntersectionContact {
    pub fn new(node: NodeHandle, origin: Point3<f32>, hit: LineContact) -> Self {
        use cgmath::InnerSpace;

        IntersectionContact {
            point: hit.point,
            normal: hit.normal,
            distance_sq: (hit.point - origin).magnitude2(),
            node,
            triangle: hit.triangle,
            face: hit.face,
        }
    }
}

/// Everything a contact callback gets to see about a detected contact.
#[derive(Copy, Clone, Debug)]
pub struct ContactEvent<'a> {
    /// Material of the node being resolved.
    pub material: MaterialHandle,
    pub node: NodeHandle,
    pub rival: NodeHandle,
    pub contact: &'a CollisionContact,
}

/// A contact found while resolving a node against its rivals.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ResolvedContact {
    pub node: NodeHandle,
    pub rival: NodeHandle,
    pub contact: CollisionContact,
    /// False when a callback vetoed the correction or the node lacks the
    /// resolve flag.
    pub resolved: bool,
}
