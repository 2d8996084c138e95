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

//! Narrow phase tests for sphere nodes.
//!
//! Every test returns a contact whose normal points from the rival towards
//! the sphere and whose impact is the distance the sphere has to travel along
//! that normal to separate.

use cgmath::{InnerSpace, Point3, Transform, Vector3};

use crate::collision::Contains;
use crate::contact::CollisionContact;
use crate::geom::*;

/// Contact between a point on a node's core at p and the closest point q on
/// a rival's core, both rounded by a radius. Cores closer than epsilon have no
/// usable normal and report nothing.
pub(crate) fn rounded_contact(
    p: Point3<f32>,
    q: Point3<f32>,
    node_r: f32,
    rival_r: f32
) -> Option<CollisionContact> {
    let r = node_r + rival_r;
    let d2 = (p - q).magnitude2();
    if d2 >= r * r {
        return None;
    }
    let dist = d2.sqrt();
    if dist < COLLISION_EPSILON {
        return None;
    }
    let normal = (p - q) / dist;
    Some(CollisionContact::new(q + normal * rival_r, normal, r - dist))
}

pub fn sphere_sphere(s: &Sphere, rival: &Sphere) -> Option<CollisionContact> {
    rounded_contact(s.c, rival.c, s.r, rival.r)
}

pub fn sphere_capsule(s: &Sphere, rival: &Capsule) -> Option<CollisionContact> {
    let q: Point3<f32> = Segment::from(*rival).min_dist(&s.c);
    rounded_contact(s.c, q, s.r, rival.r)
}

/// The rival is a solid cylinder around the capsule's axis. A sphere whose
/// center is inside the cylinder is pushed out through the nearest of the
/// side and the two caps.
pub fn sphere_cylinder(s: &Sphere, rival: &Capsule) -> Option<CollisionContact> {
    let len = rival.d.magnitude();
    let axis = if len > COLLISION_EPSILON {
        rival.d / len
    } else {
        Vector3::new(0.0, 1.0, 0.0)
    };
    let rel = s.c - rival.a;
    let h = rel.dot(axis);
    let radial = rel - axis * h;
    let radial_len = radial.magnitude();
    if h >= 0.0 && h <= len && radial_len <= rival.r {
        let outward = if radial_len > COLLISION_EPSILON {
            radial / radial_len
        } else {
            perpendicular(axis)
        };
        let mut best = (outward, rival.r - radial_len);
        if h < best.1 {
            best = (-axis, h);
        }
        if len - h < best.1 {
            best = (axis, len - h);
        }
        let (normal, depth) = best;
        return Some(CollisionContact::new(s.c + normal * depth, normal, s.r + depth));
    }
    let radial = if radial_len > rival.r {
        radial * (rival.r / radial_len)
    } else {
        radial
    };
    let q = rival.a + axis * clamp(h, 0.0, len) + radial;
    rounded_contact(s.c, q, s.r, 0.0)
}

/// Any unit vector perpendicular to the unit vector v.
fn perpendicular(v: Vector3<f32>) -> Vector3<f32> {
    let other = if v.x.abs() < 0.9 {
        Vector3::new(1.0, 0.0, 0.0)
    } else {
        Vector3::new(0.0, 1.0, 0.0)
    };
    v.cross(other).normalize()
}

/// A sphere whose center is inside the box is pushed out through the nearest
/// face.
pub fn sphere_box(s: &Sphere, rival: &OBB) -> Option<CollisionContact> {
    if rival.contains(&s.c) {
        let local = rival.world_to_local().transform_point(s.c);
        let (n, depth) = nearest_face(&rival.local_aabb(), local);
        let normal = rival.u[0] * n.x + rival.u[1] * n.y + rival.u[2] * n.z;
        return Some(CollisionContact::new(s.c + normal * depth, normal, s.r + depth));
    }
    let q: Point3<f32> = rival.min_dist(&s.c);
    rounded_contact(s.c, q, s.r, 0.0)
}

/// Only spheres in front of the plane and closer than their radius collide.
pub fn sphere_plane(s: &Sphere, rival: &Plane) -> Option<CollisionContact> {
    let d = rival.distance(s.c);
    if d > 0.0 && d < s.r {
        Some(CollisionContact::new(s.c - rival.n * d, rival.n, s.r - d))
    } else {
        None
    }
}
