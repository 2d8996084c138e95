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

use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3};

use crate::collision::Overlaps;
use crate::contact::CollisionContact;
use crate::geom::*;
use crate::sphere::rounded_contact;

pub fn capsule_sphere(c: &Capsule, rival: &Sphere) -> Option<CollisionContact> {
    let p: Point3<f32> = Segment::from(*c).min_dist(&rival.c);
    rounded_contact(p, rival.c, c.r, rival.r)
}

pub fn capsule_capsule(c: &Capsule, rival: &Capsule) -> Option<CollisionContact> {
    let (p, q) = Segment::from(*c).min_dist(&Segment::from(*rival));
    rounded_contact(p, q, c.r, rival.r)
}

/// Works in the box's frame, where the box is axis aligned. An axis passing
/// through the box is pushed out along the face normal that clears the whole
/// axis by the radius with the shortest move.
pub fn capsule_box(c: &Capsule, rival: &OBB) -> Option<CollisionContact> {
    let seg = Segment::from(*c).transform(&rival.world_to_local());
    let aabb = rival.local_aabb();
    let to_world = |v: Vector3<f32>| rival.u[0] * v.x + rival.u[1] * v.y + rival.u[2] * v.z;

    if !seg.overlaps(&aabb) {
        let (on_box, on_seg) = aabb.min_dist(&seg);
        let d2 = (on_seg - on_box).magnitude2();
        if d2 >= c.r * c.r {
            return None;
        }
        let dist = d2.sqrt();
        if dist > COLLISION_EPSILON {
            let normal = to_world((on_seg - on_box) / dist);
            let point = rival.c + to_world(on_box.to_vec());
            return Some(CollisionContact::new(point, normal, c.r - dist));
        }
    }

    let mut best: Option<(usize, f32, f32)> = None;
    for axis in 0..3 {
        for &sign in &[1.0f32, -1.0] {
            let low = (seg.a[axis] * sign).min(seg.b[axis] * sign);
            let push = aabb.r[axis] + c.r - low;
            if best.map_or(true, |(_, _, b)| push < b) {
                best = Some((axis, sign, push));
            }
        }
    }
    let (axis, sign, push) = best?;
    let deepest = if seg.a[axis] * sign <= seg.b[axis] * sign { seg.a } else { seg.b };
    let mut on_face = Point3::new(
        clamp(deepest.x, -aabb.r.x, aabb.r.x),
        clamp(deepest.y, -aabb.r.y, aabb.r.y),
        clamp(deepest.z, -aabb.r.z, aabb.r.z),
    );
    on_face[axis] = aabb.r[axis] * sign;
    let mut n = Vector3::new(0.0, 0.0, 0.0);
    n[axis] = sign;
    Some(CollisionContact::new(rival.c + to_world(on_face.to_vec()), to_world(n), push))
}

/// Resolved against the end of the axis closest to the plane. Like spheres,
/// capsules whose closest end is behind the plane are left alone.
pub fn capsule_plane(c: &Capsule, rival: &Plane) -> Option<CollisionContact> {
    let a = c.a;
    let b = c.a + c.d;
    let (da, db) = (rival.distance(a), rival.distance(b));
    let (p, d) = if da <= db { (a, da) } else { (b, db) };
    if d > 0.0 && d < c.r {
        Some(CollisionContact::new(p - rival.n * d, rival.n, c.r - d))
    } else {
        None
    }
}
