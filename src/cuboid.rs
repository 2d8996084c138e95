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

use crate::capsule::capsule_box;
use crate::contact::CollisionContact;
use crate::geom::*;
use crate::sphere::sphere_box;

/// Seen from the box. The contact point ends up on the rival's surface.
fn from_box_side(c: CollisionContact) -> CollisionContact {
    let point = c.point - c.normal * c.impact;
    c.mirrored(point)
}

pub fn box_sphere(b: &OBB, rival: &Sphere) -> Option<CollisionContact> {
    sphere_box(rival, b).map(from_box_side)
}

pub fn box_capsule(b: &OBB, rival: &Capsule) -> Option<CollisionContact> {
    capsule_box(rival, b).map(from_box_side)
}

/// Pushes the deepest corner back onto the plane. The box's center has to be
/// in front of the plane.
pub fn box_plane(b: &OBB, rival: &Plane) -> Option<CollisionContact> {
    if rival.distance(b.c) <= 0.0 {
        return None;
    }
    let (corner, d) = b
        .corners()
        .iter()
        .map(|&p| (p, rival.distance(p)))
        .fold(None, |best: Option<(_, f32)>, (p, d)| match best {
            Some((_, bd)) if bd <= d => best,
            _ => Some((p, d)),
        })?;
    if d < 0.0 {
        Some(CollisionContact::new(corner - rival.n * d, rival.n, -d))
    } else {
        None
    }
}
