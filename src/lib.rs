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

//! A 3D collision graph for games: shapes attached to scene nodes, grouped
//! into materials that decide who collides with whom.
//!
//! # Overview
//!
//! A `CollisionGraph` owns every `CollisionNode` and `CollisionMaterial` of a
//! scene and hands out generational handles to them. Each node wraps a
//! `Shape` and follows an external `SceneNode` for its transform. Materials
//! list rival materials; a node is only ever tested against the nodes of its
//! material's rivals, and rivalry is directed.
//!
//! Calling `CollisionGraph::update_scene` once per frame resolves every node
//! that moved against its rivals. Fast nodes are moved in steps no longer
//! than a fraction of their size so they cannot tunnel through thin
//! geometry. Contacts carry a unit normal pointing from the rival towards the
//! node and the depth the node had to move to separate.
//!
//! Geometry traits mirror the kind of answer they give:
//!
//! - `Overlaps`: whether two objects overlap at all.
//! - `Contains`: whether one object completely contains another. For
//!   bounding volumes.
//! - `Intersects`: the first point at which a segment meets a surface.
//! - `MinDistance`: closest points and squared distances.
//!
//! Triangle meshes are indexed by a `KdTree` built once per mesh. Moving
//! bounding volumes can be kept in an `ObbTree`. A `CharacterController`
//! drives a capsule with simple linear physics and tracks whether it stands
//! on the ground.

#[macro_use]
pub extern crate cgmath;
extern crate smallvec;

mod bounds;
pub use bounds::*;

mod capsule;
pub use capsule::*;

mod collision;
pub use collision::*;

mod config;
pub use config::*;

mod contact;
pub use contact::*;

mod controller;
pub use controller::*;

mod cuboid;
pub use cuboid::*;

mod error;
pub use error::*;

mod geom;
pub use geom::*;

mod graph;
pub use graph::*;

mod kdtree;
pub use kdtree::*;

mod material;
pub use material::*;

mod mesh;
pub use mesh::*;

mod node;
pub use node::*;

mod obbtree;
pub use obbtree::*;

mod physics;
pub use physics::*;

mod pool;
pub use pool::*;

mod shape;
pub use shape::*;

mod sphere;
pub use sphere::*;
