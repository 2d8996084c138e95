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

use cgmath::Vector3;
use serde::{Deserialize, Serialize};

use crate::kdtree::{KdTreeConcept, DEF_KDTREE_LEVEL};
use crate::mesh::FaceMode;

/// Parameters of the linear integrator. Gravity is an acceleration per tick,
/// the default assumes 60 ticks per second.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: Vector3<f32>,
    pub mass: f32,
    /// Ratio of horizontal velocity lost per tick while on the ground.
    pub friction: f32,
    /// Minimum cosine between a contact normal and the up direction for the
    /// contact to count as ground.
    pub ground_cosine: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            gravity: Vector3::new(0.0, -9.81 / 60.0, 0.0),
            mass: 1.0,
            friction: 0.2,
            ground_cosine: 0.5,
        }
    }
}

/// Defaults the collision graph uses when creating nodes.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Maximum depth of the KD tree built for a mesh.
    pub kd_tree_level: u8,
    pub kd_tree_concept: KdTreeConcept,
    /// Face mode of newly created meshes.
    pub face_mode: FaceMode,
    /// Physics of newly created character controllers.
    pub physics: PhysicsConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            kd_tree_level: DEF_KDTREE_LEVEL,
            kd_tree_concept: KdTreeConcept::default(),
            face_mode: FaceMode::default(),
            physics: PhysicsConfig::default(),
        }
    }
}
