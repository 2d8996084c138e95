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

use cgmath::{InnerSpace, Matrix3, Rad, Vector2, Vector3};
use log::error;

use crate::config::PhysicsConfig;
use crate::contact::{ContactEvent, ResolvedContact};
use crate::error::CollisionError;
use crate::geom::{matrix_scale, COLLISION_EPSILON};
use crate::graph::CollisionGraph;
use crate::material::MaterialHandle;
use crate::node::{CollisionNode, NodeHandle, SceneNodeRef};
use crate::physics::{LinearBody, PhysicsObject};

/// A capsule moved by linear physics that knows whether it stands on
/// something.
///
/// The graph's scene update skips the controller's capsule; call `update`
/// once per tick instead.
#[derive(Clone, Debug)]
pub struct CharacterController {
    node: NodeHandle,
    body: LinearBody,
    ground_cosine: f32,
    grounded: bool,
    view_yaw: f32,
    // TODO: stair stepping via a step detector capsule ahead of the body.
}

impl CollisionGraph {
    /// Creates the capsule of a character controller. The capsule's axis
    /// runs up from the scene node's origin by `height`.
    pub fn create_character_controller(
        &mut self,
        material: Option<MaterialHandle>,
        scene: SceneNodeRef,
        radius: f32,
        height: f32
    ) -> Option<CharacterController> {
        let node = self.create_capsule(material, scene, radius, height)?;
        match self.node_mut(node) {
            Some(n) => n.set_controlled(true),
            None => {
                error!("character controller capsule {:?} vanished", node);
                return None;
            },
        }
        let physics = self.config().physics;
        Some(CharacterController::new(node, &physics))
    }

    pub fn delete_character_controller(
        &mut self,
        controller: CharacterController
    ) -> Result<(), CollisionError> {
        self.delete_node(controller.node)
    }
}

impl CharacterController {
    fn new(node: NodeHandle, config: &PhysicsConfig) -> Self {
        CharacterController {
            node,
            body: LinearBody::new(config),
            ground_cosine: config.ground_cosine,
            grounded: false,
            view_yaw: 0.0,
        }
    }

    pub fn node(&self) -> NodeHandle {
        self.node
    }

    pub fn body(&self) -> &LinearBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut LinearBody {
        &mut self.body
    }

    /// True if the last update found a contact facing up.
    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    /// Yaw of the view in radians, applied to `move_by` directions.
    pub fn view_yaw(&self) -> f32 {
        self.view_yaw
    }

    pub fn set_view_yaw(&mut self, yaw: f32) {
        self.view_yaw = yaw;
    }

    /// Advances the controller by one tick: integrates, applies friction if it
    /// stood on ground last tick and resolves the capsule against its rivals.
    pub fn update(
        &mut self,
        graph: &mut CollisionGraph,
        dt: f32
    ) -> Result<Vec<ResolvedContact>, CollisionError> {
        let was_grounded = self.grounded;
        {
            let node = graph.node_mut(self.node).ok_or(CollisionError::StaleHandle)?;
            self.body.integrate(node, dt);
        }
        if was_grounded {
            self.body.apply_friction();
        }
        self.grounded = false;

        let up = self.body.up();
        let ground_cosine = self.ground_cosine;
        let body = &mut self.body;
        let grounded = &mut self.grounded;
        graph.update_node_with(self.node, &mut |event: &ContactEvent| {
            if event.contact.normal.dot(up) > ground_cosine {
                *grounded = true;
                body.stop_falling();
            }
            true
        })
    }

    /// Pushes the controller horizontally. `direction.x` is sideways and
    /// `direction.y` forward, both relative to the view yaw and the body's
    /// orientation.
    pub fn move_by(&mut self, graph: &CollisionGraph, direction: Vector2<f32>) -> Result<(), CollisionError> {
        let node = graph.node(self.node).ok_or(CollisionError::StaleHandle)?;
        let local = Matrix3::from_angle_y(Rad(self.view_yaw)) * Vector3::new(direction.x, 0.0, direction.y);
        self.body.apply_force(body_rotation(node) * local);
        Ok(())
    }

    /// Pushes the controller along its local up axis.
    pub fn jump(&mut self, graph: &CollisionGraph, force: f32) -> Result<(), CollisionError> {
        let node = graph.node(self.node).ok_or(CollisionError::StaleHandle)?;
        self.body.apply_force(body_rotation(node) * Vector3::new(0.0, force, 0.0));
        Ok(())
    }
}

/// Rotation part of the node's transform with the scale divided out.
fn body_rotation(node: &CollisionNode) -> Matrix3<f32> {
    let m = node.transform();
    let s = matrix_scale(m);
    let column = |v: Vector3<f32>, len: f32| if len > COLLISION_EPSILON { v / len } else { v };
    Matrix3::from_cols(
        column(m.x.truncate(), s.x),
        column(m.y.truncate(), s.y),
        column(m.z.truncate(), s.z),
    )
}
