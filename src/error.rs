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

/// Errors raised while building collision objects or addressing them through
/// stale handles.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CollisionError {
    /// Spheres, capsules, cylinders and cones need a radius above epsilon.
    #[error("invalid radius {0}: must be greater than zero")]
    InvalidRadius(f32),

    /// Line based shapes cannot have a negative height.
    #[error("invalid height {0}: must not be negative")]
    InvalidHeight(f32),

    /// The scene node the collision node should follow no longer exists.
    #[error("the owning scene node has been dropped")]
    DetachedSceneNode,

    /// A mesh shape needs at least one triangle to build its tree from.
    #[error("mesh has no triangles")]
    EmptyMesh,

    /// The handle refers to a node or material that has been deleted.
    #[error("stale handle: the object has been deleted")]
    StaleHandle,
}

#[cfg(test)]
mod tests {
    mod error {
        use crate::error::CollisionError;

        #[test]
        fn test_messages() {
            assert_eq!(
                CollisionError::InvalidRadius(0.0).to_string(),
                "invalid radius 0: must be greater than zero"
            );
            assert_eq!(CollisionError::EmptyMesh.to_string(), "mesh has no triangles");
        }
    }
}
