// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! # Rigid Dynamics
//!
//! A rigid-body dynamics engine for real-time simulation.
//!
//! ## Features
//!
//! - **Collision**: convex primitives, hulls, compounds and static meshes,
//!   with GJK/EPA manifolds and speculative contact points
//! - **Persistent Contacts**: per-pair manifolds that carry impulses from
//!   step to step for warm starting
//! - **Joints**: ball, hinge, fixed and a 6-DOF inverse-kinematics effector
//!   built from a common row descriptor
//! - **Islands and Sleep**: independent groups are solved separately and
//!   resting groups drop out of the step
//! - **Parallelization**: optional Rayon integration for multi-threaded
//!   stages, deterministic regardless of thread count
//! - **Models**: composite mechanisms updated once per step, with versioned
//!   API compatibility checks
//!
//! ## Example
//!
//! ```rust
//! use rigid_dynamics::prelude::*;
//!
//! let mut world = World::new(WorldConfig::default());
//! let ball = world.add_body(
//!     Body::new(ShapeInstance::new(Shape::sphere(0.5)), 1.0)
//!         .with_matrix(Frame::from_position(DVec3::new(0.0, 5.0, 0.0))),
//! );
//! world.advance_time(1.0 / 60.0);
//! assert!(world.body(ball).unwrap().velocity().y < 0.0);
//! ```

#![warn(missing_docs)]

/// Error types and contract checks
pub mod error;

/// Engine constants and configuration
pub mod config;

/// Rigid transforms and small linear algebra helpers
pub mod math;

/// Spin lock guarding per-body contact maps
pub mod sync;

/// Boxes and rays
pub mod geometry;

/// Collision shapes and shape instances
pub mod shape;

/// Rigid bodies
pub mod body;

/// Narrow phase and contacts
pub mod collision;

/// Broad phase
pub mod scene;

/// Joints and constraint rows
pub mod joint;

/// Islands and the constraint solver
pub mod solver;

/// Memory pooling for reducing allocation churn
pub mod pool;

/// Parallel execution of pipeline stages
pub mod parallel;

/// The simulation world
pub mod world;

/// Composite models
pub mod model;

pub use error::{PhysicsError, PhysicsResult};
pub use world::World;

/// Commonly used types
pub mod prelude {
    pub use crate::body::{Body, BodyId, BodyKind};
    pub use crate::collision::{Contact, ContactNotify, ContactPoint};
    pub use crate::config::{SleepConfig, SolverConfig, WorldConfig};
    pub use crate::error::{PhysicsError, PhysicsResult};
    pub use crate::geometry::{Aabb, RayHit};
    pub use crate::joint::{HingeJoint, Ik6DofEffector, Joint, JointId, JointKind, RotationType};
    pub use crate::math::{DMat3, DQuat, DVec3, Frame};
    pub use crate::model::Model;
    pub use crate::scene::{AllHits, ClosestHit, RayCastNotify};
    pub use crate::shape::{Shape, ShapeInstance, ShapeMaterial};
    pub use crate::world::{ForceProvider, Gravity, World, Wrench};
}
