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
//! Driven double pendulum registered as a model
//!
//! Two links hang from a world hinge. The model pushes the lower link
//! sideways for the first second, then lets the chain swing while it
//! reports the hinge angle.

use rigid_dynamics::joint::HingeJoint;
use rigid_dynamics::prelude::*;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

struct DoublePendulum {
    upper: BodyId,
    lower: BodyId,
    hinge: JointId,
    elbow: JointId,
    elapsed: f64,
}

impl Model for DoublePendulum {
    fn name(&self) -> &str {
        "double_pendulum"
    }

    fn bodies(&self) -> Vec<BodyId> {
        vec![self.upper, self.lower]
    }

    fn joints(&self) -> Vec<JointId> {
        vec![self.hinge, self.elbow]
    }

    fn update(&mut self, world: &mut World, dt: f64) {
        self.elapsed += dt;
        if self.elapsed < 1.0 {
            if let Some(lower) = world.body_mut(self.lower) {
                lower.add_force(DVec3::new(0.0, 0.0, 4.0));
            }
        }
    }

    fn post_update(&mut self, world: &mut World, _dt: f64) {
        let (Some(joint), Some(upper)) = (world.joint(self.hinge), world.body(self.upper)) else {
            return;
        };
        let (m0, m1) = joint.global_matrices(&upper.matrix(), None);
        tracing::trace!(angle = HingeJoint::angle(&m0, &m1), "hinge");
    }
}

fn main() -> Result<(), PhysicsError> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    println!("Rigid Dynamics - Pendulum Model");
    println!("===============================\n");

    let mut world = World::new(WorldConfig::default());
    let link = || ShapeInstance::new(Shape::capsule(0.1, 0.8));

    let upper = world.add_body(
        Body::new(link(), 1.0).with_matrix(Frame::from_position(DVec3::new(0.0, 4.5, 0.0))),
    );
    let lower = world.add_body(
        Body::new(link(), 1.0).with_matrix(Frame::from_position(DVec3::new(0.0, 3.5, 0.0))),
    );

    // hinge pins run along the joint frame X axis; point them along world X
    let pivot = Frame::from_position(DVec3::new(0.0, 5.0, 0.0));
    let elbow_pivot = Frame::from_position(DVec3::new(0.0, 4.0, 0.0));
    let hinge = world.add_joint_at(JointKind::Hinge(HingeJoint::new()), upper, None, pivot)?;
    let elbow = world.add_joint_at(
        JointKind::Hinge(HingeJoint::with_limits(-1.5, 1.5)),
        lower,
        Some(upper),
        elbow_pivot,
    )?;

    world.add_model(Box::new(DoublePendulum {
        upper,
        lower,
        hinge,
        elbow,
        elapsed: 0.0,
    }))?;
    println!("Registered {} model(s), {} joint(s)", world.model_count(), world.joint_count());

    for tick in 1..=12 {
        for _ in 0..15 {
            world.advance_time(1.0 / 60.0);
        }
        let (Some(joint), Some(upper_body)) = (world.joint(hinge), world.body(upper)) else {
            break;
        };
        let (m0, m1) = joint.global_matrices(&upper_body.matrix(), None);
        let angle = HingeJoint::angle(&m0, &m1).to_degrees();
        let tip = world.body(lower).map(|b| b.position()).unwrap_or_default();
        println!(
            "t = {:.2} s, hinge angle = {angle:7.2} deg, lower link at ({:.2}, {:.2}, {:.2})",
            tick as f64 * 0.25,
            tip.x,
            tip.y,
            tip.z
        );
    }

    // the model holds references; release them before tearing down
    world.remove_model("double_pendulum")?;
    world.remove_joint(elbow)?;
    world.remove_joint(hinge)?;
    world.remove_body(lower)?;
    world.remove_body(upper)?;
    println!("\nRemaining bodies: {}", world.body_count());
    Ok(())
}
