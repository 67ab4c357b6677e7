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
//! Rigid bodies
//!
//! A [`Body`] owns its transform, velocities, mass distribution, one
//! [`ShapeInstance`], a [`ContactMap`] and the list of joints that reference
//! it. Bodies are handed to a [`World`](crate::world::World), which returns a
//! generational [`BodyId`] to refer to them afterwards.
//!
//! Mass is stored as principal inertia in body space together with its
//! reciprocal. Immovable bodies (static, kinematic, or too light to
//! simulate) carry [`INFINITE_MASS`] and exactly zero inverses, so the
//! solver never moves them.

mod contact_map;

pub use contact_map::ContactMap;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::collision::{ContactId, ContactKey};
use crate::config::{
    SleepConfig, AABB_PADDING, INFINITE_MASS, MAX_ANGLE_STEP, MAX_INERTIA_RATIO, MAX_LINEAR_STEP,
    MIN_ANGLE_STEP, MIN_INERTIA_RATIO, MIN_MASS,
};
use crate::contract;
use crate::geometry::{Aabb, FastRay, RayHit};
use crate::joint::JointId;
use crate::math::{diagonal, solve_gaussian, DMat3, DQuat, DVec3, Frame};
use crate::shape::ShapeInstance;

/// Squared speed below which a body counts as resting for cache purposes
const REST_SPEED2: f64 = 1.0e-10;

/// Generational handle of a body in a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId {
    index: u32,
    generation: u32,
}

impl BodyId {
    /// Create a handle from a slot index and generation
    pub fn new(index: u32, generation: u32) -> Self {
        BodyId { index, generation }
    }

    /// Slot index
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Generation of the slot when the handle was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Body({}, gen: {})", self.index, self.generation)
    }
}

/// How a body takes part in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    /// Never moves and is always at rest
    Static,
    /// Moved by the application through its velocity, immune to forces
    Kinematic,
    /// Fully simulated
    Dynamic,
}

/// A rigid body
#[derive(Debug)]
pub struct Body {
    pub(crate) id: Option<BodyId>,
    pub(crate) tag: u32,
    kind: BodyKind,
    matrix: Frame,
    local_com: DVec3,
    global_com: DVec3,
    pub(crate) veloc: DVec3,
    pub(crate) omega: DVec3,
    accel: DVec3,
    alpha: DVec3,
    force: DVec3,
    torque: DVec3,
    pub(crate) external_force: DVec3,
    pub(crate) external_torque: DVec3,
    mass: f64,
    inv_mass: f64,
    inertia: DVec3,
    inv_inertia: DVec3,
    shape: ShapeInstance,
    contacts: ContactMap,
    joints: Vec<JointId>,
    equilibrium: AtomicBool,
    equilibrium_override: bool,
    auto_sleep: bool,
    sleep_counter: u32,
    joint_fence: bool,
    max_angle_step: f64,
    max_linear_step: f64,
    aabb: Aabb,
    pub(crate) scene_node: Option<usize>,
}

impl Body {
    /// Create a dynamic body whose inertia follows its shape
    ///
    /// A mass below [`MIN_MASS`], or a shape without volume, produces an
    /// immovable body.
    ///
    /// # Examples
    ///
    /// ```
    /// use rigid_dynamics::body::Body;
    /// use rigid_dynamics::shape::{Shape, ShapeInstance};
    ///
    /// let ball = Body::new(ShapeInstance::new(Shape::sphere(1.0)), 2.0);
    /// assert_eq!(ball.inv_mass(), 0.5);
    /// ```
    pub fn new(shape: ShapeInstance, mass: f64) -> Self {
        let mut body = Body::with_kind(BodyKind::Dynamic, shape);
        body.set_mass_from_shape(mass);
        body
    }

    /// Create a static body
    pub fn new_static(shape: ShapeInstance) -> Self {
        Body::with_kind(BodyKind::Static, shape)
    }

    /// Create a kinematic body
    pub fn new_kinematic(shape: ShapeInstance) -> Self {
        Body::with_kind(BodyKind::Kinematic, shape)
    }

    fn with_kind(kind: BodyKind, shape: ShapeInstance) -> Self {
        let mut body = Body {
            id: None,
            tag: 0,
            kind,
            matrix: Frame::IDENTITY,
            local_com: DVec3::ZERO,
            global_com: DVec3::ZERO,
            veloc: DVec3::ZERO,
            omega: DVec3::ZERO,
            accel: DVec3::ZERO,
            alpha: DVec3::ZERO,
            force: DVec3::ZERO,
            torque: DVec3::ZERO,
            external_force: DVec3::ZERO,
            external_torque: DVec3::ZERO,
            mass: INFINITE_MASS,
            inv_mass: 0.0,
            inertia: DVec3::splat(INFINITE_MASS),
            inv_inertia: DVec3::ZERO,
            shape,
            contacts: ContactMap::new(),
            joints: Vec::new(),
            equilibrium: AtomicBool::new(kind == BodyKind::Static),
            equilibrium_override: false,
            auto_sleep: true,
            sleep_counter: 0,
            joint_fence: false,
            max_angle_step: MAX_ANGLE_STEP,
            max_linear_step: MAX_LINEAR_STEP,
            aabb: Aabb::empty(),
            scene_node: None,
        };
        body.update_collision_matrix();
        body
    }

    /// Builder form of [`set_matrix`](Self::set_matrix)
    pub fn with_matrix(mut self, matrix: Frame) -> Self {
        self.set_matrix(matrix);
        self
    }

    /// Builder form of [`set_velocity`](Self::set_velocity)
    pub fn with_velocity(mut self, veloc: DVec3) -> Self {
        self.set_velocity(veloc);
        self
    }

    /// Handle assigned by the world, `None` before insertion
    pub fn id(&self) -> Option<BodyId> {
        self.id
    }

    /// Unique tag used to build contact keys
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Body kind
    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    /// Check whether the solver can move this body
    pub fn is_dynamic(&self) -> bool {
        self.kind == BodyKind::Dynamic && self.inv_mass > 0.0
    }

    /// Origin frame of the body
    pub fn matrix(&self) -> Frame {
        self.matrix
    }

    /// Place the body, keeping the velocities
    pub fn set_matrix(&mut self, matrix: Frame) {
        self.matrix = Frame::new(matrix.rotation.normalize(), matrix.position);
        self.global_com = self.matrix.transform_point(self.local_com);
        self.update_collision_matrix();
    }

    /// Origin position
    pub fn position(&self) -> DVec3 {
        self.matrix.position
    }

    /// Orientation
    pub fn rotation(&self) -> DQuat {
        self.matrix.rotation
    }

    /// Center of mass in body space
    pub fn local_com(&self) -> DVec3 {
        self.local_com
    }

    /// Center of mass in world space
    pub fn com(&self) -> DVec3 {
        self.global_com
    }

    /// Move the center of mass within the body
    pub fn set_local_com(&mut self, com: DVec3) {
        self.local_com = com;
        self.global_com = self.matrix.transform_point(com);
    }

    /// Linear velocity of the center of mass
    pub fn velocity(&self) -> DVec3 {
        self.veloc
    }

    /// Set the linear velocity, waking the body
    pub fn set_velocity(&mut self, veloc: DVec3) {
        self.veloc = veloc;
        self.wake();
    }

    /// Angular velocity in world space
    pub fn omega(&self) -> DVec3 {
        self.omega
    }

    /// Set the angular velocity, waking the body
    pub fn set_omega(&mut self, omega: DVec3) {
        self.omega = omega;
        self.wake();
    }

    /// Velocity of a world point attached to the body
    pub fn velocity_at_point(&self, point: DVec3) -> DVec3 {
        self.veloc + self.omega.cross(point - self.global_com)
    }

    /// Linear acceleration from the last external force integration
    pub fn accel(&self) -> DVec3 {
        self.accel
    }

    /// Angular acceleration from the last external force integration
    pub fn alpha(&self) -> DVec3 {
        self.alpha
    }

    /// Mass, [`INFINITE_MASS`] for immovable bodies
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Reciprocal mass, zero for immovable bodies
    pub fn inv_mass(&self) -> f64 {
        self.inv_mass
    }

    /// Principal inertia in body space
    pub fn inertia(&self) -> DVec3 {
        self.inertia
    }

    /// Reciprocal principal inertia
    pub fn inv_inertia(&self) -> DVec3 {
        self.inv_inertia
    }

    /// Inertia tensor in world space
    pub fn world_inertia(&self) -> DMat3 {
        let r = self.matrix.matrix();
        r * DMat3::from_diagonal(self.inertia) * r.transpose()
    }

    /// Inverse inertia tensor in world space
    pub fn world_inv_inertia(&self) -> DMat3 {
        let r = self.matrix.matrix();
        r * DMat3::from_diagonal(self.inv_inertia) * r.transpose()
    }

    /// Set mass and inertia
    ///
    /// The diagonal of `inertia` is used as the principal inertia, each
    /// component clamped to `[1e-4, 1e4] * mass`. Bodies that cannot move
    /// get [`INFINITE_MASS`] with zero inverses. Calling this twice with the
    /// same input gives the same result.
    pub fn set_mass_matrix(&mut self, mass: f64, inertia: DMat3) {
        let mass = mass.abs();
        let shape = self.shape.shape();
        let immovable = self.kind != BodyKind::Dynamic
            || mass < MIN_MASS
            || shape.is_null()
            || shape.is_static_mesh();

        if immovable {
            self.mass = INFINITE_MASS;
            self.inv_mass = 0.0;
            self.inertia = DVec3::splat(INFINITE_MASS);
            self.inv_inertia = DVec3::ZERO;
            self.set_sleep_state(true);
            return;
        }

        let lo = MIN_INERTIA_RATIO * mass;
        let hi = MAX_INERTIA_RATIO * mass;
        let i = diagonal(&inertia).abs();
        let clamped = DVec3::new(i.x.clamp(lo, hi), i.y.clamp(lo, hi), i.z.clamp(lo, hi));
        self.mass = mass;
        self.inv_mass = 1.0 / mass;
        self.inertia = clamped;
        self.inv_inertia = clamped.recip();
        self.equilibrium.store(false, Ordering::Relaxed);
    }

    /// Derive inertia and center of mass from the shape for a given mass
    pub fn set_mass_from_shape(&mut self, mass: f64) {
        let props = self.shape.calculate_inertia();
        if props.is_zero() {
            self.set_mass_matrix(0.0, DMat3::ZERO);
            return;
        }
        self.set_local_com(props.center);
        self.set_mass_matrix(mass, props.inertia() * mass);
    }

    /// Collision shape
    pub fn shape(&self) -> &ShapeInstance {
        &self.shape
    }

    /// Mutable collision shape; call [`set_matrix`](Self::set_matrix) or
    /// [`update_collision_matrix`](Self::update_collision_matrix) after
    /// changing the placement
    pub fn shape_mut(&mut self) -> &mut ShapeInstance {
        &mut self.shape
    }

    /// Refresh the shape's world matrix and the padded box
    pub fn update_collision_matrix(&mut self) {
        let global = self.matrix * self.shape.local_matrix();
        self.shape.set_global_matrix(global);
        self.aabb = self.shape.world_aabb().padded(AABB_PADDING);
    }

    /// Padded world box
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    /// Padded world box swept by the displacement over `dt`
    pub fn swept_aabb(&self, dt: f64) -> Aabb {
        self.aabb.swept(self.veloc * dt)
    }

    /// Add a force through the center of mass for the next step
    ///
    /// Application loads wake the body; loads from force providers do not.
    pub fn add_force(&mut self, force: DVec3) {
        self.force += force;
        self.wake();
    }

    /// Add a torque for the next step
    pub fn add_torque(&mut self, torque: DVec3) {
        self.torque += torque;
        self.wake();
    }

    /// Add a force applied at a world point for the next step
    pub fn add_force_at_point(&mut self, force: DVec3, point: DVec3) {
        self.force += force;
        self.torque += (point - self.global_com).cross(force);
        self.wake();
    }

    /// Force accumulated by the application
    pub fn force(&self) -> DVec3 {
        self.force
    }

    /// Torque accumulated by the application
    pub fn torque(&self) -> DVec3 {
        self.torque
    }

    pub(crate) fn clear_forces(&mut self) {
        self.force = DVec3::ZERO;
        self.torque = DVec3::ZERO;
    }

    /// Take the velocities produced by the constraint solver
    ///
    /// The change is folded into `accel`/`alpha` so they report the total
    /// acceleration of the step.
    pub(crate) fn apply_solver_velocity(&mut self, veloc: DVec3, omega: DVec3, dt: f64) {
        if dt > 0.0 {
            self.accel += (veloc - self.veloc) / dt;
            self.alpha += (omega - self.omega) / dt;
        }
        self.veloc = veloc;
        self.omega = omega;
    }

    /// Apply an impulse at a world point immediately
    pub fn add_impulse(&mut self, impulse: DVec3, point: DVec3) {
        if self.inv_mass == 0.0 {
            return;
        }
        self.veloc += impulse * self.inv_mass;
        self.omega += self.world_inv_inertia() * (point - self.global_com).cross(impulse);
        self.set_sleep_state(false);
    }

    /// Linear momentum
    pub fn linear_momentum(&self) -> DVec3 {
        if self.inv_mass == 0.0 {
            return DVec3::ZERO;
        }
        self.veloc * self.mass
    }

    /// Angular momentum about the center of mass
    pub fn angular_momentum(&self) -> DVec3 {
        if self.inv_mass == 0.0 {
            return DVec3::ZERO;
        }
        self.world_inertia() * self.omega
    }

    /// Translational plus rotational kinetic energy
    pub fn kinetic_energy(&self) -> f64 {
        if self.inv_mass == 0.0 {
            return 0.0;
        }
        0.5 * self.mass * self.veloc.length_squared() + 0.5 * self.omega.dot(self.angular_momentum())
    }

    /// Integrate external forces into the velocities
    ///
    /// The linear part is explicit Euler. The angular part solves the
    /// Euler equations `I w' + w x (I w) = t` in body space, linearized at
    /// the half step, so torque-free precession stays stable.
    pub fn integrate_external_force(&mut self, dt: f64) {
        if !self.is_dynamic() || self.equilibrium() {
            self.accel = DVec3::ZERO;
            self.alpha = DVec3::ZERO;
            return;
        }

        let accel = self.external_force * self.inv_mass;
        let torque = self.external_torque;

        let local_omega = self.matrix.unrotate_vector(self.omega);
        let angular_momentum = self.matrix.rotate_vector(self.inertia * local_omega);
        let gyro = self.omega.cross(angular_momentum);
        let local_torque = self.matrix.unrotate_vector(torque - gyro);

        let i = self.inertia;
        let dw = local_omega * (0.5 * dt);
        let jacobian = DMat3::from_cols(
            DVec3::new(i.x, (i.z - i.y) * dw.z, (i.z - i.y) * dw.y),
            DVec3::new((i.x - i.z) * dw.z, i.y, (i.x - i.z) * dw.x),
            DVec3::new((i.y - i.x) * dw.y, (i.y - i.x) * dw.x, i.z),
        )
        .transpose();

        let gradient_step = solve_gaussian(jacobian, local_torque * dt);
        let local_omega = local_omega + gradient_step;
        let alpha = self.matrix.rotate_vector(local_torque * self.inv_inertia);

        self.accel = accel;
        self.alpha = alpha;
        self.veloc += accel * dt;
        self.omega = self.matrix.rotate_vector(local_omega);
    }

    /// Advance position and orientation by the current velocities
    ///
    /// The orientation is only rotated when the angular speed is above a
    /// small threshold and is renormalized afterwards. Steps that rotate or
    /// translate more than the configured limits are reported, not clamped.
    pub fn integrate_velocity(&mut self, dt: f64) {
        if self.kind == BodyKind::Static {
            return;
        }
        self.global_com += self.veloc * dt;

        let omega2 = self.omega.length_squared();
        if omega2 > MIN_ANGLE_STEP * MIN_ANGLE_STEP {
            let omega_mag = omega2.sqrt();
            let axis = self.omega / omega_mag;
            let step = DQuat::from_axis_angle(axis, omega_mag * dt);
            self.matrix.rotation = (step * self.matrix.rotation).normalize();
        }
        self.matrix.position = self.global_com - self.matrix.rotate_vector(self.local_com);

        let angle_step = self.omega.length() * dt;
        if angle_step > self.max_angle_step {
            warn!(body = ?self.id, angle_step, "Angular step exceeds the stability limit");
        }
        let linear_step = self.veloc.length() * dt;
        if linear_step > self.max_linear_step {
            warn!(body = ?self.id, linear_step, "Linear step exceeds the stability limit");
        }
        self.update_collision_matrix();
    }

    /// Limits above which integration steps are reported
    pub fn set_step_limits(&mut self, max_angle_step: f64, max_linear_step: f64) {
        self.max_angle_step = max_angle_step;
        self.max_linear_step = max_linear_step;
    }

    /// Check whether the body is at rest and excluded from integration
    pub fn equilibrium(&self) -> bool {
        self.equilibrium.load(Ordering::Relaxed)
    }

    pub(crate) fn set_equilibrium(&self, state: bool) {
        self.equilibrium.store(state, Ordering::Relaxed);
    }

    /// Clear equilibrium after an external state change
    ///
    /// Static bodies never wake.
    fn wake(&mut self) {
        if self.kind != BodyKind::Static {
            self.equilibrium.store(false, Ordering::Relaxed);
            self.sleep_counter = 0;
            self.joint_fence = false;
        }
    }

    /// Put the body to sleep or wake it up
    ///
    /// Returns `true` when the body is a dynamic body nearly at rest; the
    /// caller must then invalidate its contacts so the next narrow phase
    /// rebuilds them.
    pub fn set_sleep_state(&mut self, sleep: bool) -> bool {
        self.equilibrium.store(sleep, Ordering::Relaxed);
        if !sleep {
            self.sleep_counter = 0;
            self.joint_fence = false;
        }
        self.inv_mass > 0.0
            && self.veloc.length_squared() < REST_SPEED2
            && self.omega.length_squared() < REST_SPEED2
    }

    /// Whether the body may fall asleep on its own
    pub fn auto_sleep(&self) -> bool {
        self.auto_sleep
    }

    /// Allow or forbid automatic sleeping
    pub fn set_auto_sleep(&mut self, auto_sleep: bool) {
        self.auto_sleep = auto_sleep;
        if !auto_sleep {
            self.set_sleep_state(false);
        }
    }

    /// Keep the body awake regardless of its motion
    pub fn set_equilibrium_override(&mut self, keep_awake: bool) {
        self.equilibrium_override = keep_awake;
    }

    /// Whether the body passed the rest test often enough to sleep
    pub fn joint_fence(&self) -> bool {
        self.joint_fence
    }

    /// Consecutive steps the body passed the rest test
    pub fn sleep_counter(&self) -> u32 {
        self.sleep_counter
    }

    /// Evaluate the rest test for one step
    ///
    /// A body slower than the freeze speed is damped by the freezing drag
    /// and snapped to zero below the velocity tolerance. After
    /// `frames_to_sleep` consecutive passes the body becomes a sleep
    /// candidate; unconstrained candidates sleep immediately, jointed ones
    /// wait for their whole island. Returns whether the body is a candidate.
    pub fn evaluate_sleep_state(&mut self, config: &SleepConfig) -> bool {
        if self.kind != BodyKind::Dynamic || self.inv_mass == 0.0 {
            if self.kind == BodyKind::Static || (self.veloc == DVec3::ZERO && self.omega == DVec3::ZERO) {
                self.set_equilibrium(true);
            }
            self.joint_fence = true;
            return true;
        }

        let mut at_rest = self.auto_sleep && !self.equilibrium_override;
        if self.veloc != DVec3::ZERO || self.omega != DVec3::ZERO {
            let freeze2 = config.freeze_speed2();
            let slow = self.veloc.length_squared() < freeze2 && self.omega.length_squared() < freeze2;
            if slow {
                let veloc = self.veloc * config.freezing_drag;
                let omega = self.omega * config.freezing_drag;
                self.veloc = if veloc.length_squared() > config.velocity_tolerance {
                    veloc
                } else {
                    DVec3::ZERO
                };
                self.omega = if omega.length_squared() > config.velocity_tolerance {
                    omega
                } else {
                    DVec3::ZERO
                };
            }
            at_rest &= slow;
        }

        self.sleep_counter = if at_rest { self.sleep_counter.saturating_add(1) } else { 0 };
        self.joint_fence = at_rest && self.sleep_counter >= config.frames_to_sleep;
        if self.joint_fence && self.joints.is_empty() {
            self.set_equilibrium(true);
        }
        self.joint_fence
    }

    /// Contact map
    pub fn contacts(&self) -> &ContactMap {
        &self.contacts
    }

    /// Contact between this body and `other`, found from either side
    pub fn find_contact(&self, other: &Body) -> Option<ContactId> {
        self.contacts.find(ContactKey::new(self.tag, other.tag))
    }

    /// Attach a contact to this body
    ///
    /// A movable body that gains a contact cannot stay asleep.
    ///
    /// # Panics
    ///
    /// Debug builds panic if the pair already has a contact attached.
    pub fn attach_contact(&self, key: ContactKey, id: ContactId) {
        let inserted = self.contacts.insert(key, id);
        contract!(inserted, "Contact is already attached to this body");
        if self.inv_mass > 0.0 {
            self.set_equilibrium(false);
        }
    }

    /// Detach a contact, taking the combined rest state of the pair
    pub fn detach_contact(&self, key: ContactKey, pair_equilibrium: bool) -> Option<ContactId> {
        let removed = self.contacts.remove(key);
        if self.inv_mass > 0.0 {
            self.set_equilibrium(pair_equilibrium);
        }
        removed
    }

    /// Joints referencing this body
    pub fn joints(&self) -> &[JointId] {
        &self.joints
    }

    /// Record a joint and wake the body
    ///
    /// # Panics
    ///
    /// Debug builds panic if the joint is already attached.
    pub fn attach_joint(&mut self, joint: JointId) {
        contract!(!self.joints.contains(&joint), "Joint is already attached to this body");
        if !self.joints.contains(&joint) {
            self.joints.push(joint);
        }
        self.set_equilibrium(self.inv_mass == 0.0);
    }

    /// Forget a joint and wake the body
    pub fn detach_joint(&mut self, joint: JointId) {
        self.joints.retain(|&j| j != joint);
        self.set_equilibrium(self.inv_mass == 0.0);
    }

    /// Cast a world-space segment against the body
    ///
    /// The segment is clipped to the body box first; `max_param` truncates
    /// it further. Returns the hit with its parameter on the full segment.
    pub fn ray_cast(&self, ray: &FastRay, max_param: f64) -> Option<RayHit> {
        let (t0, t1) = ray.clip(&self.aabb)?;
        let t1 = t1.min(max_param);
        if t1 <= t0 {
            return None;
        }
        let q0 = ray.point_at(t0);
        let q1 = ray.point_at(t1);
        if (q1 - q0).length_squared() <= 1.0e-12 {
            return None;
        }
        let global = self.shape.global_matrix();
        let l0 = global.untransform_point(q0);
        let l1 = global.untransform_point(q1);
        let (t, normal) = self.shape.ray_cast(l0, l1)?;
        let param = t0 + t * (t1 - t0);
        Some(RayHit {
            param,
            point: ray.point_at(param),
            normal: global.rotate_vector(normal).normalize_or_zero(),
            body: self.id,
            material_id: self.shape.material().user_id,
        })
    }
}

impl Clone for Body {
    fn clone(&self) -> Self {
        Body {
            id: self.id,
            tag: self.tag,
            kind: self.kind,
            matrix: self.matrix,
            local_com: self.local_com,
            global_com: self.global_com,
            veloc: self.veloc,
            omega: self.omega,
            accel: self.accel,
            alpha: self.alpha,
            force: self.force,
            torque: self.torque,
            external_force: self.external_force,
            external_torque: self.external_torque,
            mass: self.mass,
            inv_mass: self.inv_mass,
            inertia: self.inertia,
            inv_inertia: self.inv_inertia,
            shape: self.shape.clone(),
            contacts: self.contacts.clone(),
            joints: self.joints.clone(),
            equilibrium: AtomicBool::new(self.equilibrium()),
            equilibrium_override: self.equilibrium_override,
            auto_sleep: self.auto_sleep,
            sleep_counter: self.sleep_counter,
            joint_fence: self.joint_fence,
            max_angle_step: self.max_angle_step,
            max_linear_step: self.max_linear_step,
            aabb: self.aabb,
            scene_node: self.scene_node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    fn ball(mass: f64) -> Body {
        Body::new(ShapeInstance::new(Shape::sphere(1.0)), mass)
    }

    #[test]
    fn test_body_id_display() {
        assert_eq!(BodyId::new(3, 1).to_string(), "Body(3, gen: 1)");
    }

    #[test]
    fn test_mass_from_sphere() {
        let b = ball(5.0);
        assert_eq!(b.mass(), 5.0);
        assert!((b.inertia().x - 2.0).abs() < 1e-12);
        assert!((b.inv_inertia().y - 0.5).abs() < 1e-12);
        assert!(!b.equilibrium());
    }

    #[test]
    fn test_light_body_is_immovable() {
        let b = ball(1.0e-6);
        assert_eq!(b.mass(), INFINITE_MASS);
        assert_eq!(b.inv_mass(), 0.0);
        assert_eq!(b.inv_inertia(), DVec3::ZERO);
    }

    #[test]
    fn test_inertia_is_clamped() {
        let mut b = ball(1.0);
        b.set_mass_matrix(2.0, DMat3::from_diagonal(DVec3::new(1.0e-9, 1.0, 1.0e9)));
        assert_eq!(b.inertia(), DVec3::new(2.0e-4, 1.0, 2.0e4));
        assert_eq!(b.inv_inertia(), DVec3::new(1.0 / 2.0e-4, 1.0, 1.0 / 2.0e4));
    }

    #[test]
    fn test_static_mesh_forces_infinite_mass() {
        let mesh = Shape::StaticMesh(crate::shape::StaticMesh::from_triangles(&[[
            DVec3::ZERO,
            DVec3::X,
            DVec3::Z,
        ]]));
        let mut b = Body::new(ShapeInstance::new(mesh), 10.0);
        b.set_mass_matrix(10.0, DMat3::IDENTITY);
        assert_eq!(b.inv_mass(), 0.0);
    }

    #[test]
    fn test_external_force_linear() {
        let mut b = ball(2.0);
        b.external_force = DVec3::new(0.0, -20.0, 0.0);
        b.integrate_external_force(0.5);
        assert_eq!(b.velocity(), DVec3::new(0.0, -5.0, 0.0));
        assert_eq!(b.accel(), DVec3::new(0.0, -10.0, 0.0));
    }

    #[test]
    fn test_free_spin_conserves_momentum() {
        let mut b = Body::new(ShapeInstance::new(Shape::cuboid(1.0, 2.0, 3.0)), 1.0);
        b.set_omega(DVec3::new(2.0, 0.1, 0.1));
        let before = b.angular_momentum().length();
        for _ in 0..600 {
            b.integrate_external_force(1.0 / 60.0);
            b.integrate_velocity(1.0 / 60.0);
        }
        let after = b.angular_momentum().length();
        assert!((after - before).abs() / before < 0.05);
    }

    #[test]
    fn test_integrate_velocity_moves_com() {
        let mut b = ball(1.0).with_velocity(DVec3::new(1.0, 0.0, 0.0));
        b.integrate_velocity(0.5);
        assert_eq!(b.position(), DVec3::new(0.5, 0.0, 0.0));
        assert!(b.aabb().contains_point(DVec3::new(1.5, 0.0, 0.0)));
    }

    #[test]
    fn test_small_spin_keeps_orientation() {
        let mut b = ball(1.0);
        b.set_omega(DVec3::new(0.0, 1.0e-6, 0.0));
        b.integrate_velocity(1.0 / 60.0);
        assert_eq!(b.rotation(), DQuat::IDENTITY);
    }

    #[test]
    fn test_sleep_needs_consecutive_frames() {
        let config = SleepConfig::default();
        let mut b = ball(1.0).with_velocity(DVec3::new(0.01, 0.0, 0.0));
        for _ in 0..config.frames_to_sleep - 1 {
            assert!(!b.evaluate_sleep_state(&config));
        }
        assert!(b.evaluate_sleep_state(&config));
        assert!(b.equilibrium());
        assert!(b.velocity().x < 0.01);
    }

    #[test]
    fn test_fast_body_stays_awake() {
        let config = SleepConfig::default();
        let mut b = ball(1.0).with_velocity(DVec3::new(1.0, 0.0, 0.0));
        for _ in 0..20 {
            assert!(!b.evaluate_sleep_state(&config));
        }
        assert_eq!(b.velocity().x, 1.0);
        assert_eq!(b.sleep_counter(), 0);
    }

    #[test]
    fn test_sleep_state_reports_rest() {
        let mut b = ball(1.0);
        assert!(b.set_sleep_state(true));
        assert!(b.equilibrium());
        b.set_velocity(DVec3::ONE);
        assert!(!b.set_sleep_state(false));
        assert!(!b.equilibrium());
    }

    #[test]
    fn test_external_changes_wake_body() {
        let mut b = ball(1.0);
        b.set_sleep_state(true);
        b.add_torque(DVec3::X);
        assert!(!b.equilibrium());

        let mut platform = Body::new_kinematic(ShapeInstance::new(Shape::cuboid(1.0, 1.0, 1.0)));
        platform.set_sleep_state(true);
        platform.set_velocity(DVec3::X);
        assert!(!platform.equilibrium());

        let mut floor = Body::new_static(ShapeInstance::new(Shape::cuboid(1.0, 1.0, 1.0)));
        floor.set_omega(DVec3::Y);
        assert!(floor.equilibrium());
    }

    #[test]
    fn test_ray_cast_world() {
        let b = ball(1.0).with_matrix(Frame::from_position(DVec3::new(0.0, 5.0, 0.0)));
        let ray = FastRay::new(DVec3::new(0.0, 10.0, 0.0), DVec3::ZERO);
        let hit = b.ray_cast(&ray, 1.0).unwrap();
        assert!((hit.param - 0.4).abs() < 1e-9);
        assert!((hit.point.y - 6.0).abs() < 1e-9);
        assert!((hit.normal - DVec3::Y).length() < 1e-9);
        assert!(b.ray_cast(&ray, 0.3).is_none());
    }

    #[test]
    fn test_attach_detach_restores_rest_state() {
        let mut b = ball(1.0);
        b.set_sleep_state(true);
        let key = ContactKey::new(1, 2);
        b.attach_contact(key, ContactId(7));
        assert!(!b.equilibrium());
        assert_eq!(b.contacts().find(key), Some(ContactId(7)));
        assert_eq!(b.detach_contact(key, true), Some(ContactId(7)));
        assert!(b.equilibrium());
        assert!(b.contacts().is_empty());
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn test_double_attach_fires_contract() {
        let b = ball(1.0);
        let key = ContactKey::new(1, 2);
        b.attach_contact(key, ContactId(0));
        b.attach_contact(key, ContactId(1));
    }

    #[test]
    fn test_energy_of_moving_ball() {
        let mut b = ball(2.0).with_velocity(DVec3::new(3.0, 0.0, 0.0));
        b.set_omega(DVec3::new(0.0, 0.0, 1.0));
        // 0.5 * 2 * 9 + 0.5 * (0.4 * 2) * 1
        assert!((b.kinetic_energy() - 9.4).abs() < 1e-12);
        assert_eq!(b.linear_momentum(), DVec3::new(6.0, 0.0, 0.0));
    }
}
