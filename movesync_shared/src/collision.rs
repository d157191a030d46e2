//! Collision world for a single character capsule.
//!
//! Owns the collider set, the capsule dimensions and the simulated body
//! position, and answers "where can the character go" queries. Positions are
//! the character's feet; the capsule extends `height` upward.
//!
//! All queries visit colliders in insertion order, so identical inputs always
//! resolve to identical outputs.

use tracing::{debug, warn};

use crate::config::PlayerConfig;
use crate::geometry::{
    circle_overlaps_rect, circle_rect_penetration, sweep_circle_rect, Aabb, Collider,
    ColliderOwner, Flat,
};
use crate::math::Vec3;
use crate::physics::PhysicsError;

/// Distance kept between the capsule and a surface it stopped against.
pub const SKIN: f32 = 1.0e-3;

/// Overlap smaller than this is treated as touching.
const CONTACT_TOLERANCE: f32 = 1.0e-3;

/// Slack for "surface is at the feet" comparisons on Y.
const VERTICAL_EPSILON: f32 = 1.0e-3;

const MAX_SLIDE_ITERATIONS: usize = 4;
const MAX_PUSH_ITERATIONS: usize = 8;
const MIN_MOVE_SQ: f32 = 1.0e-10;

/// Capsule dimensions used for every query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapsuleShape {
    pub radius: f32,
    pub height: f32,
    pub step_height: f32,
    pub ground_check_distance: f32,
}

impl From<&PlayerConfig> for CapsuleShape {
    fn from(cfg: &PlayerConfig) -> Self {
        Self {
            radius: cfg.radius,
            height: cfg.height,
            step_height: cfg.step_height,
            ground_check_distance: cfg.ground_check_distance,
        }
    }
}

impl Default for CapsuleShape {
    fn default() -> Self {
        Self::from(&PlayerConfig::default())
    }
}

/// Result of resolving one attempted displacement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideOutcome {
    pub position: Vec3,
    /// Horizontal motion hit something and was redirected or stopped.
    pub blocked: bool,
    /// Height climbed by step-up this move.
    pub stepped_up: f32,
    /// Downward motion was stopped by a floor.
    pub landed: bool,
    /// Upward motion was stopped by a ceiling.
    pub hit_ceiling: bool,
}

/// Spatial queries against a dynamic collider set for one character body.
#[derive(Debug, Clone)]
pub struct CollisionWorld {
    colliders: Vec<Collider>,
    shape: CapsuleShape,
    body_position: Vec3,
    physics_enabled: bool,
    time: f64,
    steps: u64,
}

impl CollisionWorld {
    /// Creates an initialized, empty world with physics enabled.
    pub fn new(shape: CapsuleShape) -> Self {
        Self {
            colliders: Vec::new(),
            shape,
            body_position: Vec3::ZERO,
            physics_enabled: true,
            time: 0.0,
            steps: 0,
        }
    }

    // ─── Collider set ───

    /// Adds a collider. Malformed bounds are logged and rejected.
    pub fn add_collider(&mut self, collider: Collider) -> Result<(), PhysicsError> {
        if !collider.bounds.is_valid() {
            warn!(
                owner = collider.owner.0,
                min = ?collider.bounds.min,
                max = ?collider.bounds.max,
                "Rejected collider with invalid bounds"
            );
            return Err(PhysicsError::InvalidBounds {
                owner: collider.owner,
            });
        }
        self.colliders.push(collider);
        Ok(())
    }

    /// Removes every collider created by `owner` (objects that move re-add).
    pub fn remove_owner(&mut self, owner: ColliderOwner) -> usize {
        let before = self.colliders.len();
        self.colliders.retain(|c| c.owner != owner);
        before - self.colliders.len()
    }

    /// Drops every collider (scenario teardown).
    pub fn clear_all(&mut self) {
        debug!(count = self.colliders.len(), "Clearing colliders");
        self.colliders.clear();
    }

    pub fn colliders(&self) -> &[Collider] {
        &self.colliders
    }

    /// Lowest bottom face of any collider.
    pub fn lowest_collider_y(&self) -> Option<f32> {
        self.colliders
            .iter()
            .map(|c| c.bounds.min.y)
            .reduce(f32::min)
    }

    // ─── Configuration ───

    pub fn shape(&self) -> CapsuleShape {
        self.shape
    }

    pub fn set_player_dimensions(&mut self, radius: f32, height: f32) -> Result<(), PhysicsError> {
        if !(radius.is_finite() && height.is_finite()) || radius <= 0.0 || height < 2.0 * radius {
            warn!(radius, height, "Rejected player dimensions");
            return Err(PhysicsError::InvalidDimension {
                name: "radius/height",
                value: if radius <= 0.0 { radius } else { height },
            });
        }
        self.shape.radius = radius;
        self.shape.height = height;
        Ok(())
    }

    pub fn set_step_height(&mut self, step_height: f32) -> Result<(), PhysicsError> {
        if !step_height.is_finite() || step_height < 0.0 {
            warn!(step_height, "Rejected step height");
            return Err(PhysicsError::InvalidDimension {
                name: "step_height",
                value: step_height,
            });
        }
        self.shape.step_height = step_height;
        Ok(())
    }

    // ─── Simulation clock ───

    pub fn enable_physics(&mut self) {
        self.physics_enabled = true;
    }

    pub fn disable_physics(&mut self) {
        self.physics_enabled = false;
    }

    pub fn is_physics_enabled(&self) -> bool {
        self.physics_enabled
    }

    /// Advances the simulation clock. Zero, negative and non-finite steps are
    /// ignored, as is any step while physics is disabled.
    pub fn step(&mut self, dt: f32) {
        if !dt.is_finite() || dt < 0.0 {
            debug!(dt, "Ignoring invalid physics step");
            return;
        }
        if dt == 0.0 || !self.physics_enabled {
            return;
        }
        self.time += f64::from(dt);
        self.steps += 1;
    }

    /// Simulated seconds since creation.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step_count(&self) -> u64 {
        self.steps
    }

    // ─── Body ───

    /// Relocates the simulated body without integrating anything.
    pub fn set_player_position(&mut self, position: Vec3) {
        self.body_position = position;
    }

    pub fn player_position(&self) -> Vec3 {
        self.body_position
    }

    /// Grounded probe at the simulated body position.
    pub fn is_grounded(&self) -> bool {
        self.ground_below(self.body_position, self.shape.ground_check_distance)
            .is_some()
    }

    /// Slides the simulated body by `attempted` and commits the result.
    pub fn move_player(&mut self, attempted: Vec3) -> SlideOutcome {
        let outcome = self.slide_player_along_walls(self.body_position, attempted);
        self.body_position = outcome.position;
        outcome
    }

    // ─── Queries ───

    /// Resolves an attempted displacement from `position`.
    ///
    /// Horizontal motion is resolved first: the remainder after a contact is
    /// projected onto the contact plane, and obstructions no taller than the
    /// step height are climbed instead. Vertical motion is then clamped to the
    /// first floor or ceiling in its path, and any residual penetration is
    /// pushed out.
    pub fn slide_player_along_walls(&self, position: Vec3, attempted: Vec3) -> SlideOutcome {
        let mut outcome = SlideOutcome {
            position,
            blocked: false,
            stepped_up: 0.0,
            landed: false,
            hit_ceiling: false,
        };
        if !position.is_finite() || !attempted.is_finite() {
            warn!(?position, ?attempted, "Non-finite slide request");
            return outcome;
        }

        self.slide_horizontal(&mut outcome, Flat::of(attempted));
        self.slide_vertical(&mut outcome, attempted.y);

        if self.overlaps_any(outcome.position) {
            outcome.position = self.push_out_of_colliders(outcome.position, false);
        }
        outcome
    }

    fn slide_horizontal(&self, outcome: &mut SlideOutcome, delta: Flat) {
        let r = self.shape.radius;
        let mut remaining = delta;

        for _ in 0..MAX_SLIDE_ITERATIONS {
            let len_sq = remaining.len_sq();
            if len_sq < MIN_MOVE_SQ {
                return;
            }
            let feet = outcome.position.y;
            let start = Flat::of(outcome.position);

            let mut earliest: Option<(f32, Flat, &Collider)> = None;
            for collider in &self.colliders {
                if !self.blocks_at_height(&collider.bounds, feet) {
                    continue;
                }
                if let Some(hit) = sweep_circle_rect(start, remaining, r, &collider.bounds.footprint()) {
                    if earliest.map_or(true, |(t, _, _)| hit.fraction < t) {
                        earliest = Some((hit.fraction, hit.normal, collider));
                    }
                }
            }

            let Some((fraction, normal, collider)) = earliest else {
                outcome.position = start.add(remaining).with_y(feet);
                return;
            };

            let len = len_sq.sqrt();
            let rise = collider.bounds.max.y - feet;
            let leftover_len = (1.0 - fraction) * len;
            if rise > 0.0
                && rise <= self.shape.step_height
                && leftover_len > SKIN
                && self.has_headroom(outcome.position, collider.bounds.max.y)
            {
                // Climb and retry the same displacement from the raised height.
                outcome.position.y = collider.bounds.max.y;
                outcome.stepped_up += rise;
                continue;
            }

            let travel = (fraction - SKIN / len).max(0.0);
            let advance = remaining.scale(travel);
            outcome.position = start.add(advance).with_y(feet);
            outcome.blocked = true;

            let leftover = remaining.sub(advance);
            remaining = leftover.sub(normal.scale(leftover.dot(normal)));
        }
    }

    fn slide_vertical(&self, outcome: &mut SlideOutcome, dy: f32) {
        let pos = outcome.position;
        if dy < 0.0 {
            let floor = self
                .colliders
                .iter()
                .filter(|c| self.under_footprint(&c.bounds, pos))
                .map(|c| c.bounds.max.y)
                .filter(|&top| top <= pos.y + VERTICAL_EPSILON && top >= pos.y + dy)
                .reduce(f32::max);
            match floor {
                Some(top) => {
                    outcome.position.y = top;
                    outcome.landed = true;
                }
                None => outcome.position.y += dy,
            }
        } else if dy > 0.0 {
            let head = pos.y + self.shape.height;
            let ceiling = self
                .colliders
                .iter()
                .filter(|c| self.under_footprint(&c.bounds, pos))
                .map(|c| c.bounds.min.y)
                .filter(|&bottom| bottom >= head - VERTICAL_EPSILON && bottom <= head + dy)
                .reduce(f32::min);
            match ceiling {
                Some(bottom) => {
                    outcome.position.y = bottom - self.shape.height - SKIN;
                    outcome.hit_ceiling = true;
                }
                None => outcome.position.y += dy,
            }
        }
    }

    /// Height of the first floor below `position` within `max_distance`.
    ///
    /// Independent of the live body; used for spawn placement.
    pub fn check_ground_collision(&self, position: Vec3, max_distance: f32) -> Option<f32> {
        self.ground_below(position, max_distance)
    }

    fn ground_below(&self, position: Vec3, max_distance: f32) -> Option<f32> {
        self.colliders
            .iter()
            .filter(|c| self.under_footprint(&c.bounds, position))
            .map(|c| c.bounds.max.y)
            .filter(|&top| top <= position.y + VERTICAL_EPSILON && position.y - top <= max_distance)
            .reduce(f32::max)
    }

    /// Moves a position that already overlaps geometry out of it.
    ///
    /// Each pass resolves the deepest overlap along its minimal translation
    /// (restricted to Y when `vertical_only`), up to a fixed number of passes.
    pub fn push_out_of_colliders(&self, position: Vec3, vertical_only: bool) -> Vec3 {
        let mut pos = position;
        for _ in 0..MAX_PUSH_ITERATIONS {
            let mut deepest: Option<Vec3> = None;
            for collider in &self.colliders {
                if !self.capsule_overlaps(&collider.bounds, pos) {
                    continue;
                }
                let mtv = self.minimal_translation(&collider.bounds, pos, vertical_only);
                if deepest.map_or(true, |d| mtv.len_sq() > d.len_sq()) {
                    deepest = Some(mtv);
                }
            }
            match deepest {
                Some(mtv) => pos += mtv,
                None => return pos,
            }
        }
        if self.overlaps_any(pos) {
            debug!(?position, resolved = ?pos, "Push-out did not fully separate");
        }
        pos
    }

    fn minimal_translation(&self, bounds: &Aabb, pos: Vec3, vertical_only: bool) -> Vec3 {
        let up = bounds.max.y - pos.y + SKIN;
        let down = pos.y + self.shape.height - bounds.min.y + SKIN;
        let mut best = if up <= down {
            Vec3::new(0.0, up, 0.0)
        } else {
            Vec3::new(0.0, -down, 0.0)
        };
        if vertical_only {
            return best;
        }
        if let Some((normal, depth)) =
            circle_rect_penetration(Flat::of(pos), self.shape.radius, &bounds.footprint())
        {
            let push = depth + SKIN;
            if push < best.len() {
                best = Vec3::new(normal.x * push, 0.0, normal.z * push);
            }
        }
        best
    }

    /// True when the capsule at `position` overlaps any collider.
    pub fn overlaps_any(&self, position: Vec3) -> bool {
        self.colliders
            .iter()
            .any(|c| self.capsule_overlaps(&c.bounds, position))
    }

    // ─── Helpers ───

    /// Vertical extent of the box intersects the capsule standing at `feet`.
    fn blocks_at_height(&self, bounds: &Aabb, feet: f32) -> bool {
        bounds.max.y > feet + VERTICAL_EPSILON
            && bounds.min.y < feet + self.shape.height - VERTICAL_EPSILON
    }

    fn under_footprint(&self, bounds: &Aabb, position: Vec3) -> bool {
        circle_overlaps_rect(
            Flat::of(position),
            self.shape.radius,
            &bounds.footprint(),
            CONTACT_TOLERANCE,
        )
    }

    fn capsule_overlaps(&self, bounds: &Aabb, position: Vec3) -> bool {
        self.blocks_at_height(bounds, position.y) && self.under_footprint(bounds, position)
    }

    fn has_headroom(&self, position: Vec3, raised_feet: f32) -> bool {
        !self.overlaps_any(Vec3::new(position.x, raised_feet, position.z))
    }
}
