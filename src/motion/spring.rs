use glam::Vec2;

use crate::config::SpringConfig;

/// Damped spring constants. Defaults match the usual UI-animation
/// tuning (mass 1, tension 170, friction 26): slightly underdamped,
/// settles in roughly half a second.
#[derive(Debug, Clone, Copy)]
pub struct SpringParams {
    pub mass: f32,
    pub tension: f32,
    pub friction: f32,
}

impl Default for SpringParams {
    fn default() -> Self {
        Self {
            mass: 1.0,
            tension: 170.0,
            friction: 26.0,
        }
    }
}

impl SpringParams {
    pub fn from_config(config: &SpringConfig) -> Self {
        Self {
            mass: config.mass.max(1e-3),
            tension: config.tension,
            friction: config.friction,
        }
    }
}

/// Integration substep. Keeps stiff springs stable independent of the
/// caller's frame rate.
const SUBSTEP: f32 = 1.0 / 240.0;

/// Largest dt accepted per step; longer stalls are treated as one slow frame.
const MAX_DT: f32 = 0.1;

/// Distance/velocity below which the spring snaps to its target.
const REST_EPSILON: f32 = 0.01;

/// A 2D point animated toward a movable target by a damped spring.
///
/// One spring per joint animates the smoothed screen position; the
/// 3D mapping samples the spring's current value every rendered frame.
pub struct Spring2 {
    params: SpringParams,
    position: Vec2,
    velocity: Vec2,
    target: Vec2,
}

impl Spring2 {
    pub fn new(initial: Vec2, params: SpringParams) -> Self {
        Self {
            params,
            position: initial,
            velocity: Vec2::ZERO,
            target: initial,
        }
    }

    pub fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn is_at_rest(&self) -> bool {
        self.velocity.length() < REST_EPSILON
            && (self.position - self.target).length() < REST_EPSILON
    }

    /// Advance the simulation by dt seconds and return the new position.
    /// Semi-implicit Euler with fixed substeps; dt <= 0 is a no-op.
    pub fn step(&mut self, dt: f32) -> Vec2 {
        if dt <= 0.0 {
            return self.position;
        }

        let mut remaining = dt.min(MAX_DT);
        while remaining > 0.0 {
            let h = remaining.min(SUBSTEP);
            let displacement = self.position - self.target;
            let acceleration =
                (-self.params.tension * displacement - self.params.friction * self.velocity)
                    / self.params.mass;
            self.velocity += acceleration * h;
            self.position += self.velocity * h;
            remaining -= h;
        }

        if self.is_at_rest() {
            self.position = self.target;
            self.velocity = Vec2::ZERO;
        }

        self.position
    }

    /// Teleport to a position, clearing velocity and target.
    pub fn reset(&mut self, position: Vec2) {
        self.position = position;
        self.velocity = Vec2::ZERO;
        self.target = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled(spring: &mut Spring2, seconds: f32) -> Vec2 {
        let steps = (seconds / (1.0 / 60.0)) as usize;
        let mut last = spring.position();
        for _ in 0..steps {
            last = spring.step(1.0 / 60.0);
        }
        last
    }

    #[test]
    fn test_at_rest_initially() {
        let spring = Spring2::new(Vec2::new(3.0, 4.0), SpringParams::default());
        assert!(spring.is_at_rest());
        assert_eq!(spring.position(), Vec2::new(3.0, 4.0));
    }

    #[test]
    fn test_zero_dt_is_noop() {
        let mut spring = Spring2::new(Vec2::ZERO, SpringParams::default());
        spring.set_target(Vec2::new(10.0, 0.0));
        assert_eq!(spring.step(0.0), Vec2::ZERO);
        assert_eq!(spring.step(-1.0), Vec2::ZERO);
    }

    #[test]
    fn test_moves_toward_target() {
        let mut spring = Spring2::new(Vec2::ZERO, SpringParams::default());
        spring.set_target(Vec2::new(100.0, 0.0));
        let p = spring.step(1.0 / 60.0);
        assert!(p.x > 0.0, "expected movement toward target, got {}", p.x);
        assert_eq!(p.y, 0.0);
    }

    #[test]
    fn test_converges_to_target() {
        let mut spring = Spring2::new(Vec2::ZERO, SpringParams::default());
        let target = Vec2::new(640.0, 360.0);
        spring.set_target(target);
        let p = settled(&mut spring, 2.0);
        assert!(
            (p - target).length() < 0.5,
            "spring did not converge: {:?} vs {:?}",
            p,
            target
        );
        assert!(spring.is_at_rest());
    }

    #[test]
    fn test_rest_snaps_exactly() {
        let mut spring = Spring2::new(Vec2::ZERO, SpringParams::default());
        let target = Vec2::new(5.0, -3.0);
        spring.set_target(target);
        settled(&mut spring, 3.0);
        assert_eq!(spring.position(), target);
    }

    #[test]
    fn test_retarget_mid_flight() {
        let mut spring = Spring2::new(Vec2::ZERO, SpringParams::default());
        spring.set_target(Vec2::new(100.0, 100.0));
        settled(&mut spring, 0.1);
        spring.set_target(Vec2::new(-50.0, 0.0));
        let p = settled(&mut spring, 2.0);
        assert!((p - Vec2::new(-50.0, 0.0)).length() < 0.5);
    }

    #[test]
    fn test_large_dt_stays_finite() {
        let mut spring = Spring2::new(Vec2::ZERO, SpringParams::default());
        spring.set_target(Vec2::new(1000.0, 1000.0));
        // 長いフレームストールをまとめて渡しても発散しない
        let p = spring.step(5.0);
        assert!(p.x.is_finite() && p.y.is_finite());
        assert!(p.x.abs() < 10_000.0);
    }

    #[test]
    fn test_reset() {
        let mut spring = Spring2::new(Vec2::ZERO, SpringParams::default());
        spring.set_target(Vec2::new(100.0, 0.0));
        spring.step(0.1);
        spring.reset(Vec2::new(7.0, 7.0));
        assert_eq!(spring.position(), Vec2::new(7.0, 7.0));
        assert_eq!(spring.target(), Vec2::new(7.0, 7.0));
        assert!(spring.is_at_rest());
    }
}
