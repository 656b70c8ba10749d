use std::f64::consts::PI;
use std::time::Duration;

use super::{random_in_range, random_millis};
use crate::types::Position;

pub const MIN_PATH_STEPS: usize = 30;
pub const MAX_PATH_STEPS: usize = 100;

const CLICK_DELAY_BASE_MS: f64 = 100.0;

/// One pointer position along a path plus how long to wait after reaching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathPoint {
    pub x: i32,
    pub y: i32,
    pub delay: Duration,
}

impl PathPoint {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Press-to-release delay for a click, 100ms +/- 40ms.
pub fn click_delay() -> Duration {
    random_millis(CLICK_DELAY_BASE_MS - 40.0, CLICK_DELAY_BASE_MS + 40.0)
}

/// Number of intermediate points for a move covering `distance` pixels.
pub fn path_steps(distance: f64) -> usize {
    ((distance / 10.0).floor() as usize).clamp(MIN_PATH_STEPS, MAX_PATH_STEPS)
}

/// Curved, jittered, variable-speed path from `from` to `to`.
///
/// The path follows a cubic Bezier whose control points are pushed off the
/// straight line by a fraction of the travel distance. Step delays follow a
/// sine profile so the pointer accelerates then slows down. The last element
/// is always exactly `to`.
pub fn mouse_path(from: Position, to: Position) -> Vec<PathPoint> {
    let distance = from.distance_to(to);
    let (x0, y0) = (f64::from(from.x), f64::from(from.y));
    let (x3, y3) = (f64::from(to.x), f64::from(to.y));

    let x1 = x0 + random_in_range(-0.2 * distance, 0.2 * distance);
    let y1 = y0 + random_in_range(0.1 * distance, 0.3 * distance);
    let x2 = x3 + random_in_range(-0.2 * distance, 0.2 * distance);
    let y2 = y3 - random_in_range(0.1 * distance, 0.3 * distance);

    let steps = path_steps(distance);
    let jitter = if distance > 200.0 { 3.0 } else { 1.0 };

    let mut path = Vec::with_capacity(steps + 1);
    for i in 0..steps {
        let t = i as f64 / steps as f64;
        let (x, y) = cubic_bezier(t, (x0, y0), (x1, y1), (x2, y2), (x3, y3));

        let base_ms = random_in_range(5.0, 20.0);
        let speed = 1.0 + (t * PI).sin() * random_in_range(0.8, 1.2);
        let delay_ms = (base_ms / speed).max(1.0);

        path.push(PathPoint {
            x: (x + random_in_range(-jitter, jitter)).floor() as i32,
            y: (y + random_in_range(-jitter, jitter)).floor() as i32,
            delay: Duration::from_millis(delay_ms as u64),
        });
    }

    path.push(PathPoint {
        x: to.x,
        y: to.y,
        delay: random_millis(0.0, 30.0),
    });
    path
}

fn cubic_bezier(
    t: f64,
    p0: (f64, f64),
    p1: (f64, f64),
    p2: (f64, f64),
    p3: (f64, f64),
) -> (f64, f64) {
    let u = 1.0 - t;
    let a = u * u * u;
    let b = 3.0 * u * u * t;
    let c = 3.0 * u * t * t;
    let d = t * t * t;
    (
        a * p0.0 + b * p1.0 + c * p2.0 + d * p3.0,
        a * p0.1 + b * p1.1 + c * p2.1 + d * p3.1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_lands_exactly_on_target() {
        for _ in 0..200 {
            let path = mouse_path(Position::new(0, 0), Position::new(100, 0));
            let last = path.last().copied().unwrap();
            assert_eq!(last.position(), Position::new(100, 0));
            assert!(path.len() > MIN_PATH_STEPS && path.len() <= MAX_PATH_STEPS + 1);
        }
    }

    #[test]
    fn step_count_scales_with_distance() {
        assert_eq!(path_steps(0.0), MIN_PATH_STEPS);
        assert_eq!(path_steps(550.0), 55);
        assert_eq!(path_steps(5_000.0), MAX_PATH_STEPS);

        let long = mouse_path(Position::new(0, 0), Position::new(800, 600));
        assert_eq!(long.len(), MAX_PATH_STEPS + 1);
    }

    #[test]
    fn path_starts_near_origin() {
        let path = mouse_path(Position::new(50, 50), Position::new(400, 300));
        let first = path[0];
        assert!((first.x - 50).abs() <= 3 && (first.y - 50).abs() <= 3);
    }

    #[test]
    fn middle_of_path_is_faster_than_the_ends() {
        let mut edge = 0u128;
        let mut middle = 0u128;
        for _ in 0..200 {
            let path = mouse_path(Position::new(0, 0), Position::new(600, 0));
            let n = path.len() - 1;
            edge += path[..5].iter().map(|p| p.delay.as_millis()).sum::<u128>();
            middle += path[n / 2 - 2..n / 2 + 3]
                .iter()
                .map(|p| p.delay.as_millis())
                .sum::<u128>();
        }
        assert!(middle < edge, "middle {middle} edge {edge}");
    }

    #[test]
    fn click_delay_range() {
        for _ in 0..100 {
            let ms = click_delay().as_millis();
            assert!((60..140).contains(&ms));
        }
    }
}
