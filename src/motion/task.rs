use crate::state::Position;
use std::time::{Duration, Instant};

/// One marker moving from `from` to `to` over `duration`.
///
/// Latitude and longitude are interpolated independently and linearly.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationTask {
    pub from: Position,
    pub to: Position,
    pub started_at: Instant,
    pub duration: Duration,
}

impl AnimationTask {
    pub fn new(from: Position, to: Position, started_at: Instant, duration: Duration) -> Self {
        Self {
            from,
            to,
            started_at,
            duration,
        }
    }

    /// Fraction of the animation elapsed at `now`, clamped to [0, 1]
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    pub fn position_at(&self, now: Instant) -> Position {
        let progress = self.progress(now);
        if progress >= 1.0 {
            return self.to;
        }
        Position {
            lat: self.from.lat + (self.to.lat - self.from.lat) * progress,
            lng: self.from.lng + (self.to.lng - self.from.lng) * progress,
        }
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }

    /// Direction of travel from `from` to `to`
    pub fn bearing(&self) -> Option<f64> {
        initial_bearing(self.from, self.to)
    }
}

/// Initial great-circle bearing in degrees clockwise from north, [0, 360).
///
/// None when both points coincide.
pub fn initial_bearing(from: Position, to: Position) -> Option<f64> {
    if from == to {
        return None;
    }
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let delta_lambda = (to.lng - from.lng).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    Some((y.atan2(x).to_degrees() + 360.0) % 360.0)
}
