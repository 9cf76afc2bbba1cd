/// A step function stored as `(lower_bound, value)` pairs, ordered by
/// descending lower bound. `lookup` returns the value of the first step whose
/// bound is `<= x`, so bounds are inclusive.
#[derive(Clone, Copy, Debug)]
pub struct StepTable<T: Copy, const N: usize> {
    steps: [(f32, T); N],
}

impl<T: Copy, const N: usize> StepTable<T, N> {
    pub const fn new(steps: [(f32, T); N]) -> Self {
        Self { steps }
    }

    pub fn lookup(&self, x: f32) -> Option<T> {
        self.steps
            .iter()
            .find(|(bound, _)| x >= *bound)
            .map(|(_, value)| *value)
    }

    pub fn steps(&self) -> &[(f32, T)] {
        &self.steps
    }

    /// True when bounds are strictly descending.
    pub fn is_ordered(&self) -> bool {
        self.steps.windows(2).all(|w| w[0].0 > w[1].0)
    }
}

/// Lateral offset (car local units) to strafe strength.
pub const STRAFE_TABLE: StepTable<f32, 6> = StepTable::new([
    (30.0, 0.30),
    (20.0, 0.20),
    (15.0, 0.15),
    (10.0, 0.10),
    (5.0, 0.05),
    (1.0, 0.01),
]);

/// Signed strafe strength for a local lateral offset.
pub fn strafe_strength(local_x: f32) -> f32 {
    STRAFE_TABLE
        .lookup(local_x.abs())
        .map(|s| s.copysign(local_x))
        .unwrap_or(0.0)
}

/// Beyond this angle the next waypoint sits abeam or behind the car, which
/// means the car is already in the turn.
pub const TURN_OVERSHOOT_ANGLE: f32 = 80.0;
pub const TURN_OVERSHOOT_CAP: f32 = 0.65;

/// Next-waypoint angle (degrees) to speed cap, one column per speed band
/// (see `speed_band`).
pub const TURN_CAP_TABLE: StepTable<[f32; 3], 5> = StepTable::new([
    (65.0, [0.05, 0.10, 0.15]),
    (60.0, [0.10, 0.15, 0.25]),
    (45.0, [0.20, 0.25, 0.35]),
    (30.0, [0.40, 0.45, 0.55]),
    (15.0, [0.60, 0.65, 0.75]),
]);

/// Column of `TURN_CAP_TABLE` for the current speed ratio.
pub fn speed_band(speed_ratio: f32) -> usize {
    if speed_ratio >= 0.95 {
        0
    } else if speed_ratio >= 0.85 {
        1
    } else {
        2
    }
}

/// Speed cap for an upcoming turn, `None` when the turn is gentle enough to
/// take at full throttle.
pub fn turn_speed_cap(angle_deg: f32, speed_ratio: f32) -> Option<f32> {
    let angle = angle_deg.abs();
    if angle > TURN_OVERSHOOT_ANGLE {
        return Some(TURN_OVERSHOOT_CAP);
    }
    TURN_CAP_TABLE
        .lookup(angle)
        .map(|caps| caps[speed_band(speed_ratio)])
}
