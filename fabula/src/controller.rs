// src/controller.rs
//
// Dose controller: a PID loop that drives dose toward 1.0 by adjusting
// capacity.
//
// Error convention: `e = 1 - dose`. Positive error means under-dosed, so the
// output `u` is applied to capacity with a negative sign (`A <- A - u`):
// less capacity raises dose, more capacity lowers it.
//
// - Anti-windup: the integrator only accumulates while |e| > settle_band.
// - Slew limit: |u| <= du_max.

use crate::config::PolicyConfig;
use crate::state::PidMemory;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseController {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub du_max: f64,
    pub settle_band: f64,
    pub a_min: f64,
    pub a_max: f64,
}

impl DoseController {
    pub fn from_policy(p: &PolicyConfig) -> Self {
        Self {
            kp: p.kp,
            ki: p.ki,
            kd: p.kd,
            du_max: p.du_max.abs(),
            settle_band: p.settle_band.abs(),
            a_min: p.a_min.min(p.a_max),
            a_max: p.a_max.max(p.a_min),
        }
    }

    /// Controller output for this day's dose. Updates `mem`.
    pub fn step(&self, mem: &mut PidMemory, dose: f64) -> f64 {
        let e = 1.0 - dose;
        if !e.is_finite() {
            return 0.0;
        }
        if e.abs() > self.settle_band {
            mem.integral += e;
        }
        let d = e - mem.prev_error;
        mem.prev_error = e;

        let u = self.kp * e + self.ki * mem.integral + self.kd * d;
        if !u.is_finite() {
            return 0.0;
        }
        u.clamp(-self.du_max, self.du_max)
    }

    /// Apply controller output `u` to capacity, within bounds.
    pub fn apply(&self, a: f64, u: f64) -> f64 {
        (a - u).clamp(self.a_min, self.a_max)
    }
}
