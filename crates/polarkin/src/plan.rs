//! Turns the configured move list into trapezoid segments.
//!
//! Every move starts and ends at rest. Moves too short to reach their cruise
//! velocity become triangles.

use crate::config::{MoveConfig, StartConfig};
use polarkin_core::trap_queue::{Coord, TrapQueue};

pub struct Plan {
    pub trapq: TrapQueue,
    pub start_time: f64,
    pub end_time: f64,
    pub moves: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Profile {
    accel_t: f64,
    cruise_t: f64,
    cruise_v: f64,
    accel: f64,
}

impl Profile {
    fn new(dist: f64, velocity: f64, accel: Option<f64>) -> Self {
        let Some(accel) = accel else {
            return Self {
                accel_t: 0.0,
                cruise_t: dist / velocity,
                cruise_v: velocity,
                accel: 0.0,
            };
        };

        let accel_d = velocity * velocity / (2.0 * accel);
        if 2.0 * accel_d >= dist {
            let peak_v = (accel * dist).sqrt();
            return Self {
                accel_t: peak_v / accel,
                cruise_t: 0.0,
                cruise_v: peak_v,
                accel,
            };
        }

        Self {
            accel_t: velocity / accel,
            cruise_t: (dist - 2.0 * accel_d) / velocity,
            cruise_v: velocity,
            accel,
        }
    }

    fn duration(&self) -> f64 {
        2.0 * self.accel_t + self.cruise_t
    }
}

pub fn plan(start: &StartConfig, moves: &[MoveConfig]) -> Plan {
    let mut trapq = TrapQueue::new();
    let [x, y, z] = start.position;
    let mut pos = Coord::new(x, y, z);
    let mut print_time = start.print_time;
    let mut queued = 0;

    for (idx, m) in moves.iter().enumerate() {
        let [x, y, z] = m.to;
        let (dx, dy, dz) = (x - pos.x, y - pos.y, z - pos.z);
        let dist = (dx * dx + dy * dy + dz * dz).sqrt();
        if dist == 0.0 {
            tracing::debug!(idx, "skipping zero length move");
            continue;
        }

        let axes_r = Coord::new(dx / dist, dy / dist, dz / dist);
        let profile = Profile::new(dist, m.velocity, m.accel);
        tracing::debug!(idx, dist, ?profile, print_time, "queueing move");
        trapq.append(
            print_time,
            profile.accel_t,
            profile.cruise_t,
            profile.accel_t,
            pos,
            axes_r,
            0.0,
            profile.cruise_v,
            profile.accel,
        );

        print_time += profile.duration();
        pos = Coord::new(x, y, z);
        queued += 1;
    }

    Plan {
        trapq,
        start_time: start.print_time,
        end_time: print_time,
        moves: queued,
    }
}
