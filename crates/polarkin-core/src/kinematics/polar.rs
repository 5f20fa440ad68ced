// Polar kinematics

use std::f64::consts::{PI, TAU};

use crate::{
    itersolve::{ActiveFlags, StepperKinematics},
    kinematics::KinematicsError,
    trap_queue::Move,
};

/// Polar axis type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolarAxis {
    /// Radius axis (arm)
    Radius,
    /// Angle axis (bed)
    Angle,
}

impl PolarAxis {
    /// Map a single-character selector to an axis: `'r'` or `'a'`.
    pub fn from_selector(selector: char) -> Option<Self> {
        match selector {
            'r' => Some(PolarAxis::Radius),
            'a' => Some(PolarAxis::Angle),
            _ => None,
        }
    }

    pub fn selector(self) -> char {
        match self {
            PolarAxis::Radius => 'r',
            PolarAxis::Angle => 'a',
        }
    }
}

impl TryFrom<char> for PolarAxis {
    type Error = KinematicsError;

    fn try_from(selector: char) -> Result<Self, Self::Error> {
        Self::from_selector(selector).ok_or(KinematicsError::UnknownSelector(selector))
    }
}

/// Distance of the toolhead from the rotation center.
pub fn radius_position(m: &Move, move_time: f64) -> f64 {
    let c = m.coord_at(move_time);
    (c.x * c.x + c.y * c.y).sqrt()
}

/// Angle of the toolhead, unwrapped to within half a turn of `anchor`.
///
/// The toolhead sitting exactly on the rotation center (`x == y == 0`) has
/// no defined angle; whatever `atan2(0, 0)` reports is unwrapped as usual.
pub fn angle_position(m: &Move, move_time: f64, anchor: f64) -> f64 {
    let c = m.coord_at(move_time);
    unwrap_angle(c.y.atan2(c.x), anchor)
}

/// Shift `angle` by whole turns so that `result - anchor` is in `(-PI, PI]`.
pub fn unwrap_angle(angle: f64, anchor: f64) -> f64 {
    let mut unwrapped = angle;
    let diff = angle - anchor;
    if !(-PI..=PI).contains(&diff) {
        unwrapped -= TAU * (diff / TAU).round();
    }
    let diff = unwrapped - anchor;
    if diff > PI {
        unwrapped -= TAU;
    } else if diff <= -PI {
        unwrapped += TAU;
    }
    unwrapped
}

/// Polar kinematics - bed rotates and arm moves radially
///
/// `commanded_pos` is the last position the step generator accepted for this
/// axis. The angle axis unwraps every query against it; queries never write
/// it, so speculative probes leave it untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolarKin {
    axis: Option<PolarAxis>,
    commanded_pos: f64,
}

impl PolarKin {
    pub fn new(axis: PolarAxis) -> Self {
        Self {
            axis: Some(axis),
            commanded_pos: 0.0,
        }
    }

    /// Build a zeroed stepper for a `'r'` or `'a'` selector.
    ///
    /// Any other selector produces an inert stepper: [`PolarKin::axis`] is
    /// `None` and [`PolarKin::position`] computes nothing.
    pub fn alloc(selector: char) -> Self {
        let axis = PolarAxis::from_selector(selector);
        tracing::trace!(%selector, ?axis, "polar stepper allocated");
        Self {
            axis,
            commanded_pos: 0.0,
        }
    }

    pub fn axis(&self) -> Option<PolarAxis> {
        self.axis
    }

    pub fn commanded_pos(&self) -> f64 {
        self.commanded_pos
    }

    pub fn set_commanded_pos(&mut self, pos: f64) {
        self.commanded_pos = pos;
    }

    /// Axis position `move_time` seconds into `m`, or `None` when inert.
    pub fn position(&self, m: &Move, move_time: f64) -> Option<f64> {
        match self.axis? {
            PolarAxis::Radius => Some(radius_position(m, move_time)),
            PolarAxis::Angle => Some(angle_position(m, move_time, self.commanded_pos)),
        }
    }

    pub fn active_flags(&self) -> ActiveFlags {
        match self.axis {
            Some(_) => ActiveFlags::new().with_x().with_y(),
            None => ActiveFlags::new(),
        }
    }
}

impl StepperKinematics for PolarKin {
    fn calc_position(&self, m: &Move, move_time: f64) -> f64 {
        // an inert stepper holds still
        self.position(m, move_time).unwrap_or(self.commanded_pos)
    }

    fn commanded_pos(&self) -> f64 {
        self.commanded_pos
    }

    fn set_commanded_pos(&mut self, pos: f64) {
        self.commanded_pos = pos;
    }

    fn active_flags(&self) -> ActiveFlags {
        PolarKin::active_flags(self)
    }
}
