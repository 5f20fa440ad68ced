// Iterative solver for kinematic moves

use crate::{
    step_sink::{StepDir, StepSink, StepSinkError},
    trap_queue::{Coord, Move, TrapQueue},
};

const SEEK_TIME_RESET: f64 = 0.000100;
const POSITION_TOLERANCE: f64 = 0.000000001;
const TIME_TOLERANCE: f64 = 0.000000001;

// Active flags for axis filtering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveFlags(u8);

impl ActiveFlags {
    const X: u8 = 1 << 0;
    const Y: u8 = 1 << 1;
    const Z: u8 = 1 << 2;

    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn with_x(mut self) -> Self {
        self.0 |= Self::X;
        self
    }

    pub const fn with_y(mut self) -> Self {
        self.0 |= Self::Y;
        self
    }

    pub const fn with_z(mut self) -> Self {
        self.0 |= Self::Z;
        self
    }

    pub const fn has_x(&self) -> bool {
        self.0 & Self::X != 0
    }

    pub const fn has_y(&self) -> bool {
        self.0 & Self::Y != 0
    }

    pub const fn has_z(&self) -> bool {
        self.0 & Self::Z != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Maps a trajectory onto the position of a single stepper.
///
/// The commanded position is owned by the kinematics but written only by the
/// solver, once a step has been accepted. `calc_position` may read it (the
/// polar angle axis unwraps against it) and must not change it.
pub trait StepperKinematics {
    fn calc_position(&self, m: &Move, move_time: f64) -> f64;

    fn commanded_pos(&self) -> f64;

    fn set_commanded_pos(&mut self, pos: f64);

    fn active_flags(&self) -> ActiveFlags;
}

#[derive(Debug, Clone, Copy)]
struct Guess {
    time: f64,
    position: f64,
}

fn toward(dir: StepDir, dist: f64) -> f64 {
    if dir.is_forward() { dist } else { -dist }
}

/// Iterative solver for generating step times from kinematic moves
pub struct IterativeSolver<K> {
    kin: K,
    step_dist: f64,
    last_flush_time: f64,
    last_move_time: f64,
    gen_steps_pre_active: f64,
    gen_steps_post_active: f64,
}

impl<K: StepperKinematics> IterativeSolver<K> {
    pub fn new(step_dist: f64, kin: K) -> Self {
        Self {
            kin,
            step_dist,
            last_flush_time: 0.0,
            last_move_time: 0.0,
            gen_steps_pre_active: 0.0,
            gen_steps_post_active: 0.0,
        }
    }

    /// Keep generating steps for `pre` seconds before and `post` seconds
    /// after moves that are active on this stepper.
    pub fn with_active_windows(mut self, pre: f64, post: f64) -> Self {
        self.gen_steps_pre_active = pre;
        self.gen_steps_post_active = post;
        self
    }

    pub fn kinematics(&self) -> &K {
        &self.kin
    }

    pub fn into_kinematics(self) -> K {
        self.kin
    }

    pub fn commanded_pos(&self) -> f64 {
        self.kin.commanded_pos()
    }

    pub fn set_position(&mut self, x: f64, y: f64, z: f64) {
        let pos = self.calc_position_from_coord(x, y, z);
        tracing::debug!(x, y, z, pos, "stepper position set");
        self.kin.set_commanded_pos(pos);
    }

    pub fn calc_position_from_coord(&self, x: f64, y: f64, z: f64) -> f64 {
        let m = Move::stationary(Coord::new(x, y, z));
        self.kin.calc_position(&m, 500.0)
    }

    // Check if a move is likely to cause movement on this stepper
    fn check_active(&self, m: &Move) -> bool {
        let flags = self.kin.active_flags();
        (flags.has_x() && m.axes_r.x != 0.0)
            || (flags.has_y() && m.axes_r.y != 0.0)
            || (flags.has_z() && m.axes_r.z != 0.0)
    }

    // Find every half-step crossing of one move within [abs_start, abs_end]
    // using the secant method, falling back to bisection once bracketed.
    fn gen_steps_range<S: StepSink>(
        &mut self,
        sink: &mut S,
        m: &Move,
        abs_start: f64,
        abs_end: f64,
    ) -> Result<(), StepSinkError> {
        let half_step = 0.5 * self.step_dist;
        let start = (abs_start - m.print_time).max(0.0);
        let end = (abs_end - m.print_time).min(m.move_t);

        let mut dir = sink.last_dir().unwrap_or(StepDir::Forward);
        let mut target = self.kin.commanded_pos() + toward(dir, half_step);
        let mut old_guess = Guess {
            time: start,
            position: self.kin.commanded_pos(),
        };
        let mut guess = old_guess;
        let mut is_dir_change = false;
        let mut have_bracket = false;
        let mut check_oscillate = false;
        let mut last_time = start;
        let mut low_time = start;
        let mut high_time = (start + SEEK_TIME_RESET).min(end);

        loop {
            let guess_dist = guess.position - target;
            let old_dist = old_guess.position - target;
            let mut next_time =
                (old_guess.time * guess_dist - guess.time * old_dist) / (guess_dist - old_dist);

            if !(next_time > low_time && next_time < high_time) {
                if have_bracket {
                    // poor secant guess, bisect instead
                    next_time = (low_time + high_time) * 0.5;
                    check_oscillate = false;
                } else if guess.time >= end {
                    break;
                } else {
                    // widen the search window exponentially
                    next_time = high_time;
                    high_time = (2.0 * high_time - last_time).min(end);
                }
            }

            // Probe only; the commanded position is left alone here
            old_guess = guess;
            guess = Guess {
                time: next_time,
                position: self.kin.calc_position(m, next_time),
            };
            let guess_dist = guess.position - target;

            if guess_dist.abs() > POSITION_TOLERANCE {
                let rel_dist = toward(dir, guess_dist);
                if rel_dist > 0.0 {
                    // past the target, so a step lies in the window
                    if have_bracket && old_guess.time <= low_time {
                        if check_oscillate {
                            old_guess = guess;
                        }
                        check_oscillate = true;
                    }
                    high_time = guess.time;
                    have_bracket = true;
                } else if rel_dist < -(self.step_dist + 0.000000010) {
                    dir = dir.reverse();
                    target += toward(dir, self.step_dist);
                    low_time = last_time;
                    high_time = guess.time;
                    is_dir_change = true;
                    have_bracket = true;
                    check_oscillate = false;
                } else {
                    low_time = guess.time;
                }

                if !have_bracket || high_time - low_time > TIME_TOLERANCE {
                    if !is_dir_change && rel_dist >= -half_step {
                        sink.commit()?;
                    }
                    continue;
                }
            }

            // Step found: queue it and accept the position it reaches
            sink.append(dir, m.print_time, guess.time)?;
            target += toward(dir, self.step_dist);
            self.kin.set_commanded_pos(target - toward(dir, half_step));

            let mut seek_time_delta = (1.5 * (guess.time - last_time)).max(TIME_TOLERANCE);
            if is_dir_change && seek_time_delta > SEEK_TIME_RESET {
                seek_time_delta = SEEK_TIME_RESET;
            }
            last_time = guess.time;
            low_time = guess.time;
            high_time = (guess.time + seek_time_delta).min(end);
            is_dir_change = false;
            have_bracket = false;
            check_oscillate = false;
        }

        let reached = target - toward(dir, half_step);
        tracing::trace!(
            print_time = m.print_time,
            start,
            end,
            reached,
            "move range solved"
        );
        self.kin.set_commanded_pos(reached);
        Ok(())
    }

    /// Generate steps for the queued moves up to `flush_time`.
    pub fn generate_steps<S: StepSink>(
        &mut self,
        sink: &mut S,
        trapq: &TrapQueue,
        flush_time: f64,
    ) -> Result<(), StepSinkError> {
        let last_flush_time = self.last_flush_time;
        self.last_flush_time = flush_time;

        let moves = trapq.active_moves();
        let Some(mut move_idx) = moves
            .iter()
            .position(|m| last_flush_time < m.end_time())
        else {
            return Ok(());
        };
        tracing::trace!(last_flush_time, flush_time, first_move = move_idx, "generating steps");

        let mut force_steps_time = self.last_move_time + self.gen_steps_post_active;
        let mut skip_count = 0;

        while move_idx < moves.len() {
            let m = moves[move_idx];
            let move_start = m.print_time;
            let move_end = m.end_time();

            if self.check_active(m) {
                if skip_count > 0 && self.gen_steps_pre_active > 0.0 {
                    // Steps leading up to activity come from the skipped moves
                    let abs_start = (move_start - self.gen_steps_pre_active)
                        .max(last_flush_time)
                        .max(force_steps_time);
                    let mut pm_idx = move_idx;
                    while skip_count > 0 && pm_idx > 0 {
                        pm_idx -= 1;
                        if moves[pm_idx].print_time <= abs_start {
                            pm_idx += 1;
                            break;
                        }
                        skip_count -= 1;
                    }
                    for pm in &moves[pm_idx..move_idx] {
                        self.gen_steps_range(sink, pm, abs_start, flush_time)?;
                    }
                }

                self.gen_steps_range(sink, m, last_flush_time, flush_time)?;

                if move_end >= flush_time {
                    self.last_move_time = flush_time;
                    return Ok(());
                }

                skip_count = 0;
                self.last_move_time = move_end;
                force_steps_time = self.last_move_time + self.gen_steps_post_active;
            } else {
                if move_start < force_steps_time {
                    // Steps trailing off after activity
                    let abs_end = force_steps_time.min(flush_time);
                    self.gen_steps_range(sink, m, last_flush_time, abs_end)?;
                    skip_count = 1;
                } else {
                    skip_count += 1;
                }
                if flush_time + self.gen_steps_pre_active <= move_end {
                    return Ok(());
                }
            }

            move_idx += 1;
        }

        Ok(())
    }

    /// Print time of the first move after the last flush that moves this
    /// stepper, looking no further than `flush_time`.
    pub fn check_active_time(&self, trapq: &TrapQueue, flush_time: f64) -> Option<f64> {
        trapq
            .active_moves()
            .into_iter()
            .skip_while(|m| m.end_time() <= self.last_flush_time)
            .find_map(|m| {
                if self.check_active(m) {
                    Some(Some(m.print_time))
                } else if flush_time <= m.end_time() {
                    Some(None)
                } else {
                    None
                }
            })
            .flatten()
    }

    // Check if this stepper is registered for the given axis
    pub fn is_active_axis(&self, axis: char) -> bool {
        let flags = self.kin.active_flags();
        match axis {
            'x' | 'X' => flags.has_x(),
            'y' | 'Y' => flags.has_y(),
            'z' | 'Z' => flags.has_z(),
            _ => false,
        }
    }
}
