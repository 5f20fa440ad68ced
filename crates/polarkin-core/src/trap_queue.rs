//! Trapezoidal motion queue.
//!
//! Moves are stored as constant-acceleration segments along a unit
//! direction. Each segment answers "where is the toolhead at time `t`"
//! through [`Move::coord_at`], which is the only query the stepper
//! kinematics ever make against a trajectory.

use std::collections::VecDeque;

pub(crate) const NEVER_TIME: f64 = 9_999_999_999_999_999.9;
const MAX_NULL_MOVE: f64 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coord {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// One constant-acceleration segment of a planned move.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Move {
    pub print_time: f64,
    pub move_t: f64,
    pub start_v: f64,
    pub half_accel: f64,
    pub start_pos: Coord,
    pub axes_r: Coord,
}

impl Move {
    /// A move that stays parked at `pos` for a very long time.
    pub fn stationary(pos: Coord) -> Self {
        Self {
            move_t: 1000.0,
            start_pos: pos,
            ..Self::default()
        }
    }

    /// Distance travelled along `axes_r` after `move_time` seconds.
    pub fn distance_at(&self, move_time: f64) -> f64 {
        (self.start_v + self.half_accel * move_time) * move_time
    }

    /// Cartesian position after `move_time` seconds.
    ///
    /// Times outside `0..=move_t` are extrapolated with the same polynomial.
    pub fn coord_at(&self, move_time: f64) -> Coord {
        let move_dist = self.distance_at(move_time);
        Coord {
            x: self.start_pos.x + self.axes_r.x * move_dist,
            y: self.start_pos.y + self.axes_r.y * move_dist,
            z: self.start_pos.z + self.axes_r.z * move_dist,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.print_time + self.move_t
    }

    fn is_null(&self) -> bool {
        self.start_v == 0.0 && self.half_accel == 0.0
    }
}

pub struct TrapQueue {
    // head and tail sentinels live at the ends
    moves: VecDeque<Move>,
}

impl Default for TrapQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TrapQueue {
    pub fn new() -> Self {
        let mut moves = VecDeque::new();
        moves.push_back(Move {
            print_time: -1.0,
            ..Move::default()
        });
        moves.push_back(Move {
            print_time: NEVER_TIME,
            move_t: NEVER_TIME,
            ..Move::default()
        });
        Self { moves }
    }

    fn tail_index(&self) -> usize {
        self.moves.len() - 1
    }

    fn mark_tail_stale(&mut self) {
        let idx = self.tail_index();
        self.moves[idx].print_time = 0.0;
        self.moves[idx].move_t = 0.0;
    }

    fn park_tail(&mut self) {
        let idx = self.tail_index();
        self.moves[idx].print_time = NEVER_TIME;
        self.moves[idx].move_t = NEVER_TIME;
    }

    /// Recompute the tail sentinel after the queue changed.
    pub fn check_sentinels(&mut self) {
        let tail_idx = self.tail_index();
        if self.moves[tail_idx].print_time != 0.0 {
            return;
        }
        if tail_idx == 1 {
            self.park_tail();
            return;
        }
        let prev = self.moves[tail_idx - 1];
        let tail = &mut self.moves[tail_idx];
        tail.print_time = prev.end_time();
        tail.move_t = 0.0;
        tail.start_pos = prev.coord_at(prev.move_t);
    }

    /// Queue a move, bridging any time gap before it with a null move.
    pub fn add_move(&mut self, m: Move) {
        let prev = self.moves[self.tail_index() - 1];
        if prev.end_time() < m.print_time {
            // only the gap before the first move is capped
            let first = self.tail_index() == 1;
            let gap_start = if first && m.print_time > MAX_NULL_MOVE {
                m.print_time - MAX_NULL_MOVE
            } else {
                prev.end_time()
            };
            let null_move = Move {
                print_time: gap_start,
                move_t: m.print_time - gap_start,
                start_pos: m.start_pos,
                ..Move::default()
            };
            let at = self.tail_index();
            self.moves.insert(at, null_move);
        }
        let at = self.tail_index();
        self.moves.insert(at, m);
        self.mark_tail_stale();
    }

    /// Split an accel/cruise/decel trapezoid into segments and queue them.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &mut self,
        print_time: f64,
        accel_t: f64,
        cruise_t: f64,
        decel_t: f64,
        start_pos: Coord,
        axes_r: Coord,
        start_v: f64,
        cruise_v: f64,
        accel: f64,
    ) {
        let segments = [
            (accel_t, start_v, 0.5 * accel),
            (cruise_t, cruise_v, 0.0),
            (decel_t, cruise_v, -0.5 * accel),
        ];

        let mut cur_time = print_time;
        let mut cur_pos = start_pos;
        for (move_t, start_v, half_accel) in segments {
            if move_t <= 0.0 {
                continue;
            }
            let m = Move {
                print_time: cur_time,
                move_t,
                start_v,
                half_accel,
                start_pos: cur_pos,
                axes_r,
            };
            self.add_move(m);
            cur_time += move_t;
            cur_pos = m.coord_at(move_t);
        }
    }

    /// Drop every move that finished at or before `print_time`.
    pub fn finalize_moves(&mut self, print_time: f64) {
        while self.moves.len() > 2 && self.moves[1].end_time() <= print_time {
            self.moves.remove(1);
        }
        if self.moves.len() == 2 {
            self.park_tail();
        }
    }

    /// Moves between the sentinels, oldest first.
    pub fn active_moves(&self) -> Vec<&Move> {
        if self.moves.len() <= 2 {
            return Vec::new();
        }
        self.moves.range(1..self.tail_index()).collect()
    }

    /// Number of queued moves that carry motion (null gap fillers excluded).
    pub fn motion_len(&self) -> usize {
        self.active_moves().iter().filter(|m| !m.is_null()).count()
    }

    pub fn active_len(&self) -> usize {
        self.moves.len().saturating_sub(2)
    }

    pub fn tail_sentinel(&self) -> Move {
        self.moves[self.tail_index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const X_AXIS: Coord = Coord::new(1.0, 0.0, 0.0);

    #[test]
    fn coord_follows_trapezoid_distance() {
        let m = Move {
            print_time: 0.0,
            move_t: 2.0,
            start_v: 1.0,
            half_accel: 0.5,
            start_pos: Coord::new(1.0, 2.0, 0.0),
            axes_r: Coord::new(0.6, 0.8, 0.0),
        };
        // (1 + 0.5 * 2) * 2 = 4
        assert_eq!(m.distance_at(2.0), 4.0);
        let c = m.coord_at(2.0);
        assert!((c.x - (1.0 + 0.6 * 4.0)).abs() < 1e-12);
        assert!((c.y - (2.0 + 0.8 * 4.0)).abs() < 1e-12);
    }

    #[test]
    fn coord_extrapolates_past_move_end() {
        let m = Move {
            move_t: 1.0,
            start_v: 2.0,
            axes_r: X_AXIS,
            ..Move::default()
        };
        assert_eq!(m.coord_at(3.0).x, 6.0);
        assert_eq!(m.coord_at(-1.0).x, -2.0);
    }

    #[test]
    fn stationary_move_never_moves() {
        let m = Move::stationary(Coord::new(3.0, 4.0, 5.0));
        assert_eq!(m.coord_at(0.0), m.coord_at(500.0));
    }

    #[test]
    fn appends_segments_and_updates_sentinel() {
        let mut tq = TrapQueue::new();
        tq.append(0.0, 1.0, 2.0, 1.0, Coord::default(), X_AXIS, 0.0, 1.0, 2.0);
        // leading null move + 3 segments
        assert_eq!(tq.active_len(), 4);
        assert_eq!(tq.motion_len(), 3);
        tq.check_sentinels();
        let tail = tq.tail_sentinel();
        assert_eq!(tail.print_time, 4.0);
        assert!(tail.start_pos.x > 0.0);
    }

    #[test]
    fn inserts_null_move_for_gap() {
        let mut tq = TrapQueue::new();
        tq.add_move(Move {
            print_time: 0.0,
            move_t: 0.5,
            start_v: 1.0,
            axes_r: X_AXIS,
            ..Move::default()
        });
        tq.add_move(Move {
            print_time: 2.0,
            move_t: 0.5,
            start_v: 1.0,
            axes_r: X_AXIS,
            ..Move::default()
        });
        // leading null + m1 + gap null + m2
        assert_eq!(tq.active_len(), 4);
        assert_eq!(tq.motion_len(), 2);
        let gap = tq.active_moves()[2];
        assert_eq!(gap.print_time, 0.5);
        assert_eq!(gap.move_t, 1.5);
    }

    #[test]
    fn gap_after_move_at_time_zero_is_fully_bridged() {
        let mut tq = TrapQueue::new();
        tq.append(0.0, 0.0, 0.5, 0.0, Coord::default(), X_AXIS, 0.0, 1.0, 0.0);
        tq.append(3.0, 0.0, 0.5, 0.0, Coord::default(), X_AXIS, 0.0, 1.0, 0.0);
        let moves = tq.active_moves();
        for pair in moves.windows(2) {
            assert_eq!(pair[0].end_time(), pair[1].print_time);
        }
        let gap = moves[2];
        assert_eq!(gap.print_time, 0.5);
        assert_eq!(gap.move_t, 2.5);
    }

    #[test]
    fn leading_gap_is_capped() {
        let mut tq = TrapQueue::new();
        tq.add_move(Move {
            print_time: 5.0,
            move_t: 0.5,
            start_v: 1.0,
            axes_r: X_AXIS,
            ..Move::default()
        });
        let filler = tq.active_moves()[0];
        assert_eq!(filler.print_time, 4.0);
        assert_eq!(filler.move_t, MAX_NULL_MOVE);
    }

    #[test]
    fn finalize_drops_finished_moves() {
        let mut tq = TrapQueue::new();
        tq.append(0.0, 1.0, 0.0, 0.0, Coord::default(), X_AXIS, 0.5, 0.0, 1.0);
        tq.finalize_moves(0.5);
        assert_eq!(tq.active_len(), 1);
        tq.finalize_moves(2.0);
        assert_eq!(tq.active_len(), 0);
        tq.check_sentinels();
        assert_eq!(tq.tail_sentinel().print_time, NEVER_TIME);
    }
}
