//! Destinations for the step times found by the iterative solver.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StepSinkError {
    #[error("step time {time} is not finite")]
    NonFinite { time: f64 },
    #[error("step at {time} precedes previous step at {previous}")]
    TimeReversal { previous: f64, time: f64 },
}

pub type Result<T> = std::result::Result<T, StepSinkError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepDir {
    Forward,
    Backward,
}

impl StepDir {
    pub fn is_forward(self) -> bool {
        matches!(self, Self::Forward)
    }

    pub fn reverse(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }

    /// Signed step count contributed by one step in this direction.
    pub fn delta(self) -> i64 {
        match self {
            Self::Forward => 1,
            Self::Backward => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub dir: StepDir,
    /// Absolute time of the step.
    pub print_time: f64,
}

pub trait StepSink {
    /// Queue a step found `step_time` seconds into a move starting at
    /// `move_print_time`.
    fn append(&mut self, dir: StepDir, move_print_time: f64, step_time: f64) -> Result<()>;

    /// Mark every queued step as final.
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Direction of the most recent step, if any.
    fn last_dir(&self) -> Option<StepDir>;
}

/// Keeps every step in memory.
#[derive(Debug, Default)]
pub struct StepRecorder {
    steps: Vec<Step>,
    position: i64,
    dir_changes: usize,
    committed: usize,
}

impl StepRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Net step count, forward steps minus backward steps.
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn dir_changes(&self) -> usize {
        self.dir_changes
    }

    /// Steps that have been committed.
    pub fn committed(&self) -> &[Step] {
        &self.steps[..self.committed]
    }
}

impl StepSink for StepRecorder {
    fn append(&mut self, dir: StepDir, move_print_time: f64, step_time: f64) -> Result<()> {
        let time = move_print_time + step_time;
        if !time.is_finite() {
            return Err(StepSinkError::NonFinite { time });
        }
        if let Some(last) = self.steps.last() {
            if time < last.print_time {
                return Err(StepSinkError::TimeReversal {
                    previous: last.print_time,
                    time,
                });
            }
            if last.dir != dir {
                self.dir_changes += 1;
            }
        }
        self.position += dir.delta();
        self.steps.push(Step {
            dir,
            print_time: time,
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.committed = self.steps.len();
        Ok(())
    }

    fn last_dir(&self) -> Option<StepDir> {
        self.steps.last().map(|s| s.dir)
    }
}
