// Kinematics for polar printers

use thiserror::Error;

pub mod polar;

pub use polar::{PolarAxis, PolarKin};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KinematicsError {
    #[error("unknown polar axis selector {0:?}, expected 'r' or 'a'")]
    UnknownSelector(char),
}
