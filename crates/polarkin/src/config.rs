use anyhow::{Context, Result};
use polarkin_core::kinematics::PolarAxis;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs, path::Path};

/// Simulation input: the polar steppers and the moves to run through them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Steppers driven by the moves
    #[serde(rename = "stepper", default)]
    pub steppers: Vec<StepperConfig>,

    /// Toolhead state before the first move
    #[serde(default)]
    pub start: StartConfig,

    /// Moves, executed back to back
    #[serde(rename = "move", default)]
    pub moves: Vec<MoveConfig>,
}

/// One polar stepper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepperConfig {
    pub name: String,

    /// `'r'` for the radial arm, `'a'` for the rotating bed
    pub axis: char,

    /// Millimeters per step on the radial axis, radians per step on the
    /// angular axis
    pub step_distance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartConfig {
    #[serde(default)]
    pub position: [f64; 3],

    #[serde(default)]
    pub print_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveConfig {
    /// Cartesian end point
    pub to: [f64; 3],

    /// Cruise velocity in mm/s
    #[serde(default = "default_velocity")]
    pub velocity: f64,

    /// Acceleration in mm/s^2; the move runs at constant velocity when unset
    #[serde(default)]
    pub accel: Option<f64>,
}

fn default_velocity() -> f64 {
    50.0
}

impl Config {
    /// Load configuration from a file, auto-detecting TOML or JSON format
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content).or_else(|_| Self::from_json(&content)),
        }
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse config as TOML")
    }

    /// Parse configuration from JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("failed to parse config as JSON")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.steppers.is_empty() {
            anyhow::bail!("at least one [[stepper]] is required");
        }

        let mut names = HashSet::new();
        for stepper in &self.steppers {
            if stepper.name.is_empty() {
                anyhow::bail!("stepper.name cannot be empty");
            }
            if !names.insert(stepper.name.as_str()) {
                anyhow::bail!("duplicate stepper name {:?}", stepper.name);
            }
            stepper.polar_axis()?;
            if !(stepper.step_distance.is_finite() && stepper.step_distance > 0.0) {
                anyhow::bail!(
                    "stepper {:?}: step_distance must be positive, got {}",
                    stepper.name,
                    stepper.step_distance
                );
            }
        }

        if !self.start.position.iter().all(|v| v.is_finite()) {
            anyhow::bail!("start.position must be finite");
        }

        for (idx, m) in self.moves.iter().enumerate() {
            if !m.to.iter().all(|v| v.is_finite()) {
                anyhow::bail!("move {idx}: target must be finite");
            }
            if !(m.velocity.is_finite() && m.velocity > 0.0) {
                anyhow::bail!("move {idx}: velocity must be positive, got {}", m.velocity);
            }
            if let Some(accel) = m.accel
                && !(accel.is_finite() && accel > 0.0)
            {
                anyhow::bail!("move {idx}: accel must be positive, got {accel}");
            }
        }

        Ok(())
    }
}

impl StepperConfig {
    pub fn polar_axis(&self) -> Result<PolarAxis> {
        PolarAxis::try_from(self.axis).with_context(|| format!("stepper {:?}", self.name))
    }
}
