use crate::{config::Config, plan};
use anyhow::{Context, Result};
use clap::Args;
use polarkin_core::{
    itersolve::IterativeSolver,
    kinematics::PolarKin,
    step_sink::{StepRecorder, StepSink},
};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Args)]
pub struct SimulateArgs {
    /// Path to the configuration file (TOML or JSON).
    pub config: PathBuf,

    /// Seconds of motion solved per flush.
    #[arg(long, default_value_t = 0.5)]
    pub flush_interval: f64,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub moves: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub steppers: Vec<StepperReport>,
}

#[derive(Debug, Serialize)]
pub struct StepperReport {
    pub name: String,
    pub axis: char,
    pub steps: usize,
    pub net_steps: i64,
    pub dir_changes: usize,
    pub commanded_pos: f64,
    pub first_step_time: Option<f64>,
    pub last_step_time: Option<f64>,
}

impl SimulateArgs {
    pub fn run(&self) -> Result<()> {
        // Logs go to stderr so the report can be piped
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();

        if !(self.flush_interval.is_finite() && self.flush_interval > 0.0) {
            anyhow::bail!("--flush-interval must be positive");
        }

        let config = Config::from_file(&self.config)?;
        config.validate()?;
        tracing::info!("Simulating {}", self.config.display());

        let report = simulate(&config, self.flush_interval)?;

        if self.json {
            let out = serde_json::to_string_pretty(&report).context("failed to encode report")?;
            println!("{out}");
            return Ok(());
        }

        println!(
            "{} moves, {:.6}s to {:.6}s",
            report.moves, report.start_time, report.end_time
        );
        for s in &report.steppers {
            println!(
                "{} ({}): {} steps, net {}, {} direction changes, position {:.6}",
                s.name, s.axis, s.steps, s.net_steps, s.dir_changes, s.commanded_pos
            );
        }
        Ok(())
    }
}

/// Run every configured move through every stepper.
pub fn simulate(config: &Config, flush_interval: f64) -> Result<Report> {
    let mut plan = plan::plan(&config.start, &config.moves);
    plan.trapq.check_sentinels();
    let [x, y, z] = config.start.position;

    let mut steppers = Vec::with_capacity(config.steppers.len());
    for stepper in &config.steppers {
        let kin = PolarKin::alloc(stepper.axis);
        if kin.axis().is_none() {
            anyhow::bail!(
                "stepper {:?}: unknown polar axis selector {:?}",
                stepper.name,
                stepper.axis
            );
        }

        let mut solver = IterativeSolver::new(stepper.step_distance, kin);
        solver.set_position(x, y, z);
        steppers.push((stepper, solver, StepRecorder::new()));
    }

    if plan.end_time + flush_interval <= plan.end_time {
        anyhow::bail!(
            "--flush-interval {flush_interval} is too small to advance past {}",
            plan.end_time
        );
    }

    let mut flush_time = plan.start_time;
    while flush_time < plan.end_time {
        let next = (flush_time + flush_interval).min(plan.end_time);
        if next <= flush_time {
            anyhow::bail!(
                "--flush-interval {flush_interval} is too small to advance past {flush_time}"
            );
        }
        flush_time = next;

        for (stepper, solver, sink) in &mut steppers {
            solver
                .generate_steps(sink, &plan.trapq, flush_time)
                .with_context(|| {
                    format!("stepper {:?}: step generation failed at {flush_time}", stepper.name)
                })?;
        }
        plan.trapq.finalize_moves(flush_time);
    }

    let mut reports = Vec::with_capacity(steppers.len());
    for (stepper, solver, mut sink) in steppers {
        sink.commit()?;

        tracing::info!(
            stepper = %stepper.name,
            steps = sink.steps().len(),
            position = solver.commanded_pos(),
            "steps generated"
        );

        reports.push(StepperReport {
            name: stepper.name.clone(),
            axis: stepper.axis,
            steps: sink.steps().len(),
            net_steps: sink.position(),
            dir_changes: sink.dir_changes(),
            commanded_pos: solver.commanded_pos(),
            first_step_time: sink.steps().first().map(|s| s.print_time),
            last_step_time: sink.steps().last().map(|s| s.print_time),
        });
    }

    Ok(Report {
        moves: plan.moves,
        start_time: plan.start_time,
        end_time: plan.end_time,
        steppers: reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    // Three quarters of a circle of radius 10 around the bed center, as
    // 15 degree chords from (10, 0) counter-clockwise through (-10, 0) to
    // (0, -10)
    fn arc_config() -> Config {
        let mut toml = String::from(
            r#"
[[stepper]]
name = "stepper_arm"
axis = "r"
step_distance = 0.01

[[stepper]]
name = "stepper_bed"
axis = "a"
step_distance = 0.001

[start]
position = [10.0, 0.0, 0.0]
"#,
        );
        for i in 1..=18 {
            let theta = i as f64 * PI / 12.0;
            toml.push_str(&format!(
                "\n[[move]]\nto = [{:.12}, {:.12}, 0.0]\nvelocity = 100.0\n",
                10.0 * theta.cos(),
                10.0 * theta.sin()
            ));
        }
        Config::from_toml(&toml).unwrap()
    }

    #[test]
    fn bed_rotates_continuously_through_the_seam() {
        let config = arc_config();
        config.validate().unwrap();
        let report = simulate(&config, 0.05).unwrap();

        assert_eq!(report.moves, 18);
        let bed = &report.steppers[1];
        assert_eq!(bed.axis, 'a');
        assert_eq!(bed.dir_changes, 0);
        // past PI rather than wrapping around to -PI/2
        assert_abs_diff_eq!(bed.commanded_pos, 1.5 * PI, epsilon = 0.001);
        assert_eq!(bed.net_steps, bed.steps as i64);
    }

    #[test]
    fn arm_follows_each_chord_in_and_out() {
        let config = arc_config();
        let report = simulate(&config, 0.05).unwrap();

        let arm = &report.steppers[0];
        assert_eq!(arm.axis, 'r');
        // each chord sags about 0.086mm toward the center
        assert_eq!(arm.dir_changes, 2 * 18 - 1);
        assert_eq!(arm.net_steps, 0);
        assert_abs_diff_eq!(arm.commanded_pos, 10.0, epsilon = 0.005);
    }

    #[test]
    fn flush_interval_does_not_change_result() {
        let config = arc_config();
        let coarse = simulate(&config, 1.0).unwrap();
        let fine = simulate(&config, 0.01).unwrap();
        for (a, b) in coarse.steppers.iter().zip(&fine.steppers) {
            assert_eq!(a.steps, b.steps);
            assert_eq!(a.net_steps, b.net_steps);
            assert_abs_diff_eq!(a.commanded_pos, b.commanded_pos, epsilon = 1e-9);
        }
    }

    #[test]
    fn flush_interval_below_time_resolution_is_rejected() {
        let config = arc_config();
        let err = simulate(&config, 1e-300).unwrap_err();
        assert!(err.to_string().contains("too small to advance"));
    }

    #[test]
    fn unknown_axis_is_reported() {
        let mut config = arc_config();
        config.steppers[0].axis = 'q';
        let err = simulate(&config, 0.5).unwrap_err();
        assert!(err.to_string().contains("unknown polar axis selector 'q'"));
    }
}
