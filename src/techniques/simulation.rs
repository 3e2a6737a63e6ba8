use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset, Utc};
use indicatif::ProgressBar;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::{
    ebi_framework::{infoable::Infoable, simulation_config::SimulationConfig},
    ebi_objects::{
        event_log::EventLog, labelled_petri_net::LabelledPetriNet,
        stochastic_parameters::StochasticParameters,
    },
    techniques::{
        parameter_estimation::EstimateParameters,
        token_game::{Run, RunOutcome, TokenGame},
    },
};

/// A simulated log, with what happened on the way.
#[derive(Clone, Debug)]
pub struct SimulationReport {
    pub log: EventLog,
    pub parameters: StochasticParameters,
    pub number_of_runs: usize,
    pub completed_attempts: usize,
    pub deadlocked_attempts: usize,
    pub step_limited_attempts: usize,
    pub timed_out_attempts: usize,

    /// Runs for which no attempt completed; they are not in the log.
    pub failed_runs: usize,
    pub clipped_delays: usize,
}

impl SimulationReport {
    pub fn get_failed_fraction(&self) -> f64 {
        if self.number_of_runs == 0 {
            0.0
        } else {
            self.failed_runs as f64 / self.number_of_runs as f64
        }
    }
}

impl Infoable for SimulationReport {
    fn info(&self, f: &mut impl std::io::Write) -> Result<()> {
        writeln!(f, "Number of runs\t\t\t{}", self.number_of_runs)?;
        writeln!(f, "Number of simulated traces\t{}", self.log.len())?;
        writeln!(f, "Completed attempts\t\t{}", self.completed_attempts)?;
        writeln!(f, "Deadlocked attempts\t\t{}", self.deadlocked_attempts)?;
        writeln!(f, "Step-limited attempts\t\t{}", self.step_limited_attempts)?;
        writeln!(f, "Timed-out attempts\t\t{}", self.timed_out_attempts)?;
        writeln!(f, "Failed runs\t\t\t{:.4}", self.get_failed_fraction())?;
        writeln!(f, "Clipped delays\t\t\t{}", self.clipped_delays)?;
        Ok(write!(f, "")?)
    }
}

pub trait Simulate {
    /// Learns the parameters of the net from the log, and simulates `number_of_traces` runs.
    fn simulate(
        &mut self,
        log: &EventLog,
        number_of_traces: usize,
        config: &SimulationConfig,
        progress_bar: Option<&ProgressBar>,
    ) -> Result<SimulationReport>;

    /**
     * Simulates `number_of_traces` runs of the token game with already-known parameters.
     *
     * Each run has its own marking, start time and random generator. With a seed, run i uses
     * seed + i, so the result does not depend on the number of threads. The traces are in run order.
     */
    fn simulate_with_parameters(
        &self,
        parameters: StochasticParameters,
        number_of_traces: usize,
        config: &SimulationConfig,
        progress_bar: Option<&ProgressBar>,
    ) -> Result<SimulationReport>;
}

impl Simulate for LabelledPetriNet {
    fn simulate(
        &mut self,
        log: &EventLog,
        number_of_traces: usize,
        config: &SimulationConfig,
        progress_bar: Option<&ProgressBar>,
    ) -> Result<SimulationReport> {
        let parameters = self
            .estimate_parameters(log, config)
            .context("estimating the parameters")?;
        self.simulate_with_parameters(parameters, number_of_traces, config, progress_bar)
    }

    fn simulate_with_parameters(
        &self,
        parameters: StochasticParameters,
        number_of_traces: usize,
        config: &SimulationConfig,
        progress_bar: Option<&ProgressBar>,
    ) -> Result<SimulationReport> {
        parameters.check(self)?;
        config.validate()?;

        log::info!(
            "simulate {} traces using the {} policy",
            number_of_traces,
            config.selection_policy
        );

        let runs = (0..number_of_traces)
            .into_par_iter()
            .map(|run_index| {
                let result = simulate_run(self, &parameters, config, run_index);
                if let Some(progress_bar) = progress_bar {
                    progress_bar.inc(1);
                }
                result
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(progress_bar) = progress_bar {
            progress_bar.finish_and_clear();
        }

        let mut report = SimulationReport {
            log: EventLog::new(self.get_activity_key().clone()),
            parameters,
            number_of_runs: number_of_traces,
            completed_attempts: 0,
            deadlocked_attempts: 0,
            step_limited_attempts: 0,
            timed_out_attempts: 0,
            failed_runs: 0,
            clipped_delays: 0,
        };

        for (run_index, attempts) in runs.into_iter().enumerate() {
            let mut completed = None;
            for attempt in attempts {
                report.clipped_delays += attempt.clipped_delays;
                match attempt.outcome {
                    RunOutcome::Completed => {
                        report.completed_attempts += 1;
                        completed = Some(attempt.trace);
                    }
                    RunOutcome::Deadlocked => report.deadlocked_attempts += 1,
                    RunOutcome::StepLimitExceeded => report.step_limited_attempts += 1,
                    RunOutcome::TimedOut => report.timed_out_attempts += 1,
                }
            }

            match completed {
                Some(trace) => report.log.push(trace),
                None => {
                    log::warn!(
                        "run {} did not reach the final marking in {} attempts",
                        run_index,
                        config.max_attempts_per_run
                    );
                    report.failed_runs += 1;
                }
            }
        }

        log::info!(
            "{} of {} runs completed",
            report.log.len(),
            report.number_of_runs
        );
        Ok(report)
    }
}

/// Attempts a run until it completes or the attempts are exhausted; returns all attempts.
fn simulate_run(
    net: &LabelledPetriNet,
    parameters: &StochasticParameters,
    config: &SimulationConfig,
    run_index: usize,
) -> Result<Vec<Run>> {
    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(run_index as u64)),
        None => ChaCha8Rng::from_entropy(),
    };

    let mut attempts = vec![];
    for attempt_index in 0..config.max_attempts_per_run {
        let start_time = get_start_time(config);
        let run = net
            .play(
                parameters,
                net.get_initial_marking(),
                net.get_final_marking(),
                config,
                start_time,
                &mut rng,
            )
            .with_context(|| format!("run {}, attempt {}", run_index, attempt_index))?;

        log::debug!(
            "run {} attempt {}: {} after {} steps",
            run_index,
            attempt_index,
            run.outcome,
            run.steps
        );

        let completed = run.is_completed();
        attempts.push(run);
        if completed {
            break;
        }
    }
    Ok(attempts)
}

fn get_start_time(config: &SimulationConfig) -> DateTime<FixedOffset> {
    config
        .start_time
        .unwrap_or_else(|| Utc::now().fixed_offset())
}

/**
 * Splits the log randomly into a train and a test part, learns the parameters on the train part and
 * simulates. The simulated log is shifted such that it starts with the first event of the test part.
 */
pub fn simulate_train_test(
    net: &mut LabelledPetriNet,
    log: &EventLog,
    number_of_traces: usize,
    train_fraction: f64,
    config: &SimulationConfig,
    progress_bar: Option<&ProgressBar>,
) -> Result<SimulationReport> {
    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let (train, test) = log.split(train_fraction, &mut rng)?;
    log::info!(
        "the log was split into {} train and {} test traces",
        train.len(),
        test.len()
    );

    let reference = test
        .get_first_timestamp()
        .ok_or_else(|| anyhow!("the test part of the log has no events to align with"))?;

    let mut report = net.simulate(&train, number_of_traces, config, progress_bar)?;
    report.log.align_start_to(reference)?;
    Ok(report)
}
