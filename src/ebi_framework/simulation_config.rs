use anyhow::{Context, Error, Result, anyhow};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::{
    io::{self, BufRead},
    str::FromStr,
};

use crate::{
    ebi_framework::{importable::Importable, infoable::Infoable},
    techniques::token_game::SelectionPolicy,
};

pub const DEFAULT_DELAY_CAP: f64 = 1e8;
pub const DEFAULT_SILENT_RACE_DELAY: f64 = 1e6;
pub const DEFAULT_MIN_SAMPLES_FOR_FITTING: usize = 30;

pub const DEFAULT_PARSIMONY_MARGIN: f64 = 0.05;

/// Settings of estimation and simulation.
/// In a configuration file, every field is optional and unknown fields are refused.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Runs are reproducible if a seed is given.
    pub seed: Option<u64>,
    pub selection_policy: SelectionPolicy,

    /// A run that fires more transitions than this is abandoned.
    pub max_steps: usize,

    /// Sampled delays are clipped to [0, delay_cap] seconds.
    pub delay_cap: f64,

    /// Delay with which silent transitions take part in a race.
    pub silent_race_delay: f64,

    /// How often a run is attempted before it is given up.
    pub max_attempts_per_run: usize,

    /// Wall-clock budget of a single attempt.
    pub max_run_seconds: Option<f64>,

    pub min_samples_for_fitting: usize,

    /// How much lower the Kolmogorov-Smirnov statistic of a two-parameter family has to be to be
    /// preferred over the exponential family.
    pub parsimony_margin: f64,
    pub include_normal: bool,

    /// Replay does not explore markings with more tokens in a place than this.
    pub max_tokens_per_place: u64,

    /// Start of every simulated trace; the current time if not given.
    pub start_time: Option<DateTime<FixedOffset>>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            selection_policy: SelectionPolicy::default(),
            max_steps: 10000,
            delay_cap: DEFAULT_DELAY_CAP,
            silent_race_delay: DEFAULT_SILENT_RACE_DELAY,
            max_attempts_per_run: 1,
            max_run_seconds: None,
            min_samples_for_fitting: DEFAULT_MIN_SAMPLES_FOR_FITTING,
            parsimony_margin: DEFAULT_PARSIMONY_MARGIN,
            include_normal: true,
            max_tokens_per_place: 1000,
            start_time: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.delay_cap >= 0.0) {
            return Err(anyhow!("delay_cap should be non-negative"));
        }
        if !(self.silent_race_delay >= 0.0) {
            return Err(anyhow!("silent_race_delay should be non-negative"));
        }
        if self.max_attempts_per_run == 0 {
            return Err(anyhow!("max_attempts_per_run should be at least 1"));
        }
        if let Some(seconds) = self.max_run_seconds {
            if !(seconds > 0.0) {
                return Err(anyhow!("max_run_seconds should be positive"));
            }
        }
        if !(self.parsimony_margin >= 0.0) {
            return Err(anyhow!("parsimony_margin should be non-negative"));
        }
        if self.max_tokens_per_place == 0 {
            return Err(anyhow!("max_tokens_per_place should be at least 1"));
        }
        Ok(())
    }
}

impl Importable for SimulationConfig {
    fn import(reader: &mut dyn BufRead) -> Result<Self> {
        let result: Self =
            serde_json::from_reader(reader).context("the configuration could not be read")?;
        result.validate()?;
        Ok(result)
    }
}

impl FromStr for SimulationConfig {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut reader = io::Cursor::new(s);
        Self::import(&mut reader)
    }
}

impl Infoable for SimulationConfig {
    fn info(&self, f: &mut impl std::io::Write) -> Result<()> {
        match self.seed {
            Some(seed) => writeln!(f, "Seed\t\t\t\t{}", seed)?,
            None => writeln!(f, "Seed\t\t\t\tnone")?,
        }
        writeln!(f, "Selection policy\t\t{}", self.selection_policy)?;
        writeln!(f, "Maximum steps\t\t\t{}", self.max_steps)?;
        writeln!(f, "Delay cap\t\t\t{}", self.delay_cap)?;
        writeln!(f, "Attempts per run\t\t{}", self.max_attempts_per_run)?;
        writeln!(f, "Minimum samples for fitting\t{}", self.min_samples_for_fitting)?;
        Ok(write!(f, "")?)
    }
}
