use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset};
use rand::{Rng, distributions::WeightedIndex, prelude::Distribution, seq::SliceRandom};
use serde::Deserialize;
use std::time::Instant;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    ebi_framework::simulation_config::SimulationConfig,
    ebi_objects::{
        event_log::{TimedEvent, TimedTrace, seconds_to_delta},
        labelled_petri_net::TransitionIndex,
        stochastic_parameters::StochasticParameters,
    },
    marking::Marking,
    semantics::semantics::Semantics,
};

/// How the next transition is chosen among the enabled ones.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Deserialize,
)]
pub enum SelectionPolicy {
    /// Draw proportionally to the firing probabilities; the delay comes from the chosen transition.
    #[default]
    #[strum(serialize = "weighted")]
    #[serde(rename = "weighted")]
    ProbabilityWeighted,

    /// Every enabled transition with a positive firing probability draws a delay; the fastest fires.
    #[strum(serialize = "race")]
    #[serde(rename = "race")]
    Race,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum RunOutcome {
    Completed,

    /// No transition could fire before the final marking was reached.
    Deadlocked,
    StepLimitExceeded,
    TimedOut,
}

/// The result of playing the token game once.
#[derive(Clone, Debug)]
pub struct Run {
    pub outcome: RunOutcome,

    /// The events of the labelled transitions that fired, in firing order.
    pub trace: TimedTrace,

    /// The marking in which the run ended.
    pub marking: Marking,
    pub steps: usize,
    pub clipped_delays: usize,
}

impl Run {
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

pub trait TokenGame {
    /**
     * Plays the token game from the initial marking until the final marking is reached exactly.
     * Every fired labelled transition emits an event, timestamped `start_time` plus the sum of the
     * delays so far. Silent transitions move the clock but leave no event.
     *
     * A run that gets stuck, takes too many steps or too much time ends with the corresponding
     * outcome rather than an error.
     */
    fn play<R: Rng + ?Sized>(
        &self,
        parameters: &StochasticParameters,
        initial_marking: &Marking,
        final_marking: &Marking,
        config: &SimulationConfig,
        start_time: DateTime<FixedOffset>,
        rng: &mut R,
    ) -> Result<Run>;
}

impl<T> TokenGame for T
where
    T: Semantics + ?Sized,
{
    fn play<R: Rng + ?Sized>(
        &self,
        parameters: &StochasticParameters,
        initial_marking: &Marking,
        final_marking: &Marking,
        config: &SimulationConfig,
        start_time: DateTime<FixedOffset>,
        rng: &mut R,
    ) -> Result<Run> {
        let started = Instant::now();
        let mut state = self
            .get_state(initial_marking)
            .context("the initial marking does not fit the net")?;
        let mut clock = 0.0f64;
        let mut trace = vec![];
        let mut steps = 0;
        let mut clipped_delays = 0;

        let outcome = loop {
            if self.is_state_marking(&state, final_marking) {
                break RunOutcome::Completed;
            }
            if steps >= config.max_steps {
                break RunOutcome::StepLimitExceeded;
            }
            if let Some(max_run_seconds) = config.max_run_seconds {
                if started.elapsed().as_secs_f64() > max_run_seconds {
                    break RunOutcome::TimedOut;
                }
            }

            let enabled = self.get_enabled_transitions(&state);
            if enabled.is_empty() {
                break RunOutcome::Deadlocked;
            }

            let (transition, delay) = match config.selection_policy {
                SelectionPolicy::ProbabilityWeighted => {
                    match select_weighted(self, parameters, &enabled, rng) {
                        Some(transition) => (
                            transition,
                            parameters.get_delay_model(transition).sample(rng),
                        ),
                        None => break RunOutcome::Deadlocked,
                    }
                }
                SelectionPolicy::Race => {
                    match select_race(self, parameters, config, enabled, rng) {
                        Some(winner) => winner,
                        None => break RunOutcome::Deadlocked,
                    }
                }
            };

            let clipped = clip(delay, config.delay_cap);
            if clipped != delay {
                log::trace!("delay {} clipped to {}", delay, clipped);
                clipped_delays += 1;
            }
            clock += clipped;

            if let Some(activity) = self.get_transition_activity(transition) {
                let timestamp = start_time
                    .checked_add_signed(seconds_to_delta(clock))
                    .ok_or_else(|| anyhow!("the simulated time {}s is out of range", clock))?;
                trace.push(TimedEvent {
                    activity,
                    timestamp,
                });
            }

            self.execute_transition(&mut state, transition)?;
            steps += 1;
        };

        Ok(Run {
            outcome,
            trace,
            marking: self.get_marking(&state).clone(),
            steps,
            clipped_delays,
        })
    }
}

/// Chooses among the enabled transitions proportionally to their firing probabilities.
/// Returns `None` if none of them has a positive probability.
fn select_weighted<T, R>(
    semantics: &T,
    parameters: &StochasticParameters,
    enabled: &[TransitionIndex],
    rng: &mut R,
) -> Option<TransitionIndex>
where
    T: Semantics + ?Sized,
    R: Rng + ?Sized,
{
    let weights = enabled
        .iter()
        .map(|transition| parameters.get_probability(*transition))
        .collect::<Vec<_>>();
    match WeightedIndex::new(&weights) {
        Ok(distribution) => Some(enabled[distribution.sample(rng)]),
        Err(_) => {
            log::debug!(
                "none of the enabled transitions {:?} of {} transitions can fire",
                enabled,
                semantics.get_number_of_transitions()
            );
            None
        }
    }
}

/// Lets the enabled transitions race: each draws a delay and the smallest wins, ties going to the
/// first in a random order. Silent transitions race with a fixed delay, but when they win, the clock
/// moves by their own delay. Transitions with a zero firing probability do not take part; if none
/// is left, `None` is returned.
fn select_race<T, R>(
    semantics: &T,
    parameters: &StochasticParameters,
    config: &SimulationConfig,
    mut enabled: Vec<TransitionIndex>,
    rng: &mut R,
) -> Option<(TransitionIndex, f64)>
where
    T: Semantics + ?Sized,
    R: Rng + ?Sized,
{
    enabled.retain(|transition| parameters.get_probability(*transition) > 0.0);
    if enabled.is_empty() {
        log::debug!(
            "none of the enabled transitions of {} transitions can fire",
            semantics.get_number_of_transitions()
        );
        return None;
    }
    enabled.shuffle(rng);

    let mut winner: Option<(TransitionIndex, f64, f64)> = None;
    for transition in enabled {
        let (candidate, delay) = if semantics.is_transition_silent(transition) {
            (
                config.silent_race_delay,
                parameters.get_delay_model(transition).sample(rng),
            )
        } else {
            let delay = parameters.get_delay_model(transition).sample(rng);
            (clip(delay, config.delay_cap), delay)
        };

        match winner {
            Some((_, best, _)) if candidate >= best => {}
            _ => winner = Some((transition, candidate, delay)),
        }
    }

    winner.map(|(transition, _, delay)| (transition, delay))
}

fn clip(delay: f64, delay_cap: f64) -> f64 {
    if delay.is_nan() {
        0.0
    } else {
        delay.clamp(0.0, delay_cap)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{DateTime, TimeDelta};
    use ntest::timeout;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use crate::{
        ebi_framework::simulation_config::SimulationConfig,
        ebi_objects::{
            labelled_petri_net::LabelledPetriNet, stochastic_parameters::StochasticParameters,
        },
        math::delay_model::DelayModel,
    };

    use super::{RunOutcome, SelectionPolicy, TokenGame};

    fn start() -> DateTime<chrono::FixedOffset> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap()
    }

    fn net(file: &str) -> LabelledPetriNet {
        fs::read_to_string(format!("testfiles/{}", file))
            .unwrap()
            .parse::<LabelledPetriNet>()
            .unwrap()
    }

    #[test]
    fn play_sequence_without_delays() {
        let lpn = net("sequence.alpn");
        let parameters = StochasticParameters::uniform(&lpn);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let run = lpn
            .play(
                &parameters,
                lpn.get_initial_marking(),
                lpn.get_final_marking(),
                &SimulationConfig::default(),
                start(),
                &mut rng,
            )
            .unwrap();

        assert_eq!(run.outcome, RunOutcome::Completed);
        assert_eq!(&run.marking, lpn.get_final_marking());
        assert_eq!(
            lpn.get_activity_key().deprocess_trace(
                &run.trace.iter().map(|event| event.activity).collect::<Vec<_>>()
            ),
            vec!["A", "B", "C"]
        );
        assert!(run.trace.iter().all(|event| event.timestamp == start()));
        assert_eq!(run.steps, 4);
    }

    #[test]
    fn play_initial_is_final() {
        let lpn = net("initial-is-final.alpn");
        let parameters = StochasticParameters::uniform(&lpn);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let run = lpn
            .play(
                &parameters,
                lpn.get_initial_marking(),
                lpn.get_final_marking(),
                &SimulationConfig::default(),
                start(),
                &mut rng,
            )
            .unwrap();
        assert!(run.is_completed());
        assert!(run.trace.is_empty());
    }

    #[test]
    #[timeout(5000)]
    fn play_starved_place() {
        let lpn = net("a-bc-d.alpn");
        let parameters = StochasticParameters::new(
            &lpn,
            vec![1.0, 0.0, 0.0, 1.0],
            vec![DelayModel::zero(); 4],
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let run = lpn
            .play(
                &parameters,
                lpn.get_initial_marking(),
                lpn.get_final_marking(),
                &SimulationConfig::default(),
                start(),
                &mut rng,
            )
            .unwrap();
        assert_eq!(run.outcome, RunOutcome::Deadlocked);
        assert_eq!(run.trace.len(), 1);
    }

    #[test]
    #[timeout(5000)]
    fn play_race_starved_place() {
        let lpn = net("a-bc-d.alpn");
        let parameters = StochasticParameters::new(
            &lpn,
            vec![1.0, 0.0, 0.0, 1.0],
            vec![DelayModel::zero(); 4],
        )
        .unwrap();
        let config = SimulationConfig {
            selection_policy: SelectionPolicy::Race,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let run = lpn
            .play(
                &parameters,
                lpn.get_initial_marking(),
                lpn.get_final_marking(),
                &config,
                start(),
                &mut rng,
            )
            .unwrap();
        assert_eq!(run.outcome, RunOutcome::Deadlocked);
        assert_eq!(run.trace.len(), 1);
    }

    #[test]
    #[timeout(5000)]
    fn play_dead_end() {
        let lpn = net("dead-end.alpn");
        let parameters = StochasticParameters::new(
            &lpn,
            vec![0.0, 1.0, 1.0],
            vec![DelayModel::zero(); 3],
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let run = lpn
            .play(
                &parameters,
                lpn.get_initial_marking(),
                lpn.get_final_marking(),
                &SimulationConfig::default(),
                start(),
                &mut rng,
            )
            .unwrap();
        assert_eq!(run.outcome, RunOutcome::Deadlocked);
        assert_eq!(run.marking.get_tokens(2), 1);
    }

    #[test]
    #[timeout(5000)]
    fn play_step_limit() {
        let lpn = net("loop.alpn");
        //the loop is always taken
        let parameters = StochasticParameters::new(
            &lpn,
            vec![1.0, 1.0, 1.0, 0.0],
            vec![DelayModel::zero(); 4],
        )
        .unwrap();
        let config = SimulationConfig {
            max_steps: 100,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let run = lpn
            .play(
                &parameters,
                lpn.get_initial_marking(),
                lpn.get_final_marking(),
                &config,
                start(),
                &mut rng,
            )
            .unwrap();
        assert_eq!(run.outcome, RunOutcome::StepLimitExceeded);
        assert_eq!(run.steps, 100);
    }

    #[test]
    #[timeout(10000)]
    fn play_time_limit() {
        let lpn = net("loop.alpn");
        let parameters = StochasticParameters::new(
            &lpn,
            vec![1.0, 1.0, 1.0, 0.0],
            vec![DelayModel::zero(); 4],
        )
        .unwrap();
        let config = SimulationConfig {
            max_steps: usize::MAX,
            max_run_seconds: Some(0.01),
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let run = lpn
            .play(
                &parameters,
                lpn.get_initial_marking(),
                lpn.get_final_marking(),
                &config,
                start(),
                &mut rng,
            )
            .unwrap();
        assert_eq!(run.outcome, RunOutcome::TimedOut);
    }

    #[test]
    fn play_clips_delays() {
        let lpn = net("a-bc-d.alpn");
        let parameters = StochasticParameters::new(
            &lpn,
            vec![1.0, 1.0, 0.0, 1.0],
            vec![
                DelayModel::Degenerate { value: -5.0 },
                DelayModel::Degenerate { value: 1e12 },
                DelayModel::zero(),
                DelayModel::Degenerate { value: f64::NAN },
            ],
        )
        .unwrap();
        let config = SimulationConfig {
            delay_cap: 100.0,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let run = lpn
            .play(
                &parameters,
                lpn.get_initial_marking(),
                lpn.get_final_marking(),
                &config,
                start(),
                &mut rng,
            )
            .unwrap();
        assert!(run.is_completed());
        assert_eq!(run.clipped_delays, 3);
        assert_eq!(run.trace[0].timestamp, start());
        assert_eq!(run.trace[1].timestamp, start() + TimeDelta::seconds(100));
        assert_eq!(run.trace[2].timestamp, start() + TimeDelta::seconds(100));
    }

    #[test]
    fn play_race() {
        let lpn = net("parallel.alpn");
        let parameters = StochasticParameters::new(
            &lpn,
            vec![1.0; 6],
            vec![
                DelayModel::Degenerate { value: 1.0 },
                DelayModel::zero(),
                DelayModel::Degenerate { value: 2.0 },
                DelayModel::Degenerate { value: 3.0 },
                DelayModel::zero(),
                DelayModel::Degenerate { value: 1.0 },
            ],
        )
        .unwrap();
        let config = SimulationConfig {
            selection_policy: SelectionPolicy::Race,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let run = lpn
            .play(
                &parameters,
                lpn.get_initial_marking(),
                lpn.get_final_marking(),
                &config,
                start(),
                &mut rng,
            )
            .unwrap();
        assert!(run.is_completed());

        let labels = lpn.get_activity_key().deprocess_trace(
            &run.trace.iter().map(|event| event.activity).collect::<Vec<_>>(),
        );
        assert_eq!(labels, vec!["A", "B", "C", "D"]);
        let offsets = run
            .trace
            .iter()
            .map(|event| (event.timestamp - start()).num_seconds())
            .collect::<Vec<_>>();
        assert_eq!(offsets, vec![1, 3, 6, 7]);
    }

    #[test]
    fn play_race_skips_unobserved_choice() {
        let lpn = net("a-bc-d.alpn");
        //C never fired and races with a zero delay, B is slow
        let parameters = StochasticParameters::new(
            &lpn,
            vec![1.0, 1.0, 0.0, 1.0],
            vec![
                DelayModel::zero(),
                DelayModel::Degenerate { value: 5.0 },
                DelayModel::zero(),
                DelayModel::zero(),
            ],
        )
        .unwrap();
        let config = SimulationConfig {
            selection_policy: SelectionPolicy::Race,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for _ in 0..50 {
            let run = lpn
                .play(
                    &parameters,
                    lpn.get_initial_marking(),
                    lpn.get_final_marking(),
                    &config,
                    start(),
                    &mut rng,
                )
                .unwrap();
            assert!(run.is_completed());
            assert_eq!(
                lpn.get_activity_key().deprocess_trace(
                    &run.trace.iter().map(|event| event.activity).collect::<Vec<_>>()
                ),
                vec!["A", "B", "D"]
            );
        }
    }

    #[test]
    fn policy_names() {
        assert_eq!(
            "race".parse::<SelectionPolicy>().unwrap(),
            SelectionPolicy::Race
        );
        assert_eq!(SelectionPolicy::ProbabilityWeighted.to_string(), "weighted");
    }
}
