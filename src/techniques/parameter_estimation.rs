use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;

use crate::{
    ebi_framework::{activity_key::Activity, simulation_config::SimulationConfig},
    ebi_objects::{
        event_log::{EventLog, TimedTrace, seconds_between},
        labelled_petri_net::{LabelledPetriNet, TransitionIndex},
        stochastic_parameters::{EstimationSummary, StochasticParameters},
    },
    math::delay_model::DelayModel,
    techniques::{
        distribution_fitting::{self, Fit},
        predecessors::Predecessors,
        token_replay::Replay,
    },
};

pub trait EstimateParameters {
    /**
     * Learns the firing probabilities and waiting-time models of the net from the log.
     *
     * Only traces that replay perfectly on the net, from its initial to its final marking, are used.
     * The activities of the log are added to the activity key of the net.
     */
    fn estimate_parameters(
        &mut self,
        log: &EventLog,
        config: &SimulationConfig,
    ) -> Result<StochasticParameters>;
}

impl EstimateParameters for LabelledPetriNet {
    fn estimate_parameters(
        &mut self,
        log: &EventLog,
        config: &SimulationConfig,
    ) -> Result<StochasticParameters> {
        let mut log = log.clone();
        log.translate_using_activity_key(self.get_activity_key_mut());
        let net: &LabelledPetriNet = self;

        log::info!("replay {} traces", log.len());
        let replays = log
            .iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .enumerate()
            .map(|(trace_index, trace)| {
                let activities = trace.iter().map(|event| event.activity).collect::<Vec<_>>();
                net.replay_trace(
                    &activities,
                    net.get_initial_marking(),
                    net.get_final_marking(),
                    config.max_tokens_per_place,
                )
                .with_context(|| format!("replaying trace {}", trace_index))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut accepted: Vec<(&TimedTrace, Vec<TransitionIndex>)> = vec![];
        for (trace_index, (trace, replay)) in log.iter().zip(replays).enumerate() {
            match replay.fired_transitions {
                Some(fired) => accepted.push((trace, fired)),
                None => log::debug!(
                    "trace {} is skipped, as its fitness is {:.4}",
                    trace_index,
                    replay.fitness
                ),
            }
        }
        log::info!(
            "{} of {} traces replay on the net",
            accepted.len(),
            log.len()
        );

        let (transition2probability, place2probabilities, starved_places) =
            estimate_probabilities(net, &accepted);

        let accepted_traces = accepted.iter().map(|(trace, _)| *trace).collect::<Vec<_>>();
        let transition2samples = (0..net.get_number_of_transitions())
            .into_par_iter()
            .map(|transition| collect_delays(net, transition, &accepted_traces))
            .collect::<Vec<_>>();

        let fits = transition2samples
            .par_iter()
            .map(|samples| distribution_fitting::fit(samples, config))
            .collect::<Vec<Fit>>();

        for (transition, (samples, fit)) in transition2samples.iter().zip(fits.iter()).enumerate() {
            log::debug!(
                "transition {}: probability {:.4}, {} delays, {}",
                net.get_transition_name(transition),
                transition2probability[transition],
                samples.len(),
                fit.model
            );
        }

        let summary = EstimationSummary {
            number_of_traces: log.len(),
            number_of_accepted_traces: accepted.len(),
            starved_places,
            transition2samples: transition2samples.iter().map(Vec::len).collect(),
            transition2ks_statistic: fits.iter().map(|fit| fit.ks_statistic).collect(),
        };

        Ok(StochasticParameters {
            transition2probability,
            place2probabilities,
            transition2delay: fits.into_iter().map(|fit| fit.model).collect::<Vec<DelayModel>>(),
            summary,
        })
    }
}

/**
 * Counts how often each transition fired in the accepted replays, and normalises the counts per
 * place over the transitions that consume from it. A place whose transitions never fired is starved:
 * all its transitions get probability 0.
 *
 * A transition with several input places takes the lowest of its conditional probabilities; a
 * transition without input places gets 0.
 */
pub fn estimate_probabilities(
    net: &LabelledPetriNet,
    accepted: &[(&TimedTrace, Vec<TransitionIndex>)],
) -> (Vec<f64>, Vec<Vec<(TransitionIndex, f64)>>, Vec<usize>) {
    let mut transition2frequency = vec![0u64; net.get_number_of_transitions()];
    for (_, fired) in accepted {
        for transition in fired {
            transition2frequency[*transition] += 1;
        }
    }

    let mut starved_places = vec![];
    let place2probabilities = (0..net.get_number_of_places())
        .map(|place| {
            let outputs = net.get_output_transitions(place);
            let total = outputs
                .iter()
                .map(|transition| transition2frequency[*transition])
                .sum::<u64>();
            if total == 0 {
                if !outputs.is_empty() {
                    log::warn!(
                        "none of the transitions after place p{} fired in the log, so the place is starved",
                        place
                    );
                    starved_places.push(place);
                }
                outputs.iter().map(|transition| (*transition, 0.0)).collect()
            } else {
                outputs
                    .iter()
                    .map(|transition| {
                        (
                            *transition,
                            transition2frequency[*transition] as f64 / total as f64,
                        )
                    })
                    .collect::<Vec<_>>()
            }
        })
        .collect::<Vec<_>>();

    let transition2probability = (0..net.get_number_of_transitions())
        .map(|transition| {
            net.get_input_places(transition)
                .iter()
                .filter_map(|place| {
                    place2probabilities[*place]
                        .iter()
                        .find(|(t, _)| *t == transition)
                        .map(|(_, probability)| *probability)
                })
                .reduce(f64::min)
                .unwrap_or(0.0)
        })
        .collect();

    (transition2probability, place2probabilities, starved_places)
}

/**
 * Gathers the waiting times before a labelled transition.
 *
 * For a single predecessor u, every pair of consecutive events (u, t) contributes its delay.
 * For a group of synchronising predecessors, a trace contributes the smallest non-negative delay
 * between the last occurrence of t and any occurrence of a group member.
 */
pub fn collect_delays(
    net: &LabelledPetriNet,
    transition: TransitionIndex,
    traces: &[&TimedTrace],
) -> Vec<f64> {
    let activity = match net.get_transition_label(transition) {
        Some(activity) => activity,
        None => return vec![],
    };

    let mut single_predecessors: HashSet<Activity> = HashSet::new();
    let mut result = vec![];
    for group in net.find_predecessor_groups(transition) {
        let group_activities = group
            .iter()
            .filter_map(|t| net.get_transition_label(*t))
            .collect::<HashSet<_>>();

        if group.len() == 1 {
            if let Some(predecessor) = group_activities.iter().next() {
                //the same label may be reached along several paths
                if single_predecessors.insert(*predecessor) {
                    collect_directly_follows_delays(*predecessor, activity, traces, &mut result);
                }
            }
        } else {
            collect_synchronised_delays(&group_activities, activity, traces, &mut result);
        }
    }
    result
}

fn collect_directly_follows_delays(
    predecessor: Activity,
    activity: Activity,
    traces: &[&TimedTrace],
    result: &mut Vec<f64>,
) {
    for trace in traces {
        for pair in trace.windows(2) {
            if pair[0].activity == predecessor && pair[1].activity == activity {
                result.push(seconds_between(&pair[0].timestamp, &pair[1].timestamp));
            }
        }
    }
}

fn collect_synchronised_delays(
    group: &HashSet<Activity>,
    activity: Activity,
    traces: &[&TimedTrace],
    result: &mut Vec<f64>,
) {
    for trace in traces {
        let last = match trace.iter().rev().find(|event| event.activity == activity) {
            Some(event) => event.timestamp,
            None => continue,
        };

        let delay = trace
            .iter()
            .filter(|event| group.contains(&event.activity))
            .map(|event| seconds_between(&event.timestamp, &last))
            .filter(|delay| *delay >= 0.0)
            .reduce(f64::min);

        if let Some(delay) = delay {
            result.push(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{DateTime, TimeDelta};

    use crate::{
        ebi_framework::{activity_key::ActivityKey, simulation_config::SimulationConfig},
        ebi_objects::{event_log::EventLog, labelled_petri_net::LabelledPetriNet},
        math::delay_model::{DelayFamily, DelayModel},
    };

    use super::EstimateParameters;

    #[test]
    fn estimate_choice() {
        let fin = fs::read_to_string("testfiles/a-bc-d.alpn").unwrap();
        let mut lpn = fin.parse::<LabelledPetriNet>().unwrap();
        let fin2 = fs::read_to_string("testfiles/a-bc-d.json").unwrap();
        let log = fin2.parse::<EventLog>().unwrap();

        let parameters = lpn
            .estimate_parameters(&log, &SimulationConfig::default())
            .unwrap();

        //the trace without B or C does not replay
        assert_eq!(parameters.get_summary().number_of_traces, 4);
        assert_eq!(parameters.get_summary().number_of_accepted_traces, 3);

        assert_eq!(parameters.get_probability(0), 1.0);
        assert!((parameters.get_probability(1) - 2.0 / 3.0).abs() < 1e-9);
        assert!((parameters.get_probability(2) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(parameters.get_probability(3), 1.0);

        //few samples: uniform between 0 and twice the mean
        assert_eq!(parameters.get_summary().transition2samples, vec![0, 2, 1, 3]);
        assert_eq!(*parameters.get_delay_model(0), DelayModel::zero());
        assert_eq!(
            *parameters.get_delay_model(1),
            DelayModel::Uniform { max: 14.0 }
        );
        assert_eq!(
            *parameters.get_delay_model(2),
            DelayModel::Uniform { max: 40.0 }
        );
    }

    #[test]
    fn estimate_deterministic_path() {
        let fin = fs::read_to_string("testfiles/a-bc-d.alpn").unwrap();
        let mut lpn = fin.parse::<LabelledPetriNet>().unwrap();

        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap();
        let mut log = EventLog::new(ActivityKey::new());
        for _ in 0..5 {
            log.push_labelled_trace(vec![
                ("A", start),
                ("B", start + TimeDelta::seconds(1)),
                ("D", start + TimeDelta::seconds(2)),
            ]);
        }

        let parameters = lpn
            .estimate_parameters(&log, &SimulationConfig::default())
            .unwrap();
        assert_eq!(parameters.get_probability(1), 1.0);
        assert_eq!(parameters.get_probability(2), 0.0);
        assert!(parameters.get_summary().starved_places.is_empty());
    }

    #[test]
    fn estimate_synchronised() {
        let fin = fs::read_to_string("testfiles/parallel.alpn").unwrap();
        let mut lpn = fin.parse::<LabelledPetriNet>().unwrap();
        let fin2 = fs::read_to_string("testfiles/parallel.json").unwrap();
        let log = fin2.parse::<EventLog>().unwrap();

        let parameters = lpn
            .estimate_parameters(&log, &SimulationConfig::default())
            .unwrap();
        assert_eq!(parameters.get_summary().number_of_accepted_traces, 2);

        //silent transitions never get a delay
        assert_eq!(*parameters.get_delay_model(1), DelayModel::zero());
        assert_eq!(*parameters.get_delay_model(4), DelayModel::zero());

        //D synchronises on B and C: one delay per trace
        assert_eq!(parameters.get_summary().transition2samples[5], 2);
        assert_eq!(parameters.get_probability(4), 1.0);
    }

    #[test]
    fn estimate_empty_log() {
        let fin = fs::read_to_string("testfiles/a-bc-d.alpn").unwrap();
        let mut lpn = fin.parse::<LabelledPetriNet>().unwrap();
        let log = EventLog::new(ActivityKey::new());

        let parameters = lpn
            .estimate_parameters(&log, &SimulationConfig::default())
            .unwrap();
        assert!((0..4).all(|t| parameters.get_probability(t) == 0.0));
        assert_eq!(parameters.get_summary().starved_places, vec![0, 1, 2]);
    }

    #[test]
    fn estimate_exponential_delays() {
        let fin = fs::read_to_string("testfiles/sequence.alpn").unwrap();
        let mut lpn = fin.parse::<LabelledPetriNet>().unwrap();

        //delays of B after A are exponential quantiles with rate 1
        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap();
        let mut log = EventLog::new(ActivityKey::new());
        let n = 100;
        for i in 1..=n {
            let delay = -(1.0 - (i as f64 - 0.5) / n as f64).ln();
            let b = start + TimeDelta::microseconds((delay * 1e6) as i64);
            log.push_labelled_trace(vec![("A", start), ("B", b), ("C", b)]);
        }

        let parameters = lpn
            .estimate_parameters(&log, &SimulationConfig::default())
            .unwrap();
        assert_eq!(
            parameters.get_delay_model(2).get_family(),
            DelayFamily::Exponential
        );
        assert_eq!(*parameters.get_delay_model(3), DelayModel::Degenerate { value: 0.0 });
    }
}
