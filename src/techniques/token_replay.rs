use anyhow::{Context, Result, anyhow};

use crate::{
    ebi_framework::activity_key::Activity,
    ebi_objects::labelled_petri_net::TransitionIndex,
    marking::Marking,
    semantics::semantics::Semantics,
};

pub const DEVIATION_COST: usize = 10000;
pub const SILENT_COST: usize = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct ReplayResult {
    /// 1.0 if and only if the trace can be replayed perfectly.
    pub fitness: f64,

    /// The transitions (silent ones included) of a perfect replay; `None` if there is none.
    pub fired_transitions: Option<Vec<TransitionIndex>>,
}

impl ReplayResult {
    pub fn is_perfect(&self) -> bool {
        self.fired_transitions.is_some()
    }
}

pub trait Replay {
    /**
     * Replays the trace on the model, from the initial marking to exactly the final marking.
     * A trace that does not fit is not an error: it yields a fitness below 1.
     *
     * Please note to ensure the trace and the semantics use the same ActivityKey, or they have been translated.
     */
    fn replay_trace(
        &self,
        trace: &[Activity],
        initial_marking: &Marking,
        final_marking: &Marking,
        max_tokens_per_place: u64,
    ) -> Result<ReplayResult>;
}

impl<T> Replay for T
where
    T: Semantics + ?Sized,
{
    fn replay_trace(
        &self,
        trace: &[Activity],
        initial_marking: &Marking,
        final_marking: &Marking,
        max_tokens_per_place: u64,
    ) -> Result<ReplayResult> {
        self.get_state(final_marking)
            .context("the final marking does not fit the model")?;
        let initial_state = self
            .get_state(initial_marking)
            .context("the initial marking does not fit the model")?;

        //first, try to replay the trace using synchronous and silent moves only
        if let Some((states, _)) = replay_astar(
            self,
            trace,
            &initial_state,
            final_marking,
            max_tokens_per_place,
            false,
        ) {
            let fired_transitions = transform_to_transitions(self, trace, states)?;
            return Ok(ReplayResult {
                fitness: 1.0,
                fired_transitions: Some(fired_transitions),
            });
        }

        //otherwise, compute an alignment to measure how far off the trace is
        let fitness = match replay_astar(
            self,
            trace,
            &initial_state,
            final_marking,
            max_tokens_per_place,
            true,
        ) {
            Some((states, _)) => alignment_fitness(self, trace, states),
            None => 0.0,
        };
        log::trace!("trace {:?} does not replay, fitness {}", trace, fitness);

        Ok(ReplayResult {
            fitness: fitness.min(1.0 - f64::EPSILON),
            fired_transitions: None,
        })
    }
}

/// A* search over the synchronous product of the trace and the model.
/// Without deviations, only synchronous moves (cost 0) and silent moves are explored.
fn replay_astar<T>(
    semantics: &T,
    trace: &[Activity],
    initial_state: &T::SemState,
    final_marking: &Marking,
    max_tokens_per_place: u64,
    with_deviations: bool,
) -> Option<(Vec<(usize, T::SemState)>, usize)>
where
    T: Semantics + ?Sized,
{
    let start = (0, initial_state.clone());

    let successors = |(trace_index, state): &(usize, T::SemState)| {
        let mut result = vec![];

        if with_deviations && *trace_index < trace.len() {
            //log move
            result.push(((trace_index + 1, state.clone()), DEVIATION_COST));
        }

        for transition in semantics.get_enabled_transitions(state) {
            let mut new_state = state.clone();
            if semantics
                .execute_transition(&mut new_state, transition)
                .is_err()
            {
                continue;
            }
            if semantics.get_maximum_tokens(&new_state) > max_tokens_per_place {
                continue;
            }

            match semantics.get_transition_activity(transition) {
                Some(activity) => {
                    if *trace_index < trace.len() && activity == trace[*trace_index] {
                        //synchronous move
                        result.push(((trace_index + 1, new_state.clone()), 0));
                    }
                    if with_deviations {
                        //model move
                        result.push(((*trace_index, new_state), DEVIATION_COST));
                    }
                }
                None => {
                    //silent move
                    result.push(((*trace_index, new_state), SILENT_COST));
                }
            }
        }

        result
    };

    let heuristic = |_: &(usize, T::SemState)| 0;

    let success = |(trace_index, state): &(usize, T::SemState)| {
        *trace_index == trace.len() && semantics.is_state_marking(state, final_marking)
    };

    pathfinding::prelude::astar(&start, successors, heuristic, success)
}

/**
 * The search returns a sequence of states, while we need the transitions that were fired.
 * As the path contains only synchronous and silent moves, every step fired exactly one transition.
 */
fn transform_to_transitions<T>(
    semantics: &T,
    trace: &[Activity],
    states: Vec<(usize, T::SemState)>,
) -> Result<Vec<TransitionIndex>>
where
    T: Semantics + ?Sized,
{
    let mut result = Vec::with_capacity(states.len());

    let mut it = states.into_iter();
    let (mut previous_trace_index, mut previous_state) = match it.next() {
        Some(first) => first,
        None => return Ok(result),
    };

    for (trace_index, state) in it {
        let transition = if trace_index != previous_trace_index {
            let activity = trace[previous_trace_index];
            find_transition(semantics, &previous_state, &state, Some(activity))
        } else {
            find_transition(semantics, &previous_state, &state, None)
        }
        .ok_or_else(|| {
            anyhow!(
                "there is no transition that brings the model from {} to {}",
                previous_state,
                state
            )
        })?;
        result.push(transition);

        previous_trace_index = trace_index;
        previous_state = state;
    }

    Ok(result)
}

/// Fitness of an alignment: synchronous moves divided by all non-silent moves.
fn alignment_fitness<T>(semantics: &T, trace: &[Activity], states: Vec<(usize, T::SemState)>) -> f64
where
    T: Semantics + ?Sized,
{
    let mut synchronous_moves = 0usize;
    let mut deviations = 0usize;

    for window in states.windows(2) {
        let (previous_trace_index, previous_state) = &window[0];
        let (trace_index, state) = &window[1];

        if trace_index != previous_trace_index {
            let activity = trace[*previous_trace_index];
            if find_transition(semantics, previous_state, state, Some(activity)).is_some() {
                synchronous_moves += 1;
            } else {
                //log move
                deviations += 1;
            }
        } else if find_transition(semantics, previous_state, state, None).is_none() {
            //model move
            deviations += 1;
        }
    }

    if synchronous_moves + deviations == 0 {
        //an empty trace on a model that needs no labelled transitions
        return 1.0;
    }
    synchronous_moves as f64 / (synchronous_moves + deviations) as f64
}

/// Finds an enabled transition with the given label (`None` = silent) that brings `from` to `to`.
fn find_transition<T>(
    semantics: &T,
    from: &T::SemState,
    to: &T::SemState,
    label: Option<Activity>,
) -> Option<TransitionIndex>
where
    T: Semantics + ?Sized,
{
    semantics
        .get_enabled_transitions(from)
        .into_iter()
        .find(|transition| {
            if semantics.get_transition_activity(*transition) != label {
                return false;
            }
            let mut new_state = from.clone();
            semantics
                .execute_transition(&mut new_state, *transition)
                .is_ok()
                && &new_state == to
        })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::{
        ebi_framework::activity_key::Activity, ebi_objects::labelled_petri_net::LabelledPetriNet,
        marking::Marking,
    };

    use super::Replay;

    fn trace(lpn: &mut LabelledPetriNet, labels: &[&str]) -> Vec<Activity> {
        labels
            .iter()
            .map(|label| lpn.get_activity_key_mut().process_activity(label))
            .collect()
    }

    #[test]
    fn replay_choice() {
        let fin = fs::read_to_string("testfiles/a-bc-d.alpn").unwrap();
        let mut lpn = fin.parse::<LabelledPetriNet>().unwrap();
        let im = lpn.get_initial_marking().clone();
        let fm = lpn.get_final_marking().clone();

        let t = trace(&mut lpn, &["A", "C", "D"]);
        let result = lpn.replay_trace(&t, &im, &fm, 100).unwrap();
        assert_eq!(result.fitness, 1.0);
        assert_eq!(result.fired_transitions, Some(vec![0, 2, 3]));

        let t = trace(&mut lpn, &["A", "D"]);
        let result = lpn.replay_trace(&t, &im, &fm, 100).unwrap();
        assert!(result.fitness < 1.0);
        assert!(result.fitness > 0.0);
        assert!(!result.is_perfect());
    }

    #[test]
    fn replay_silent_transitions() {
        let fin = fs::read_to_string("testfiles/parallel.alpn").unwrap();
        let mut lpn = fin.parse::<LabelledPetriNet>().unwrap();
        let im = lpn.get_initial_marking().clone();
        let fm = lpn.get_final_marking().clone();

        let t = trace(&mut lpn, &["A", "C", "B", "D"]);
        let result = lpn.replay_trace(&t, &im, &fm, 100).unwrap();
        assert_eq!(result.fired_transitions, Some(vec![0, 1, 3, 2, 4, 5]));
    }

    #[test]
    fn replay_prefix_is_not_perfect() {
        let fin = fs::read_to_string("testfiles/a-bc-d.alpn").unwrap();
        let mut lpn = fin.parse::<LabelledPetriNet>().unwrap();
        let im = lpn.get_initial_marking().clone();
        let fm = lpn.get_final_marking().clone();

        //ends in the wrong marking
        let t = trace(&mut lpn, &["A", "B"]);
        let result = lpn.replay_trace(&t, &im, &fm, 100).unwrap();
        assert!(result.fitness < 1.0);
    }

    #[test]
    fn replay_unknown_activity() {
        let fin = fs::read_to_string("testfiles/a-bc-d.alpn").unwrap();
        let mut lpn = fin.parse::<LabelledPetriNet>().unwrap();
        let im = lpn.get_initial_marking().clone();
        let fm = lpn.get_final_marking().clone();

        let t = trace(&mut lpn, &["A", "X", "B", "D"]);
        let result = lpn.replay_trace(&t, &im, &fm, 100).unwrap();
        assert!(result.fitness < 1.0);
        assert!(result.fired_transitions.is_none());
    }

    #[test]
    fn replay_empty_trace() {
        let fin = fs::read_to_string("testfiles/initial-is-final.alpn").unwrap();
        let lpn = fin.parse::<LabelledPetriNet>().unwrap();
        let im = lpn.get_initial_marking().clone();
        let fm = lpn.get_final_marking().clone();

        let result = lpn.replay_trace(&[], &im, &fm, 100).unwrap();
        assert_eq!(result.fired_transitions, Some(vec![]));
    }

    #[test]
    fn replay_loop() {
        let fin = fs::read_to_string("testfiles/loop.alpn").unwrap();
        let mut lpn = fin.parse::<LabelledPetriNet>().unwrap();
        let im = lpn.get_initial_marking().clone();
        let fm = lpn.get_final_marking().clone();

        let t = trace(&mut lpn, &["A", "B", "B", "C"]);
        let result = lpn.replay_trace(&t, &im, &fm, 100).unwrap();
        assert_eq!(result.fired_transitions, Some(vec![0, 1, 2, 1, 3]));
    }

    #[test]
    fn replay_wrong_marking() {
        let fin = fs::read_to_string("testfiles/a-bc-d.alpn").unwrap();
        let lpn = fin.parse::<LabelledPetriNet>().unwrap();
        assert!(lpn
            .replay_trace(&[], &Marking::from(vec![1]), lpn.get_final_marking(), 100)
            .is_err());
    }
}
