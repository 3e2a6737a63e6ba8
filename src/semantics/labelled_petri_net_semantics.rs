use std::{
    fmt::{Debug, Display, Formatter},
    hash::Hasher,
};

use anyhow::{Context, Result};
use bitvec::{bitvec, vec::BitVec};

use crate::{
    ebi_framework::{activity_key::Activity, displayable::Displayable},
    ebi_objects::labelled_petri_net::{LabelledPetriNet, TransitionIndex},
    marking::Marking,
    semantics::semantics::Semantics,
};

fn compute_enabled_transition(
    lpn: &LabelledPetriNet,
    state: &mut LPNMarking,
    transition: TransitionIndex,
) -> bool {
    for (in_place_pos, in_place) in lpn.transition2input_places[transition].iter().enumerate() {
        if state.marking.place2token[*in_place]
            < lpn.transition2input_places_cardinality[transition][in_place_pos]
        {
            if state.enabled_transitions[transition] {
                state.enabled_transitions.set(transition, false);
                state.number_of_enabled_transitions -= 1;
            }
            return false;
        }
    }

    if !state.enabled_transitions[transition] {
        state.enabled_transitions.set(transition, true);
        state.number_of_enabled_transitions += 1;
    }

    true
}

pub(crate) fn compute_enabled_transitions(lpn: &LabelledPetriNet, state: &mut LPNMarking) {
    state.number_of_enabled_transitions = 0;
    state.enabled_transitions.fill(false);
    for transition in 0..lpn.get_number_of_transitions() {
        compute_enabled_transition(lpn, state, transition);
    }
}

impl Semantics for LabelledPetriNet {
    type SemState = LPNMarking;

    fn get_state(&self, marking: &Marking) -> Result<LPNMarking> {
        self.check_marking(marking)?;
        let mut result = LPNMarking {
            marking: marking.clone(),
            enabled_transitions: bitvec![0; self.get_number_of_transitions()],
            number_of_enabled_transitions: 0,
        };
        compute_enabled_transitions(self, &mut result);
        Ok(result)
    }

    fn execute_transition(&self, state: &mut LPNMarking, transition: TransitionIndex) -> Result<()> {
        for (place_pos, place) in self.transition2input_places[transition].iter().enumerate() {
            let arc_weight = self.transition2input_places_cardinality[transition][place_pos];
            state
                .marking
                .decrease(*place, arc_weight)
                .with_context(|| format!("transition {} is not enabled", transition))?;

            //some transitions might be disabled by this execution
            for transition_t in &self.place2output_transitions[*place] {
                compute_enabled_transition(self, state, *transition_t);
            }
        }

        for (place_pos, place) in self.transition2output_places[transition].iter().enumerate() {
            let arc_weight = self.transition2output_places_cardinality[transition][place_pos];
            state
                .marking
                .increase(*place, arc_weight)
                .with_context(|| format!("when firing transition {}", transition))?;

            //some transitions might be enabled by this execution
            for transition_t in &self.place2output_transitions[*place] {
                compute_enabled_transition(self, state, *transition_t);
            }
        }

        Ok(())
    }

    fn get_marking<'a>(&self, state: &'a LPNMarking) -> &'a Marking {
        &state.marking
    }

    fn is_state_marking(&self, state: &LPNMarking, marking: &Marking) -> bool {
        &state.marking == marking
    }

    fn get_maximum_tokens(&self, state: &LPNMarking) -> u64 {
        state.marking.get_maximum_tokens()
    }

    fn get_enabled_transitions(&self, state: &LPNMarking) -> Vec<TransitionIndex> {
        let mut result = Vec::with_capacity(state.number_of_enabled_transitions);
        result.extend(state.enabled_transitions.iter_ones());
        result
    }

    fn is_transition_silent(&self, transition: TransitionIndex) -> bool {
        self.labels[transition].is_none()
    }

    fn get_transition_activity(&self, transition: TransitionIndex) -> Option<Activity> {
        self.labels[transition]
    }

    fn get_number_of_transitions(&self) -> usize {
        self.transition2input_places.len()
    }
}

/// A marking together with the set of transitions it enables, kept up to date on firing.
#[derive(Clone)]
pub struct LPNMarking {
    pub(crate) marking: Marking,
    pub(crate) enabled_transitions: BitVec,
    pub(crate) number_of_enabled_transitions: usize,
}

impl LPNMarking {
    pub fn get_marking(&self) -> &Marking {
        &self.marking
    }

    pub fn has_enabled_transitions(&self) -> bool {
        self.number_of_enabled_transitions > 0
    }
}

impl Displayable for LPNMarking {}

impl Eq for LPNMarking {}

impl std::hash::Hash for LPNMarking {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.marking.hash(state);
    }
}

impl PartialEq for LPNMarking {
    fn eq(&self, other: &Self) -> bool {
        self.marking == other.marking
    }
}

impl Display for LPNMarking {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.marking)
    }
}

impl Debug for LPNMarking {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.marking)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::{
        ebi_objects::labelled_petri_net::LabelledPetriNet, marking::Marking,
        semantics::semantics::Semantics,
    };

    #[test]
    fn lpn_fire_parallel() {
        let fin = fs::read_to_string("testfiles/parallel.alpn").unwrap();
        let lpn = fin.parse::<LabelledPetriNet>().unwrap();

        let mut state = lpn.get_state(lpn.get_initial_marking()).unwrap();
        assert_eq!(lpn.get_enabled_transitions(&state), vec![0]);

        lpn.execute_transition(&mut state, 0).unwrap();
        lpn.execute_transition(&mut state, 1).unwrap();
        assert_eq!(lpn.get_enabled_transitions(&state), vec![2, 3]);

        lpn.execute_transition(&mut state, 3).unwrap();
        assert_eq!(lpn.get_enabled_transitions(&state), vec![2]);
        lpn.execute_transition(&mut state, 2).unwrap();
        lpn.execute_transition(&mut state, 4).unwrap();
        lpn.execute_transition(&mut state, 5).unwrap();

        assert!(lpn.is_state_marking(&state, lpn.get_final_marking()));
        assert!(!state.has_enabled_transitions());
    }

    #[test]
    fn lpn_fire_disabled() {
        let fin = fs::read_to_string("testfiles/a-bc-d.alpn").unwrap();
        let lpn = fin.parse::<LabelledPetriNet>().unwrap();

        let mut state = lpn.get_state(lpn.get_initial_marking()).unwrap();
        assert!(lpn.execute_transition(&mut state, 3).is_err());
    }

    #[test]
    fn lpn_state_of_wrong_marking() {
        let fin = fs::read_to_string("testfiles/a-bc-d.alpn").unwrap();
        let lpn = fin.parse::<LabelledPetriNet>().unwrap();

        assert!(lpn.get_state(&Marking::from(vec![1])).is_err());
    }
}
