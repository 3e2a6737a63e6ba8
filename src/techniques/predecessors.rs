use bitvec::{bitvec, vec::BitVec};

use crate::ebi_objects::labelled_petri_net::{LabelledPetriNet, TransitionIndex};

pub trait Predecessors {
    /**
     * Walks the arcs backwards from `transition`, through silent transitions, to the nearest
     * labelled transitions. Each returned group is either a single labelled transition, or all the
     * labelled transitions found behind a join (a transition with several input places), which
     * synchronise.
     *
     * Terminates on cyclic nets: every place and transition is visited at most once.
     */
    fn find_predecessor_groups(&self, transition: TransitionIndex) -> Vec<Vec<TransitionIndex>>;
}

impl Predecessors for LabelledPetriNet {
    fn find_predecessor_groups(&self, transition: TransitionIndex) -> Vec<Vec<TransitionIndex>> {
        let mut groups: Vec<Vec<TransitionIndex>> = vec![];

        let mut visited_places: BitVec = bitvec![0; self.get_number_of_places()];
        let mut visited_transitions: BitVec = bitvec![0; self.get_number_of_transitions()];
        visited_transitions.set(transition, true);

        //a transition to walk back from, and the synchronised group that it contributes to (if any)
        let mut worklist: Vec<(TransitionIndex, Option<usize>)> = vec![(transition, None)];

        while let Some((current, group)) = worklist.pop() {
            let places = self.get_input_places(current);

            let group = match group {
                Some(group) => Some(group),
                None if places.len() > 1 => {
                    //a join: everything behind it synchronises
                    groups.push(vec![]);
                    Some(groups.len() - 1)
                }
                None => None,
            };

            for place in places {
                if visited_places[*place] {
                    continue;
                }
                visited_places.set(*place, true);

                for input_transition in self.get_input_transitions(*place) {
                    match (self.is_transition_silent(*input_transition), group) {
                        (false, Some(group)) => groups[group].push(*input_transition),
                        (false, None) => {
                            if !visited_transitions[*input_transition] {
                                groups.push(vec![*input_transition]);
                            }
                        }
                        (true, group) => {
                            if !visited_transitions[*input_transition] {
                                worklist.push((*input_transition, group));
                            }
                        }
                    }
                    visited_transitions.set(*input_transition, true);
                }
            }
        }

        groups.iter_mut().for_each(|group| {
            group.sort_unstable();
            group.dedup();
        });
        groups.retain(|group| !group.is_empty());
        groups
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use ntest::timeout;

    use crate::ebi_objects::labelled_petri_net::LabelledPetriNet;

    use super::Predecessors;

    #[test]
    fn predecessors_choice() {
        let fin = fs::read_to_string("testfiles/a-bc-d.alpn").unwrap();
        let lpn = fin.parse::<LabelledPetriNet>().unwrap();

        assert!(lpn.find_predecessor_groups(0).is_empty());
        assert_eq!(lpn.find_predecessor_groups(1), vec![vec![0]]);
        let mut d = lpn.find_predecessor_groups(3);
        d.sort();
        assert_eq!(d, vec![vec![1], vec![2]]);
    }

    #[test]
    fn predecessors_join() {
        let fin = fs::read_to_string("testfiles/parallel.alpn").unwrap();
        let lpn = fin.parse::<LabelledPetriNet>().unwrap();

        //D is preceded by a silent join of B and C
        assert_eq!(lpn.find_predecessor_groups(5), vec![vec![2, 3]]);

        //B is preceded by a silent split after A
        assert_eq!(lpn.find_predecessor_groups(2), vec![vec![0]]);
    }

    #[test]
    #[timeout(5000)]
    fn predecessors_loop() {
        let fin = fs::read_to_string("testfiles/loop.alpn").unwrap();
        let lpn = fin.parse::<LabelledPetriNet>().unwrap();

        assert_eq!(lpn.find_predecessor_groups(1), vec![vec![0]]);
        assert_eq!(lpn.find_predecessor_groups(3), vec![vec![1]]);
    }

    #[test]
    #[timeout(5000)]
    fn predecessors_self_loop() {
        let fin = fs::read_to_string("testfiles/initial-is-final.alpn").unwrap();
        let lpn = fin.parse::<LabelledPetriNet>().unwrap();

        //the only transition is its own predecessor, but the walk starts by visiting it
        assert!(lpn.find_predecessor_groups(0).is_empty());
    }
}
