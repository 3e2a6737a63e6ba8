use anyhow::{Context, Error, Result, anyhow};
use std::{
    fmt,
    io::{self, BufRead},
    str::FromStr,
};

use crate::{
    ebi_framework::{
        activity_key::{Activity, ActivityKey},
        exportable::Exportable,
        importable::Importable,
        infoable::Infoable,
    },
    line_reader::LineReader,
    marking::Marking,
};

pub type TransitionIndex = usize;
pub type PlaceIndex = usize;

pub const HEADER: &str = "accepting labelled Petri net";

/// A labelled Petri net with an initial and a final marking.
/// Places and transitions are identified by their index; arcs are kept in both directions.
#[derive(Clone, Debug)]
pub struct LabelledPetriNet {
    pub(crate) activity_key: ActivityKey,
    pub(crate) initial_marking: Marking,
    pub(crate) final_marking: Marking,
    pub(crate) labels: Vec<Option<Activity>>,
    pub(crate) place2input_transitions: Vec<Vec<TransitionIndex>>,
    pub(crate) place2output_transitions: Vec<Vec<TransitionIndex>>,
    pub(crate) transition2input_places: Vec<Vec<PlaceIndex>>,
    pub(crate) transition2output_places: Vec<Vec<PlaceIndex>>,
    pub(crate) transition2input_places_cardinality: Vec<Vec<u64>>,
    pub(crate) transition2output_places_cardinality: Vec<Vec<u64>>,
}

impl LabelledPetriNet {
    pub fn new() -> Self {
        Self {
            activity_key: ActivityKey::new(),
            initial_marking: Marking::new(0),
            final_marking: Marking::new(0),
            labels: vec![],
            place2input_transitions: vec![],
            place2output_transitions: vec![],
            transition2input_places: vec![],
            transition2output_places: vec![],
            transition2input_places_cardinality: vec![],
            transition2output_places_cardinality: vec![],
        }
    }

    pub fn get_number_of_transitions(&self) -> usize {
        self.transition2input_places.len()
    }

    pub fn get_number_of_places(&self) -> usize {
        self.place2output_transitions.len()
    }

    pub fn get_initial_marking(&self) -> &Marking {
        &self.initial_marking
    }

    pub fn get_final_marking(&self) -> &Marking {
        &self.final_marking
    }

    pub fn get_activity_key(&self) -> &ActivityKey {
        &self.activity_key
    }

    pub fn get_activity_key_mut(&mut self) -> &mut ActivityKey {
        &mut self.activity_key
    }

    pub fn is_transition_silent(&self, transition: TransitionIndex) -> bool {
        self.labels[transition].is_none()
    }

    pub fn get_transition_label(&self, transition: TransitionIndex) -> Option<Activity> {
        self.labels[transition]
    }

    /// Human-readable name of a transition: its label, or `tau` with its index for silent transitions.
    pub fn get_transition_name(&self, transition: TransitionIndex) -> String {
        match self.labels[transition] {
            Some(activity) => self.activity_key.get_activity_label(&activity).to_string(),
            None => format!("tau{}", transition),
        }
    }

    pub fn get_input_places(&self, transition: TransitionIndex) -> &[PlaceIndex] {
        &self.transition2input_places[transition]
    }

    pub fn get_input_transitions(&self, place: PlaceIndex) -> &[TransitionIndex] {
        &self.place2input_transitions[place]
    }

    pub fn get_output_transitions(&self, place: PlaceIndex) -> &[TransitionIndex] {
        &self.place2output_transitions[place]
    }

    pub fn get_number_of_silent_transitions(&self) -> usize {
        self.labels.iter().filter(|label| label.is_none()).count()
    }

    pub fn add_place(&mut self) -> PlaceIndex {
        let place = self.get_number_of_places();
        self.place2input_transitions.push(vec![]);
        self.place2output_transitions.push(vec![]);
        self.initial_marking.add_place();
        self.final_marking.add_place();
        place
    }

    pub fn add_transition(&mut self, label: Option<Activity>) -> TransitionIndex {
        self.labels.push(label);
        self.transition2input_places.push(vec![]);
        self.transition2input_places_cardinality.push(vec![]);
        self.transition2output_places.push(vec![]);
        self.transition2output_places_cardinality.push(vec![]);
        self.get_number_of_transitions() - 1
    }

    /// Adds a transition with the given label, registering the label in the activity key.
    pub fn add_labelled_transition(&mut self, label: &str) -> TransitionIndex {
        let activity = self.activity_key.process_activity(label);
        self.add_transition(Some(activity))
    }

    pub fn add_transition_place_arc(
        &mut self,
        from_transition: TransitionIndex,
        to_place: PlaceIndex,
        cardinality: u64,
    ) -> Result<()> {
        self.check_arc(from_transition, to_place)?;

        if let Some(pos) = self.transition2output_places[from_transition]
            .iter()
            .position(|p| *p == to_place)
        {
            self.transition2output_places_cardinality[from_transition][pos] += cardinality;
        } else {
            self.transition2output_places[from_transition].push(to_place);
            self.transition2output_places_cardinality[from_transition].push(cardinality);
            self.place2input_transitions[to_place].push(from_transition);
        }
        Ok(())
    }

    pub fn add_place_transition_arc(
        &mut self,
        from_place: PlaceIndex,
        to_transition: TransitionIndex,
        cardinality: u64,
    ) -> Result<()> {
        self.check_arc(to_transition, from_place)?;

        if let Some(pos) = self.transition2input_places[to_transition]
            .iter()
            .position(|p| *p == from_place)
        {
            self.transition2input_places_cardinality[to_transition][pos] += cardinality;
        } else {
            self.transition2input_places[to_transition].push(from_place);
            self.transition2input_places_cardinality[to_transition].push(cardinality);
            self.place2output_transitions[from_place].push(to_transition);
        }
        Ok(())
    }

    fn check_arc(&self, transition: TransitionIndex, place: PlaceIndex) -> Result<()> {
        if transition >= self.get_number_of_transitions() {
            Err(anyhow!(
                "non-existing transition {} referenced, while there are {}",
                transition,
                self.get_number_of_transitions()
            ))
        } else if place >= self.get_number_of_places() {
            Err(anyhow!(
                "non-existing place {} referenced, while there are {}",
                place,
                self.get_number_of_places()
            ))
        } else {
            Ok(())
        }
    }

    /// A marking is compatible with the net if it mentions exactly the places of the net.
    pub fn check_marking(&self, marking: &Marking) -> Result<()> {
        if marking.get_number_of_places() != self.get_number_of_places() {
            return Err(anyhow!(
                "marking {} refers to {} places, while the net has {}",
                marking,
                marking.get_number_of_places(),
                self.get_number_of_places()
            ));
        }
        Ok(())
    }

    pub fn set_final_marking(&mut self, marking: Marking) -> Result<()> {
        self.check_marking(&marking).context("setting the final marking")?;
        self.final_marking = marking;
        Ok(())
    }
}

impl Exportable for LabelledPetriNet {
    fn export(&self, f: &mut dyn std::io::Write) -> Result<()> {
        Ok(write!(f, "{}", self)?)
    }
}

impl Infoable for LabelledPetriNet {
    fn info(&self, f: &mut impl std::io::Write) -> Result<()> {
        writeln!(f, "Number of places\t\t{}", self.get_number_of_places())?;
        writeln!(
            f,
            "Number of transitions\t\t{}",
            self.get_number_of_transitions()
        )?;
        writeln!(
            f,
            "Number of activities\t\t{}",
            self.activity_key.get_number_of_activities()
        )?;
        writeln!(
            f,
            "Number of silent transitions\t{}",
            self.get_number_of_silent_transitions()
        )?;
        writeln!(f, "Initial marking\t\t\t{}", self.initial_marking)?;
        writeln!(f, "Final marking\t\t\t{}", self.final_marking)?;

        Ok(write!(f, "")?)
    }
}

impl fmt::Display for LabelledPetriNet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", HEADER)?;
        writeln!(f, "# number of places\n{}", self.get_number_of_places())?;

        writeln!(f, "# initial marking")?;
        for tokens in self.initial_marking.get_place2token() {
            writeln!(f, "{}", tokens)?;
        }

        writeln!(f, "# final marking")?;
        for tokens in self.final_marking.get_place2token() {
            writeln!(f, "{}", tokens)?;
        }

        writeln!(
            f,
            "# number of transitions\n{}",
            self.get_number_of_transitions()
        )?;

        for transition in 0..self.get_number_of_transitions() {
            writeln!(f, "# transition {}", transition)?;

            if let Some(activity) = self.get_transition_label(transition) {
                writeln!(f, "label {}", self.activity_key.get_activity_label(&activity))?;
            } else {
                writeln!(f, "silent")?;
            }

            let inputs = self.transition2input_places_cardinality[transition]
                .iter()
                .sum::<u64>();
            writeln!(f, "# number of input places\n{}", inputs)?;
            for (pos, place) in self.transition2input_places[transition].iter().enumerate() {
                for _ in 0..self.transition2input_places_cardinality[transition][pos] {
                    writeln!(f, "{}", place)?;
                }
            }

            let outputs = self.transition2output_places_cardinality[transition]
                .iter()
                .sum::<u64>();
            writeln!(f, "# number of output places\n{}", outputs)?;
            for (pos, place) in self.transition2output_places[transition].iter().enumerate() {
                for _ in 0..self.transition2output_places_cardinality[transition][pos] {
                    writeln!(f, "{}", place)?;
                }
            }
        }

        write!(f, "")
    }
}

impl FromStr for LabelledPetriNet {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut reader = io::Cursor::new(s);
        Self::import(&mut reader)
    }
}

impl Importable for LabelledPetriNet {
    fn import(reader: &mut dyn BufRead) -> Result<Self> {
        let mut lreader = LineReader::new(reader);

        let head = lreader
            .next_line_string()
            .with_context(|| format!("failed to read header, which should be `{}`", HEADER))?;
        if head.trim() != HEADER {
            return Err(anyhow!(
                "first line should be exactly `{}`, but found `{}` on line `{}`",
                HEADER,
                lreader.get_last_line(),
                lreader.get_last_line_number()
            ));
        }

        let mut result = LabelledPetriNet::new();

        let number_of_places = lreader
            .next_line_index()
            .context("failed to read number of places")?;
        for _ in 0..number_of_places {
            result.add_place();
        }

        let mut initial_marking = vec![0u64; number_of_places];
        for (place, tokens) in initial_marking.iter_mut().enumerate() {
            *tokens = lreader
                .next_line_natural()
                .with_context(|| format!("failed to read initial marking of place {}", place))?;
        }
        result.initial_marking = initial_marking.into();

        let mut final_marking = vec![0u64; number_of_places];
        for (place, tokens) in final_marking.iter_mut().enumerate() {
            *tokens = lreader
                .next_line_natural()
                .with_context(|| format!("failed to read final marking of place {}", place))?;
        }
        result.final_marking = final_marking.into();

        let number_of_transitions = lreader
            .next_line_index()
            .context("failed to read number of transitions")?;

        for transition in 0..number_of_transitions {
            let label_line = lreader
                .next_line_string()
                .with_context(|| format!("failed to read label of transition {}", transition))?;

            let label_line = label_line.trim_start();
            if let Some(label) = label_line.strip_prefix("label ") {
                result.add_labelled_transition(label);
            } else if label_line.trim_end() == "silent" {
                result.add_transition(None);
            } else {
                return Err(anyhow!(
                    "transition {} should be `silent` or start with `label `, but found `{}` on line {}",
                    transition,
                    lreader.get_last_line(),
                    lreader.get_last_line_number()
                ));
            }

            let number_of_input_places = lreader.next_line_index().with_context(|| {
                format!(
                    "failed to read number of input places of transition {}",
                    transition
                )
            })?;
            for p in 0..number_of_input_places {
                let place = lreader.next_line_index().with_context(|| {
                    format!(
                        "failed to read input place number {} of transition {}",
                        p, transition
                    )
                })?;
                result
                    .add_place_transition_arc(place, transition, 1)
                    .with_context(|| {
                        format!(
                            "input place number {} of transition {}, at line {}",
                            p,
                            transition,
                            lreader.get_last_line_number()
                        )
                    })?;
            }

            let number_of_output_places = lreader.next_line_index().with_context(|| {
                format!(
                    "failed to read number of output places of transition {}",
                    transition
                )
            })?;
            for p in 0..number_of_output_places {
                let place = lreader.next_line_index().with_context(|| {
                    format!(
                        "failed to read output place number {} of transition {}",
                        p, transition
                    )
                })?;
                result
                    .add_transition_place_arc(transition, place, 1)
                    .with_context(|| {
                        format!(
                            "output place number {} of transition {}, at line {}",
                            p,
                            transition,
                            lreader.get_last_line_number()
                        )
                    })?;
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::{ebi_framework::infoable::Infoable, marking::Marking};

    use super::LabelledPetriNet;

    #[test]
    fn import_choice() {
        let fin = fs::read_to_string("testfiles/a-bc-d.alpn").unwrap();
        let net = fin.parse::<LabelledPetriNet>().unwrap();

        assert_eq!(net.get_number_of_places(), 4);
        assert_eq!(net.get_number_of_transitions(), 4);
        assert_eq!(net.get_activity_key().get_number_of_activities(), 4);
        assert_eq!(net.get_initial_marking(), &Marking::from(vec![1, 0, 0, 0]));
        assert_eq!(net.get_final_marking(), &Marking::from(vec![0, 0, 0, 1]));
        assert_eq!(net.get_output_transitions(1), &[1, 2]);
        assert_eq!(net.get_input_transitions(2), &[1, 2]);
    }

    #[test]
    fn export_import() {
        let fin = fs::read_to_string("testfiles/parallel.alpn").unwrap();
        let net = fin.parse::<LabelledPetriNet>().unwrap();

        let net2 = net.to_string().parse::<LabelledPetriNet>().unwrap();
        assert_eq!(net.to_string(), net2.to_string());
        assert_eq!(net2.get_number_of_silent_transitions(), 2);

        let mut f = vec![];
        net2.info(&mut f).unwrap();
    }

    #[test]
    fn dangling_arc_is_fatal() {
        let fin = "accepting labelled Petri net\n1\n1\n0\n1\nlabel a\n1\n0\n1\n5\n";
        assert!(fin.parse::<LabelledPetriNet>().is_err());
    }

    #[test]
    fn bad_header() {
        assert!("labelled Petri net\n0\n0\n".parse::<LabelledPetriNet>().is_err());
    }

    #[test]
    fn marking_must_match_places() {
        let mut net = LabelledPetriNet::new();
        net.add_place();
        assert!(net.set_final_marking(Marking::from(vec![0, 1])).is_err());
        assert!(net.set_final_marking(Marking::from(vec![1])).is_ok());
    }

    #[test]
    fn arc_weights() {
        let mut net = LabelledPetriNet::new();
        let p = net.add_place();
        let t = net.add_labelled_transition("a");
        net.add_place_transition_arc(p, t, 1).unwrap();
        net.add_place_transition_arc(p, t, 1).unwrap();
        assert_eq!(net.transition2input_places_cardinality[t], vec![2]);
        assert_eq!(net.get_output_transitions(p), &[t]);
        assert!(net.add_transition_place_arc(t, 3, 1).is_err());
    }
}
