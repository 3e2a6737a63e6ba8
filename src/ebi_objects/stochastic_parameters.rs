use anyhow::{Result, anyhow};
use serde_json::{Map, Number, Value};
use std::fmt::Write as _;

use crate::{
    ebi_objects::labelled_petri_net::{LabelledPetriNet, PlaceIndex, TransitionIndex},
    math::delay_model::DelayModel,
};

/// How the parameters were obtained from the log.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EstimationSummary {
    pub number_of_traces: usize,
    pub number_of_accepted_traces: usize,

    /// Places with outgoing transitions of which none fired in an accepted trace.
    pub starved_places: Vec<PlaceIndex>,

    /// For every transition, the number of delays its waiting-time model was fitted on.
    pub transition2samples: Vec<usize>,

    /// For every transition, the Kolmogorov-Smirnov statistic of its waiting-time model, if fitted.
    pub transition2ks_statistic: Vec<Option<f64>>,
}

/// The stochastic parameters of a net: the firing-probability table P and the waiting-time model F.
/// Once estimated, the parameters are immutable and can be shared by any number of runs.
#[derive(Clone, Debug, PartialEq)]
pub struct StochasticParameters {
    pub(crate) transition2probability: Vec<f64>,
    pub(crate) place2probabilities: Vec<Vec<(TransitionIndex, f64)>>,
    pub(crate) transition2delay: Vec<DelayModel>,
    pub(crate) summary: EstimationSummary,
}

impl StochasticParameters {
    /// Parameters that were not estimated from a log. The per-place table is derived from the net.
    pub fn new(
        net: &LabelledPetriNet,
        transition2probability: Vec<f64>,
        transition2delay: Vec<DelayModel>,
    ) -> Result<Self> {
        let place2probabilities = (0..net.get_number_of_places())
            .map(|place| {
                net.get_output_transitions(place)
                    .iter()
                    .map(|transition| {
                        (
                            *transition,
                            transition2probability.get(*transition).copied().unwrap_or(0.0),
                        )
                    })
                    .collect()
            })
            .collect();
        let result = Self {
            transition2probability,
            place2probabilities,
            transition2delay,
            summary: EstimationSummary::default(),
        };
        result.check(net)?;
        Ok(result)
    }

    /// Parameters in which every transition has the same weight and no delay.
    pub fn uniform(net: &LabelledPetriNet) -> Self {
        let n = net.get_number_of_transitions();
        Self {
            transition2probability: vec![1.0; n],
            place2probabilities: (0..net.get_number_of_places())
                .map(|place| {
                    let outputs = net.get_output_transitions(place);
                    outputs
                        .iter()
                        .map(|transition| (*transition, 1.0 / outputs.len() as f64))
                        .collect()
                })
                .collect(),
            transition2delay: vec![DelayModel::zero(); n],
            summary: EstimationSummary::default(),
        }
    }

    pub fn get_probability(&self, transition: TransitionIndex) -> f64 {
        self.transition2probability[transition]
    }

    /// The conditional firing probabilities of the transitions that consume from the place.
    pub fn get_place_probabilities(&self, place: PlaceIndex) -> &[(TransitionIndex, f64)] {
        &self.place2probabilities[place]
    }

    pub fn get_delay_model(&self, transition: TransitionIndex) -> &DelayModel {
        &self.transition2delay[transition]
    }

    pub fn get_summary(&self) -> &EstimationSummary {
        &self.summary
    }

    /// The parameters must cover exactly the transitions of the net, with probabilities in [0, 1].
    pub fn check(&self, net: &LabelledPetriNet) -> Result<()> {
        if self.transition2probability.len() != net.get_number_of_transitions()
            || self.transition2delay.len() != net.get_number_of_transitions()
        {
            return Err(anyhow!(
                "the parameters cover {} probabilities and {} delays, while the net has {} transitions",
                self.transition2probability.len(),
                self.transition2delay.len(),
                net.get_number_of_transitions()
            ));
        }
        if let Some((transition, probability)) = self
            .transition2probability
            .iter()
            .enumerate()
            .find(|(_, p)| !(0.0..=1.0).contains(*p))
        {
            return Err(anyhow!(
                "transition {} has probability {}, which is not in [0, 1]",
                transition,
                probability
            ));
        }
        Ok(())
    }

    pub fn to_json(&self, net: &LabelledPetriNet) -> Value {
        let transitions = (0..net.get_number_of_transitions())
            .map(|transition| {
                let mut object = Map::new();
                object.insert("transition".to_string(), Value::from(transition));
                object.insert(
                    "name".to_string(),
                    Value::String(net.get_transition_name(transition)),
                );
                object.insert(
                    "silent".to_string(),
                    Value::Bool(net.is_transition_silent(transition)),
                );
                object.insert(
                    "probability".to_string(),
                    number(self.transition2probability[transition]),
                );
                object.insert(
                    "delay".to_string(),
                    self.transition2delay[transition].to_json(),
                );
                if let Some(samples) = self.summary.transition2samples.get(transition) {
                    object.insert("samples".to_string(), Value::from(*samples));
                }
                if let Some(Some(ks)) = self.summary.transition2ks_statistic.get(transition) {
                    object.insert("ks_statistic".to_string(), number(*ks));
                }
                Value::Object(object)
            })
            .collect();

        let mut summary = Map::new();
        summary.insert(
            "traces".to_string(),
            Value::from(self.summary.number_of_traces),
        );
        summary.insert(
            "accepted_traces".to_string(),
            Value::from(self.summary.number_of_accepted_traces),
        );
        summary.insert(
            "starved_places".to_string(),
            Value::Array(
                self.summary
                    .starved_places
                    .iter()
                    .map(|place| Value::from(*place))
                    .collect(),
            ),
        );

        let mut result = Map::new();
        result.insert("summary".to_string(), Value::Object(summary));
        result.insert("transitions".to_string(), Value::Array(transitions));
        Value::Object(result)
    }

    /// A human-readable table of the parameters.
    pub fn to_report(&self, net: &LabelledPetriNet) -> Result<String> {
        let mut f = String::new();
        writeln!(
            f,
            "Accepted traces\t{} of {}",
            self.summary.number_of_accepted_traces, self.summary.number_of_traces
        )?;
        if !self.summary.starved_places.is_empty() {
            writeln!(
                f,
                "Starved places\t{}",
                self.summary
                    .starved_places
                    .iter()
                    .map(|place| format!("p{}", place))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
        }
        writeln!(f, "transition\tprobability\tsamples\tdelay")?;
        for transition in 0..net.get_number_of_transitions() {
            writeln!(
                f,
                "{}\t{:.4}\t{}\t{}",
                net.get_transition_name(transition),
                self.transition2probability[transition],
                self.summary
                    .transition2samples
                    .get(transition)
                    .copied()
                    .unwrap_or(0),
                self.transition2delay[transition]
            )?;
        }
        Ok(f)
    }
}

fn number(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::{
        ebi_objects::labelled_petri_net::LabelledPetriNet, math::delay_model::DelayModel,
    };

    use super::StochasticParameters;

    #[test]
    fn parameters_check() {
        let fin = fs::read_to_string("testfiles/a-bc-d.alpn").unwrap();
        let lpn = fin.parse::<LabelledPetriNet>().unwrap();

        let delays = vec![DelayModel::zero(); 4];
        let parameters =
            StochasticParameters::new(&lpn, vec![1.0, 0.7, 0.3, 1.0], delays.clone()).unwrap();
        assert_eq!(parameters.get_place_probabilities(1), &[(1, 0.7), (2, 0.3)]);

        assert!(StochasticParameters::new(&lpn, vec![1.0, 0.7, 0.3], delays.clone()).is_err());
        assert!(StochasticParameters::new(&lpn, vec![1.0, 1.7, 0.3, 1.0], delays).is_err());
    }

    #[test]
    fn parameters_report() {
        let fin = fs::read_to_string("testfiles/parallel.alpn").unwrap();
        let lpn = fin.parse::<LabelledPetriNet>().unwrap();

        let parameters = StochasticParameters::uniform(&lpn);
        let report = parameters.to_report(&lpn).unwrap();
        assert!(report.contains("tau1"));

        let json = parameters.to_json(&lpn);
        assert_eq!(json["transitions"].as_array().unwrap().len(), 6);
        assert_eq!(json["transitions"][5]["name"], "D");
    }
}
