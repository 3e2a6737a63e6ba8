use anyhow::Context;
use rayon::prelude::*;
use std::io::Write;

use crate::{
    ebi_framework::{
        ebi_command::{EbiCommand, add_config_arguments, get_config},
        ebi_input::EbiInputType,
        ebi_output::{EbiOutput, EbiOutputType},
    },
    techniques::token_replay::Replay,
};

pub const EBI_REPLAY: EbiCommand = EbiCommand::Command {
    name_short: "rep",
    name_long: Some("replay"),
    explanation_short: "Compute the fitness of each trace of an event log on a Petri net.",
    explanation_long: Some(
        "Compute the fitness of each trace of an event log on a Petri net. A trace that can be replayed from the initial marking to exactly the final marking has fitness 1. Otherwise, the fitness is based on an alignment of the trace with the net, and is lower than 1.",
    ),
    cli_command: Some(add_config_arguments),
    input_types: &[
        &[&EbiInputType::LabelledPetriNet],
        &[&EbiInputType::EventLog],
    ],
    input_names: &["NET", "LOG"],
    input_helps: &["The accepting Petri net.", "The event log."],
    execute: |mut inputs, cli_matches| {
        let mut net = inputs.remove(0).to_labelled_petri_net()?;
        let mut log = inputs.remove(0).to_event_log()?;
        let config = get_config(cli_matches)?;

        log.translate_using_activity_key(net.get_activity_key_mut());

        let progress_bar = EbiCommand::get_progress_bar(log.len());
        let results = log
            .iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .enumerate()
            .map(|(trace_index, trace)| {
                let activities = trace.iter().map(|event| event.activity).collect::<Vec<_>>();
                let result = net
                    .replay_trace(
                        &activities,
                        net.get_initial_marking(),
                        net.get_final_marking(),
                        config.max_tokens_per_place,
                    )
                    .with_context(|| format!("replaying trace {}", trace_index));
                progress_bar.inc(1);
                result
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        progress_bar.finish_and_clear();

        let mut f = vec![];
        writeln!(f, "trace\tevents\tfitness\tperfect")?;
        let mut sum = 0.0;
        let mut perfect = 0;
        for (trace_index, (trace, result)) in log.iter().zip(results.iter()).enumerate() {
            writeln!(
                f,
                "{}\t{}\t{:.6}\t{}",
                trace_index,
                trace.len(),
                result.fitness,
                result.is_perfect()
            )?;
            sum += result.fitness;
            if result.is_perfect() {
                perfect += 1;
            }
        }

        if !log.is_empty() {
            writeln!(f)?;
            writeln!(f, "Average fitness\t\t{:.6}", sum / log.len() as f64)?;
            writeln!(f, "Perfectly fitting traces\t{} of {}", perfect, log.len())?;
        }

        Ok(EbiOutput::String(String::from_utf8(f)?))
    },
    output_type: &EbiOutputType::String,
};
