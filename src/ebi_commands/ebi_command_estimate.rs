use anyhow::Context;
use clap::{Arg, ArgAction};

use crate::{
    ebi_framework::{
        ebi_command::{EbiCommand, add_config_arguments, get_config},
        ebi_input::EbiInputType,
        ebi_output::{EbiOutput, EbiOutputType},
    },
    techniques::parameter_estimation::EstimateParameters,
};

pub const ARG_ID_JSON: &str = "json";

pub const EBI_ESTIMATE: EbiCommand = EbiCommand::Command {
    name_short: "est",
    name_long: Some("estimate"),
    explanation_short: "Estimate the firing probabilities and waiting times of a Petri net from an event log.",
    explanation_long: Some(
        "Estimate the firing probabilities and waiting times of a Petri net from an event log. Only traces that replay perfectly on the net are used. For each transition, the report shows its probability, the number of waiting times observed and the distribution fitted to them.",
    ),
    cli_command: Some(|command| {
        add_config_arguments(command).arg(
            Arg::new(ARG_ID_JSON)
                .long(ARG_ID_JSON)
                .action(ArgAction::SetTrue)
                .help("Write the report as JSON.")
                .required(false),
        )
    }),
    input_types: &[
        &[&EbiInputType::LabelledPetriNet],
        &[&EbiInputType::EventLog],
    ],
    input_names: &["NET", "LOG"],
    input_helps: &["The accepting Petri net.", "The event log with timestamps."],
    execute: |mut inputs, cli_matches| {
        let mut net = inputs.remove(0).to_labelled_petri_net()?;
        let log = inputs.remove(0).to_event_log()?;
        let config = get_config(cli_matches)?;

        let parameters = net
            .estimate_parameters(&log, &config)
            .context("estimating the parameters")?;

        if cli_matches.get_flag(ARG_ID_JSON) {
            Ok(EbiOutput::String(serde_json::to_string_pretty(
                &parameters.to_json(&net),
            )?))
        } else {
            Ok(EbiOutput::String(parameters.to_report(&net)?))
        }
    },
    output_type: &EbiOutputType::String,
};
