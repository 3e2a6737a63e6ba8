use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};

use crate::{
    ebi_framework::{
        ebi_command::{EbiCommand, add_config_arguments, get_config, parse_timestamp},
        ebi_input::EbiInputType,
        ebi_output::{EbiOutput, EbiOutputType},
        infoable::Infoable,
    },
    techniques::simulation::{Simulate, SimulationReport, simulate_train_test},
};

pub const ARG_ID_TRAIN_FRACTION: &str = "train-fraction";
pub const ARG_ID_ALIGN_TO: &str = "align-to";

pub const EBI_SIMULATE: EbiCommand = EbiCommand::Command {
    name_short: "sim",
    name_long: Some("simulate"),
    explanation_short: "Simulate an event log with a Petri net, using probabilities and waiting times learned from an event log.",
    explanation_long: Some(
        "Simulate an event log with a Petri net, using probabilities and waiting times learned from an event log. Runs that do not reach the final marking are retried, and left out if they keep failing. Please note that the start time of each trace is the current time, unless a start time is configured or the log is aligned.",
    ),
    cli_command: Some(cli_simulate),
    input_types: &[
        &[&EbiInputType::LabelledPetriNet],
        &[&EbiInputType::EventLog],
        &[&EbiInputType::Usize],
    ],
    input_names: &["NET", "LOG", "NUMBER_OF_TRACES"],
    input_helps: &[
        "The accepting Petri net.",
        "The event log with timestamps.",
        "The number of traces to be simulated.",
    ],
    execute: |mut inputs, cli_matches| {
        let mut net = inputs.remove(0).to_labelled_petri_net()?;
        let log = inputs.remove(0).to_event_log()?;
        let number_of_traces = inputs.remove(0).to_usize()?;
        let config = get_config(cli_matches)?;

        let progress_bar = EbiCommand::get_progress_bar(number_of_traces);
        let mut report = match cli_matches.get_one::<f64>(ARG_ID_TRAIN_FRACTION) {
            Some(train_fraction) => simulate_train_test(
                &mut net,
                &log,
                number_of_traces,
                *train_fraction,
                &config,
                Some(&progress_bar),
            )?,
            None => net.simulate(&log, number_of_traces, &config, Some(&progress_bar))?,
        };

        align(&mut report, cli_matches)?;
        log_report(&report)?;

        Ok(EbiOutput::EventLog(report.log))
    },
    output_type: &EbiOutputType::EventLog,
};

pub fn cli_simulate(command: Command) -> Command {
    add_config_arguments(command)
        .arg(
            Arg::new(ARG_ID_TRAIN_FRACTION)
                .long(ARG_ID_TRAIN_FRACTION)
                .action(ArgAction::Set)
                .value_name("FRACTION")
                .help("Learn from a random part of the log of this size, and start the simulated log at the first event of the rest.")
                .required(false)
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new(ARG_ID_ALIGN_TO)
                .long(ARG_ID_ALIGN_TO)
                .action(ArgAction::Set)
                .value_name("TIMESTAMP")
                .help("Shift the simulated log such that its first event happens at this RFC 3339 timestamp.")
                .required(false)
                .conflicts_with(ARG_ID_TRAIN_FRACTION),
        )
}

fn align(report: &mut SimulationReport, cli_matches: &ArgMatches) -> anyhow::Result<()> {
    if let Some(value) = cli_matches.get_one::<String>(ARG_ID_ALIGN_TO) {
        let reference = parse_timestamp(value)?;
        report
            .log
            .align_start_to(reference)
            .context("aligning the simulated log")?;
    }
    Ok(())
}

fn log_report(report: &SimulationReport) -> anyhow::Result<()> {
    let mut f = vec![];
    report.info(&mut f)?;
    for line in String::from_utf8(f)?.lines() {
        log::info!("{}", line);
    }
    if report.failed_runs > 0 {
        log::warn!(
            "{} of {} runs did not complete and were left out",
            report.failed_runs,
            report.number_of_runs
        );
    }
    Ok(())
}
