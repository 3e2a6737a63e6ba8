use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use crate::{
    ebi_commands::{
        ebi_command_estimate, ebi_command_info, ebi_command_replay, ebi_command_simulate,
    },
    ebi_framework::{
        ebi_input::{self, EbiInput, EbiInputType},
        ebi_output::{EbiOutput, EbiOutputType},
        importable::Importable,
        simulation_config::SimulationConfig,
    },
    techniques::token_game::SelectionPolicy,
};

pub const EBI_COMMANDS: EbiCommand = EbiCommand::Group {
    name_short: "ebi-spn",
    name_long: None,
    explanation_short: "Ebi-SPN: estimation and simulation of stochastic Petri nets.",
    explanation_long: Some(
        "Learns firing probabilities and waiting-time distributions of a Petri net from an event log, and simulates synthetic event logs with them.",
    ),
    children: &[
        &ebi_command_estimate::EBI_ESTIMATE,
        &ebi_command_info::EBI_INFO,
        &ebi_command_replay::EBI_REPLAY,
        &ebi_command_simulate::EBI_SIMULATE,
    ],
};

pub const ARG_SHORT_OUTPUT: char = 'o';
pub const ARG_ID_OUTPUT: &str = "output";
pub const ARG_ID_CONFIG: &str = "config";
pub const ARG_ID_SEED: &str = "seed";
pub const ARG_ID_RACE: &str = "race";

pub enum EbiCommand {
    Group {
        name_short: &'static str,
        name_long: Option<&'static str>,
        explanation_short: &'static str,
        explanation_long: Option<&'static str>,
        children: &'static [&'static EbiCommand],
    },
    Command {
        name_short: &'static str,
        name_long: Option<&'static str>,
        explanation_short: &'static str,
        explanation_long: Option<&'static str>,
        cli_command: Option<fn(command: Command) -> Command>, //extra arguments; an output -o argument is always added

        input_types: &'static [&'static [&'static EbiInputType]], //for each fixed-position input parameter, the types that are accepted
        input_names: &'static [&'static str],
        input_helps: &'static [&'static str],

        execute: fn(inputs: Vec<EbiInput>, cli_matches: &ArgMatches) -> Result<EbiOutput>,
        output_type: &'static EbiOutputType,
    },
}

impl EbiCommand {
    pub fn build_cli(&self) -> Command {
        let mut command;
        match self {
            EbiCommand::Group {
                name_short,
                name_long,
                explanation_short,
                explanation_long,
                children,
            } => {
                command = Command::new(self.long_name())
                    .about(*explanation_short)
                    .subcommand_required(true)
                    .allow_external_subcommands(false);

                if name_long.is_some() {
                    command = command.alias(*name_short);
                }

                if let Some(l) = explanation_long {
                    command = command.long_about(*l);
                }

                for child in children.iter() {
                    command = command.subcommand(child.build_cli());
                }
            }
            EbiCommand::Command {
                name_short,
                name_long,
                explanation_short,
                explanation_long,
                cli_command,
                input_types,
                input_names,
                input_helps,
                ..
            } => {
                command = Command::new(self.long_name()).about(*explanation_short);

                if name_long.is_some() {
                    command = command.alias(*name_short);
                }

                if let Some(l) = explanation_long {
                    command = command.long_about(*l);
                }

                for (i, (input_name, (input_type, input_help))) in input_names
                    .iter()
                    .zip(input_types.iter().zip(input_helps.iter()))
                    .enumerate()
                {
                    let arg = Arg::new(format!("{}x{}", input_name, i))
                        .action(ArgAction::Set)
                        .value_name(*input_name)
                        .help(*input_help)
                        .required(true)
                        .value_parser(EbiInputType::get_parser_of_list(input_type))
                        .long_help(format!(
                            "{}: {}.",
                            input_help,
                            EbiInputType::possible_inputs_as_strings_with_articles(
                                input_type, " or "
                            )
                        ));

                    command = command.arg(arg);
                }

                if let Some(f) = cli_command {
                    command = (f)(command);
                }

                command = command.arg(
                    Arg::new(ARG_ID_OUTPUT)
                        .short(ARG_SHORT_OUTPUT)
                        .long(ARG_ID_OUTPUT)
                        .action(ArgAction::Set)
                        .value_name("FILE")
                        .help("Saves the result to a file.")
                        .required(false)
                        .value_parser(value_parser!(PathBuf)),
                );
            }
        };
        command
    }

    pub fn long_name(&self) -> &'static str {
        match self {
            EbiCommand::Group {
                name_short,
                name_long,
                ..
            }
            | EbiCommand::Command {
                name_short,
                name_long,
                ..
            } => name_long.unwrap_or(*name_short),
        }
    }

    pub fn get_progress_bar(total_ticks: usize) -> ProgressBar {
        let pb = ProgressBar::new(total_ticks as u64);
        if let Ok(style) = ProgressStyle::with_template("[{wide_bar:.cyan/blue}] {pos:>7}/{len:7}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_position(0);
        pb
    }

    pub fn execute(&self, cli_matches: &ArgMatches) -> Result<()> {
        match self {
            EbiCommand::Group { children, .. } => {
                for child in children.iter() {
                    if let Some(sub_matches) = cli_matches.subcommand_matches(child.long_name()) {
                        return child.execute(sub_matches);
                    }
                }
            }
            EbiCommand::Command {
                input_types,
                input_names,
                execute,
                output_type,
                ..
            } => {
                //read the inputs
                let mut inputs = vec![];
                for (i, (input_types, input_name)) in
                    input_types.iter().zip(input_names.iter()).enumerate()
                {
                    let cli_id = format!("{}x{}", input_name, i);

                    log::info!("Reading {}", input_name);
                    let input = ebi_input::attempt_parse(input_types, cli_matches, &cli_id)
                        .with_context(|| format!("reading parameter {}", input_name))?;
                    inputs.push(input);
                }

                log::info!("Starting {}", self.long_name());

                let result = (execute)(inputs, cli_matches)?;

                if &result.get_type() != *output_type {
                    return Err(anyhow!(
                        "output type {} does not match the declared output of {}",
                        result.get_type(),
                        output_type
                    ));
                }

                let to_file = cli_matches.get_one::<PathBuf>(ARG_ID_OUTPUT);
                match to_file {
                    Some(to_file) => log::info!("Writing {} to {:?}", output_type, to_file),
                    None => log::info!("Writing {}", output_type),
                }
                return result.export(to_file.map(PathBuf::as_path));
            }
        }
        Err(anyhow!("command not recognised"))
    }
}

/// Adds the arguments that influence estimation and simulation.
pub fn add_config_arguments(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ID_CONFIG)
                .long(ARG_ID_CONFIG)
                .action(ArgAction::Set)
                .value_name("FILE")
                .help("Read the settings from a JSON file. Other arguments take precedence.")
                .required(false)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_ID_SEED)
                .long(ARG_ID_SEED)
                .action(ArgAction::Set)
                .value_name("NUMBER")
                .help("Seed of the random generators, for reproducible results.")
                .required(false)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ID_RACE)
                .long(ARG_ID_RACE)
                .action(ArgAction::SetTrue)
                .help("Let the enabled transitions race on their delays, instead of choosing by probability.")
                .required(false),
        )
}

/// The settings from the configuration file, if given, overridden by the command line.
pub fn get_config(cli_matches: &ArgMatches) -> Result<SimulationConfig> {
    let mut config = match cli_matches.try_get_one::<PathBuf>(ARG_ID_CONFIG)? {
        Some(path) => SimulationConfig::import_from_path(path).context("reading the configuration")?,
        None => SimulationConfig::default(),
    };

    if let Some(seed) = cli_matches.try_get_one::<u64>(ARG_ID_SEED)? {
        config.seed = Some(*seed);
    }
    if cli_matches.try_get_one::<bool>(ARG_ID_RACE)? == Some(&true) {
        config.selection_policy = SelectionPolicy::Race;
    }
    Ok(config)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("`{}` is not an RFC 3339 timestamp", value))
}

#[cfg(test)]
mod tests {
    use super::EBI_COMMANDS;

    #[test]
    fn cli_is_consistent() {
        EBI_COMMANDS.build_cli().debug_assert();
    }

    #[test]
    fn cli_parses_simulate() {
        let matches = EBI_COMMANDS
            .build_cli()
            .try_get_matches_from(vec![
                "ebi-spn",
                "simulate",
                "testfiles/a-bc-d.alpn",
                "testfiles/a-bc-d.json",
                "10",
                "--seed",
                "3",
                "--race",
            ])
            .unwrap();
        let sub_matches = matches.subcommand_matches("simulate").unwrap();
        let config = super::get_config(sub_matches).unwrap();
        assert_eq!(config.seed, Some(3));
        assert_eq!(
            config.selection_policy,
            crate::techniques::token_game::SelectionPolicy::Race
        );
    }
}
