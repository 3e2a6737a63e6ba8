use anyhow::{Context, Result, anyhow};
use clap::{ArgMatches, builder::ValueParser, value_parser};
use std::path::PathBuf;
use strum_macros::Display;

use crate::{
    ebi_framework::importable::Importable,
    ebi_objects::{event_log::EventLog, labelled_petri_net::LabelledPetriNet},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum EbiInputType {
    #[strum(serialize = "labelled Petri net")]
    LabelledPetriNet,
    #[strum(serialize = "event log")]
    EventLog,
    #[strum(serialize = "natural number")]
    Usize,
}

impl EbiInputType {
    pub fn get_article(&self) -> &str {
        match self {
            EbiInputType::LabelledPetriNet => "a",
            EbiInputType::EventLog => "an",
            EbiInputType::Usize => "a",
        }
    }

    /// Files are read after parsing the command line; other inputs are parsed by clap.
    pub fn get_parser_of_list(input_types: &[&EbiInputType]) -> ValueParser {
        if input_types
            .iter()
            .all(|input_type| input_type == &&EbiInputType::Usize)
        {
            value_parser!(usize).into()
        } else {
            value_parser!(PathBuf).into()
        }
    }

    pub fn possible_inputs_as_strings_with_articles(
        input_types: &[&EbiInputType],
        last_connector: &str,
    ) -> String {
        let mut list = input_types
            .iter()
            .map(|input_type| format!("{} {}", input_type.get_article(), input_type))
            .collect::<Vec<_>>();
        match list.pop() {
            Some(last) if !list.is_empty() => format!("{}{}{}", list.join(", "), last_connector, last),
            Some(last) => last,
            None => String::new(),
        }
    }

    pub fn read(&self, cli_matches: &ArgMatches, cli_id: &str) -> Result<EbiInput> {
        match self {
            EbiInputType::Usize => cli_matches
                .try_get_one::<usize>(cli_id)?
                .map(|value| EbiInput::Usize(*value))
                .ok_or_else(|| anyhow!("no number given")),
            EbiInputType::LabelledPetriNet => Ok(EbiInput::LabelledPetriNet(
                LabelledPetriNet::import_from_path(get_path(cli_matches, cli_id)?)?,
            )),
            EbiInputType::EventLog => Ok(EbiInput::EventLog(EventLog::import_from_path(
                get_path(cli_matches, cli_id)?,
            )?)),
        }
    }
}

pub enum EbiInput {
    LabelledPetriNet(LabelledPetriNet),
    EventLog(EventLog),
    Usize(usize),
}

impl EbiInput {
    pub fn get_type(&self) -> EbiInputType {
        match self {
            EbiInput::LabelledPetriNet(_) => EbiInputType::LabelledPetriNet,
            EbiInput::EventLog(_) => EbiInputType::EventLog,
            EbiInput::Usize(_) => EbiInputType::Usize,
        }
    }

    pub fn to_labelled_petri_net(self) -> Result<LabelledPetriNet> {
        match self {
            EbiInput::LabelledPetriNet(net) => Ok(net),
            other => Err(anyhow!(
                "expected a labelled Petri net, but got {} {}",
                other.get_type().get_article(),
                other.get_type()
            )),
        }
    }

    pub fn to_event_log(self) -> Result<EventLog> {
        match self {
            EbiInput::EventLog(log) => Ok(log),
            other => Err(anyhow!(
                "expected an event log, but got {} {}",
                other.get_type().get_article(),
                other.get_type()
            )),
        }
    }

    pub fn to_usize(self) -> Result<usize> {
        match self {
            EbiInput::Usize(value) => Ok(value),
            other => Err(anyhow!(
                "expected a natural number, but got {} {}",
                other.get_type().get_article(),
                other.get_type()
            )),
        }
    }
}

fn get_path<'a>(cli_matches: &'a ArgMatches, cli_id: &str) -> Result<&'a PathBuf> {
    cli_matches
        .try_get_one::<PathBuf>(cli_id)
        .context("reading the argument as a path")?
        .ok_or_else(|| anyhow!("no argument given, or it could not be parsed as a path"))
}

/**
 * Attempt to read an input as any of the given input types. Returns the last error if unsuccessful.
 */
pub fn attempt_parse(
    input_types: &[&EbiInputType],
    cli_matches: &ArgMatches,
    cli_id: &str,
) -> Result<EbiInput> {
    let mut error = None;
    for input_type in input_types {
        match input_type
            .read(cli_matches, cli_id)
            .with_context(|| format!("parsing as {} {}", input_type.get_article(), input_type))
        {
            Ok(input) => return Ok(input),
            Err(e) => error = Some(e),
        }
    }
    Err(error.unwrap_or_else(|| anyhow!("no input types given")))
}
