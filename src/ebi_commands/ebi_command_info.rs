use std::io::Write;

use crate::ebi_framework::{
    ebi_command::EbiCommand,
    ebi_input::{EbiInput, EbiInputType},
    ebi_output::{EbiOutput, EbiOutputType},
    infoable::Infoable,
};

pub const EBI_INFO: EbiCommand = EbiCommand::Command {
    name_short: "info",
    name_long: Some("information"),
    explanation_short: "Show information about a Petri net or an event log.",
    explanation_long: None,
    cli_command: None,
    input_types: &[&[&EbiInputType::LabelledPetriNet, &EbiInputType::EventLog]],
    input_names: &["FILE"],
    input_helps: &["A Petri net or event log."],
    execute: |mut inputs, _| {
        let input = inputs.remove(0);
        let mut f = vec![];

        writeln!(
            f,
            "Object was recognised as {} {}.",
            input.get_type().get_article(),
            input.get_type()
        )?;

        match input {
            EbiInput::LabelledPetriNet(net) => net.info(&mut f)?,
            EbiInput::EventLog(log) => log.info(&mut f)?,
            EbiInput::Usize(value) => writeln!(f, "Value\t{}", value)?,
        }

        Ok(EbiOutput::String(String::from_utf8(f)?))
    },
    output_type: &EbiOutputType::String,
};
