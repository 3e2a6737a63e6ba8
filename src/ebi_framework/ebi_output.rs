use anyhow::Result;
use std::path::Path;
use strum_macros::Display;

use crate::{ebi_framework::exportable::Exportable, ebi_objects::event_log::EventLog};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum EbiOutputType {
    #[strum(serialize = "text")]
    String,
    #[strum(serialize = "event log")]
    EventLog,
}

pub enum EbiOutput {
    String(String),
    EventLog(EventLog),
}

impl EbiOutput {
    pub fn get_type(&self) -> EbiOutputType {
        match self {
            EbiOutput::String(_) => EbiOutputType::String,
            EbiOutput::EventLog(_) => EbiOutputType::EventLog,
        }
    }

    /// Writes the output to the file, or to standard output if there is none.
    pub fn export(&self, to_file: Option<&Path>) -> Result<()> {
        match self {
            EbiOutput::String(string) => string.export_to_path(to_file),
            EbiOutput::EventLog(log) => log.export_to_path(to_file),
        }
    }
}
