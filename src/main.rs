use anyhow::{Context, Result};
use clap::{Args, FromArgMatches, crate_version};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use env_logger::Builder;

use ebi_spn::ebi_framework::ebi_command::EBI_COMMANDS;

pub fn main() -> Result<()> {
    let command = Verbosity::<InfoLevel>::augment_args(EBI_COMMANDS.build_cli());
    let command = command.version(crate_version!());
    let cli_matches = command.get_matches();

    //the verbosity flags are global, so the innermost subcommand has them all
    let mut sub_matches = &cli_matches;
    while let Some((_, matches)) = sub_matches.subcommand() {
        sub_matches = matches;
    }
    let verbosity = Verbosity::<InfoLevel>::from_arg_matches(sub_matches)?;
    Builder::new()
        .filter_level(verbosity.log_level_filter())
        .init();

    log::info!("Ebi-SPN starting");

    EBI_COMMANDS.execute(&cli_matches).context("Executing Ebi-SPN")
}
