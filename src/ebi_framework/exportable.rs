use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

pub trait Exportable {
    fn export(&self, f: &mut dyn std::io::Write) -> Result<()>;

    /// Exports to the given file, or to standard output if there is none.
    fn export_to_path(&self, path: Option<&Path>) -> Result<()> {
        match path {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("could not create `{}`", path.display()))?;
                let mut writer = BufWriter::new(file);
                self.export(&mut writer)
                    .with_context(|| format!("could not write `{}`", path.display()))?;
                writer
                    .flush()
                    .with_context(|| format!("could not write `{}`", path.display()))
            }
            None => {
                let stdout = std::io::stdout();
                let mut lock = stdout.lock();
                self.export(&mut lock)?;
                Ok(lock.flush()?)
            }
        }
    }
}

impl Exportable for String {
    fn export(&self, f: &mut dyn std::io::Write) -> Result<()> {
        Ok(writeln!(f, "{}", self)?)
    }
}
