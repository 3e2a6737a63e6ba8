use anyhow::{Context, Result, anyhow};
use std::io::BufRead;

/// Reads a line-based file format, skipping comment lines that start with `#`.
pub struct LineReader<'a> {
    reader: &'a mut dyn BufRead,
    line_no: usize,
    line: String,
}

impl<'a> LineReader<'a> {
    pub fn new(reader: &'a mut (dyn BufRead + 'a)) -> Self {
        LineReader::<'a> {
            reader,
            line_no: 0,
            line: String::new(),
        }
    }

    pub fn get_last_line_number(&self) -> usize {
        self.line_no
    }

    pub fn get_last_line(&self) -> &str {
        &self.line
    }

    fn next_line_raw(&mut self) -> Result<()> {
        self.line.clear();

        match self.reader.read_line(&mut self.line) {
            Ok(0) => Err(anyhow!("premature end of file")),
            Ok(_) => {
                if self.line.ends_with('\n') {
                    self.line.pop();
                    if self.line.ends_with('\r') {
                        self.line.pop();
                    }
                }
                self.line_no += 1;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn next_line(&mut self) -> Result<()> {
        self.next_line_raw()?;
        while self.get_last_line().trim_start().starts_with('#') {
            self.next_line_raw()?;
        }
        Ok(())
    }

    pub fn next_line_string(&mut self) -> Result<String> {
        self.next_line()?;
        Ok(self.get_last_line().to_string())
    }

    pub fn next_line_index(&mut self) -> Result<usize> {
        self.next_line()?;
        self.get_last_line()
            .trim()
            .parse::<usize>()
            .with_context(|| {
                format!(
                    "failed to read integer at line {}; found `{}`",
                    self.get_last_line_number(),
                    self.get_last_line()
                )
            })
    }

    pub fn next_line_natural(&mut self) -> Result<u64> {
        self.next_line()?;
        self.get_last_line().trim().parse::<u64>().with_context(|| {
            format!(
                "failed to read natural number at line {}; found `{}`",
                self.get_last_line_number(),
                self.get_last_line()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::LineReader;

    #[test]
    fn skips_comments() {
        let mut reader = Cursor::new("# comment\n3\n  # another\r\nx\n");
        let mut lreader = LineReader::new(&mut reader);
        assert_eq!(lreader.next_line_index().unwrap(), 3);
        assert_eq!(lreader.next_line_string().unwrap(), "x");
        assert_eq!(lreader.get_last_line_number(), 4);
        assert!(lreader.next_line().is_err());
    }
}
