use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::app::BatchReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct ConsoleOutput;

impl ConsoleOutput {
    /// Closing banner, printed whatever the error count.
    pub fn print_completion(report: &BatchReport, log_path: &Utf8Path) -> io::Result<()> {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let reset = "\x1b[0m";
        let color = if report.summary.failed == 0 { green } else { yellow };

        let mut stdout = io::stdout();
        writeln!(stdout)?;
        writeln!(stdout, "{color}{}{reset}", "=".repeat(50))?;
        writeln!(
            stdout,
            "{color}Conversion complete! Check {log_path} for details.{reset}"
        )?;
        writeln!(stdout, "{color}{}{reset}", "=".repeat(50))?;
        Ok(())
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
