use std::io::{self, Write};

use serde::Serialize;

use crate::app::{IngestReport, InspectResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(result: &IngestReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_inspect(result: &InspectResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_report(result: &IngestReport) -> io::Result<()> {
        let mut stdout = io::stdout();
        if result.dry_run {
            writeln!(
                stdout,
                "dry run: fetched {} records from {} page(s), nothing written",
                result.records_fetched, result.pages
            )?;
            return Ok(());
        }
        writeln!(
            stdout,
            "committed {} of {} records in {} batches ({:.2} records/second)",
            result.committed, result.records_fetched, result.batches, result.records_per_second
        )
    }

    pub fn print_inspect(result: &InspectResult) -> io::Result<()> {
        let mut stdout = io::stdout();
        writeln!(
            stdout,
            "{} payload: {} records, {} with a reason",
            result.codec, result.records, result.with_reason
        )?;
        for record in &result.sample {
            writeln!(stdout, "  {record}")?;
        }
        Ok(())
    }
}
