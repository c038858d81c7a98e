//! Persisted table formats.
//!
//! Downstream statistics tooling reads these files field for field, so the
//! layout is fixed: comma separated rows terminated by `\r\n`, a header row,
//! minimal quoting, and floats in shortest round-trip form with a trailing
//! `.0` for integral values. Outside `[1e-4, 1e16)` floats switch to
//! exponent form with a signed, two digit exponent (`1.3e-06`, `1e+16`).

use std::io::{self, Write};

use crate::{Condition, ParadigmError, Result, RuntimeLogRecord, ScheduleEntry, TrialLabel};

pub const SCHEDULE_HEADER: [&str; 5] = [
    "block",
    "trial",
    "condition",
    "simulated_onset",
    "duration",
];

pub const EVENT_LOG_HEADER: [&str; 6] = [
    "block",
    "trial",
    "condition",
    "onset_time",
    "duration",
    "cumulative_onset",
];

const ROW_END: &str = "\r\n";

/// Shortest representation that parses back to the same value.
pub fn format_float(v: f64) -> String {
    let repr = format!("{v:?}");
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => repr,
    }
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

fn write_row<W: Write>(w: &mut W, fields: &[String]) -> io::Result<()> {
    let row: Vec<String> = fields.iter().map(|f| quote(f)).collect();
    write!(w, "{}{}", row.join(","), ROW_END)
}

fn header(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub fn write_schedule<W: Write>(w: &mut W, plan: &[ScheduleEntry]) -> io::Result<()> {
    write_row(w, &header(&SCHEDULE_HEADER))?;
    for entry in plan {
        write_row(
            w,
            &[
                entry.block.to_string(),
                entry.trial.to_string(),
                entry.condition.to_string(),
                format_float(entry.planned_onset),
                format_float(entry.planned_duration),
            ],
        )?;
    }
    Ok(())
}

pub fn write_event_log<W: Write>(w: &mut W, log: &[RuntimeLogRecord]) -> io::Result<()> {
    write_row(w, &header(&EVENT_LOG_HEADER))?;
    for record in log {
        write_row(
            w,
            &[
                record.block.to_string(),
                record.trial.to_string(),
                record.condition.to_string(),
                format_float(record.onset),
                format_float(record.duration),
                format_float(record.cumulative_onset()),
            ],
        )?;
    }
    Ok(())
}

/// Human-readable presentation order, one line per planned entry.
pub fn write_transcript<W: Write>(w: &mut W, plan: &[ScheduleEntry]) -> io::Result<()> {
    for entry in plan {
        writeln!(
            w,
            "Block: {}, Trial: {}, Condition: {}, Simulated Onset: {}, Duration: {}",
            entry.block,
            entry.trial,
            entry.condition,
            format_float(entry.planned_onset),
            format_float(entry.planned_duration),
        )?;
    }
    Ok(())
}

/// Onset file body: two decimals, single spaces, trailing newline.
pub fn format_onsets(onsets: &[f64]) -> String {
    let mut line = onsets
        .iter()
        .map(|o| format!("{o:.2}"))
        .collect::<Vec<_>>()
        .join(" ");
    line.push('\n');
    line
}

pub fn parse_onsets(text: &str) -> Result<Vec<f64>> {
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|e| ParadigmError::parse(1, format!("onset {tok:?}: {e}")))
        })
        .collect()
}

pub fn parse_schedule(text: &str) -> Result<Vec<ScheduleEntry>> {
    let rows = split_rows(text)?;
    check_header(&rows, &SCHEDULE_HEADER)?;
    rows.iter()
        .enumerate()
        .skip(1)
        .map(|(i, row)| {
            let line = i + 1;
            expect_width(row, SCHEDULE_HEADER.len(), line)?;
            Ok(ScheduleEntry {
                block: field(&row[0], line)?,
                trial: label(&row[1], line)?,
                condition: Condition::from(row[2].as_str()),
                planned_onset: field(&row[3], line)?,
                planned_duration: field(&row[4], line)?,
            })
        })
        .collect()
}

/// Parses an event log table. `cumulative_onset` is derived, so it is read
/// for validation only.
pub fn parse_event_log(text: &str) -> Result<Vec<RuntimeLogRecord>> {
    let rows = split_rows(text)?;
    check_header(&rows, &EVENT_LOG_HEADER)?;
    rows.iter()
        .enumerate()
        .skip(1)
        .map(|(i, row)| {
            let line = i + 1;
            expect_width(row, EVENT_LOG_HEADER.len(), line)?;
            let _: f64 = field(&row[5], line)?;
            Ok(RuntimeLogRecord {
                block: field(&row[0], line)?,
                trial: label(&row[1], line)?,
                condition: Condition::from(row[2].as_str()),
                onset: field(&row[3], line)?,
                duration: field(&row[4], line)?,
            })
        })
        .collect()
}

fn field<T>(raw: &str, line: usize) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ParadigmError::parse(line, format!("{raw:?}: {e}")))
}

fn label(raw: &str, line: usize) -> Result<TrialLabel> {
    raw.parse::<TrialLabel>()
        .map_err(|e| ParadigmError::parse(line, e.to_string()))
}

fn expect_width(row: &[String], width: usize, line: usize) -> Result<()> {
    if row.len() == width {
        Ok(())
    } else {
        Err(ParadigmError::parse(
            line,
            format!("expected {width} fields, found {}", row.len()),
        ))
    }
}

fn check_header(rows: &[Vec<String>], expected: &[&str]) -> Result<()> {
    match rows.first() {
        Some(row) if row.iter().map(String::as_str).eq(expected.iter().copied()) => Ok(()),
        Some(row) => Err(ParadigmError::parse(1, format!("unexpected header {row:?}"))),
        None => Err(ParadigmError::parse(1, "missing header")),
    }
}

/// Splits CSV text into rows of unquoted fields. Quoted fields may contain
/// separators, doubled quotes and line breaks.
fn split_rows(text: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cur.push('"');
                }
                '"' => quoted = false,
                _ => cur.push(c),
            }
            continue;
        }
        match c {
            '"' if cur.is_empty() => quoted = true,
            ',' => row.push(std::mem::take(&mut cur)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                row.push(std::mem::take(&mut cur));
                rows.push(std::mem::take(&mut row));
            }
            _ => cur.push(c),
        }
    }

    if quoted {
        return Err(ParadigmError::parse(rows.len() + 1, "unterminated quoted field"));
    }
    if !cur.is_empty() || !row.is_empty() {
        row.push(cur);
        rows.push(row);
    }
    Ok(rows)
}
