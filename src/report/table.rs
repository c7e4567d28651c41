//! Count report types and results-table formatting.
//!
//! A [`CountReport`] renders as text (Display, in the counter's
//! tab-separated results layout), serializes as JSON, or exports as TSV.

use serde::Serialize;
use std::fmt;

use crate::error::CellCountError;

/// The result of counting markers over a stack.
#[derive(Clone, Debug, Serialize)]
pub struct CountReport {
    /// Counter type names, in declaration order.
    pub type_names: Vec<String>,
    /// One row per plane, ascending.
    pub rows: Vec<SliceCounts>,
    /// Count per type over the whole stack.
    pub totals: Vec<usize>,
    /// Number of planes in the stack.
    pub stack_size: usize,
    /// Markers whose slice index lies beyond the stack (counted in totals only).
    pub markers_outside_stack: usize,
    /// Whether only markers inside subregions were counted.
    pub restricted_to_subregions: bool,
}

/// Marker counts on a single plane.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SliceCounts {
    /// 1-based linear stack index.
    pub slice: usize,
    /// Count per type, in declaration order.
    pub counts: Vec<usize>,
    pub channel: usize,
    pub z_pos: usize,
    pub frame: usize,
}

impl CountReport {
    /// Returns true if per-plane rows are meaningful (more than one plane).
    pub fn is_stack(&self) -> bool {
        self.stack_size > 1
    }

    /// Sum of all totals.
    pub fn grand_total(&self) -> usize {
        self.totals.iter().sum()
    }

    /// Export as a tab-separated table with a header row, one row per plane
    /// and a final `Total` row.
    pub fn to_tsv_string(&self) -> Result<String, CellCountError> {
        let mut header = vec!["Slice".to_string()];
        header.extend(self.type_names.iter().cloned());
        header.extend(["C-pos", "Z-pos", "T-pos"].map(String::from));

        let mut records: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                let mut record = vec![row.slice.to_string()];
                record.extend(row.counts.iter().map(usize::to_string));
                record.extend([row.channel, row.z_pos, row.frame].map(|v| v.to_string()));
                record
            })
            .collect();

        let mut total = vec!["Total".to_string()];
        total.extend(self.totals.iter().map(usize::to_string));
        total.extend(std::iter::repeat(String::new()).take(3));
        records.push(total);

        tsv_string(&header, &records)
    }
}

impl fmt::Display for CountReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slice\t")?;
        for name in &self.type_names {
            write!(f, "{name}\t")?;
        }
        writeln!(f, "\tC-pos\tZ-pos\tT-pos\t")?;

        if self.is_stack() {
            for row in &self.rows {
                write!(f, "{}\t", row.slice)?;
                for count in &row.counts {
                    write!(f, "{count}\t")?;
                }
                writeln!(f, "{}\t{}\t{}\t", row.channel, row.z_pos, row.frame)?;
            }
            writeln!(f)?;
        }

        write!(f, "Total\t")?;
        for count in &self.totals {
            write!(f, "{count}\t")?;
        }
        writeln!(f)?;

        if self.markers_outside_stack > 0 {
            writeln!(
                f,
                "({} marker(s) beyond the last plane)",
                self.markers_outside_stack
            )?;
        }
        Ok(())
    }
}

/// Writes a header and records as a tab-separated table.
pub(crate) fn tsv_string(header: &[String], records: &[Vec<String>]) -> Result<String, CellCountError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());

    writer.write_record(header)?;
    for record in records {
        writer.write_record(record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| CellCountError::Io(err.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|err| CellCountError::InvalidInput(format!("table is not valid UTF-8: {err}")))
}
