//! Measurement result rows and their text/TSV rendering.

use serde::Serialize;
use std::fmt;

use crate::error::CellCountError;
use crate::model::TypeIndex;
use crate::report::tsv_string;

/// The intensity at one marker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeasureRow {
    pub type_index: TypeIndex,
    pub type_name: String,
    pub x: f64,
    pub y: f64,
    /// 1-based linear index of the plane actually sampled.
    pub slice: usize,
    pub channel: usize,
    pub z_pos: usize,
    pub frame: usize,
    pub intensity: f64,
}

/// Intensities for all measured markers plus what was left out.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MeasureReport {
    pub type_names: Vec<String>,
    pub rows: Vec<MeasureRow>,
    /// Markers whose position or slice lies outside the image.
    pub skipped_out_of_bounds: usize,
    /// Markers left out by the subregion restriction.
    pub outside_subregions: usize,
}

impl MeasureReport {
    const HEADER: [&'static str; 8] = ["Type", "Name", "X", "Y", "Slice", "C-pos", "Z-pos", "T-pos"];

    fn record(row: &MeasureRow) -> Vec<String> {
        vec![
            row.type_index.number().to_string(),
            row.type_name.clone(),
            row.x.to_string(),
            row.y.to_string(),
            row.slice.to_string(),
            row.channel.to_string(),
            row.z_pos.to_string(),
            row.frame.to_string(),
            row.intensity.to_string(),
        ]
    }

    /// Export as a tab-separated table, one row per measured marker.
    pub fn to_tsv_string(&self) -> Result<String, CellCountError> {
        let mut header: Vec<String> = Self::HEADER.iter().map(|h| h.to_string()).collect();
        header.push("Intensity".to_string());
        let records: Vec<Vec<String>> = self.rows.iter().map(Self::record).collect();
        tsv_string(&header, &records)
    }
}

impl fmt::Display for MeasureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for column in Self::HEADER {
            write!(f, "{column}\t")?;
        }
        writeln!(f, "Intensity")?;
        for row in &self.rows {
            writeln!(f, "{}", Self::record(row).join("\t"))?;
        }
        if self.skipped_out_of_bounds > 0 {
            writeln!(f, "Skipped (out of bounds): {}", self.skipped_out_of_bounds)?;
        }
        if self.outside_subregions > 0 {
            writeln!(f, "Outside subregions: {}", self.outside_subregions)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> MeasureReport {
        MeasureReport {
            type_names: vec!["Type 1".into()],
            rows: vec![MeasureRow {
                type_index: TypeIndex(0),
                type_name: "Type 1".into(),
                x: 1.5,
                y: 2.0,
                slice: 1,
                channel: 1,
                z_pos: 1,
                frame: 1,
                intensity: 42.0,
            }],
            skipped_out_of_bounds: 2,
            outside_subregions: 0,
        }
    }

    #[test]
    fn text_lists_rows_and_skips() {
        let text = report().to_string();
        assert!(text.starts_with("Type\tName\tX\tY\tSlice\tC-pos\tZ-pos\tT-pos\tIntensity\n"));
        assert!(text.contains("1\tType 1\t1.5\t2\t1\t1\t1\t1\t42\n"));
        assert!(text.contains("Skipped (out of bounds): 2"));
        assert!(!text.contains("Outside subregions"));
    }

    #[test]
    fn tsv_has_one_row_per_marker() {
        let tsv = report().to_tsv_string().expect("tsv");
        assert_eq!(tsv.lines().count(), 2);
        assert!(tsv.lines().next().expect("header").ends_with("\tIntensity"));
    }
}
