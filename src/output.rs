use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::{
    control::Stats,
    geom::Enclosure,
    result::{RowSumErrors, ViewFactors},
    settings::Settings,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::PairState;

    fn two_surfaces() -> ViewFactors {
        let mut vf = ViewFactors::new(vec![1.0, 2.0], vec![None, None]);
        vf.set(1, 0, 0.5, PairState::Unobstructed);
        vf
    }

    #[test]
    fn matrix_text() {
        let mut buf = Vec::new();
        write_matrix(&mut buf, &two_surfaces()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "2");
        assert_eq!(lines.len(), 3);
        let row: Vec<f64> = lines[2].split_whitespace().map(|v| v.parse().unwrap()).collect();
        assert_eq!(row, vec![0.25, 0.0]);
    }

    #[test]
    fn summary_json() {
        let vf = two_surfaces();
        let summary = Summary {
            timestamp: "now".to_string(),
            geometry: "two.obj".to_string(),
            surfaces: vf.len(),
            stats: &vf.stats,
            failed_to_converge: vf.failed_to_converge(),
            volume: None,
            row_sums: Some(vf.row_sum_errors()),
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["surfaces"], 2);
        assert_eq!(value["stats"]["n_zero"], 0);
        assert!(value["volume"].is_null());
        assert!(value["row_sums"]["max"].as_f64().unwrap() > 0.0);
    }
}

/// Run summary written alongside the view factors.
#[derive(Debug, Serialize)]
struct Summary<'a> {
    timestamp: String,
    geometry: String,
    surfaces: usize,
    stats: &'a Stats,
    failed_to_converge: Vec<(usize, usize)>,
    volume: Option<f64>,
    row_sums: Option<RowSumErrors>,
}

/// Writes the number of surfaces, then one row of `F(n, m)` per surface.
pub fn write_matrix(writer: &mut impl Write, vf: &ViewFactors) -> std::io::Result<()> {
    writeln!(writer, "{}", vf.len())?;
    for row in vf.f_matrix().outer_iter() {
        writeln!(writer, "{}", row.iter().map(|f| format!("{:.6e}", f)).join(" "))?;
    }
    Ok(())
}

/// Writes `view_factors.txt` and `summary.json` to the output directory and
/// prints the report.
pub fn writeup(settings: &Settings, enclosure: &Enclosure, vf: &ViewFactors) -> Result<()> {
    let dir = &settings.directory;
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let path = dir.join("view_factors.txt");
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_matrix(&mut writer, vf)?;
    writer.flush()?;
    info!("view factors written to {}", path.display());

    let (volume, row_sums) = if settings.enclosure {
        (Some(enclosure.volume()), Some(vf.row_sum_errors()))
    } else {
        (None, None)
    };
    let summary = Summary {
        timestamp: chrono::Local::now().to_rfc3339(),
        geometry: settings.geom_name.clone(),
        surfaces: vf.len(),
        stats: &vf.stats,
        failed_to_converge: vf.failed_to_converge(),
        volume,
        row_sums,
    };
    write_summary(&dir.join("summary.json"), &summary)?;

    println!("Results:");
    println!("{}", vf.stats);
    if let (Some(volume), Some(row_sums)) = (summary.volume, &summary.row_sums) {
        println!("Enclosure volume: {:.6e}", volume);
        println!("{}", row_sums);
    }
    Ok(())
}

fn write_summary(path: &Path, summary: &Summary) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.flush()?;
    info!("summary written to {}", path.display());
    Ok(())
}
