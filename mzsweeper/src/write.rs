use std::fs;
use std::io::{self, Write};
use std::path::Path;

use itertools::Itertools;
use tracing::{debug, instrument};

use mzsweep::ExplorerView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    JSON,
    TSV,
}

impl OutputFormat {
    /// `-` writes JSON to STDOUT, files are inferred from their extension
    pub fn infer_from_path(path: &Path) -> Option<Self> {
        if path == Path::new("-") {
            return Some(Self::JSON);
        }
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "json" => Some(Self::JSON),
            "tsv" | "txt" => Some(Self::TSV),
            _ => None,
        }
    }
}

pub fn write_json<W: Write>(mut writer: W, views: &[ExplorerView]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, views)?;
    writeln!(writer)?;
    writer.flush()
}

/// One row per detected peak, with the labels of fragments matched to it
pub fn write_tsv<W: Write>(mut writer: W, views: &[ExplorerView]) -> io::Result<()> {
    writeln!(
        writer,
        "energy\tinterpolated\tapex_mz\tcentroid_mz\tintensity\tlabelled\tfragments"
    )?;
    for view in views {
        for peak in view.peaks.iter() {
            let labelled = view.labelled_peaks.iter().any(|p| p.index == peak.index);
            let fragments = view
                .fragments
                .iter()
                .filter(|f| f.matched_peak.is_some_and(|p| p.index == peak.index))
                .map(|f| f.ion.label.as_str())
                .join(",");
            writeln!(
                writer,
                "{}\t{}\t{:.4}\t{:.4}\t{:.2}\t{}\t{}",
                view.energy,
                view.interpolated,
                peak.mz,
                peak.centroid_mz,
                peak.intensity,
                labelled,
                fragments
            )?;
        }
    }
    writer.flush()
}

#[instrument(level = "debug", skip(views))]
pub fn write_output(
    path: &Path,
    format: OutputFormat,
    views: &[ExplorerView],
) -> io::Result<()> {
    debug!("Writing {} views as {format:?}", views.len());
    if path == Path::new("-") {
        let handle = io::stdout().lock();
        return match format {
            OutputFormat::JSON => write_json(handle, views),
            OutputFormat::TSV => write_tsv(handle, views),
        };
    }
    let handle = io::BufWriter::new(fs::File::create(path)?);
    match format {
        OutputFormat::JSON => write_json(handle, views),
        OutputFormat::TSV => write_tsv(handle, views),
    }
}
