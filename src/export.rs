// src/export.rs - Plot data export for the external plotting process
//
// One row per sample: `<cycle> <position> <cycle> <velocity>`, i.e. an
// (x, y) column pair for the position series followed by one for velocity.
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::AcquisitionError;
use crate::history::{SampleHistory, SharedHistory, lock_history};

pub fn write_plot_data<W: Write>(history: &SampleHistory, mut out: W) -> io::Result<usize> {
    let mut rows = 0;
    for (cycle, sample) in history.iter().enumerate() {
        writeln!(out, "{} {} {} {}", cycle, sample.position, cycle, sample.velocity)?;
        rows += 1;
    }
    out.flush()?;
    Ok(rows)
}

/// Write the shared history to `path`, replacing any existing file
pub fn export_plot_data(history: &SharedHistory, path: &Path) -> Result<usize, AcquisitionError> {
    tracing::info!("Writing plot data to {}", path.display());
    let file = File::create(path).map_err(AcquisitionError::Export)?;
    let history = lock_history(history);
    let rows = write_plot_data(&history, BufWriter::new(file)).map_err(AcquisitionError::Export)?;
    tracing::debug!("Wrote {} plot rows", rows);
    Ok(rows)
}
