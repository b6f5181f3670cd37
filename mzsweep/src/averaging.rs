/*! Merge several spectra onto one evenly spaced m/z axis and take the mean.

The axis is described by a [`ReferenceGrid`] derived from the first spectrum. Reusing
one grid through a [`SignalAverager`] keeps every averaged spectrum sample-aligned
with every other, which the energy interpolation step relies on. The resampling and
mean themselves are done by [`mzsignal::average::SignalAverager`].
*/
use mzsignal::average::SignalAverager as ArrayAverager;
use mzsignal::ArrayPair;
use thiserror::Error;
use tracing::{debug, instrument};

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::arrayops::{min_gap, unique_sorted};
use crate::spectrum::{ScanWindow, Spectrum};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AveragingError {
    #[error("Cannot average an empty collection of spectra")]
    EmptyInput,
    #[error("Bin width must be a positive finite number, received {0}")]
    InvalidBinWidth(f64),
    #[error("Cannot infer a bin width from a spectrum with fewer than two distinct m/z values")]
    CannotInferBinWidth,
    #[error("The scan window {0:?} does not contain any bins")]
    EmptyGrid(ScanWindow),
}

/// The bin width and scan window of an evenly spaced m/z axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceGrid {
    pub bin_width: f64,
    pub scan_window: ScanWindow,
}

impl ReferenceGrid {
    pub fn new(scan_window: ScanWindow, bin_width: f64) -> Result<Self, AveragingError> {
        if !bin_width.is_finite() || bin_width <= 0.0 {
            return Err(AveragingError::InvalidBinWidth(bin_width));
        }
        if !(scan_window.width() >= bin_width) {
            return Err(AveragingError::EmptyGrid(scan_window));
        }
        Ok(Self {
            bin_width,
            scan_window,
        })
    }

    /// Build a grid over `spectrum`'s scan window. Without an explicit `bin_width`,
    /// the smallest spacing between its distinct m/z values is used.
    pub fn from_spectrum(
        spectrum: &Spectrum,
        bin_width: Option<f64>,
    ) -> Result<Self, AveragingError> {
        let bin_width = match bin_width {
            Some(w) => w,
            None => {
                let unique = unique_sorted(&spectrum.mz_array);
                min_gap(&unique).ok_or(AveragingError::CannotInferBinWidth)?
            }
        };
        Self::new(spectrum.scan_window, bin_width)
    }

    fn averager<'a>(&self) -> ArrayAverager<'a> {
        ArrayAverager::new(
            self.scan_window.lower_bound,
            self.scan_window.upper_bound,
            self.bin_width,
        )
    }

    /// The m/z values of every bin
    pub fn mz_array(&self) -> Vec<f64> {
        self.averager().mz_grid
    }
}

/// Averages groups of spectra onto one shared [`ReferenceGrid`]
#[derive(Debug, Clone, PartialEq)]
pub struct SignalAverager {
    pub grid: ReferenceGrid,
}

impl SignalAverager {
    pub fn new(grid: ReferenceGrid) -> Self {
        Self { grid }
    }

    #[instrument(level = "debug", skip_all, fields(n = spectra.len()))]
    pub fn average(
        &self,
        spectra: &[&Spectrum],
        label: Option<&str>,
    ) -> Result<Spectrum, AveragingError> {
        let (first, last) = match (spectra.first(), spectra.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(AveragingError::EmptyInput),
        };
        let mut averager = self.grid.averager();
        for spectrum in spectra {
            averager.push(ArrayPair::from((
                spectrum.mz_array.as_slice(),
                spectrum.intensity_array.as_slice(),
            )));
        }
        let intensity_array = averager.interpolate();
        let mz_array = averager.mz_grid.clone();
        if mz_array.is_empty() {
            return Err(AveragingError::EmptyGrid(self.grid.scan_window));
        }

        let label = format!(
            "AV: {:.2}-{:.2}; {}",
            first.start_time,
            last.start_time,
            label.unwrap_or_default()
        );
        debug!("Averaged {} spectra: {label}", spectra.len());
        Ok(Spectrum {
            mz_array,
            intensity_array,
            scan_window: self.grid.scan_window,
            start_time: first.start_time,
            label: Some(label),
        })
    }

    /// Average several independent groups of spectra, preserving their order
    pub fn average_groups(
        &self,
        groups: &[(Vec<&Spectrum>, String)],
    ) -> Result<Vec<Spectrum>, AveragingError> {
        #[cfg(feature = "parallelism")]
        let it = groups.par_iter();
        #[cfg(not(feature = "parallelism"))]
        let it = groups.iter();
        it.map(|(spectra, label)| self.average(spectra, Some(label.as_str())))
            .collect()
    }
}

/// Average `spectra` onto a grid built from the first of them.
///
/// See [`ReferenceGrid::from_spectrum`] for how the grid is chosen.
pub fn average(
    spectra: &[&Spectrum],
    bin_width: Option<f64>,
    label: Option<&str>,
) -> Result<Spectrum, AveragingError> {
    let first = spectra.first().ok_or(AveragingError::EmptyInput)?;
    let grid = ReferenceGrid::from_spectrum(first, bin_width)?;
    SignalAverager::new(grid).average(spectra, label)
}
