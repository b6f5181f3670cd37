//! Plain signal containers shared by every stage of the pipeline.
use std::cmp::Ordering;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpectrumError {
    #[error("Received {mz} m/z values but {intensity} intensities")]
    MismatchedArrays { mz: usize, intensity: usize },
}

/// The m/z interval an acquisition was recorded over
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanWindow {
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl ScanWindow {
    pub fn new(lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }

    pub fn contains(&self, mz: f64) -> bool {
        self.lower_bound <= mz && mz <= self.upper_bound
    }

    pub fn width(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }
}

/// A profile or centroid signal with parallel m/z and intensity arrays.
///
/// The m/z array is ordered in increasing order and the intensity array is
/// always the same length.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Spectrum {
    pub mz_array: Vec<f64>,
    pub intensity_array: Vec<f32>,
    pub scan_window: ScanWindow,
    /// The acquisition time in minutes
    pub start_time: f64,
    pub label: Option<String>,
}

impl Spectrum {
    pub fn new(
        mz_array: Vec<f64>,
        intensity_array: Vec<f32>,
        scan_window: ScanWindow,
        start_time: f64,
        label: Option<String>,
    ) -> Result<Self, SpectrumError> {
        if mz_array.len() != intensity_array.len() {
            return Err(SpectrumError::MismatchedArrays {
                mz: mz_array.len(),
                intensity: intensity_array.len(),
            });
        }
        Ok(Self {
            mz_array,
            intensity_array,
            scan_window,
            start_time,
            label,
        })
    }

    /// Build a spectrum whose scan window spans its first and last m/z
    pub fn from_arrays(
        mz_array: Vec<f64>,
        intensity_array: Vec<f32>,
    ) -> Result<Self, SpectrumError> {
        let scan_window = match (mz_array.first(), mz_array.last()) {
            (Some(lo), Some(hi)) => ScanWindow::new(*lo, *hi),
            _ => ScanWindow::default(),
        };
        Self::new(mz_array, intensity_array, scan_window, 0.0, None)
    }

    pub fn len(&self) -> usize {
        self.mz_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz_array.is_empty()
    }

    pub fn max_intensity(&self) -> f32 {
        self.intensity_array
            .iter()
            .copied()
            .fold(0.0f32, |acc, x| if x > acc { x } else { acc })
    }

    /// Find the index of the sample whose m/z is closest to `mz`
    pub fn nearest_index(&self, mz: f64) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let i = match self
            .mz_array
            .binary_search_by(|x| x.partial_cmp(&mz).unwrap_or(Ordering::Less))
        {
            Ok(i) => return Some(i),
            Err(i) => i,
        };
        if i == 0 {
            Some(0)
        } else if i >= self.len() {
            Some(self.len() - 1)
        } else if (self.mz_array[i] - mz).abs() < (mz - self.mz_array[i - 1]).abs() {
            Some(i)
        } else {
            Some(i - 1)
        }
    }

    pub fn intensity_near(&self, mz: f64) -> Option<f32> {
        self.nearest_index(mz).map(|i| self.intensity_array[i])
    }

    /// Whether `other` shares this spectrum's m/z axis, sample for sample
    pub fn is_aligned_with(&self, other: &Spectrum) -> bool {
        self.len() == other.len()
            && self
                .mz_array
                .iter()
                .zip(other.mz_array.iter())
                .all(|(a, b)| (a - b).abs() <= 1e-9 * a.abs().max(1.0))
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f32)> + '_ {
        self.mz_array
            .iter()
            .copied()
            .zip(self.intensity_array.iter().copied())
    }
}

/// One acquisition read from a data file
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scan {
    pub index: usize,
    pub id: String,
    pub ms_level: u8,
    /// The precursor activation energy, absent for MS1 scans
    pub collision_energy: Option<f32>,
    pub filter_string: Option<String>,
    pub signal: Spectrum,
}

impl Scan {
    pub fn start_time(&self) -> f64 {
        self.signal.start_time
    }

    pub fn is_msn(&self) -> bool {
        self.ms_level > 1
    }
}
