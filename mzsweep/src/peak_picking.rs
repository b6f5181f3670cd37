/*! Locate local maxima in a [`Spectrum`].

Two strategies are available behind the [`PeakDetector`] trait:

- [`CentroidModeDetector`] treats every sample above the relative height threshold as
  a peak, which is what already-centroided data needs.
- [`ProfileModeDetector`] searches profile signal for local maxima and filters them by
  height, horizontal distance, prominence and width at half prominence, reporting the
  interpolated half-prominence positions on either side of each apex.
*/
use std::cmp::Ordering;

use tracing::{instrument, trace};

use crate::spectrum::Spectrum;

/// The interpolated positions, in fractional sample indices, where a peak's
/// signal crosses half of its prominence
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakBounds {
    pub left_ip: f64,
    pub right_ip: f64,
}

impl PeakBounds {
    pub fn new(left_ip: f64, right_ip: f64) -> Self {
        Self { left_ip, right_ip }
    }

    /// The left bound truncated to a sample index
    pub fn left(&self) -> usize {
        self.left_ip.max(0.0) as usize
    }

    /// The right bound truncated to a sample index
    pub fn right(&self) -> usize {
        self.right_ip.max(0.0) as usize
    }

    pub fn width(&self) -> f64 {
        self.right_ip - self.left_ip
    }
}

/// The result of running a [`PeakDetector`]. `bounds` is only present when the
/// detector works on profile signal, and is then parallel to `indices`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DetectedPeaks {
    pub indices: Vec<usize>,
    pub bounds: Option<Vec<PeakBounds>>,
}

impl DetectedPeaks {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn bounds_of(&self, i: usize) -> Option<PeakBounds> {
        self.bounds.as_ref().and_then(|b| b.get(i).copied())
    }
}

/// A detected local maximum with its centroid. The centroid is NaN when the signal
/// in the peak's bounds sums to zero.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Peak {
    pub index: usize,
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub mz: f64,
    pub intensity: f32,
    pub centroid_mz: f64,
}

impl Peak {
    /// Whether the centroid is defined and can be displayed
    pub fn is_usable(&self) -> bool {
        self.centroid_mz.is_finite()
    }
}

/// Peak detection parameters, with thresholds relative to the base peak.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectionParams {
    /// Minimum peak height as a percentage of the most intense sample
    pub threshold_pct: f32,
    /// Minimum number of samples between neighboring peaks
    pub distance: f64,
    /// Minimum height above the surrounding valley
    pub prominence: f64,
    /// Minimum width in samples at half prominence
    pub width: f64,
    pub centroid_mode: bool,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            threshold_pct: 5.0,
            distance: 4.0,
            prominence: 0.8,
            width: 2.0,
            centroid_mode: false,
        }
    }
}

pub trait PeakDetector {
    fn detect(&self, spectrum: &Spectrum) -> DetectedPeaks;
}

fn relative_threshold(intensities: &[f32], threshold_pct: f32) -> f64 {
    let max = intensities
        .iter()
        .copied()
        .fold(0.0f32, |acc, x| if x > acc { x } else { acc });
    (threshold_pct as f64 / 100.0) * max as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentroidModeDetector {
    pub threshold_pct: f32,
}

impl CentroidModeDetector {
    pub fn new(threshold_pct: f32) -> Self {
        Self { threshold_pct }
    }
}

impl PeakDetector for CentroidModeDetector {
    fn detect(&self, spectrum: &Spectrum) -> DetectedPeaks {
        let threshold = relative_threshold(&spectrum.intensity_array, self.threshold_pct);
        let indices = spectrum
            .intensity_array
            .iter()
            .enumerate()
            .filter(|(_, v)| (**v as f64) > threshold)
            .map(|(i, _)| i)
            .collect();
        DetectedPeaks {
            indices,
            bounds: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileModeDetector {
    pub threshold_pct: f32,
    pub distance: f64,
    pub prominence: f64,
    pub width: f64,
}

impl ProfileModeDetector {
    pub fn new(threshold_pct: f32, distance: f64, prominence: f64, width: f64) -> Self {
        Self {
            threshold_pct,
            distance,
            prominence,
            width,
        }
    }

    #[instrument(level = "trace", skip_all)]
    pub fn find_peaks(&self, x: &[f64]) -> DetectedPeaks {
        let threshold = x.iter().copied().fold(0.0f64, f64::max) * (self.threshold_pct as f64 / 100.0);

        let mut peaks = local_maxima(x);
        trace!("{} local maxima", peaks.len());
        peaks.retain(|p| x[*p] >= threshold);

        let peaks = select_by_distance(x, &peaks, self.distance);

        let mut kept = Vec::with_capacity(peaks.len());
        for p in peaks {
            let prominence = peak_prominence(x, p);
            if prominence.prominence >= self.prominence {
                kept.push((p, prominence));
            }
        }

        let mut indices = Vec::with_capacity(kept.len());
        let mut bounds = Vec::with_capacity(kept.len());
        for (p, prominence) in kept {
            let b = peak_width(x, p, &prominence, 0.5);
            if b.width() >= self.width {
                indices.push(p);
                bounds.push(b);
            }
        }
        DetectedPeaks {
            indices,
            bounds: Some(bounds),
        }
    }
}

impl PeakDetector for ProfileModeDetector {
    fn detect(&self, spectrum: &Spectrum) -> DetectedPeaks {
        let x: Vec<f64> = spectrum.intensity_array.iter().map(|v| *v as f64).collect();
        self.find_peaks(&x)
    }
}

/// Either detection strategy, chosen at run time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeakPicker {
    Centroid(CentroidModeDetector),
    Profile(ProfileModeDetector),
}

impl PeakDetector for PeakPicker {
    fn detect(&self, spectrum: &Spectrum) -> DetectedPeaks {
        match self {
            PeakPicker::Centroid(d) => d.detect(spectrum),
            PeakPicker::Profile(d) => d.detect(spectrum),
        }
    }
}

impl From<DetectionParams> for PeakPicker {
    fn from(value: DetectionParams) -> Self {
        if value.centroid_mode {
            Self::Centroid(CentroidModeDetector::new(value.threshold_pct))
        } else {
            Self::Profile(ProfileModeDetector::new(
                value.threshold_pct,
                value.distance,
                value.prominence,
                value.width,
            ))
        }
    }
}

impl Default for PeakPicker {
    fn default() -> Self {
        DetectionParams::default().into()
    }
}

/// Detect peaks in `spectrum` with the strategy selected by `centroid_mode`
pub fn detect(
    spectrum: &Spectrum,
    threshold_pct: f32,
    distance: f64,
    prominence: f64,
    width: f64,
    centroid_mode: bool,
) -> DetectedPeaks {
    let picker: PeakPicker = DetectionParams {
        threshold_pct,
        distance,
        prominence,
        width,
        centroid_mode,
    }
    .into();
    picker.detect(spectrum)
}

/// Strict local maxima. A flat top is reported once, at its middle sample
/// (rounding down).
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let i_max = x.len() - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut i_ahead = i + 1;
            while i_ahead < i_max && x[i_ahead] == x[i] {
                i_ahead += 1;
            }
            if x[i_ahead] < x[i] {
                let left_edge = i;
                let right_edge = i_ahead - 1;
                peaks.push((left_edge + right_edge) / 2);
                i = i_ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Drop peaks closer than `distance` samples to a taller neighbor
fn select_by_distance(x: &[f64], peaks: &[usize], distance: f64) -> Vec<usize> {
    let distance = distance.ceil().max(1.0) as usize;
    if distance <= 1 || peaks.len() < 2 {
        return peaks.to_vec();
    }
    let mut keep = vec![true; peaks.len()];
    let mut priority: Vec<usize> = (0..peaks.len()).collect();
    priority.sort_by(|a, b| {
        x[peaks[*a]]
            .partial_cmp(&x[peaks[*b]])
            .unwrap_or(Ordering::Equal)
    });

    for j in priority.into_iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }
    peaks
        .iter()
        .zip(keep)
        .filter(|(_, k)| *k)
        .map(|(p, _)| *p)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Prominence {
    prominence: f64,
    left_base: usize,
    right_base: usize,
}

fn peak_prominence(x: &[f64], peak: usize) -> Prominence {
    let height = x[peak];

    let mut left_base = peak;
    let mut left_min = height;
    let mut i = peak as isize;
    while i >= 0 && x[i as usize] <= height {
        if x[i as usize] < left_min {
            left_min = x[i as usize];
            left_base = i as usize;
        }
        i -= 1;
    }

    let mut right_base = peak;
    let mut right_min = height;
    let mut i = peak;
    while i < x.len() && x[i] <= height {
        if x[i] < right_min {
            right_min = x[i];
            right_base = i;
        }
        i += 1;
    }

    Prominence {
        prominence: height - left_min.max(right_min),
        left_base,
        right_base,
    }
}

fn peak_width(x: &[f64], peak: usize, prominence: &Prominence, rel_height: f64) -> PeakBounds {
    let height = x[peak] - prominence.prominence * rel_height;

    let mut i = peak;
    while prominence.left_base < i && height < x[i] {
        i -= 1;
    }
    let mut left_ip = i as f64;
    if x[i] < height {
        left_ip += (height - x[i]) / (x[i + 1] - x[i]);
    }

    let mut i = peak;
    while i < prominence.right_base && height < x[i] {
        i += 1;
    }
    let mut right_ip = i as f64;
    if x[i] < height {
        right_ip -= (height - x[i]) / (x[i - 1] - x[i]);
    }

    PeakBounds::new(left_ip, right_ip)
}
