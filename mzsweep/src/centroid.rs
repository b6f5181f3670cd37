//! Intensity weighted centroids of detected peaks
use crate::peak_picking::{DetectedPeaks, Peak, PeakBounds};
use crate::spectrum::Spectrum;

/// Compute Σ(m/z · intensity) / Σ(intensity) over the inclusive index range
/// `[left, right]`, clamped to the spectrum. Returns NaN when the intensity sums
/// to zero.
pub fn weighted_centroid(spectrum: &Spectrum, left: usize, right: usize) -> f64 {
    if spectrum.is_empty() || left > right {
        return f64::NAN;
    }
    let right = right.min(spectrum.len() - 1);
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for i in left..=right {
        let intensity = spectrum.intensity_array[i] as f64;
        numerator += spectrum.mz_array[i] * intensity;
        denominator += intensity;
    }
    if denominator == 0.0 {
        f64::NAN
    } else {
        numerator / denominator
    }
}

/// Compute the centroid m/z of each peak.
///
/// When `peak_bounds` is absent the peaks came from centroided data and each
/// centroid is the apex sample's own m/z.
pub fn centroid(
    spectrum: &Spectrum,
    peak_indices: &[usize],
    peak_bounds: Option<&[PeakBounds]>,
) -> Vec<f64> {
    match peak_bounds {
        Some(bounds) => bounds
            .iter()
            .map(|b| weighted_centroid(spectrum, b.left(), b.right()))
            .collect(),
        None => peak_indices
            .iter()
            .map(|i| spectrum.mz_array.get(*i).copied().unwrap_or(f64::NAN))
            .collect(),
    }
}

/// Combine detected peaks with their centroids
pub fn build_peaks(spectrum: &Spectrum, detected: &DetectedPeaks) -> Vec<Peak> {
    let centroids = centroid(spectrum, &detected.indices, detected.bounds.as_deref());
    detected
        .indices
        .iter()
        .zip(centroids)
        .enumerate()
        .map(|(i, (index, centroid_mz))| {
            let bounds = detected.bounds_of(i);
            Peak {
                index: *index,
                left: bounds.map(|b| b.left()),
                right: bounds.map(|b| b.right()),
                mz: spectrum.mz_array[*index],
                intensity: spectrum.intensity_array[*index],
                centroid_mz,
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_triangle() {
        let spec = Spectrum::from_arrays(vec![1.0, 2.0, 3.0], vec![0.0, 10.0, 0.0]).unwrap();
        let c = centroid(&spec, &[1], Some(&[PeakBounds::new(0.0, 2.0)]));
        assert_eq!(c, vec![2.0]);
    }

    #[test]
    fn test_asymmetric() {
        let spec =
            Spectrum::from_arrays(vec![1.0, 2.0, 3.0, 4.0], vec![0.0, 10.0, 30.0, 0.0]).unwrap();
        let c = weighted_centroid(&spec, 0, 3);
        assert!((c - 2.75).abs() < 1e-12);
        // fractional bounds are truncated
        let c = centroid(&spec, &[2], Some(&[PeakBounds::new(1.9, 2.9)]));
        assert!((c[0] - 2.75).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate() {
        let spec = Spectrum::from_arrays(vec![1.0, 2.0, 3.0], vec![0.0, 0.0, 0.0]).unwrap();
        let c = weighted_centroid(&spec, 0, 2);
        assert!(c.is_nan());
        let detected = DetectedPeaks {
            indices: vec![1],
            bounds: Some(vec![PeakBounds::new(0.0, 2.0)]),
        };
        let peaks = build_peaks(&spec, &detected);
        assert!(!peaks[0].is_usable());
    }

    #[test]
    fn test_centroid_mode_uses_apex() {
        let spec = Spectrum::from_arrays(vec![1.0, 2.0, 3.0], vec![0.0, 10.0, 0.0]).unwrap();
        let detected = DetectedPeaks {
            indices: vec![1],
            bounds: None,
        };
        let peaks = build_peaks(&spec, &detected);
        assert_eq!(peaks[0].centroid_mz, 2.0);
        assert_eq!(peaks[0].left, None);
    }
}
