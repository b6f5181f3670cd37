//! Estimate a spectrum at an unobserved collision energy from spectra
//! observed at neighboring energies.
use thiserror::Error;
use tracing::{debug, instrument};

use crate::arrayops::interp;
use crate::spectrum::{ScanWindow, Spectrum};

/// The collision energies sampled by a typical energy ramp experiment
pub const DEFAULT_KNOWN_ENERGIES: [f32; 5] = [0.0, 5.0, 10.0, 15.0, 20.0];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpolationError {
    #[error("Target energy {target} is outside of the known range [{min}, {max}]")]
    OutOfRange { target: f32, min: f32, max: f32 },
    #[error("Expected one spectrum per known energy ({expected}), received {received}")]
    LengthMismatch { expected: usize, received: usize },
    #[error("Spectrum at index {index} has {length} samples, but the first has {expected}")]
    MisalignedSpectra {
        index: usize,
        length: usize,
        expected: usize,
    },
    #[error("Known energies must be non-empty and strictly increasing")]
    InvalidKnownEnergies,
}

/// The interpolated intensities at one requested energy
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyIntensities {
    pub energy: f32,
    pub intensities: Vec<f32>,
}

fn validate_known(known_energies: &[f32]) -> Result<(f32, f32), InterpolationError> {
    if known_energies.is_empty()
        || known_energies.windows(2).any(|w| !(w[0] < w[1]))
        || known_energies.iter().any(|e| !e.is_finite())
    {
        return Err(InterpolationError::InvalidKnownEnergies);
    }
    Ok((known_energies[0], known_energies[known_energies.len() - 1]))
}

/// Linearly interpolate each sample position across energy.
///
/// `intensities_by_energy[i]` holds the intensities observed at `known_energies[i]`,
/// and every array must have the same length. Results are returned in the order of
/// `target_energies`. A target strictly outside the known energies is rejected.
#[instrument(level = "debug", skip(intensities_by_energy))]
pub fn interpolate_intensities(
    intensities_by_energy: &[&[f32]],
    target_energies: &[f32],
    known_energies: &[f32],
) -> Result<Vec<EnergyIntensities>, InterpolationError> {
    let (min, max) = validate_known(known_energies)?;
    if intensities_by_energy.len() != known_energies.len() {
        return Err(InterpolationError::LengthMismatch {
            expected: known_energies.len(),
            received: intensities_by_energy.len(),
        });
    }
    let expected = intensities_by_energy[0].len();
    if let Some((index, arr)) = intensities_by_energy
        .iter()
        .enumerate()
        .find(|(_, arr)| arr.len() != expected)
    {
        return Err(InterpolationError::MisalignedSpectra {
            index,
            length: arr.len(),
            expected,
        });
    }
    if let Some(target) = target_energies.iter().find(|t| !(min <= **t && **t <= max)) {
        return Err(InterpolationError::OutOfRange {
            target: *target,
            min,
            max,
        });
    }

    let xp: Vec<f64> = known_energies.iter().map(|e| *e as f64).collect();
    let mut results: Vec<EnergyIntensities> = target_energies
        .iter()
        .map(|t| EnergyIntensities {
            energy: *t,
            intensities: Vec::with_capacity(expected),
        })
        .collect();

    let mut curve = vec![0.0f64; known_energies.len()];
    for position in 0..expected {
        for (c, arr) in curve.iter_mut().zip(intensities_by_energy.iter()) {
            *c = arr[position] as f64;
        }
        for result in results.iter_mut() {
            let v = interp(result.energy as f64, &xp, &curve, 0.0, 0.0);
            result.intensities.push(v as f32);
        }
    }
    Ok(results)
}

/// Interpolate whole spectra sharing one m/z axis.
///
/// The spectra must be sample-aligned, as produced by a single
/// [`SignalAverager`](crate::averaging::SignalAverager).
pub fn interpolate(
    spectra_by_energy: &[Spectrum],
    target_energies: &[f32],
    known_energies: &[f32],
) -> Result<Vec<EnergyIntensities>, InterpolationError> {
    if let Some(first) = spectra_by_energy.first() {
        if let Some((index, s)) = spectra_by_energy
            .iter()
            .enumerate()
            .find(|(_, s)| !first.is_aligned_with(s))
        {
            return Err(InterpolationError::MisalignedSpectra {
                index,
                length: s.len(),
                expected: first.len(),
            });
        }
    }
    let arrays: Vec<&[f32]> = spectra_by_energy
        .iter()
        .map(|s| s.intensity_array.as_slice())
        .collect();
    if arrays.is_empty() {
        validate_known(known_energies)?;
        return Err(InterpolationError::LengthMismatch {
            expected: known_energies.len(),
            received: 0,
        });
    }
    interpolate_intensities(&arrays, target_energies, known_energies)
}

/// Interpolate a single [`Spectrum`] at `target`, spanning the shared m/z axis.
pub fn interpolate_spectrum(
    spectra_by_energy: &[Spectrum],
    target: f32,
    known_energies: &[f32],
) -> Result<Spectrum, InterpolationError> {
    let mut result = interpolate(spectra_by_energy, &[target], known_energies)?;
    // validated non-empty above
    let first = &spectra_by_energy[0];
    let intensities = result.pop().map(|r| r.intensities).unwrap_or_default();
    let scan_window = match (first.mz_array.first(), first.mz_array.last()) {
        (Some(lo), Some(hi)) => ScanWindow::new(*lo, *hi),
        _ => first.scan_window,
    };
    debug!("Interpolated {} samples at {target} eV", intensities.len());
    Ok(Spectrum {
        mz_array: first.mz_array.clone(),
        intensity_array: intensities,
        scan_window,
        start_time: first.start_time,
        label: Some(format!("Interpolated {target} eV")),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn ramp() -> Vec<Spectrum> {
        DEFAULT_KNOWN_ENERGIES
            .iter()
            .map(|e| {
                Spectrum::from_arrays(
                    vec![100.0, 100.5, 101.0],
                    vec![100.0 - 4.0 * e, e * e, 7.0],
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_exact_at_known() -> Result<(), InterpolationError> {
        let spectra = ramp();
        let out = interpolate(&spectra, &DEFAULT_KNOWN_ENERGIES, &DEFAULT_KNOWN_ENERGIES)?;
        for (result, spec) in out.iter().zip(spectra.iter()) {
            assert_eq!(result.intensities, spec.intensity_array);
        }
        Ok(())
    }

    #[test]
    fn test_between() -> Result<(), InterpolationError> {
        let spectra = ramp();
        let out = interpolate(&spectra, &[12.5, 2.0], &DEFAULT_KNOWN_ENERGIES)?;
        assert_eq!(out[0].energy, 12.5);
        assert_eq!(out[0].intensities[0], 50.0);
        // midpoint between 100 and 225
        assert_eq!(out[0].intensities[1], 162.5);
        assert_eq!(out[0].intensities[2], 7.0);
        assert!((out[1].intensities[0] - 92.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_out_of_range() {
        let spectra = ramp();
        let err = interpolate(&spectra, &[25.0], &DEFAULT_KNOWN_ENERGIES).unwrap_err();
        assert_eq!(
            err,
            InterpolationError::OutOfRange {
                target: 25.0,
                min: 0.0,
                max: 20.0
            }
        );
        assert!(matches!(
            interpolate(&spectra, &[-0.5], &DEFAULT_KNOWN_ENERGIES),
            Err(InterpolationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_misaligned() {
        let mut spectra = ramp();
        spectra[3] = Spectrum::from_arrays(vec![100.0, 100.5], vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            interpolate(&spectra, &[12.0], &DEFAULT_KNOWN_ENERGIES),
            Err(InterpolationError::MisalignedSpectra { index: 3, .. })
        ));
        let spectra = ramp();
        assert!(matches!(
            interpolate(&spectra[..4], &[12.0], &DEFAULT_KNOWN_ENERGIES),
            Err(InterpolationError::LengthMismatch { .. })
        ));
        assert_eq!(
            interpolate(&spectra, &[12.0], &[0.0, 10.0, 5.0, 15.0, 20.0]),
            Err(InterpolationError::InvalidKnownEnergies)
        );
    }

    #[test]
    fn test_interpolate_spectrum() -> Result<(), InterpolationError> {
        let spectra = ramp();
        let s = interpolate_spectrum(&spectra, 7.5, &DEFAULT_KNOWN_ENERGIES)?;
        assert_eq!(s.mz_array, spectra[0].mz_array);
        assert_eq!(s.intensity_array[0], 70.0);
        assert_eq!(s.scan_window, ScanWindow::new(100.0, 101.0));
        Ok(())
    }
}
