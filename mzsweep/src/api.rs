//! * High level APIs for exploring a collision energy ramp
//!
//! A [`SpectrumExplorer`] borrows a loaded [`ScanStore`] and runs one render cycle at a
//! time: build the spectrum at a requested energy, pick and centroid its peaks, and
//! optionally annotate it with theoretical fragment ions.
use mzpeaks::{prelude::*, CentroidPeak, MZPeakSetType, Tolerance};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::averaging::{average, AveragingError, ReferenceGrid, SignalAverager};
use crate::centroid::build_peaks;
use crate::fragments::{
    default_ion_specs, FragmentCalculator, FragmentError, FragmentIon, IonLabelConvention,
    IonSpec,
};
use crate::interpolation::{interpolate_spectrum, InterpolationError, DEFAULT_KNOWN_ENERGIES};
use crate::peak_picking::{DetectionParams, Peak, PeakDetector, PeakPicker};
use crate::residues::ResidueMassTable;
use crate::scan_store::{ScanStore, ScanStoreError};
use crate::spectrum::Spectrum;

/// Fragment labels are drawn this far above the signal they mark
const ANCHOR_SCALE: f32 = 1.05;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    ScanStoreError(#[from] ScanStoreError),
    #[error(transparent)]
    AveragingError(#[from] AveragingError),
    #[error(transparent)]
    InterpolationError(#[from] InterpolationError),
    #[error(transparent)]
    FragmentError(#[from] FragmentError),
    #[error("No scans were acquired at any of the known collision energies {0:?}")]
    NoEnergies(Vec<f32>),
}

/// Every tunable of a render cycle
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExplorerParams {
    pub detection: DetectionParams,
    /// The averaging bin width, inferred from the data when absent
    pub bin_width: Option<f64>,
    pub known_energies: Vec<f32>,
    /// Peaks below this percentage of the base peak are not labelled
    pub label_threshold_pct: f32,
    /// The m/z tolerance in Daltons for matching a fragment to a detected peak
    pub match_tolerance: f64,
    pub ion_specs: Vec<IonSpec>,
    pub label_convention: IonLabelConvention,
}

impl Default for ExplorerParams {
    fn default() -> Self {
        Self {
            detection: DetectionParams::default(),
            bin_width: None,
            known_energies: DEFAULT_KNOWN_ENERGIES.to_vec(),
            label_threshold_pct: 2.0,
            match_tolerance: 0.1,
            ion_specs: default_ion_specs(),
            label_convention: IonLabelConvention::default(),
        }
    }
}

/// The peptide to annotate a spectrum with
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeptideTarget {
    pub sequence: String,
    pub charge: i32,
}

impl PeptideTarget {
    pub fn new(sequence: impl Into<String>, charge: i32) -> Self {
        Self {
            sequence: sequence.into(),
            charge,
        }
    }
}

/// A theoretical fragment placed on a spectrum
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FragmentAnnotation {
    pub ion: FragmentIon,
    /// Where to draw the label: the intensity of the nearest sample, scaled up slightly
    pub anchor_intensity: f32,
    /// The detected peak whose centroid lies within the match tolerance, if any
    pub matched_peak: Option<Peak>,
}

/// Everything a renderer needs to draw one spectrum
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExplorerView {
    pub energy: f32,
    pub interpolated: bool,
    pub spectrum: Spectrum,
    pub peaks: Vec<Peak>,
    /// Usable peaks at or above the label threshold
    pub labelled_peaks: Vec<Peak>,
    pub fragments: Vec<FragmentAnnotation>,
    pub annotation_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SpectrumExplorer<'a> {
    store: &'a ScanStore,
    params: ExplorerParams,
    picker: PeakPicker,
    calculator: FragmentCalculator,
}

impl<'a> SpectrumExplorer<'a> {
    pub fn new(store: &'a ScanStore, params: ExplorerParams) -> Self {
        let picker = params.detection.into();
        let calculator = FragmentCalculator::new(ResidueMassTable::standard())
            .with_label_convention(params.label_convention);
        Self {
            store,
            params,
            picker,
            calculator,
        }
    }

    /// Use a custom residue table, e.g. with extra modifications
    pub fn with_residue_table(mut self, table: ResidueMassTable) -> Self {
        self.calculator = FragmentCalculator::new(table)
            .with_label_convention(self.params.label_convention);
        self
    }

    pub fn params(&self) -> &ExplorerParams {
        &self.params
    }

    pub fn store(&self) -> &ScanStore {
        self.store
    }

    /// The configured known energies that were actually acquired
    pub fn available_energies(&self) -> Vec<f32> {
        let index = self.store.energy_index();
        self.params
            .known_energies
            .iter()
            .copied()
            .filter(|e| index.contains(*e))
            .collect()
    }

    fn average_bucket(&self, energy: f32) -> Result<Spectrum, PipelineError> {
        let scans = self.store.scans_at_energy(energy);
        let label = scans
            .first()
            .and_then(|s| s.filter_string.clone())
            .unwrap_or_else(|| format!("{energy} eV"));
        let spectra: Vec<&Spectrum> = scans.iter().map(|s| &s.signal).collect();
        Ok(average(&spectra, self.params.bin_width, Some(&label))?)
    }

    /// Average every available energy onto one grid, built from the first scan of
    /// the lowest energy, so the results can be interpolated sample by sample.
    pub fn average_available(&self) -> Result<(Vec<f32>, Vec<Spectrum>), PipelineError> {
        let energies = self.available_energies();
        let first = energies
            .first()
            .and_then(|e| self.store.scans_at_energy(*e).first().copied())
            .ok_or_else(|| PipelineError::NoEnergies(self.params.known_energies.clone()))?;
        let grid = ReferenceGrid::from_spectrum(&first.signal, self.params.bin_width)?;
        let averager = SignalAverager::new(grid);
        let groups: Vec<(Vec<&Spectrum>, String)> = energies
            .iter()
            .map(|e| {
                let scans = self.store.scans_at_energy(*e);
                let label = scans
                    .first()
                    .and_then(|s| s.filter_string.clone())
                    .unwrap_or_else(|| format!("{e} eV"));
                (scans.into_iter().map(|s| &s.signal).collect(), label)
            })
            .collect();
        let averaged = averager.average_groups(&groups)?;
        Ok((energies, averaged))
    }

    /// Build the spectrum at `energy`.
    ///
    /// Scans acquired at exactly this energy are averaged directly. Otherwise the
    /// available energies are averaged onto a shared grid and interpolated.
    #[instrument(level = "debug", skip(self))]
    pub fn spectrum_at(&self, energy: f32) -> Result<(Spectrum, bool), PipelineError> {
        if self.store.energy_index().contains(energy) {
            debug!("Averaging scans acquired at {energy} eV");
            return Ok((self.average_bucket(energy)?, false));
        }
        let (energies, averaged) = self.average_available()?;
        debug!("Interpolating {energy} eV from {energies:?}");
        let spectrum = interpolate_spectrum(&averaged, energy, &energies)?;
        Ok((spectrum, true))
    }

    pub fn pick_peaks(&self, spectrum: &Spectrum) -> Vec<Peak> {
        let detected = self.picker.detect(spectrum);
        build_peaks(spectrum, &detected)
    }

    /// The usable peaks whose apex reaches the label threshold
    pub fn labelled_peaks(&self, spectrum: &Spectrum, peaks: &[Peak]) -> Vec<Peak> {
        let threshold = spectrum.max_intensity() * self.params.label_threshold_pct / 100.0;
        peaks
            .iter()
            .filter(|p| p.is_usable() && p.intensity >= threshold)
            .copied()
            .collect()
    }

    /// Place theoretical fragments of `target` on `spectrum`
    pub fn annotate(
        &self,
        spectrum: &Spectrum,
        peaks: &[Peak],
        target: &PeptideTarget,
    ) -> Result<Vec<FragmentAnnotation>, FragmentError> {
        let ions =
            self.calculator
                .fragments(&target.sequence, &self.params.ion_specs, target.charge)?;

        let mut usable: Vec<Peak> = peaks.iter().filter(|p| p.is_usable()).copied().collect();
        usable.sort_by(|a, b| a.centroid_mz.total_cmp(&b.centroid_mz));
        let peak_set = MZPeakSetType::new(
            usable
                .iter()
                .enumerate()
                .map(|(i, p)| CentroidPeak::new(p.centroid_mz, p.intensity, i as u32))
                .collect(),
        );
        let tolerance = Tolerance::Da(self.params.match_tolerance);

        let annotations = ions
            .into_iter()
            .map(|ion| {
                let anchor_intensity =
                    spectrum.intensity_near(ion.mz).unwrap_or_default() * ANCHOR_SCALE;
                let matched_peak = peak_set
                    .has_peak(ion.mz, tolerance)
                    .and_then(|p| usable.get(p.get_index() as usize).copied());
                FragmentAnnotation {
                    ion,
                    anchor_intensity,
                    matched_peak,
                }
            })
            .collect();
        Ok(annotations)
    }

    /// Run one full render cycle. Annotation failures are reported on the view
    /// rather than failing the whole cycle.
    pub fn explore(
        &self,
        energy: f32,
        target: Option<&PeptideTarget>,
    ) -> Result<ExplorerView, PipelineError> {
        let (spectrum, interpolated) = self.spectrum_at(energy)?;
        let peaks = self.pick_peaks(&spectrum);
        let labelled_peaks = self.labelled_peaks(&spectrum, &peaks);
        info!(
            "{} peaks detected at {energy} eV, {} labelled",
            peaks.len(),
            labelled_peaks.len()
        );

        let (fragments, annotation_error) = match target {
            Some(target) => match self.annotate(&spectrum, &peaks, target) {
                Ok(fragments) => (fragments, None),
                Err(e) => {
                    warn!("Skipping fragment annotation: {e}");
                    (Vec::new(), Some(e.to_string()))
                }
            },
            None => (Vec::new(), None),
        };

        Ok(ExplorerView {
            energy,
            interpolated,
            spectrum,
            peaks,
            labelled_peaks,
            fragments,
            annotation_error,
        })
    }
}
