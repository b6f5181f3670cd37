/*! Load every scan of an mzML document into memory and index the MSn scans by
collision energy.
*/
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use flate2::bufread::MultiGzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XMLReader;
use thiserror::Error;
use tracing::{debug, instrument, trace};

use mzdata::io::mzml::{MzMLParserError, MzMLParserState, MzMLReader};
use mzdata::prelude::*;
use mzdata::spectrum::bindata::{ArrayRetrievalError, ArrayType};
use mzdata::spectrum::MultiLayerSpectrum;

use mzpeaks::{CentroidPeak, DeconvolutedPeak};

use crate::spectrum::{Scan, ScanWindow, Spectrum, SpectrumError};

/// Energies closer together than this are considered the same bucket
pub const ENERGY_TOLERANCE: f32 = 1e-4;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Activation terms that set the energy a precursor was fragmented at
const COLLISION_ENERGY_TERMS: &[&[u8]] = &[
    b"MS:1000045", // collision energy
    b"MS:1000138", // normalized collision energy
    b"MS:1002013", // collision energy ramp start
    b"MS:1002014", // collision energy ramp end
    b"MS:1002218", // percent collision energy ramp start
    b"MS:1002219", // percent collision energy ramp end
];

#[derive(Debug, Error)]
pub enum ScanStoreError {
    #[error("An IO error occurred while reading scans: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Failed to parse mzML: {0}")]
    ParseError(
        #[source]
        #[from]
        MzMLParserError,
    ),
    #[error("The input does not look like an mzML document")]
    NotMzML,
    #[error("Scan {id} is missing a required signal array: {source}")]
    MissingArray {
        id: String,
        #[source]
        source: ArrayRetrievalError,
    },
    #[error("Scan {id} has {mz} m/z values but {intensity} intensities")]
    MismatchedArrays {
        id: String,
        mz: usize,
        intensity: usize,
    },
}

/// The scans recorded at one collision energy, in acquisition order
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyBucket {
    pub energy: f32,
    pub indices: Vec<usize>,
}

/// A mapping from collision energy to the scans acquired at it.
///
/// Buckets are kept sorted by energy and only ever reference MSn scans.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EnergyIndex {
    buckets: Vec<EnergyBucket>,
}

impl EnergyIndex {
    pub fn insert(&mut self, energy: f32, index: usize) {
        match self.search(energy) {
            Ok(i) => self.buckets[i].indices.push(index),
            Err(i) => self.buckets.insert(
                i,
                EnergyBucket {
                    energy,
                    indices: vec![index],
                },
            ),
        }
    }

    fn search(&self, energy: f32) -> Result<usize, usize> {
        let i = self.buckets.partition_point(|b| b.energy < energy - ENERGY_TOLERANCE);
        match self.buckets.get(i) {
            Some(b) if (b.energy - energy).abs() <= ENERGY_TOLERANCE => Ok(i),
            _ => Err(i),
        }
    }

    pub fn get(&self, energy: f32) -> Option<&[usize]> {
        self.search(energy)
            .ok()
            .map(|i| self.buckets[i].indices.as_slice())
    }

    pub fn contains(&self, energy: f32) -> bool {
        self.search(energy).is_ok()
    }

    pub fn energies(&self) -> impl Iterator<Item = f32> + '_ {
        self.buckets.iter().map(|b| b.energy)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EnergyBucket> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// All scans of one file, addressable by ordinal index, native ID or collision energy
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanStore {
    scans: Vec<Scan>,
    id_index: HashMap<String, usize>,
    energy_index: EnergyIndex,
}

impl ScanStore {
    /// Parse an in-memory mzML document, transparently decompressing gzip
    pub fn load(bytes: &[u8]) -> Result<Self, ScanStoreError> {
        if bytes.starts_with(&GZIP_MAGIC) {
            debug!("Detected gzip compressed input");
            let mut buf = Vec::new();
            MultiGzDecoder::new(io::BufReader::new(bytes)).read_to_end(&mut buf)?;
            return Self::load_uncompressed(&buf);
        }
        Self::load_uncompressed(bytes)
    }

    /// Read the full stream into memory and parse it
    pub fn load_from<R: Read>(mut source: R) -> Result<Self, ScanStoreError> {
        let mut buf = Vec::new();
        source.read_to_end(&mut buf)?;
        Self::load(&buf)
    }

    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, ScanStoreError> {
        let handle = io::BufReader::new(fs::File::open(path.as_ref())?);
        Self::load_from(handle)
    }

    fn load_uncompressed(bytes: &[u8]) -> Result<Self, ScanStoreError> {
        if !looks_like_mzml(bytes) {
            return Err(ScanStoreError::NotMzML);
        }
        let outline = DocumentOutline::read(bytes)?;
        let reader = MzMLReader::new(io::Cursor::new(bytes));
        Self::from_reader(reader, &outline)
    }

    #[instrument(level = "debug", skip_all)]
    fn from_reader<R: io::Read>(
        reader: MzMLReader<R>,
        outline: &DocumentOutline,
    ) -> Result<Self, ScanStoreError> {
        let mut store = Self::default();
        for spectrum in reader {
            let index = store.scans.len();
            let energy_declared = outline.energy_declared.get(index).copied().unwrap_or_default();
            let scan = convert_spectrum(index, &spectrum, energy_declared)?;
            store.push(scan);
        }
        if store.len() != outline.energy_declared.len() {
            return Err(malformed(format!(
                "read {} of {} spectra",
                store.len(),
                outline.energy_declared.len()
            )));
        }
        debug!(
            "Loaded {} scans over {} collision energies",
            store.len(),
            store.energy_index.len()
        );
        Ok(store)
    }

    fn push(&mut self, scan: Scan) {
        let index = self.scans.len();
        if scan.is_msn() {
            if let Some(energy) = scan.collision_energy {
                trace!("Scan {} at {energy} eV", scan.id);
                self.energy_index.insert(energy, index);
            }
        }
        self.id_index.insert(scan.id.clone(), index);
        self.scans.push(scan);
    }

    pub fn get(&self, index: usize) -> Option<&Scan> {
        self.scans.get(index)
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Scan> {
        self.id_index.get(id).and_then(|i| self.get(*i))
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Scan> {
        self.scans.iter()
    }

    pub fn energy_index(&self) -> &EnergyIndex {
        &self.energy_index
    }

    pub fn energies(&self) -> Vec<f32> {
        self.energy_index.energies().collect()
    }

    /// The scans acquired at `energy`, in acquisition order
    pub fn scans_at_energy(&self, energy: f32) -> Vec<&Scan> {
        self.energy_index
            .get(energy)
            .map(|indices| indices.iter().filter_map(|i| self.get(*i)).collect())
            .unwrap_or_default()
    }
}

impl<'a> IntoIterator for &'a ScanStore {
    type Item = &'a Scan;
    type IntoIter = std::slice::Iter<'a, Scan>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn malformed(message: String) -> ScanStoreError {
    ScanStoreError::ParseError(MzMLParserError::IncompleteElementError(
        message,
        MzMLParserState::SpectrumList,
    ))
}

/// A shallow pass over the XML recording which spectra are complete and which of
/// them declare a collision energy. The mzML reader reports a missing energy as 0,
/// and stops quietly at the first spectrum it cannot parse.
#[derive(Debug, Default, Clone, PartialEq)]
struct DocumentOutline {
    /// One entry per closed `<spectrum>` element, in document order
    energy_declared: Vec<bool>,
    run_closed: bool,
}

impl DocumentOutline {
    fn read(bytes: &[u8]) -> Result<Self, ScanStoreError> {
        let outline = Self::scan(bytes).map_err(|e| malformed(e.to_string()))?;
        if !outline.run_closed {
            return Err(malformed(format!(
                "the document ends after {} spectra without closing its run",
                outline.energy_declared.len()
            )));
        }
        Ok(outline)
    }

    fn scan(bytes: &[u8]) -> Result<Self, quick_xml::Error> {
        let mut reader = XMLReader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut outline = Self::default();
        let mut in_activation = false;
        let mut declared = false;
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"spectrum" => declared = false,
                    b"activation" => in_activation = true,
                    b"cvParam" if in_activation => declared |= is_energy_param(&e)?,
                    _ => {}
                },
                Event::Empty(e) => {
                    if in_activation && e.local_name().as_ref() == b"cvParam" {
                        declared |= is_energy_param(&e)?;
                    }
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"spectrum" => outline.energy_declared.push(declared),
                    b"activation" => in_activation = false,
                    b"run" => outline.run_closed = true,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(outline)
    }
}

fn is_energy_param(param: &BytesStart) -> Result<bool, quick_xml::Error> {
    Ok(param
        .try_get_attribute("accession")?
        .is_some_and(|attr| COLLISION_ENERGY_TERMS.contains(&attr.value.as_ref())))
}

fn looks_like_mzml(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(8192)];
    let text = String::from_utf8_lossy(head);
    text.contains("<mzML") || text.contains("<indexedmzML")
}

fn convert_spectrum(
    index: usize,
    spectrum: &MultiLayerSpectrum<CentroidPeak, DeconvolutedPeak>,
    energy_declared: bool,
) -> Result<Scan, ScanStoreError> {
    let id = spectrum.id().to_string();
    let (mz_array, intensity_array) = match spectrum.arrays.as_ref() {
        Some(arrays) => {
            let mzs = arrays
                .mzs()
                .map_err(|source| ScanStoreError::MissingArray {
                    id: id.clone(),
                    source,
                })?
                .to_vec();
            let intensities = arrays
                .intensities()
                .map_err(|source| ScanStoreError::MissingArray {
                    id: id.clone(),
                    source,
                })?
                .to_vec();
            (mzs, intensities)
        }
        None => {
            return Err(ScanStoreError::MissingArray {
                id,
                source: ArrayRetrievalError::NotFound(ArrayType::MZArray),
            })
        }
    };
    let first_event = spectrum.acquisition().first_scan();
    let scan_window = first_event
        .and_then(|event| event.scan_windows.first())
        .filter(|w| w.upper_bound > w.lower_bound)
        .map(|w| ScanWindow::new(w.lower_bound as f64, w.upper_bound as f64))
        .unwrap_or_else(|| match (mz_array.first(), mz_array.last()) {
            (Some(lo), Some(hi)) => ScanWindow::new(*lo, *hi),
            _ => ScanWindow::default(),
        });
    let filter_string = first_event.and_then(|event| {
        event
            .get_param_by_accession("MS:1000512")
            .or_else(|| event.get_param_by_name("filter string"))
            .map(|p| p.value.to_string())
    });

    let ms_level = spectrum.ms_level();
    let collision_energy = if ms_level > 1 && energy_declared {
        spectrum.precursor().map(|p| p.activation.energy)
    } else {
        None
    };

    let signal = Spectrum::new(
        mz_array,
        intensity_array,
        scan_window,
        spectrum.start_time(),
        filter_string.clone(),
    )
    .map_err(|e| match e {
        SpectrumError::MismatchedArrays { mz, intensity } => ScanStoreError::MismatchedArrays {
            id: id.clone(),
            mz,
            intensity,
        },
    })?;
    Ok(Scan {
        index,
        id,
        ms_level,
        collision_energy,
        filter_string,
        signal,
    })
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};

    use super::*;

    const PATH: &str = "../test/data/energy_ramp.mzML";

    #[test_log::test]
    fn test_load() -> Result<(), ScanStoreError> {
        let store = ScanStore::open_path(PATH)?;
        assert_eq!(store.len(), 11);
        let first = store.get(0).unwrap();
        assert_eq!(first.ms_level, 1);
        assert!(first.collision_energy.is_none());

        assert_eq!(store.energies(), vec![0.0, 5.0, 10.0, 15.0, 20.0]);
        for bucket in store.energy_index().iter() {
            assert_eq!(bucket.indices.len(), 2);
            assert!(bucket.indices[0] < bucket.indices[1]);
            for i in bucket.indices.iter() {
                let scan = store.get(*i).unwrap();
                assert!(scan.ms_level >= 2);
                assert_eq!(scan.collision_energy, Some(bucket.energy));
            }
        }
        let scan = store.get(3).unwrap();
        assert_eq!(store.get_by_id(&scan.id), Some(scan));
        assert_eq!(scan.signal.scan_window, ScanWindow::new(100.0, 550.0));
        assert!(scan.filter_string.is_some());
        assert_eq!(scan.signal.mz_array.len(), scan.signal.intensity_array.len());
        Ok(())
    }

    #[test_log::test]
    fn test_gzip_matches_plain() -> Result<(), ScanStoreError> {
        let raw = fs::read(PATH)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let compressed = encoder.finish()?;

        let plain = ScanStore::load(&raw)?;
        let gzipped = ScanStore::load(&compressed)?;
        assert_eq!(plain, gzipped);
        // loading the same bytes twice yields the same store
        assert_eq!(plain, ScanStore::load(&raw)?);
        Ok(())
    }

    #[test_log::test]
    fn test_load_bytes() -> Result<(), ScanStoreError> {
        let raw = fs::read(PATH)?;
        let store = ScanStore::load(&raw)?;
        assert_eq!(store.len(), 11);
        assert_eq!(store.iter().filter(|s| s.is_msn()).count(), 10);
        assert_eq!(store.energies(), vec![0.0, 5.0, 10.0, 15.0, 20.0]);
        Ok(())
    }

    #[test_log::test]
    fn test_undeclared_energy_not_indexed() -> Result<(), ScanStoreError> {
        let text = fs::read_to_string(PATH)?;
        let param = r#"<cvParam cvRef="MS" accession="MS:1000045" name="collision energy" value="10.0" unitCvRef="UO" unitAccession="UO:0000266" unitName="electronvolt"/>"#;
        assert!(text.contains(param));
        let text = text.replacen(param, "", 1);

        let store = ScanStore::load(text.as_bytes())?;
        assert_eq!(store.len(), 11);
        let scan = store.get(5).unwrap();
        assert_eq!(scan.ms_level, 2);
        assert_eq!(scan.collision_energy, None);
        assert_eq!(store.energy_index().get(0.0), Some([1usize, 2].as_slice()));
        assert_eq!(store.energy_index().get(10.0), Some([6usize].as_slice()));
        Ok(())
    }

    #[test_log::test]
    fn test_truncated_document() -> Result<(), ScanStoreError> {
        let raw = fs::read(PATH)?;

        let cut = &raw[..raw.len() * 6 / 10];
        let err = ScanStore::load(cut).unwrap_err();
        assert!(matches!(err, ScanStoreError::ParseError(_)), "{err:?}");

        // a prefix ending cleanly on a spectrum boundary is still incomplete
        let text = String::from_utf8_lossy(&raw);
        let end = text.match_indices("</spectrum>").nth(4).map(|(i, _)| i).unwrap();
        let cut = &raw[..end + "</spectrum>".len()];
        let err = ScanStore::load(cut).unwrap_err();
        assert!(matches!(err, ScanStoreError::ParseError(_)), "{err:?}");
        Ok(())
    }

    #[test_log::test]
    fn test_corrupt_binary() -> Result<(), ScanStoreError> {
        let text = fs::read_to_string(PATH)?;
        // the m/z array of the fourth spectrum
        let (start, _) = text.match_indices("<binary>").nth(6).unwrap();
        let start = start + "<binary>".len();
        let end = start + text[start..].find("</binary>").unwrap();
        let corrupt = format!("{}{}{}", &text[..start], "!".repeat(end - start), &text[end..]);

        let err = ScanStore::load(corrupt.as_bytes()).unwrap_err();
        assert!(
            matches!(
                err,
                ScanStoreError::ParseError(_)
                    | ScanStoreError::MissingArray { .. }
                    | ScanStoreError::MismatchedArrays { .. }
            ),
            "{err:?}"
        );
        Ok(())
    }

    #[test]
    fn test_not_mzml() {
        let err = ScanStore::load(b"BEGIN IONS\nEND IONS\n").unwrap_err();
        assert!(matches!(err, ScanStoreError::NotMzML));
    }

    #[test]
    fn test_energy_index_tolerance() {
        let mut index = EnergyIndex::default();
        index.insert(10.0, 3);
        index.insert(5.0, 1);
        index.insert(10.00001, 4);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(10.0), Some([3usize, 4].as_slice()));
        assert_eq!(index.energies().collect::<Vec<_>>(), vec![5.0, 10.0]);
        assert!(!index.contains(7.5));
    }
}
