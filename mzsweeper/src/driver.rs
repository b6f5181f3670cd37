use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::value::{Dict, Value};
use figment::Figment;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use mzsweep::cache::StoreCache;
use mzsweep::fragments::FragmentError;
use mzsweep::interpolation::DEFAULT_KNOWN_ENERGIES;
use mzsweep::{
    ChargeState, DetectionParams, ExplorerParams, ExplorerView, PeptideTarget, PipelineError,
    ScanStore, ScanStoreError, SpectrumExplorer,
};

use crate::args::{
    non_negative_float_f32, parse_ion_specs, positive_float_f64, ArgLabelConvention,
};
use crate::catalog::{Catalog, CatalogError, DatasetKey, DatasetKeyParseError};
use crate::progress::RunSummary;
use crate::write::{write_output, OutputFormat};

#[derive(Debug, Error)]
pub enum MZSweeperError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error(transparent)]
    ScanStoreError(#[from] ScanStoreError),
    #[error(transparent)]
    PipelineError(#[from] PipelineError),
    #[error(transparent)]
    FragmentError(#[from] FragmentError),
    #[error(transparent)]
    CatalogError(#[from] CatalogError),
    #[error("Malformed dataset key: {0}")]
    DatasetKeyError(#[from] DatasetKeyParseError),
    #[error("The output file format for {0} was either unknown or not supported")]
    OutputFormatUnknownOrNotSupportedError(String),
    #[error("No input file was given and no catalog dataset was selected")]
    MissingInput,
    #[error("A dataset was selected without a catalog to look it up in")]
    MissingCatalog,
    #[error("Cannot read {0}, only local files and STDIN are supported")]
    RemoteSourceNotSupported(String),
    #[error("Failed to build thread pool: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    #[error("Failed to read configuration: {0}")]
    ConfigurationError(#[from] Box<figment::Error>),
    #[error(transparent)]
    ArgumentError(#[from] clap::Error),
}

impl From<figment::Error> for MZSweeperError {
    fn from(value: figment::Error) -> Self {
        Self::ConfigurationError(Box::new(value))
    }
}

/// Explore how MS/MS spectra change across a collision energy ramp.
///
/// Read an mzML file or stream, build the spectrum at each requested collision energy by
/// averaging or interpolating between the acquired energies, pick peaks, and optionally
/// annotate them with theoretical fragment ions of a peptide.
#[derive(Parser, Debug, Clone, Deserialize, Serialize)]
#[command(author, version)]
pub struct MZSweeper {
    /// The path to read the input spectra from, or if '-' is passed, read from STDIN.
    ///
    /// May be omitted when a catalog dataset is selected.
    #[arg()]
    pub input_file: Option<String>,

    /// The path to write the output file to, or if '-' is passed, write JSON to STDOUT.
    ///
    /// If a path is specified, the output format is inferred from its extension,
    /// `.json` or `.tsv`.
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: PathBuf,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `mzsweeper.toml` in the working directory.
    /// Environment variables prefixed with `MZSWEEPER_` will be read too.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(short = 't', long = "threads", default_value_t = -1)]
    pub threads: i32,

    /// The collision energies to render, comma separated. Defaults to every acquired
    /// known energy.
    #[arg(short = 'e', long = "energy", value_delimiter = ',')]
    pub energies: Vec<f32>,

    /// The minimum peak height as a percentage of the base peak
    #[arg(
        long = "threshold",
        default_value_t = 5.0,
        value_parser = non_negative_float_f32
    )]
    pub threshold_pct: f32,

    /// The minimum number of samples between neighboring peaks
    #[arg(long = "distance", default_value_t = 4.0)]
    pub distance: f64,

    /// The minimum peak prominence
    #[arg(long = "prominence", default_value_t = 0.8)]
    pub prominence: f64,

    /// The minimum peak width in samples
    #[arg(long = "width", default_value_t = 2.0)]
    pub width: f64,

    /// Treat the signal as already centroided
    #[arg(short = 'c', long = "centroid")]
    pub centroid_mode: bool,

    /// The m/z spacing of the averaging grid, inferred from the data when absent
    #[arg(long = "bin-width", value_parser = positive_float_f64)]
    pub bin_width: Option<f64>,

    /// The collision energies the ramp was acquired at, comma separated
    #[arg(
        long = "known-energies",
        value_delimiter = ',',
        default_values_t = DEFAULT_KNOWN_ENERGIES
    )]
    pub known_energies: Vec<f32>,

    /// Peaks below this percentage of the base peak are not labelled
    #[arg(
        long = "label-threshold",
        default_value_t = 2.0,
        value_parser = non_negative_float_f32
    )]
    pub label_threshold_pct: f32,

    /// The peptide sequence to annotate fragments of
    #[arg(short = 'p', long = "peptide")]
    pub peptide: Option<String>,

    /// The precursor charge state, e.g. `2` or `2+`
    #[arg(short = 'z', long = "charge", value_parser = ChargeState::from_str)]
    pub charge: Option<ChargeState>,

    /// The fragment ions to annotate, comma separated, e.g. `b2,y2`
    #[arg(long = "ions", value_delimiter = ',')]
    pub ions: Vec<String>,

    /// The m/z tolerance in Daltons for matching fragments to detected peaks
    #[arg(
        long = "fragment-tolerance",
        default_value_t = 0.1,
        value_parser = positive_float_f64
    )]
    pub fragment_tolerance: f64,

    /// How C-terminal fragment ions are numbered
    #[arg(long = "label-convention", default_value = "cleavage-site")]
    pub label_convention: ArgLabelConvention,

    /// A TOML catalog of named datasets
    #[arg(long = "catalog")]
    pub catalog: Option<PathBuf>,

    /// The catalog dataset to read, denoted peptide:charge:resolution:ramp[:isolation]
    #[arg(short = 'd', long = "dataset")]
    pub dataset: Option<String>,
}

impl MZSweeper {
    /// Assemble the run configuration from parsed command line `matches`.
    ///
    /// Sources are layered from weakest to strongest: built-in defaults,
    /// `mzsweeper.toml`, `--config-file`, `MZSWEEPER_*` environment variables, and
    /// last the flags actually typed on the command line.
    pub fn configure(matches: &ArgMatches) -> Result<Self, MZSweeperError> {
        let given = Self::from_arg_matches(matches)?;
        let defaults = Self::try_parse_from(["mzsweeper"])?;

        let command = Self::command();
        let explicit: Dict = Value::serialize(&given)?
            .into_dict()
            .unwrap_or_default()
            .into_iter()
            .filter(|(key, _)| {
                command.get_arguments().any(|arg| arg.get_id() == key.as_str())
                    && matches.value_source(key) == Some(ValueSource::CommandLine)
            })
            .collect();
        debug!("Arguments given on the command line: {:?}", explicit.keys());

        let mut config = Figment::new()
            .merge(Serialized::defaults(&defaults))
            .merge(Toml::file("mzsweeper.toml"));
        if let Some(path) = given.config_file.as_ref() {
            config = config.merge(Toml::file_exact(path));
        }
        Ok(config
            .merge(Env::prefixed("MZSWEEPER_"))
            .merge(Serialized::defaults(explicit))
            .extract()?)
    }

    fn create_threadpool(&self) -> Result<rayon::ThreadPool, MZSweeperError> {
        let num_threads = if self.threads > 0 {
            self.threads as usize
        } else {
            thread::available_parallelism()?.into()
        };
        debug!("Using {} cores", num_threads);
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?)
    }

    pub fn explorer_params(&self) -> Result<ExplorerParams, MZSweeperError> {
        Ok(ExplorerParams {
            detection: DetectionParams {
                threshold_pct: self.threshold_pct,
                distance: self.distance,
                prominence: self.prominence,
                width: self.width,
                centroid_mode: self.centroid_mode,
            },
            bin_width: self.bin_width,
            known_energies: self.known_energies.clone(),
            label_threshold_pct: self.label_threshold_pct,
            match_tolerance: self.fragment_tolerance,
            ion_specs: parse_ion_specs(&self.ions)?,
            label_convention: self.label_convention.into(),
        })
    }

    /// Where to read scans from and which peptide to annotate. Explicit
    /// `--peptide` and `--charge` take precedence over the catalog entry.
    pub fn resolve_input(&self) -> Result<(String, Option<PeptideTarget>), MZSweeperError> {
        let (source, sequence, charge) = match (&self.dataset, &self.catalog) {
            (Some(key), Some(catalog_path)) => {
                let key: DatasetKey = key.parse()?;
                let catalog = Catalog::open_path(catalog_path)?;
                let entry = catalog.resolve(&key)?;
                if self.input_file.is_some() {
                    warn!("Ignoring input file in favor of dataset {key}");
                }
                (
                    catalog.source_of(entry),
                    Some(entry.sequence().to_string()),
                    Some(entry.charge),
                )
            }
            (Some(_), None) => return Err(MZSweeperError::MissingCatalog),
            (None, _) => (
                self.input_file.clone().ok_or(MZSweeperError::MissingInput)?,
                None,
                None,
            ),
        };
        let sequence = self.peptide.clone().or(sequence);
        let charge = self.charge.or(charge).map(i32::from).unwrap_or(1);
        Ok((source, sequence.map(|s| PeptideTarget::new(s, charge))))
    }

    fn load_store(
        &self,
        source: &str,
        cache: &mut StoreCache,
    ) -> Result<Arc<ScanStore>, MZSweeperError> {
        if source == "-" {
            let mut buf = Vec::new();
            io::stdin().lock().read_to_end(&mut buf)?;
            return Ok(cache.get_or_load(&buf)?);
        }
        if source.contains("://") {
            return Err(MZSweeperError::RemoteSourceNotSupported(source.to_string()));
        }
        Ok(cache.get_or_load_keyed(source, || Ok(fs::read(source)?))?)
    }

    pub fn main(&self) -> Result<(), MZSweeperError> {
        info!(
            "mzsweeper v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        self.create_threadpool()?.install(|| self.run())
    }

    fn run(&self) -> Result<(), MZSweeperError> {
        let start = Instant::now();
        let format = OutputFormat::infer_from_path(&self.output_file).ok_or_else(|| {
            MZSweeperError::OutputFormatUnknownOrNotSupportedError(
                self.output_file.display().to_string(),
            )
        })?;
        let (source, target) = self.resolve_input()?;
        info!("Input: {}", source);
        info!("Output: {}", self.output_file.display());
        if let Some(target) = target.as_ref() {
            info!("Annotating {} at charge {}", target.sequence, target.charge);
        }

        let mut cache = StoreCache::new();
        let store = self.load_store(&source, &mut cache)?;
        let explorer = SpectrumExplorer::new(&store, self.explorer_params()?);

        let energies = if self.energies.is_empty() {
            explorer.available_energies()
        } else {
            self.energies.clone()
        };
        if energies.is_empty() {
            return Err(PipelineError::NoEnergies(self.known_energies.clone()).into());
        }

        let views: Vec<ExplorerView> = energies
            .par_iter()
            .map(|energy| explorer.explore(*energy, target.as_ref()))
            .collect::<Result<_, _>>()?;

        let summary = self.summarize(&store, &views);
        info!("MS1 Scans: {}", summary.ms1_scans);
        info!("MSn Scans: {}", summary.msn_scans);
        info!(
            "Energies: {} | Interpolated: {}",
            summary.energies, summary.interpolated
        );
        info!(
            "Peaks: {} | Labelled: {}",
            summary.peaks, summary.labelled_peaks
        );
        info!(
            "Fragments: {} | Matched: {}",
            summary.fragments, summary.matched_fragments
        );

        write_output(&self.output_file, format, &views)?;
        info!("Elapsed Time: {:0.3?}", start.elapsed());
        Ok(())
    }

    fn summarize(&self, store: &ScanStore, views: &[ExplorerView]) -> RunSummary {
        let msn_scans = store.iter().filter(|s| s.is_msn()).count();
        let base = RunSummary {
            ms1_scans: store.len() - msn_scans,
            msn_scans,
            ..Default::default()
        };
        views
            .iter()
            .map(RunSummary::from_view)
            .fold(base, |acc, s| acc + s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> MZSweeper {
        MZSweeper::parse_from(std::iter::once("mzsweeper").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() -> Result<(), MZSweeperError> {
        let args = parse(&["in.mzML"]);
        assert_eq!(args.known_energies, DEFAULT_KNOWN_ENERGIES.to_vec());
        assert!(args.energies.is_empty());
        let params = args.explorer_params()?;
        assert_eq!(params, ExplorerParams::default());
        Ok(())
    }

    #[test]
    fn test_command_line_overrides_config() -> Result<(), MZSweeperError> {
        let matches = MZSweeper::command().get_matches_from([
            "mzsweeper",
            "--config-file",
            "../test/data/ramp_test.toml",
            "-e",
            "10",
            "--threshold",
            "5",
        ]);
        let args = MZSweeper::configure(&matches)?;
        assert_eq!(args.energies, vec![10.0]);
        assert_eq!(args.threshold_pct, 5.0);
        // flags left untyped are read from the file
        assert_eq!(args.charge.map(|z| z.get()), Some(1));
        assert_eq!(args.ions.len(), 3);
        assert_eq!(args.threads, 2);
        assert_eq!(
            args.input_file.as_deref(),
            Some("../test/data/energy_ramp.mzML.gz")
        );

        let matches = MZSweeper::command().get_matches_from(["mzsweeper"]);
        let args = MZSweeper::configure(&matches)?;
        assert!(args.energies.is_empty());
        assert_eq!(args.config_file, None);
        Ok(())
    }

    #[test]
    fn test_resolve_input() -> Result<(), MZSweeperError> {
        let args = parse(&["in.mzML", "-p", "MRFA", "-z", "2+", "--ions", "b2,y3"]);
        let (source, target) = args.resolve_input()?;
        assert_eq!(source, "in.mzML");
        assert_eq!(target, Some(PeptideTarget::new("MRFA", 2)));
        assert_eq!(args.explorer_params()?.ion_specs.len(), 2);

        let args = parse(&[]);
        assert!(matches!(
            args.resolve_input(),
            Err(MZSweeperError::MissingInput)
        ));
        let args = parse(&["-d", "MRFA:1+:Enhanced:Iso 1"]);
        assert!(matches!(
            args.resolve_input(),
            Err(MZSweeperError::MissingCatalog)
        ));
        Ok(())
    }

    #[test]
    fn test_resolve_catalog() -> Result<(), MZSweeperError> {
        let args = parse(&[
            "--catalog",
            "../test/data/catalog.toml",
            "-d",
            "MRFA:1+:Enhanced:Iso 1",
            "-z",
            "2",
        ]);
        let (source, target) = args.resolve_input()?;
        assert!(source.ends_with("energy_ramp.mzML"));
        assert_eq!(target, Some(PeptideTarget::new("MRFA", 2)));
        Ok(())
    }
}
