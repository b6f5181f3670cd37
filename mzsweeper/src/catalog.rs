//! A TOML catalog of named energy ramp acquisitions.
//!
//! ```toml
//! isolation_variants = ["Bradykinin"]
//!
//! [[datasets]]
//! peptide = "MRFA"
//! charge = "1+"
//! resolution = "Enhanced"
//! energy_ramp = "Iso 1"
//! source = "energy_ramp.mzML"
//! sequence = "MRFA"
//! ```
use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use mzsweep::ChargeState;

pub const DEFAULT_ISOLATION: &str = "Centre";

fn default_isolation() -> String {
    DEFAULT_ISOLATION.to_string()
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Failed to parse catalog: {0}")]
    ParseError(
        #[source]
        #[from]
        toml::de::Error,
    ),
    #[error("No dataset matches {0}")]
    DatasetNotFound(DatasetKey),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub peptide: String,
    pub charge: ChargeState,
    pub resolution: String,
    pub energy_ramp: String,
    #[serde(default = "default_isolation")]
    pub isolation: String,
    /// A path, relative to the catalog, or a URL
    pub source: String,
    /// The residue sequence used for annotation, when it differs from the name
    pub sequence: Option<String>,
}

impl DatasetEntry {
    pub fn sequence(&self) -> &str {
        self.sequence.as_deref().unwrap_or(&self.peptide)
    }

    fn matches(&self, key: &DatasetKey, isolation: &str) -> bool {
        self.peptide == key.peptide
            && self.charge == key.charge
            && self.resolution == key.resolution
            && self.energy_ramp == key.energy_ramp
            && self.isolation == isolation
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Peptides acquired with more than one isolation placement
    #[serde(default)]
    pub isolation_variants: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl FromStr for Catalog {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

impl Catalog {
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let mut catalog: Catalog = fs::read_to_string(path)?.parse()?;
        catalog.base_dir = path.parent().map(|p| p.to_path_buf());
        debug!(
            "Read {} datasets from {}",
            catalog.datasets.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Find the dataset for `key`. A requested isolation is only honored for
    /// peptides listed in `isolation_variants`.
    pub fn resolve(&self, key: &DatasetKey) -> Result<&DatasetEntry, CatalogError> {
        let isolation = match key.isolation.as_deref() {
            Some(iso) if self.isolation_variants.iter().any(|p| p == &key.peptide) => iso,
            _ => DEFAULT_ISOLATION,
        };
        self.datasets
            .iter()
            .find(|e| e.matches(key, isolation))
            .ok_or_else(|| CatalogError::DatasetNotFound(key.clone()))
    }

    /// The location of an entry's data, resolving relative paths against the catalog
    pub fn source_of(&self, entry: &DatasetEntry) -> String {
        if entry.source.contains("://") {
            return entry.source.clone();
        }
        let path = Path::new(&entry.source);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path).to_string_lossy().to_string(),
            _ => entry.source.clone(),
        }
    }
}

/// Selects a catalog entry, written `peptide:charge:resolution:ramp[:isolation]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetKey {
    pub peptide: String,
    pub charge: ChargeState,
    pub resolution: String,
    pub energy_ramp: String,
    pub isolation: Option<String>,
}

impl Display for DatasetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.peptide, self.charge, self.resolution, self.energy_ramp
        )?;
        if let Some(iso) = &self.isolation {
            write!(f, ":{iso}")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum DatasetKeyParseError {
    MissingField(&'static str),
    MalformedCharge(String),
}

impl Display for DatasetKeyParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetKeyParseError::MissingField(name) => {
                write!(f, "Dataset key is missing its {name}")
            }
            DatasetKeyParseError::MalformedCharge(s) => {
                write!(f, "Failed to parse dataset charge {s:?}")
            }
        }
    }
}

impl Error for DatasetKeyParseError {}

impl FromStr for DatasetKey {
    type Err = DatasetKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split(':').map(|t| t.trim());
        let mut next = |name: &'static str| {
            tokens
                .next()
                .filter(|t| !t.is_empty())
                .map(|t| t.to_string())
                .ok_or(DatasetKeyParseError::MissingField(name))
        };
        let peptide = next("peptide")?;
        let charge_s = next("charge")?;
        let charge = charge_s
            .parse()
            .map_err(|_| DatasetKeyParseError::MalformedCharge(charge_s))?;
        let resolution = next("resolution")?;
        let energy_ramp = next("energy ramp")?;
        let isolation = next("isolation").ok();
        Ok(Self {
            peptide,
            charge,
            resolution,
            energy_ramp,
            isolation,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const CATALOG: &str = r#"
isolation_variants = ["Bradykinin"]

[[datasets]]
peptide = "MRFA"
charge = "1+"
resolution = "Enhanced"
energy_ramp = "Iso 1"
source = "energy_ramp.mzML"

[[datasets]]
peptide = "Bradykinin"
charge = "2+"
resolution = "Turbo"
energy_ramp = "Iso 1"
source = "brady_centre.mzML"
sequence = "RPPGFSPFR"

[[datasets]]
peptide = "Bradykinin"
charge = "2+"
resolution = "Turbo"
energy_ramp = "Iso 1"
isolation = "Defined"
source = "https://example.org/brady_defined.mzML"
"#;

    #[test]
    fn test_key_fromstr() -> Result<(), DatasetKeyParseError> {
        let key: DatasetKey = "MRFA:1+:Enhanced:Iso 1".parse()?;
        assert_eq!(key.peptide, "MRFA");
        assert_eq!(key.charge.get(), 1);
        assert_eq!(key.energy_ramp, "Iso 1");
        assert_eq!(key.isolation, None);
        assert_eq!(key.to_string(), "MRFA:1+:Enhanced:Iso 1");

        let key: DatasetKey = "Bradykinin:2:Turbo:Iso 1:Defined".parse()?;
        assert_eq!(key.isolation.as_deref(), Some("Defined"));

        assert!(matches!(
            "MRFA:1+".parse::<DatasetKey>(),
            Err(DatasetKeyParseError::MissingField("resolution"))
        ));
        assert!(matches!(
            "MRFA:one:Enhanced:Iso 1".parse::<DatasetKey>(),
            Err(DatasetKeyParseError::MalformedCharge(_))
        ));
        Ok(())
    }

    #[test]
    fn test_resolve() -> Result<(), Box<dyn Error>> {
        let mut catalog: Catalog = CATALOG.parse()?;
        catalog.base_dir = Some(PathBuf::from("data"));

        let entry = catalog.resolve(&"MRFA:1+:Enhanced:Iso 1:Defined".parse()?)?;
        assert_eq!(entry.isolation, "Centre");
        assert_eq!(entry.sequence(), "MRFA");
        assert_eq!(
            catalog.source_of(entry),
            Path::new("data").join("energy_ramp.mzML").to_string_lossy()
        );

        let entry = catalog.resolve(&"Bradykinin:2+:Turbo:Iso 1".parse()?)?;
        assert_eq!(entry.source, "brady_centre.mzML");
        assert_eq!(entry.sequence(), "RPPGFSPFR");

        let entry = catalog.resolve(&"Bradykinin:2+:Turbo:Iso 1:Defined".parse()?)?;
        assert_eq!(
            catalog.source_of(entry),
            "https://example.org/brady_defined.mzML"
        );

        let err = catalog
            .resolve(&"Substance_P:2+:Zoom:Iso 1".parse()?)
            .unwrap_err();
        assert!(matches!(err, CatalogError::DatasetNotFound(_)));
        Ok(())
    }
}
