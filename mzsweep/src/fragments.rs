/*! Theoretical peptide backbone fragment ions.

A peptide is written as a run of residue tokens, each an optional lowercase
modification label followed by one uppercase residue letter (`"pSMoxMR"`).
Unmodified `H-` and `-OH` termini may be written explicitly.
*/
use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;
use tracing::trace;

use crate::residues::{ResidueMassTable, PROTON};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FragmentError {
    #[error("Unrecognized symbol {symbol:?} at position {position} of the sequence")]
    InvalidSequence { symbol: String, position: usize },
    #[error("The peptide sequence is empty")]
    EmptySequence,
    #[error("Cannot make a {ion}{position} ion from a {length} residue peptide")]
    InvalidPosition {
        ion: IonType,
        position: usize,
        length: usize,
    },
    #[error("Charge state must be positive, received {0}")]
    InvalidCharge(i32),
    #[error("Failed to parse a charge state from {0:?}")]
    InvalidChargeText(String),
    #[error("Failed to parse ion type from {0:?}")]
    InvalidIonType(String),
    #[error("Failed to parse ion specification from {0:?}")]
    InvalidIonSpec(String),
}

/// The six backbone cleavage ion series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IonType {
    A,
    B,
    C,
    X,
    Y,
    Z,
}

impl IonType {
    pub const ALL: [IonType; 6] = [
        IonType::A,
        IonType::B,
        IonType::C,
        IonType::X,
        IonType::Y,
        IonType::Z,
    ];

    /// Whether this series retains the N-terminus of the peptide
    pub fn is_n_terminal(&self) -> bool {
        matches!(self, Self::A | Self::B | Self::C)
    }

    pub fn as_char(&self) -> char {
        match self {
            IonType::A => 'a',
            IonType::B => 'b',
            IonType::C => 'c',
            IonType::X => 'x',
            IonType::Y => 'y',
            IonType::Z => 'z',
        }
    }
}

impl Display for IonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for IonType {
    type Err = FragmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "a" | "A" => Ok(Self::A),
            "b" | "B" => Ok(Self::B),
            "c" | "C" => Ok(Self::C),
            "x" | "X" => Ok(Self::X),
            "y" | "Y" => Ok(Self::Y),
            "z" | "Z" => Ok(Self::Z),
            _ => Err(FragmentError::InvalidIonType(s.to_string())),
        }
    }
}

/// A requested ion: its series and its length in residues from the relevant terminus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IonSpec {
    pub ion_type: IonType,
    pub position: usize,
}

impl IonSpec {
    pub fn new(ion_type: IonType, position: usize) -> Self {
        Self { ion_type, position }
    }
}

impl Display for IonSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.ion_type, self.position)
    }
}

impl FromStr for IonSpec {
    type Err = FragmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let ion_type = chars
            .next()
            .ok_or_else(|| FragmentError::InvalidIonSpec(s.to_string()))?
            .to_string()
            .parse::<IonType>()
            .map_err(|_| FragmentError::InvalidIonSpec(s.to_string()))?;
        let position = chars
            .as_str()
            .parse::<usize>()
            .map_err(|_| FragmentError::InvalidIonSpec(s.to_string()))?;
        Ok(Self::new(ion_type, position))
    }
}

/// `a1..a4`, `b1..b4`, `c1..c4`, `x1..x4`, `y1..y4` and `z1..z4`
pub fn default_ion_specs() -> Vec<IonSpec> {
    IonType::ALL
        .iter()
        .flat_map(|t| (1..=4).map(|i| IonSpec::new(*t, i)))
        .collect()
}

/// A residue token within a [`Peptide`]
#[derive(Debug, Clone, PartialEq)]
pub struct Residue {
    pub symbol: char,
    pub modification: Option<String>,
    pub mass: f64,
}

impl Display for Residue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(m) = self.modification.as_deref() {
            f.write_str(m)?;
        }
        write!(f, "{}", self.symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Peptide {
    pub residues: Vec<Residue>,
}

impl Peptide {
    /// Tokenize `sequence`, resolving each residue's mass from `table`
    pub fn parse(sequence: &str, table: &ResidueMassTable) -> Result<Self, FragmentError> {
        let body = sequence.trim();
        let (offset, body) = match body.strip_prefix("H-") {
            Some(rest) => (2, rest),
            None => (0, body),
        };
        let body = body.strip_suffix("-OH").unwrap_or(body);

        let mut residues = Vec::new();
        let mut label_start: Option<usize> = None;
        for (i, c) in body.char_indices() {
            if c.is_ascii_lowercase() {
                label_start.get_or_insert(i);
            } else if c.is_ascii_uppercase() {
                let modification = label_start.take().map(|start| &body[start..i]);
                let token_start = modification.map(|m| i - m.len()).unwrap_or(i);
                let mass = table.mass_of(c, modification).ok_or_else(|| {
                    FragmentError::InvalidSequence {
                        symbol: body[token_start..i + c.len_utf8()].to_string(),
                        position: offset + token_start,
                    }
                })?;
                residues.push(Residue {
                    symbol: c,
                    modification: modification.map(|m| m.to_string()),
                    mass,
                });
            } else {
                return Err(FragmentError::InvalidSequence {
                    symbol: c.to_string(),
                    position: offset + i,
                });
            }
        }
        if let Some(start) = label_start {
            return Err(FragmentError::InvalidSequence {
                symbol: body[start..].to_string(),
                position: offset + start,
            });
        }
        if residues.is_empty() {
            return Err(FragmentError::EmptySequence);
        }
        Ok(Self { residues })
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    pub fn residue_mass(&self) -> f64 {
        self.residues.iter().map(|r| r.mass).sum()
    }
}

impl Display for Peptide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in self.residues.iter() {
            write!(f, "{r}")?;
        }
        Ok(())
    }
}

/// How C-terminal ion labels are numbered
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IonLabelConvention {
    /// C-terminal ions are numbered by the cleavage site counted from the
    /// N-terminus, `length - position + 1`
    #[default]
    CleavageSite,
    /// Every ion is numbered by the residues it contains
    ResidueCount,
}

/// A theoretical fragment ion
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FragmentIon {
    pub ion_type: IonType,
    pub position: usize,
    pub subsequence: String,
    pub mz: f64,
    pub charge: i32,
    pub label: String,
}

/// Computes fragment ion m/z values from a [`ResidueMassTable`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentCalculator {
    pub table: ResidueMassTable,
    pub label_convention: IonLabelConvention,
}

impl FragmentCalculator {
    pub fn new(table: ResidueMassTable) -> Self {
        Self {
            table,
            label_convention: IonLabelConvention::default(),
        }
    }

    pub fn with_label_convention(mut self, label_convention: IonLabelConvention) -> Self {
        self.label_convention = label_convention;
        self
    }

    /// The neutral mass of an ion of `ion_type` made of residues summing to `residue_mass`
    pub fn neutral_mass(&self, residue_mass: f64, ion_type: IonType) -> f64 {
        let offsets = self.table.offsets();
        match ion_type {
            IonType::A => residue_mass - offsets.carbon_monoxide,
            IonType::B => residue_mass,
            IonType::C => residue_mass + offsets.ammonia,
            IonType::X => residue_mass + offsets.carbon_dioxide,
            IonType::Y => residue_mass + offsets.water,
            IonType::Z => residue_mass + offsets.water - offsets.ammonia,
        }
    }

    fn label(&self, spec: &IonSpec, length: usize) -> String {
        let number = match self.label_convention {
            IonLabelConvention::CleavageSite if !spec.ion_type.is_n_terminal() => {
                length - spec.position + 1
            }
            _ => spec.position,
        };
        format!("{}{}", spec.ion_type, number)
    }

    /// Compute one ion per entry of `ion_specs`, in the same order
    pub fn fragments_of(
        &self,
        peptide: &Peptide,
        ion_specs: &[IonSpec],
        charge: i32,
    ) -> Result<Vec<FragmentIon>, FragmentError> {
        if charge <= 0 {
            return Err(FragmentError::InvalidCharge(charge));
        }
        let length = peptide.len();
        ion_specs
            .iter()
            .map(|spec| {
                if spec.position == 0 || spec.position > length {
                    return Err(FragmentError::InvalidPosition {
                        ion: spec.ion_type,
                        position: spec.position,
                        length,
                    });
                }
                let residues = if spec.ion_type.is_n_terminal() {
                    &peptide.residues[..spec.position]
                } else {
                    &peptide.residues[length - spec.position..]
                };
                let residue_mass: f64 = residues.iter().map(|r| r.mass).sum();
                let neutral = self.neutral_mass(residue_mass, spec.ion_type);
                let mz = (neutral + charge as f64 * PROTON) / charge as f64;
                let subsequence: String = residues.iter().map(|r| r.to_string()).collect();
                let label = self.label(spec, length);
                trace!("{label} {subsequence} {mz:.4}");
                Ok(FragmentIon {
                    ion_type: spec.ion_type,
                    position: spec.position,
                    subsequence,
                    mz,
                    charge,
                    label,
                })
            })
            .collect()
    }

    pub fn fragments(
        &self,
        sequence: &str,
        ion_specs: &[IonSpec],
        charge: i32,
    ) -> Result<Vec<FragmentIon>, FragmentError> {
        let peptide = Peptide::parse(sequence, &self.table)?;
        self.fragments_of(&peptide, ion_specs, charge)
    }
}

/// Compute fragments of `sequence` with the standard residue mass table
pub fn fragments(
    sequence: &str,
    ion_specs: &[IonSpec],
    charge: i32,
) -> Result<Vec<FragmentIon>, FragmentError> {
    FragmentCalculator::default().fragments(sequence, ion_specs, charge)
}

/// A positive precursor charge, written `"2"` or `"2+"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct ChargeState(i32);

impl ChargeState {
    pub fn new(charge: i32) -> Result<Self, FragmentError> {
        if charge <= 0 {
            Err(FragmentError::InvalidCharge(charge))
        } else {
            Ok(Self(charge))
        }
    }

    pub fn get(&self) -> i32 {
        self.0
    }
}

impl Display for ChargeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+", self.0)
    }
}

impl FromStr for ChargeState {
    type Err = FragmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let z = s
            .strip_suffix('+')
            .unwrap_or(s)
            .parse::<i32>()
            .map_err(|_| FragmentError::InvalidChargeText(s.to_string()))?;
        Self::new(z)
    }
}

impl TryFrom<String> for ChargeState {
    type Error = FragmentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChargeState> for String {
    fn from(value: ChargeState) -> Self {
        value.to_string()
    }
}

impl From<ChargeState> for i32 {
    fn from(value: ChargeState) -> Self {
        value.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    macro_rules! assert_is_close {
        ($t1:expr, $t2:expr, $tol:expr, $label:literal) => {
            assert!(
                ($t1 - $t2).abs() < $tol,
                "Observed {} {}, expected {}, difference {}",
                $label,
                $t1,
                $t2,
                $t1 - $t2,
            );
        };
    }

    #[test]
    fn test_parse_spec() {
        assert_eq!("b2".parse::<IonSpec>(), Ok(IonSpec::new(IonType::B, 2)));
        assert_eq!(" y12 ".parse::<IonSpec>(), Ok(IonSpec::new(IonType::Y, 12)));
        assert!("q2".parse::<IonSpec>().is_err());
        assert!("b".parse::<IonSpec>().is_err());
        assert!("".parse::<IonSpec>().is_err());
        assert_eq!(IonSpec::new(IonType::Z, 3).to_string(), "z3");
        let specs = default_ion_specs();
        assert_eq!(specs.len(), 24);
        assert_eq!(specs[0], IonSpec::new(IonType::A, 1));
        assert_eq!(specs[23], IonSpec::new(IonType::Z, 4));
    }

    #[test]
    fn test_parse_peptide() -> Result<(), FragmentError> {
        let table = ResidueMassTable::standard();
        let peptide = Peptide::parse("H-pSAoxMR-OH", &table)?;
        assert_eq!(peptide.len(), 4);
        assert_eq!(peptide.residues[0].modification.as_deref(), Some("p"));
        assert_eq!(peptide.residues[2].modification.as_deref(), Some("ox"));
        assert_eq!(peptide.to_string(), "pSAoxMR");

        let err = Peptide::parse("MRXFA", &table).unwrap_err();
        assert_eq!(
            err,
            FragmentError::InvalidSequence {
                symbol: "X".to_string(),
                position: 2
            }
        );
        let err = Peptide::parse("MRqqF", &table).unwrap_err();
        assert!(matches!(err, FragmentError::InvalidSequence { position: 2, .. }));
        assert!(Peptide::parse("MR1", &table).is_err());
        assert!(Peptide::parse("MRp", &table).is_err());
        assert_eq!(Peptide::parse("", &table), Err(FragmentError::EmptySequence));
        Ok(())
    }

    #[test]
    fn test_mrfa() -> Result<(), FragmentError> {
        let ions = fragments(
            "MRFA",
            &[IonSpec::new(IonType::B, 2), IonSpec::new(IonType::Y, 2)],
            1,
        )?;
        assert_eq!(ions[0].subsequence, "MR");
        assert_eq!(ions[0].label, "b2");
        assert_is_close!(ions[0].mz, 288.14891, 1e-4, "b2 m/z");

        assert_eq!(ions[1].subsequence, "FA");
        // counted from the N-terminal cleavage site
        assert_eq!(ions[1].label, "y3");
        assert_is_close!(ions[1].mz, 237.12336, 1e-4, "y2 m/z");

        let calc = FragmentCalculator::default()
            .with_label_convention(IonLabelConvention::ResidueCount);
        let ions = calc.fragments("MRFA", &[IonSpec::new(IonType::Y, 2)], 1)?;
        assert_eq!(ions[0].subsequence, "FA");
        assert_eq!(ions[0].label, "y2");
        Ok(())
    }

    #[test]
    fn test_ion_series() -> Result<(), FragmentError> {
        let calc = FragmentCalculator::default();
        let specs: Vec<IonSpec> = IonType::ALL.iter().map(|t| IonSpec::new(*t, 2)).collect();
        let ions = calc.fragments("MRFA", &specs, 2)?;
        let mzs: Vec<f64> = ions.iter().map(|i| i.mz).collect();
        // b2 is 287.14163 neutral
        assert_is_close!(mzs[1], (287.1416 + 2.0 * PROTON) / 2.0, 1e-3, "b2++");
        assert_is_close!(mzs[1] - mzs[0], 27.99491 / 2.0, 1e-4, "b - a");
        assert_is_close!(mzs[2] - mzs[1], 17.02655 / 2.0, 1e-4, "c - b");
        assert_is_close!(mzs[4] - mzs[3], (18.01056 - 43.98983) / 2.0, 1e-4, "y - x");
        assert_is_close!(mzs[4] - mzs[5], 17.02655 / 2.0, 1e-4, "y - z");
        Ok(())
    }

    #[test]
    fn test_modified_mass() -> Result<(), FragmentError> {
        let plain = fragments("SA", &[IonSpec::new(IonType::B, 2)], 1)?;
        let phospho = fragments("pSA", &[IonSpec::new(IonType::B, 2)], 1)?;
        assert_is_close!(phospho[0].mz - plain[0].mz, 79.966331, 1e-6, "phospho shift");
        assert_eq!(phospho[0].subsequence, "pSA");
        Ok(())
    }

    #[test]
    fn test_invalid_arguments() {
        assert_eq!(
            fragments("MRFA", &[IonSpec::new(IonType::B, 2)], 0),
            Err(FragmentError::InvalidCharge(0))
        );
        assert!(matches!(
            fragments("MRFA", &[IonSpec::new(IonType::Y, 5)], 1),
            Err(FragmentError::InvalidPosition { position: 5, length: 4, .. })
        ));
        assert!(matches!(
            fragments("MRFA", &[IonSpec::new(IonType::A, 0)], 1),
            Err(FragmentError::InvalidPosition { .. })
        ));
    }

    #[test]
    fn test_charge_state() {
        assert_eq!("2".parse::<ChargeState>().map(|z| z.get()), Ok(2));
        assert_eq!(" 3+".parse::<ChargeState>().map(|z| z.get()), Ok(3));
        assert_eq!(
            "0+".parse::<ChargeState>(),
            Err(FragmentError::InvalidCharge(0))
        );
        assert!("-1".parse::<ChargeState>().is_err());
        assert!(matches!(
            "two".parse::<ChargeState>(),
            Err(FragmentError::InvalidChargeText(_))
        ));
        assert_eq!(ChargeState::new(2).unwrap().to_string(), "2+");
    }
}
