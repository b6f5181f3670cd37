//! Monoisotopic residue masses and the modification labels that can prefix them.
use std::collections::HashMap;

use chemical_elements::{ChemicalComposition, ElementSpecification, PROTON as _PROTON};

/// The mass of H+, a hydrogen atom minus an electron
pub const PROTON: f64 = _PROTON;

const STANDARD_RESIDUES: [(char, f64); 23] = [
    ('G', 57.02146),
    ('A', 71.03711),
    ('S', 87.03203),
    ('P', 97.05276),
    ('V', 99.06841),
    ('T', 101.04768),
    ('C', 103.00919),
    ('L', 113.08406),
    ('I', 113.08406),
    ('J', 113.08406),
    ('N', 114.04293),
    ('D', 115.02694),
    ('Q', 128.05858),
    ('K', 128.09496),
    ('E', 129.04259),
    ('M', 131.04049),
    ('H', 137.05891),
    ('F', 147.06841),
    ('U', 150.95364),
    ('R', 156.10111),
    ('Y', 163.06333),
    ('W', 186.07931),
    ('O', 237.14773),
];

/// Phosphorylation, oxidation, deamidation and amidation
const STANDARD_MODIFICATIONS: [(&str, f64); 4] = [
    ("p", 79.966331),
    ("ox", 15.994915),
    ("d", 0.984016),
    ("am", -0.984016),
];

fn formula_mass(parts: &[(&str, i32)]) -> f64 {
    let mut composition = ChemicalComposition::new();
    for (symbol, count) in parts {
        composition.set(ElementSpecification::parse(symbol).unwrap(), *count);
    }
    composition.mass()
}

/// Neutral losses and gains applied to a residue mass sum to form each ion series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalOffsets {
    pub water: f64,
    pub ammonia: f64,
    pub carbon_monoxide: f64,
    pub carbon_dioxide: f64,
}

impl Default for TerminalOffsets {
    fn default() -> Self {
        Self {
            water: formula_mass(&[("H", 2), ("O", 1)]),
            ammonia: formula_mass(&[("N", 1), ("H", 3)]),
            carbon_monoxide: formula_mass(&[("C", 1), ("O", 1)]),
            carbon_dioxide: formula_mass(&[("C", 1), ("O", 2)]),
        }
    }
}

/// An immutable lookup of residue and modification masses.
///
/// Use [`ResidueMassTable::standard`] for the twenty-odd standard residues and the
/// phosphorylation (`p`), oxidation (`ox`), deamidation (`d`) and amidation (`am`)
/// labels, and the `with_*` builders to derive extended tables from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidueMassTable {
    residues: HashMap<char, f64>,
    modifications: HashMap<String, f64>,
    offsets: TerminalOffsets,
}

impl Default for ResidueMassTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl ResidueMassTable {
    pub fn standard() -> Self {
        Self {
            residues: STANDARD_RESIDUES.iter().copied().collect(),
            modifications: STANDARD_MODIFICATIONS
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            offsets: TerminalOffsets::default(),
        }
    }

    pub fn with_residue(mut self, symbol: char, mass: f64) -> Self {
        self.residues.insert(symbol, mass);
        self
    }

    /// Add a modification label. Labels are written in lowercase before the residue
    /// they modify, e.g. `"pS"`.
    pub fn with_modification(mut self, label: &str, mass_delta: f64) -> Self {
        self.modifications.insert(label.to_string(), mass_delta);
        self
    }

    pub fn residue_mass(&self, symbol: char) -> Option<f64> {
        self.residues.get(&symbol).copied()
    }

    pub fn modification_mass(&self, label: &str) -> Option<f64> {
        self.modifications.get(label).copied()
    }

    /// The mass of a residue carrying an optional modification label
    pub fn mass_of(&self, symbol: char, modification: Option<&str>) -> Option<f64> {
        let base = self.residue_mass(symbol)?;
        match modification {
            Some(label) => Some(base + self.modification_mass(label)?),
            None => Some(base),
        }
    }

    pub fn offsets(&self) -> &TerminalOffsets {
        &self.offsets
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_offsets() {
        let offsets = TerminalOffsets::default();
        assert!((offsets.water - 18.0105646).abs() < 1e-5);
        assert!((offsets.ammonia - 17.0265491).abs() < 1e-5);
        assert!((offsets.carbon_monoxide - 27.9949146).abs() < 1e-5);
        assert!((offsets.carbon_dioxide - 43.9898292).abs() < 1e-5);
    }

    #[test]
    fn test_table() {
        let table = ResidueMassTable::standard();
        assert_eq!(table.residue_mass('G'), Some(57.02146));
        assert_eq!(table.residue_mass('L'), table.residue_mass('I'));
        assert_eq!(table.residue_mass('B'), None);
        assert!((table.mass_of('S', Some("p")).unwrap() - 166.998361).abs() < 1e-6);
        assert_eq!(table.mass_of('S', Some("ac")), None);

        let extended = table.clone().with_modification("ac", 42.010565);
        assert!(extended.mass_of('K', Some("ac")).is_some());
        assert_eq!(table.modification_mass("ac"), None);
    }
}
