use std::ops::{Add, AddAssign};

use mzsweep::ExplorerView;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub ms1_scans: usize,
    pub msn_scans: usize,
    pub energies: usize,
    pub interpolated: usize,
    pub peaks: usize,
    pub labelled_peaks: usize,
    pub fragments: usize,
    pub matched_fragments: usize,
}

impl RunSummary {
    pub fn from_view(view: &ExplorerView) -> Self {
        Self {
            energies: 1,
            interpolated: view.interpolated as usize,
            peaks: view.peaks.len(),
            labelled_peaks: view.labelled_peaks.len(),
            fragments: view.fragments.len(),
            matched_fragments: view
                .fragments
                .iter()
                .filter(|f| f.matched_peak.is_some())
                .count(),
            ..Default::default()
        }
    }
}

impl Add for RunSummary {
    type Output = RunSummary;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.ms1_scans += rhs.ms1_scans;
        self.msn_scans += rhs.msn_scans;
        self.energies += rhs.energies;
        self.interpolated += rhs.interpolated;
        self.peaks += rhs.peaks;
        self.labelled_peaks += rhs.labelled_peaks;
        self.fragments += rhs.fragments;
        self.matched_fragments += rhs.matched_fragments;
    }
}
