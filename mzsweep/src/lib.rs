pub mod arrayops;
pub mod spectrum;
pub mod scan_store;
pub mod averaging;
pub mod interpolation;
pub mod peak_picking;
pub mod centroid;
pub mod residues;
pub mod fragments;
pub mod cache;
pub mod api;

pub use crate::api::{
    ExplorerParams, ExplorerView, FragmentAnnotation, PeptideTarget, PipelineError,
    SpectrumExplorer,
};
pub use crate::fragments::{ChargeState, FragmentIon, IonLabelConvention, IonSpec, IonType};
pub use crate::peak_picking::{DetectionParams, Peak};
pub use crate::scan_store::{ScanStore, ScanStoreError};
pub use crate::spectrum::{Scan, ScanWindow, Spectrum, SpectrumError};
