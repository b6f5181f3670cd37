mod args;
mod catalog;
mod driver;
mod progress;
mod write;

pub use args::*;
pub use catalog::{Catalog, CatalogError, DatasetEntry, DatasetKey, DatasetKeyParseError};
pub use driver::{MZSweeper, MZSweeperError};
pub use progress::RunSummary;
pub use write::{write_output, OutputFormat};
