pub mod catalog;
pub mod elevation;

pub use catalog::LinuxCatalog;
pub use elevation::is_elevated;
