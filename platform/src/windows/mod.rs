pub mod catalog;
pub mod elevation;

pub use catalog::WindowsCatalog;
pub use elevation::{is_elevated, relaunch_elevated};
