//! Contract with the CTest tool that runs inside the execution image.

pub mod command;
pub mod listing;

pub use command::{exact_name_regex, sanitize_name, shell_quote};
pub use listing::{CtestEntry, CtestListing, CtestProperty};
