//! Output writers.
//!
//! - [`json`]: serialises reports, scrapes and summaries to stdout or a file

pub mod json;
