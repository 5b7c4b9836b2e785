//! A/D and D/A converters

mod pcf8591;

pub use pcf8591::{control, Pcf8591, BASE_ADDRESS};
