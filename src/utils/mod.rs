//! Helpers shared by the library and the command line.

pub mod validation;
