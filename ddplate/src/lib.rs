// src/lib.rs
pub mod cluster;

pub mod pipeline {
    pub mod well;
    pub mod plate;
}

pub use pipeline::plate::{analyze_plate, analyze_plate_with_threads, PlateDiagnostics, PlateSummary};
pub use pipeline::well::{analyze_well, WellResult, WellStatus};
