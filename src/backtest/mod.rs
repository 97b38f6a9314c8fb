//! Post-publication evaluation: closing line value tracking and
//! probability calibration over settled plays.

pub mod calibration;
pub mod clv;

pub use calibration::{CalibrationDiagnosis, CalibrationReport, Calibrator};
pub use clv::{ClvRecord, ClvState, ClvSummary, ClvTracker};
