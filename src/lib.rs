pub mod error;
pub mod config;
pub mod matrix;
pub mod tripbuf;
pub mod dvl;
pub mod kalman;
pub mod control;
pub mod navigator;
pub mod board;
pub mod ffi;

#[cfg(feature = "python")]
pub mod python;

pub use error::{NavError, Result};
pub use config::NavConfig;
pub use tripbuf::{triple_buffer, TripleReader, TripleWriter};

pub use dvl::{
    DvlRecord, DvlParser, DvlReader, DvlLink,
    ParserStatsSnapshot, DatagramBuilder,
};

pub use kalman::KalmanEstimator;
pub use control::{Attitude, Dof, DofVector, State, VerticalMode, ThrusterMixer, PidBank, NUM_MOTORS};
pub use navigator::{Navigator, CycleInputs, Telemetry};
pub use board::BoardLink;
