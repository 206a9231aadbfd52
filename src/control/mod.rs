/**
 * Control Module
 *
 * Per-DOF PID controllers and the thruster mixing stage, plus the small
 * vector types they exchange.
 */

pub mod state;
pub mod pid;
pub mod mixer;

pub use state::{Attitude, Dof, DofVector, State, VerticalMode, DOF};
pub use pid::{Pid, PidBank};
pub use mixer::{BodyForces, ThrusterMixer, NUM_MOTORS, ORIENTATION};
