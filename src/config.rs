//! Configuration for the navigation stack
//!
//! Loaded from a TOML file. Every section and field has a default so a
//! partial file (or none at all) is valid.

use crate::control::state::DOF;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NavConfig{
    pub dvl: DvlConfig,
    pub board: BoardConfig,
    pub control: ControlConfig,
    pub kalman: KalmanConfig,
    pub logging: LoggingConfig,
}

/// DVL serial link and command-mode setup
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DvlConfig{
    pub port: String,
    pub baud: u32,
    /// How long to wait for the `>` prompt after each command
    pub command_timeout_ms: u64,
    /// Sent once to drop the DVL into command mode
    pub break_command: String,
    /// Sent in order after the break, each one waits for the prompt
    pub setup_commands: Vec<String>,
    /// Starts pinging, not acknowledged
    pub ping_command: String,
}

impl Default for DvlConfig{
    fn default() -> Self{
        DvlConfig{
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            command_timeout_ms: 2000,
            break_command: "===".to_string(),
            setup_commands: vec![
                "CR1\r".to_string(),
                "PD0\r".to_string(),
                "EX11111\r".to_string(),
                "BP001\r".to_string(),
                "TP00:00.00\r".to_string(),
                "TE00:00:00.00\r".to_string(),
                "CK\r".to_string(),
            ],
            ping_command: "CS\r".to_string(),
        }
    }
}

/// I/O board link (attitude, depth, kill switch, thrusters)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BoardConfig{
    pub port: String,
    pub baud: u32,
}

impl Default for BoardConfig{
    fn default() -> Self{
        BoardConfig{
            port: "/dev/ttyACM0".to_string(),
            baud: 115200,
        }
    }
}

/// PID gains and deadband for one degree of freedom
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PidGains{
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub deadband: f32,
}

impl PidGains{
    pub const fn new(kp: f32, ki: f32, kd: f32, deadband: f32) -> Self{
        PidGains{ kp, ki, kd, deadband }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig{
    /// Control loop frequency
    pub rate_hz: f32,
    /// Global power scalar `p` applied to every thruster
    pub power: f32,
    /// Translation is held off while the heading error is larger than this
    pub yaw_priority_deg: f32,
    /// Gains in F, H, V, Y, P, R order
    pub gains: [PidGains; DOF],
    /// Buoyancy trim added to the vertical thrusters
    pub trim: f32,
    /// Trim is only applied while `power` exceeds this
    pub trim_threshold: f32,
}

impl Default for ControlConfig{
    fn default() -> Self{
        ControlConfig{
            rate_hz: 50.0,
            power: 0.5,
            yaw_priority_deg: 30.0,
            gains: [
                PidGains::new(0.8, 0.0, 0.1, 0.1),    //F (m)
                PidGains::new(0.8, 0.0, 0.1, 0.1),    //H (m)
                PidGains::new(1.2, 0.05, 0.2, 0.05),  //V (m)
                PidGains::new(0.04, 0.0, 0.01, 0.02), //Y (deg)
                PidGains::new(0.04, 0.0, 0.01, 0.02), //P (deg)
                PidGains::new(0.04, 0.0, 0.01, 0.02), //R (deg)
            ],
            trim: 0.05,
            trim_threshold: 0.01,
        }
    }
}

/// Estimator tuning. The defaults are the vehicle's calibrated constants.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct KalmanConfig{
    /// Diagonal of the covariance after a reset
    pub initial_covariance: f32,
    /// Diagonal of Qk
    pub process_noise: f32,
    /// Diagonal of Rk
    pub measurement_noise: f32,
}

impl Default for KalmanConfig{
    fn default() -> Self{
        KalmanConfig{
            initial_covariance: 100.0,
            process_noise: 0.005,
            measurement_noise: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig{
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig{
    fn default() -> Self{
        LoggingConfig{ level: "info".to_string() }
    }
}

impl NavConfig{
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self>{
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self>{
        let config: NavConfig = toml::from_str(contents)?;
        Ok(config)
    }
}
