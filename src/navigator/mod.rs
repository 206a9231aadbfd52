/**
 * Navigator
 *
 * One control cycle: sample the kill switch, fold the latest DVL record into
 * the estimator, build the per-DOF error against the desired state, then run
 * the PID bank and thruster mixer. Estimation always completes before control.
 */

use log::{info, warn};

use crate::config::NavConfig;
use crate::control::{Attitude, BodyForces, Dof, DofVector, State, ThrusterMixer, VerticalMode, NUM_MOTORS};
use crate::control::state::wrap_degrees;
use crate::dvl::{DvlReader, DvlRecord, ParserStatsSnapshot};
use crate::error::Result;
use crate::kalman::{KalmanEstimator, N};

/// DVL velocities and ranges arrive in millimetres
pub const DVL_UNITS_PER_METER: f32 = 1000.0;

/// Heading, pitch and roll in degrees
pub trait AttitudeSource{
    fn attitude(&self) -> Attitude;
}

/// Pressure depth in meters, down positive
pub trait DepthSource{
    fn depth(&self) -> f32;
}

pub trait KillSwitch{
    fn alive(&self) -> bool;
}

/// Receives the 8 thruster commands in [-1, 1], orientation-matrix order
pub trait ThrustSink{
    fn write_thrust(&mut self, thrust: &[f32; NUM_MOTORS]) -> Result<()>;
}

/// Everything the loop samples once per cycle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CycleInputs{
    pub attitude: Attitude,
    pub depth: f32,
    pub alive: bool,
}

/// Status snapshot taken after each cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct Telemetry{
    pub alive: bool,
    pub estimate: [f32; N],
    pub current: State,
    pub desired: State,
    pub pid: DofVector,
    pub thrust: [f32; NUM_MOTORS],
    pub forces: BodyForces,
    pub parser: ParserStatsSnapshot,
    pub degenerate_updates: u64,
}

pub struct Navigator{
    estimator: KalmanEstimator,
    mixer: ThrusterMixer,
    dvl: DvlReader,
    desired: State,
    current: State,
    power: f32,
    yaw_priority_deg: f32,
    last_time: Option<u32>,
    was_alive: bool,
    hold_depth: Option<f32>,
    thrust: [f32; NUM_MOTORS],
    forces: BodyForces,
}

impl Navigator{
    pub fn new(config: &NavConfig, dvl: DvlReader) -> Self{
        Navigator{
            estimator: KalmanEstimator::new(&config.kalman),
            mixer: ThrusterMixer::new(&config.control),
            dvl,
            desired: State::default(),
            current: State::default(),
            power: config.control.power,
            yaw_priority_deg: config.control.yaw_priority_deg,
            last_time: None,
            was_alive: false,
            hold_depth: None,
            thrust: [0.0; NUM_MOTORS],
            forces: BodyForces::default(),
        }
    }

    pub fn estimator(&self) -> &KalmanEstimator{
        &self.estimator
    }

    pub fn mixer(&self) -> &ThrusterMixer{
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut ThrusterMixer{
        &mut self.mixer
    }

    pub fn desired(&self) -> State{
        self.desired
    }

    pub fn set_desired(&mut self, desired: State){
        self.desired = desired;
    }

    pub fn current(&self) -> State{
        self.current
    }

    pub fn power(&self) -> f32{
        self.power
    }

    pub fn set_power(&mut self, power: f32){
        self.power = power.clamp(0.0, 1.0);
    }

    pub fn is_alive(&self) -> bool{
        self.was_alive
    }

    pub fn thrust(&self) -> [f32; NUM_MOTORS]{
        self.thrust
    }

    /// Clear integrators and derivative history. Re-arming does not do this.
    pub fn reset_pid(&mut self){
        self.mixer.pids_mut().reset();
    }

    /// Run one cycle at `now` microseconds (wrapping) and return the clamped
    /// thruster commands.
    pub fn step(&mut self, inputs: &CycleInputs, now: u32) -> [f32; NUM_MOTORS]{
        if !inputs.alive{
            if self.was_alive{
                warn!("[NAV] Kill switch pulled, thrusters stopped");
            }
            self.was_alive = false;
            self.thrust = [0.0; NUM_MOTORS];
            self.forces = BodyForces::default();
            return self.thrust;
        }

        if !self.was_alive{
            self.rearm(&inputs.attitude);
        }

        self.dvl.update();
        let record = self.dvl.record();

        let start = self.last_time.unwrap_or(now);
        let dt = now.wrapping_sub(start) as f32 * 1e-6;
        self.last_time = Some(self.estimator.compute(&record, &inputs.attitude, start, now));

        self.update_current(&record, inputs);
        let error = self.error(&record, inputs.depth);

        let raw = self.mixer.mix(&error, self.power, dt);
        self.thrust = ThrusterMixer::to_command(&raw);
        self.forces = self.mixer.body_forces(&self.thrust, &inputs.attitude);
        self.thrust
    }

    /// Sample the board, run a cycle and push the result to the thrusters.
    pub fn cycle<B>(&mut self, board: &mut B, now: u32) -> Result<[f32; NUM_MOTORS]>
    where
        B: AttitudeSource + DepthSource + KillSwitch + ThrustSink,
    {
        let inputs = CycleInputs{
            attitude: board.attitude(),
            depth: board.depth(),
            alive: board.alive(),
        };
        let thrust = self.step(&inputs, now);
        board.write_thrust(&thrust)?;
        Ok(thrust)
    }

    pub fn telemetry(&self) -> Telemetry{
        Telemetry{
            alive: self.was_alive,
            estimate: *self.estimator.state(),
            current: self.current,
            desired: self.desired,
            pid: self.mixer.last_pid(),
            thrust: self.thrust,
            forces: self.forces,
            parser: self.dvl.stats(),
            degenerate_updates: self.estimator.degenerate_updates(),
        }
    }

    //fresh estimate, and the current pose becomes the reference
    fn rearm(&mut self, attitude: &Attitude){
        self.estimator.reset();
        self.last_time = None;
        self.hold_depth = None;
        self.desired.x = 0.0;
        self.desired.y = 0.0;
        self.desired.yaw = attitude.yaw;
        self.was_alive = true;
        info!("[NAV] Armed, heading reference {:.1} deg", attitude.yaw);
    }

    fn update_current(&mut self, record: &DvlRecord, inputs: &CycleInputs){
        let (north, east) = self.estimator.position();
        self.current.x = north / DVL_UNITS_PER_METER;
        self.current.y = east / DVL_UNITS_PER_METER;
        self.current.yaw = inputs.attitude.yaw;
        self.current.pitch = inputs.attitude.pitch;
        self.current.roll = inputs.attitude.roll;
        self.current.vertical = self.desired.vertical;
        self.current.z = match self.desired.vertical{
            VerticalMode::Altitude if record.range_to_bottom > 0 =>{
                record.range_to_bottom as f32 / DVL_UNITS_PER_METER
            }
            _ => inputs.depth,
        };
    }

    fn error(&mut self, record: &DvlRecord, depth: f32) -> DofVector{
        let mut e = DofVector::ZERO;

        //north/east error into the body frame
        let dn = self.desired.x - self.current.x;
        let de = self.desired.y - self.current.y;
        let (s, c) = self.current.yaw.to_radians().sin_cos();
        e[Dof::F] = dn * c + de * s;
        e[Dof::H] = -dn * s + de * c;

        e[Dof::V] = match self.desired.vertical{
            VerticalMode::Depth =>{
                self.hold_depth = None;
                self.desired.z - depth
            }
            VerticalMode::Altitude if record.range_to_bottom > 0 =>{
                self.hold_depth = None;
                //too high above the bottom means go down
                self.current.z - self.desired.z
            }
            VerticalMode::Altitude =>{
                let target = *self.hold_depth.get_or_insert_with(||{
                    warn!("[NAV] No bottom lock, holding depth {:.2} m", depth);
                    depth
                });
                target - depth
            }
        };

        e[Dof::Y] = wrap_degrees(self.desired.yaw - self.current.yaw);
        e[Dof::P] = self.desired.pitch - self.current.pitch;
        e[Dof::R] = self.desired.roll - self.current.roll;

        if e[Dof::Y].abs() > self.yaw_priority_deg{
            e[Dof::F] = 0.0;
            e[Dof::H] = 0.0;
        }

        e
    }
}
