/**
 * PID Controllers
 *
 * One controller per degree of freedom. State (integral, previous error)
 * persists across cycles and is cleared only by an explicit reset.
 */

use crate::config::PidGains;
use super::state::{Dof, DofVector, DOF};

#[derive(Debug, Clone, Copy, Default)]
pub struct Pid{
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    integral: f32,
    prev_error: f32,
    has_prev: bool,
}

impl Pid{
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self{
        Self{ kp, ki, kd, ..Default::default() }
    }

    /// Control signal for `error` after `dt` seconds.
    ///
    /// The integral accumulates on every call, including calls that end up
    /// inside the deadband, and is not clamped. The output is forced to
    /// exactly zero when `|error|` or the computed `|signal|` is below
    /// `deadband`.
    pub fn calculate(&mut self, error: f32, dt: f32, deadband: f32) -> f32{
        self.integral += error * dt;

        let derivative = if self.has_prev && dt > 0.0{
            (error - self.prev_error) / dt
        }else{
            0.0
        };
        self.prev_error = error;
        self.has_prev = true;

        let signal = self.kp * error + self.ki * self.integral + self.kd * derivative;

        if error.abs() < deadband || signal.abs() < deadband{
            return 0.0;
        }
        signal
    }

    pub fn integral(&self) -> f32{
        self.integral
    }

    pub fn reset(&mut self){
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.has_prev = false;
    }
}

/// The six per-axis controllers plus their deadbands.
#[derive(Debug, Clone)]
pub struct PidBank{
    pids: [Pid; DOF],
    deadbands: DofVector,
}

impl PidBank{
    pub fn new(gains: &[PidGains; DOF]) -> Self{
        let mut pids = [Pid::default(); DOF];
        let mut deadbands = DofVector::ZERO;
        for (i, g) in gains.iter().enumerate(){
            pids[i] = Pid::new(g.kp, g.ki, g.kd);
            deadbands.0[i] = g.deadband;
        }
        Self{ pids, deadbands }
    }

    /// Run every axis error through its controller.
    pub fn calculate(&mut self, error: &DofVector, dt: f32) -> DofVector{
        let mut out = DofVector::ZERO;
        for dof in Dof::ALL{
            let i = dof as usize;
            out.0[i] = self.pids[i].calculate(error[dof], dt, self.deadbands[dof]);
        }
        out
    }

    pub fn pid(&self, dof: Dof) -> &Pid{
        &self.pids[dof as usize]
    }

    pub fn pid_mut(&mut self, dof: Dof) -> &mut Pid{
        &mut self.pids[dof as usize]
    }

    pub fn set_gains(&mut self, dof: Dof, gains: PidGains){
        let pid = &mut self.pids[dof as usize];
        pid.kp = gains.kp;
        pid.ki = gains.ki;
        pid.kd = gains.kd;
        self.deadbands[dof] = gains.deadband;
    }

    pub fn reset(&mut self){
        for pid in self.pids.iter_mut(){
            pid.reset();
        }
    }
}
