/**
 * Thruster Mixer
 *
 * Converts per-DOF controller outputs (F, H, V, Y, P, R) into individual
 * thruster values through a fixed orientation matrix, adds buoyancy trim
 * to the vertical thrusters, and back-computes the resulting body forces
 * for telemetry.
 */

use crate::config::ControlConfig;
use super::pid::PidBank;
use super::state::{Attitude, Dof, DofVector, DOF};

pub const NUM_MOTORS: usize = 8;

/// Thrusters that receive the buoyancy trim
pub const VERTICAL_THRUSTERS: [usize; 4] = [0, 1, 2, 3];

/// Contribution of a unit command on each DoF to each thruster.
/// Rows: thrusters, Columns: [F, H, V, Y, P, R]
/// Positive thrust on a vertical thruster pushes that corner down, so +P
/// lifts the bow and +R lowers the starboard side.
pub const ORIENTATION: [[f32; DOF]; NUM_MOTORS] = [
    // Thruster 0 (front-left vertical)
    [0.0, 0.0, 1.0, 0.0, -1.0, -1.0],
    // Thruster 1 (front-right vertical)
    [0.0, 0.0, 1.0, 0.0, -1.0, 1.0],
    // Thruster 2 (rear-left vertical)
    [0.0, 0.0, 1.0, 0.0, 1.0, -1.0],
    // Thruster 3 (rear-right vertical)
    [0.0, 0.0, 1.0, 0.0, 1.0, 1.0],
    // Thruster 4 (front-left vectored)
    [1.0, -1.0, 0.0, 1.0, 0.0, 0.0],
    // Thruster 5 (front-right vectored)
    [1.0, 1.0, 0.0, -1.0, 0.0, 0.0],
    // Thruster 6 (rear-left vectored)
    [1.0, 1.0, 0.0, 1.0, 0.0, 0.0],
    // Thruster 7 (rear-right vectored)
    [1.0, -1.0, 0.0, -1.0, 0.0, 0.0],
];

/// Translational force implied by a set of thruster outputs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyForces{
    /// Surge, sway, heave in the vehicle frame
    pub body: [f32; 3],
    /// Same force rotated into north, east, down
    pub inertial: [f32; 3],
}

#[derive(Debug, Clone)]
pub struct ThrusterMixer{
    pub orientation: [[f32; DOF]; NUM_MOTORS],
    pub trim: [f32; NUM_MOTORS],
    pub trim_threshold: f32,
    pids: PidBank,
    last_pid: DofVector,
}

impl Default for ThrusterMixer{
    fn default() -> Self{
        Self::new(&ControlConfig::default())
    }
}

impl ThrusterMixer{
    pub fn new(config: &ControlConfig) -> Self{
        let mut trim = [0.0f32; NUM_MOTORS];
        for &i in VERTICAL_THRUSTERS.iter(){
            trim[i] = config.trim;
        }
        Self{
            orientation: ORIENTATION,
            trim,
            trim_threshold: config.trim_threshold,
            pids: PidBank::new(&config.gains),
            last_pid: DofVector::ZERO,
        }
    }

    pub fn pids(&self) -> &PidBank{
        &self.pids
    }

    pub fn pids_mut(&mut self) -> &mut PidBank{
        &mut self.pids
    }

    /// Controller output from the most recent [`mix`](Self::mix)
    pub fn last_pid(&self) -> DofVector{
        self.last_pid
    }

    /// `thrust[i] = trim[i] + p * sum_j pid[j] * orientation[i][j]`.
    /// Trim only applies while `p` is above the trim threshold. Unclamped.
    pub fn allocate(&self, pid: &DofVector, p: f32) -> [f32; NUM_MOTORS]{
        let trimmed = p > self.trim_threshold;
        let mut output = [0.0f32; NUM_MOTORS];

        for (i, row) in self.orientation.iter().enumerate(){
            let mut sum = 0.0;
            for (j, &coeff) in row.iter().enumerate(){
                sum += coeff * pid.0[j];
            }
            output[i] = p * sum;
            if trimmed{
                output[i] += self.trim[i];
            }
        }

        output
    }

    /// Run the error vector through the PID bank and allocate the result.
    pub fn mix(&mut self, error: &DofVector, p: f32, dt: f32) -> [f32; NUM_MOTORS]{
        self.last_pid = self.pids.calculate(error, dt);
        self.allocate(&self.last_pid, p)
    }

    /// Clamp thrust to the driver range [-1, 1]
    pub fn to_command(thrust: &[f32; NUM_MOTORS]) -> [f32; NUM_MOTORS]{
        let mut out = *thrust;
        for v in out.iter_mut(){
            *v = v.clamp(-1.0, 1.0);
        }
        out
    }

    /// Convert a thrust value (-1 to 1) to PWM (1100 to 1900 us)
    pub fn thrust_to_pwm(thrust: f32) -> i32{
        // Linear mapping: -1 -> 1100, 0 -> 1500, 1 -> 1900
        (1500.0 + thrust.clamp(-1.0, 1.0) * 400.0).round() as i32
    }

    /// Convert thrust array to PWM array
    pub fn to_pwm(thrusts: &[f32; NUM_MOTORS]) -> [i32; NUM_MOTORS]{
        let mut pwm = [1500i32; NUM_MOTORS];
        for (p, &t) in pwm.iter_mut().zip(thrusts.iter()){
            *p = Self::thrust_to_pwm(t);
        }
        pwm
    }

    /// Back-project thruster outputs onto surge/sway/heave and rotate them
    /// into the inertial frame. Diagnostic only.
    pub fn body_forces(&self, thrust: &[f32; NUM_MOTORS], attitude: &Attitude) -> BodyForces{
        let mut body = [0.0f32; 3];
        for (i, row) in self.orientation.iter().enumerate(){
            body[0] += thrust[i] * row[Dof::F as usize];
            body[1] += thrust[i] * row[Dof::H as usize];
            body[2] += thrust[i] * row[Dof::V as usize];
        }

        // ZYX: R = Rz(yaw) * Ry(pitch) * Rx(roll)
        let (sy, cy) = attitude.yaw.to_radians().sin_cos();
        let (sp, cp) = attitude.pitch.to_radians().sin_cos();
        let (sr, cr) = attitude.roll.to_radians().sin_cos();
        let r = [
            [cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr],
            [sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr],
            [-sp, cp * sr, cp * cr],
        ];

        let mut inertial = [0.0f32; 3];
        for (k, row) in r.iter().enumerate(){
            inertial[k] = row[0] * body[0] + row[1] * body[1] + row[2] * body[2];
        }

        BodyForces{ body, inertial }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit(dof: Dof, v: f32) -> DofVector{
        let mut d = DofVector::ZERO;
        d[dof] = v;
        d
    }

    #[test]
    fn test_neutral_thrust() {
        let mixer = ThrusterMixer::default();
        let output = mixer.allocate(&DofVector::ZERO, 0.0);
        assert!(output.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_trim_gated_by_power() {
        let mixer = ThrusterMixer::default();
        let idle = mixer.allocate(&DofVector::ZERO, 0.005);
        assert!(idle.iter().all(|&x| x == 0.0));

        let powered = mixer.allocate(&DofVector::ZERO, 0.5);
        for i in 0..NUM_MOTORS{
            assert_eq!(powered[i], mixer.trim[i]);
        }
        assert!(VERTICAL_THRUSTERS.iter().all(|&i| powered[i] > 0.0));
        assert!((4..NUM_MOTORS).all(|i| powered[i] == 0.0));
    }

    #[test]
    fn test_surge() {
        let mixer = ThrusterMixer::default();
        let output = mixer.allocate(&unit(Dof::F, 0.5), 1.0);
        // Vectored thrusters push forward, verticals carry only trim
        for i in 4..NUM_MOTORS{
            assert_abs_diff_eq!(output[i], 0.5);
        }
        for &i in VERTICAL_THRUSTERS.iter(){
            assert_abs_diff_eq!(output[i], mixer.trim[i]);
        }
    }

    #[test]
    fn test_yaw_is_differential() {
        let mixer = ThrusterMixer::default();
        let output = mixer.allocate(&unit(Dof::Y, 0.4), 1.0);
        assert!(output[4] > 0.0 && output[6] > 0.0);
        assert!(output[5] < 0.0 && output[7] < 0.0);
        let net: f32 = output[4..].iter().sum();
        assert_abs_diff_eq!(net, 0.0);
    }

    #[test]
    fn test_zero_power_ignores_pid() {
        let mixer = ThrusterMixer::default();
        let output = mixer.allocate(&DofVector([0.3; DOF]), 0.0);
        assert!(output.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_pitch_and_roll_directions() {
        let mixer = ThrusterMixer::default();
        //nose up: bow thrusters lift, stern thrusters push down
        let pitch = mixer.allocate(&unit(Dof::P, 0.5), 1.0);
        assert!(pitch[0] < 0.0 && pitch[1] < 0.0);
        assert!(pitch[2] > 0.0 && pitch[3] > 0.0);

        //starboard down
        let roll = mixer.allocate(&unit(Dof::R, 0.5), 1.0);
        assert!(roll[1] > 0.0 && roll[3] > 0.0);
        assert!(roll[0] < 0.0 && roll[2] < 0.0);
    }

    #[test]
    fn test_linear_in_pid_output() {
        let mixer = ThrusterMixer::default();
        let pid = DofVector([0.1, -0.05, 0.2, 0.03, -0.02, 0.01]);
        let p = 0.7;
        let single = mixer.allocate(&pid, p);
        let double = mixer.allocate(&pid.scaled(2.0), p);
        for i in 0..NUM_MOTORS{
            let a = single[i] - mixer.trim[i];
            let b = double[i] - mixer.trim[i];
            assert_abs_diff_eq!(b, 2.0 * a, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_mix_runs_pid_bank() {
        let mut mixer = ThrusterMixer::default();
        let error = unit(Dof::F, 2.0);
        let out = mixer.mix(&error, 0.5, 0.02);
        let pid = mixer.last_pid();
        assert!(pid[Dof::F] > 0.0);
        assert_abs_diff_eq!(out[4], 0.5 * pid[Dof::F], epsilon = 1e-6);
    }

    #[test]
    fn test_command_clamp_and_pwm() {
        let thrust = [2.0, -3.0, 0.5, 0.0, -0.25, 1.0, -1.0, 0.1];
        let cmd = ThrusterMixer::to_command(&thrust);
        assert_eq!(cmd[0], 1.0);
        assert_eq!(cmd[1], -1.0);
        assert_eq!(cmd[2], 0.5);

        let pwm = ThrusterMixer::to_pwm(&cmd);
        assert_eq!(pwm, [1900, 1100, 1700, 1500, 1400, 1900, 1100, 1540]);
    }

    #[test]
    fn test_body_forces_level_and_turned() {
        let mixer = ThrusterMixer::default();
        let thrust = mixer.allocate(&unit(Dof::F, 0.25), 1.0);
        //no trim in the horizontal plane, 4 thrusters x 0.25
        let level = mixer.body_forces(&thrust, &Attitude::default());
        assert_abs_diff_eq!(level.body[0], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(level.body[1], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(level.inertial[0], 1.0, epsilon = 1e-6);

        let east = mixer.body_forces(&thrust, &Attitude{ yaw: 90.0, pitch: 0.0, roll: 0.0 });
        assert_abs_diff_eq!(east.inertial[0], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(east.inertial[1], 1.0, epsilon = 1e-5);
        //trim shows up as heave
        assert_abs_diff_eq!(east.body[2], 4.0 * mixer.trim[0], epsilon = 1e-6);
    }
}
