/**
 * Kalman Filter
 *
 * Fixed-gain linear filter over the state [X VX AX Y VY AY] (north and east
 * position, velocity, acceleration). The only measurement is the DVL
 * velocity, rotated from the body frame into north/east with the AHRS
 * heading. Attitude is taken as exact, which keeps the filter linear and
 * the only inversion a 2x2.
 *
 * Units follow the measurement: DVL device units (mm/s, mm).
 */

use log::warn;

use crate::config::KalmanConfig;
use crate::control::Attitude;
use crate::dvl::DvlRecord;
use crate::matrix;

/// Number of state elements
pub const N: usize = 6;
/// Number of measurements
pub const M: usize = 2;

pub const X: usize = 0;
pub const VX: usize = 1;
pub const AX: usize = 2;
pub const Y: usize = 3;
pub const VY: usize = 4;
pub const AY: usize = 5;

/// Maps the state to the measured north and east velocity
pub const HK: [f32; M * N] = [
    0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
];

//n x n diagonal matrix with v on the diagonal
fn diagonal<const LEN: usize>(n: usize, v: f32) -> [f32; LEN]{
    let mut a = [0.0f32; LEN];
    for i in 0..n{
        a[i * n + i] = v;
    }
    a
}

/// Rotate a body-frame DVL velocity into north/east using heading in degrees.
pub fn rotate_to_inertial(forward: f32, starboard: f32, yaw_deg: f32) -> (f32, f32){
    let (s, c) = yaw_deg.to_radians().sin_cos();
    let north = forward * c - starboard * s;
    let east = forward * s + starboard * c;
    (north, east)
}

/// Constant-acceleration transition over `dt` for both axes
fn transition(dt: f32) -> [f32; N * N]{
    let mut f = diagonal::<{ N * N }>(N, 1.0);
    for base in [X, Y]{
        f[base * N + base + 1] = dt;
        f[base * N + base + 2] = 0.5 * dt * dt;
        f[(base + 1) * N + base + 2] = dt;
    }
    f
}

#[derive(Debug, Clone)]
pub struct KalmanEstimator{
    state: [f32; N],
    covar: [f32; N * N],
    qk: [f32; N * N],
    rk: [f32; M * M],
    initial_covariance: f32,
    degenerate_updates: u64,
}

impl Default for KalmanEstimator{
    fn default() -> Self{
        Self::new(&KalmanConfig::default())
    }
}

impl KalmanEstimator{
    pub fn new(config: &KalmanConfig) -> Self{
        Self{
            state: [0.0; N],
            covar: diagonal::<{ N * N }>(N, config.initial_covariance),
            qk: diagonal::<{ N * N }>(N, config.process_noise),
            rk: diagonal::<{ M * M }>(M, config.measurement_noise),
            initial_covariance: config.initial_covariance,
            degenerate_updates: 0,
        }
    }

    /// Zero the state and restore the initial covariance.
    pub fn reset(&mut self){
        self.state = [0.0; N];
        self.covar = diagonal::<{ N * N }>(N, self.initial_covariance);
    }

    pub fn state(&self) -> &[f32; N]{
        &self.state
    }

    pub fn covariance(&self) -> &[f32; N * N]{
        &self.covar
    }

    pub fn trace(&self) -> f32{
        matrix::trace(&self.covar, N)
    }

    /// (north, east)
    pub fn position(&self) -> (f32, f32){
        (self.state[X], self.state[Y])
    }

    pub fn velocity(&self) -> (f32, f32){
        (self.state[VX], self.state[VY])
    }

    pub fn acceleration(&self) -> (f32, f32){
        (self.state[AX], self.state[AY])
    }

    /// Updates rejected because the math went non-finite
    pub fn degenerate_updates(&self) -> u64{
        self.degenerate_updates
    }

    /// One filter cycle from a DVL record and the current attitude.
    ///
    /// `start` is the timestamp returned by the previous call and `now` the
    /// current time, both in microseconds (wrapping). Returns `now`.
    pub fn compute(&mut self, record: &DvlRecord, attitude: &Attitude, start: u32, now: u32) -> u32{
        let (north, east) = rotate_to_inertial(
            record.velocity_forward as f32,
            record.velocity_starboard as f32,
            attitude.yaw,
        );
        let dt = now.wrapping_sub(start) as f32 * 1e-6;
        self.step([north, east], dt);
        now
    }

    /// Predict over `dt` seconds, then correct with an inertial-frame
    /// velocity measurement `[north, east]`.
    ///
    /// If any intermediate goes non-finite (singular innovation covariance)
    /// the whole cycle is rejected and the previous estimate is kept.
    pub fn step(&mut self, z: [f32; M], dt: f32){
        let f = transition(dt);
        let mut ft = [0.0f32; N * N];
        matrix::transpose(&f, N, N, &mut ft);

        // predict: x = F x, P = F P F' + Q
        let mut x = [0.0f32; N];
        matrix::multiply(&f, &self.state, N, N, 1, &mut x);

        let mut fp = [0.0f32; N * N];
        let mut fpft = [0.0f32; N * N];
        let mut p = [0.0f32; N * N];
        matrix::multiply(&f, &self.covar, N, N, N, &mut fp);
        matrix::multiply(&fp, &ft, N, N, N, &mut fpft);
        matrix::add(&fpft, &self.qk, N, N, &mut p);

        // S = H P H' + R
        let mut ht = [0.0f32; N * M];
        matrix::transpose(&HK, M, N, &mut ht);
        let mut hp = [0.0f32; M * N];
        let mut hpht = [0.0f32; M * M];
        let mut s = [0.0f32; M * M];
        matrix::multiply(&HK, &p, M, N, N, &mut hp);
        matrix::multiply(&hp, &ht, M, N, M, &mut hpht);
        matrix::add(&hpht, &self.rk, M, M, &mut s);

        let mut s_inv = [0.0f32; M * M];
        matrix::invert(&mut s, M, &mut s_inv);

        // K = P H' S^-1
        let mut pht = [0.0f32; N * M];
        let mut k = [0.0f32; N * M];
        matrix::multiply(&p, &ht, N, N, M, &mut pht);
        matrix::multiply(&pht, &s_inv, N, M, M, &mut k);

        // x += K (z - H x)
        let mut hx = [0.0f32; M];
        let mut innovation = [0.0f32; M];
        let mut correction = [0.0f32; N];
        matrix::multiply(&HK, &x, M, N, 1, &mut hx);
        matrix::subtract(&z, &hx, M, 1, &mut innovation);
        matrix::multiply(&k, &innovation, N, M, 1, &mut correction);
        let mut x_new = [0.0f32; N];
        matrix::add(&x, &correction, N, 1, &mut x_new);

        // P = (I - K H) P
        let mut kh = [0.0f32; N * N];
        let mut i_kh = [0.0f32; N * N];
        let mut p_new = [0.0f32; N * N];
        let identity = diagonal::<{ N * N }>(N, 1.0);
        matrix::multiply(&k, &HK, N, M, N, &mut kh);
        matrix::subtract(&identity, &kh, N, N, &mut i_kh);
        matrix::multiply(&i_kh, &p, N, N, N, &mut p_new);

        if !(matrix::all_finite(&s_inv) && matrix::all_finite(&x_new) && matrix::all_finite(&p_new)){
            self.degenerate_updates += 1;
            warn!("kalman: non-finite update rejected (dt={}, z={:?}), holding estimate", dt, z);
            return;
        }

        self.state = x_new;
        self.covar = p_new;
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rotation_identity_at_zero_heading(){
        let (n, e) = rotate_to_inertial(100.0, 200.0, 0.0);
        assert_abs_diff_eq!(n, 100.0);
        assert_abs_diff_eq!(e, 200.0);
    }

    #[test]
    fn test_rotation_quarter_turns(){
        //heading east: forward motion is east, starboard is south
        let (n, e) = rotate_to_inertial(100.0, 50.0, 90.0);
        assert_abs_diff_eq!(n, -50.0, epsilon = 1e-4);
        assert_abs_diff_eq!(e, 100.0, epsilon = 1e-4);

        let (n, e) = rotate_to_inertial(100.0, 0.0, 180.0);
        assert_abs_diff_eq!(n, -100.0, epsilon = 1e-4);
        assert_abs_diff_eq!(e, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_transition_matrix(){
        let f = transition(0.5);
        assert_eq!(f[X * N + VX], 0.5);
        assert_eq!(f[X * N + AX], 0.125);
        assert_eq!(f[VX * N + AX], 0.5);
        assert_eq!(f[Y * N + VY], 0.5);
        assert_eq!(f[VY * N + AY], 0.5);
        assert_eq!(f[X * N + Y], 0.0);
    }

    #[test]
    fn test_prediction_integrates_velocity(){
        //near-zero covariance and noisy measurement: prediction dominates
        let mut kf = KalmanEstimator::new(&KalmanConfig{
            initial_covariance: 0.0,
            process_noise: 0.0,
            measurement_noise: 1.0e6,
        });
        kf.state[VX] = 2.0;
        kf.state[AY] = 1.0;
        kf.step([2.0, 0.0], 1.0);
        assert_abs_diff_eq!(kf.state()[X], 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(kf.state()[Y], 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(kf.state()[VY], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_converges_to_constant_velocity(){
        let mut kf = KalmanEstimator::default();
        let record = DvlRecord{ velocity_forward: 100, velocity_starboard: 200, ..Default::default() };
        let attitude = Attitude::default();

        let mut t = 0u32;
        let mut last_trace = kf.trace();
        for _ in 0..10{
            t = kf.compute(&record, &attitude, t, t + 100_000);
            let trace = kf.trace();
            assert!(trace <= last_trace + 1e-3, "trace grew {} -> {}", last_trace, trace);
            last_trace = trace;
        }

        let (vx, vy) = kf.velocity();
        assert!((vx - 100.0).abs() < 5.0, "vx = {}", vx);
        assert!((vy - 200.0).abs() < 10.0, "vy = {}", vy);
        assert_eq!(t, 1_000_000);
    }

    #[test]
    fn test_covariance_stays_symmetric_with_nonnegative_diagonal(){
        let mut kf = KalmanEstimator::default();
        for i in 0..25{
            kf.step([10.0 * i as f32, -3.0], 0.02);
        }
        let p = kf.covariance();
        for r in 0..N{
            assert!(p[r * N + r] >= 0.0);
            for c in 0..N{
                assert_abs_diff_eq!(p[r * N + c], p[c * N + r], epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn test_timestamp_wraps(){
        let mut kf = KalmanEstimator::default();
        let start = u32::MAX - 49_999;
        let end = kf.compute(&DvlRecord::default(), &Attitude::default(), start, 50_000);
        assert_eq!(end, 50_000);
        assert!(kf.state().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_singular_innovation_is_rejected(){
        let mut kf = KalmanEstimator::new(&KalmanConfig{
            initial_covariance: 0.0,
            process_noise: 0.0,
            measurement_noise: 0.0,
        });
        kf.step([1.0, 1.0], 0.1);
        assert_eq!(kf.degenerate_updates(), 1);
        assert_eq!(kf.state(), &[0.0; N]);
        assert!(kf.covariance().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_reset(){
        let mut kf = KalmanEstimator::default();
        kf.step([50.0, 50.0], 0.1);
        kf.reset();
        assert_eq!(kf.state(), &[0.0; N]);
        assert_abs_diff_eq!(kf.trace(), 600.0);
    }
}
