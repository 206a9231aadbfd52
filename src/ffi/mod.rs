use std::ptr;
use crate::control::{Attitude, DofVector, ThrusterMixer, DOF, NUM_MOTORS};
use crate::dvl::{self, DvlParser, DvlReader, DvlRecord, ParserStatsSnapshot};
use crate::kalman::{KalmanEstimator, N};
use crate::config::{ControlConfig, KalmanConfig};

pub struct AuvDvlChannel{
    parser: DvlParser,
    reader: DvlReader,
}

pub struct AuvEstimator{
    inner: KalmanEstimator,
}

pub struct AuvMixer{
    inner: ThrusterMixer,
}

//dvl channel

#[no_mangle]
pub extern "C" fn auv_dvl_channel_new() -> *mut AuvDvlChannel{
    let (parser, reader) = dvl::channel();
    Box::into_raw(Box::new(AuvDvlChannel{ parser, reader }))
}

#[no_mangle]
pub unsafe extern "C" fn auv_dvl_channel_free(channel: *mut AuvDvlChannel){
    if !channel.is_null(){
        unsafe{ drop(Box::from_raw(channel)); }
    }
}

/// Feed raw serial bytes. Returns the number of sub-frames completed, -1 on null.
#[no_mangle]
pub unsafe extern "C" fn auv_dvl_feed(
    channel: *mut AuvDvlChannel,
    data: *const u8,
    len: usize,
) -> i32{
    if channel.is_null() || data.is_null(){
        return -1;
    }

    unsafe{
        let ch = &mut *channel;
        let slice = std::slice::from_raw_parts(data, len);
        ch.parser.feed_all(slice) as i32
    }
}

/// Swap in the newest record. 1 if it is new, 0 if not, -1 on null.
#[no_mangle]
pub unsafe extern "C" fn auv_dvl_update(channel: *mut AuvDvlChannel) -> i32{
    if channel.is_null(){
        return -1;
    }
    unsafe{
        let ch = &mut *channel;
        ch.reader.update() as i32
    }
}

#[no_mangle]
pub unsafe extern "C" fn auv_dvl_read_record(
    channel: *const AuvDvlChannel,
    out_record: *mut DvlRecord,
) -> i32{
    if channel.is_null() || out_record.is_null(){
        return -1;
    }
    unsafe{
        let ch = &*channel;
        *out_record = ch.reader.record();
    }
    0
}

#[no_mangle]
pub unsafe extern "C" fn auv_dvl_stats(
    channel: *const AuvDvlChannel,
    out_stats: *mut ParserStatsSnapshot,
) -> i32{
    if channel.is_null() || out_stats.is_null(){
        return -1;
    }
    unsafe{
        let ch = &*channel;
        *out_stats = ch.reader.stats();
    }
    0
}

//estimator

#[no_mangle]
pub extern "C" fn auv_estimator_new(
    initial_covariance: f32,
    process_noise: f32,
    measurement_noise: f32,
) -> *mut AuvEstimator{
    let config = KalmanConfig{ initial_covariance, process_noise, measurement_noise };
    Box::into_raw(Box::new(AuvEstimator{ inner: KalmanEstimator::new(&config) }))
}

#[no_mangle]
pub extern "C" fn auv_estimator_new_default() -> *mut AuvEstimator{
    Box::into_raw(Box::new(AuvEstimator{ inner: KalmanEstimator::default() }))
}

#[no_mangle]
pub unsafe extern "C" fn auv_estimator_free(estimator: *mut AuvEstimator){
    if !estimator.is_null(){
        unsafe{ drop(Box::from_raw(estimator)); }
    }
}

/// One filter cycle. Returns `now`, or `start` unchanged on null input.
#[no_mangle]
pub unsafe extern "C" fn auv_estimator_compute(
    estimator: *mut AuvEstimator,
    record: *const DvlRecord,
    yaw_deg: f32,
    start_us: u32,
    now_us: u32,
) -> u32{
    if estimator.is_null() || record.is_null(){
        return start_us;
    }
    unsafe{
        let est = &mut *estimator;
        let attitude = Attitude{ yaw: yaw_deg, ..Attitude::default() };
        est.inner.compute(&*record, &attitude, start_us, now_us)
    }
}

/// Copy the 6-element state `[X, VX, AX, Y, VY, AY]` into `out_state`.
#[no_mangle]
pub unsafe extern "C" fn auv_estimator_state(
    estimator: *const AuvEstimator,
    out_state: *mut f32,
) -> i32{
    if estimator.is_null() || out_state.is_null(){
        return -1;
    }
    unsafe{
        let est = &*estimator;
        ptr::copy_nonoverlapping(est.inner.state().as_ptr(), out_state, N);
    }
    0
}

#[no_mangle]
pub unsafe extern "C" fn auv_estimator_reset(estimator: *mut AuvEstimator){
    if estimator.is_null(){
        return;
    }
    unsafe{ (*estimator).inner.reset(); }
}

//mixer

#[no_mangle]
pub extern "C" fn auv_mixer_new() -> *mut AuvMixer{
    Box::into_raw(Box::new(AuvMixer{ inner: ThrusterMixer::new(&ControlConfig::default()) }))
}

#[no_mangle]
pub unsafe extern "C" fn auv_mixer_free(mixer: *mut AuvMixer){
    if !mixer.is_null(){
        unsafe{ drop(Box::from_raw(mixer)); }
    }
}

/// Run a 6-element F,H,V,Y,P,R error through the PIDs and mixer, writing
/// 8 clamped thruster commands to `out_thrust`.
#[no_mangle]
pub unsafe extern "C" fn auv_mixer_mix(
    mixer: *mut AuvMixer,
    error: *const f32,
    power: f32,
    dt: f32,
    out_thrust: *mut f32,
) -> i32{
    if mixer.is_null() || error.is_null() || out_thrust.is_null(){
        return -1;
    }

    unsafe{
        let m = &mut *mixer;
        let mut e = DofVector::ZERO;
        ptr::copy_nonoverlapping(error, e.0.as_mut_ptr(), DOF);
        let thrust = ThrusterMixer::to_command(&m.inner.mix(&e, power, dt));
        ptr::copy_nonoverlapping(thrust.as_ptr(), out_thrust, NUM_MOTORS);
    }
    0
}

#[no_mangle]
pub extern "C" fn auv_thrust_to_pwm(thrust: f32) -> i32{
    ThrusterMixer::thrust_to_pwm(thrust)
}

#[no_mangle]
pub unsafe extern "C" fn auv_mixer_reset(mixer: *mut AuvMixer){
    if mixer.is_null(){
        return;
    }
    unsafe{ (*mixer).inner.pids_mut().reset(); }
}
