use pyo3::prelude::*;
use pyo3::exceptions::PyValueError;
use std::collections::HashMap;
use crate::config::{ControlConfig, KalmanConfig};
use crate::control::{Attitude, DofVector, ThrusterMixer, DOF, NUM_MOTORS};
use crate::dvl::{self, DvlReader, DvlRecord};
use crate::kalman::KalmanEstimator;

/// Parser plus the reader side of its hand-off, for replaying captured
/// DVL byte streams.
#[pyclass(name = "DvlParser")]
pub struct PyDvlParser{
    parser: dvl::DvlParser,
    reader: DvlReader,
}

#[pymethods]
impl PyDvlParser{
    #[new]
    fn new() -> Self{
        let (parser, reader) = dvl::channel();
        PyDvlParser{ parser, reader }
    }

    /// Returns the number of sub-frame boundaries seen
    fn feed(&mut self, data: &[u8]) -> usize{
        self.parser.feed_all(data)
    }

    fn update(&mut self) -> bool{
        self.reader.update()
    }

    /// (starboard, forward, upward, range) of the newest record
    fn record(&mut self) -> (i32, i32, i32, i32){
        self.reader.update();
        let r = self.reader.record();
        (r.velocity_starboard, r.velocity_forward, r.velocity_upward, r.range_to_bottom)
    }

    fn state(&self) -> String{
        format!("{:?}", self.parser.state())
    }

    fn stats(&self) -> HashMap<&'static str, u64>{
        let s = self.reader.stats();
        HashMap::from([
            ("datagrams", s.datagrams),
            ("resyncs", s.resyncs),
            ("timeouts", s.timeouts),
            ("exhausted", s.exhausted),
            ("unknown_frames", s.unknown_frames),
            ("records", s.records),
        ])
    }
}

#[pyclass(name = "Estimator")]
pub struct PyEstimator{
    inner: KalmanEstimator,
}

#[pymethods]
impl PyEstimator{
    #[new]
    #[pyo3(signature = (initial_covariance=100.0, process_noise=0.005, measurement_noise=5.0))]
    fn new(initial_covariance: f32, process_noise: f32, measurement_noise: f32) -> Self{
        let config = KalmanConfig{ initial_covariance, process_noise, measurement_noise };
        PyEstimator{ inner: KalmanEstimator::new(&config) }
    }

    /// One cycle from raw DVL forward/starboard velocity. Returns `now`.
    fn compute(&mut self, forward: i32, starboard: i32, yaw: f32, start: u32, now: u32) -> u32{
        let record = DvlRecord{
            velocity_forward: forward,
            velocity_starboard: starboard,
            ..Default::default()
        };
        let attitude = Attitude{ yaw, ..Attitude::default() };
        self.inner.compute(&record, &attitude, start, now)
    }

    fn state(&self) -> Vec<f32>{
        self.inner.state().to_vec()
    }

    fn trace(&self) -> f32{
        self.inner.trace()
    }

    fn degenerate_updates(&self) -> u64{
        self.inner.degenerate_updates()
    }

    fn reset(&mut self){
        self.inner.reset();
    }
}

#[pyclass(name = "Mixer")]
pub struct PyMixer{
    inner: ThrusterMixer,
}

#[pymethods]
impl PyMixer{
    #[new]
    fn new() -> Self{
        PyMixer{ inner: ThrusterMixer::new(&ControlConfig::default()) }
    }

    /// Clamped thruster commands for an F,H,V,Y,P,R error vector
    fn mix(&mut self, error: Vec<f32>, power: f32, dt: f32) -> PyResult<Vec<f32>>{
        if error.len() != DOF{
            return Err(PyValueError::new_err(
                format!("Expected {} errors, got {}", DOF, error.len())
            ));
        }
        let mut e = DofVector::ZERO;
        e.0.copy_from_slice(&error);
        let thrust = ThrusterMixer::to_command(&self.inner.mix(&e, power, dt));
        Ok(thrust.to_vec())
    }

    fn to_pwm(&self, thrust: Vec<f32>) -> PyResult<Vec<i32>>{
        let arr: [f32; NUM_MOTORS] = thrust.try_into().map_err(|v: Vec<f32>|{
            PyValueError::new_err(format!("Expected {} thrusts, got {}", NUM_MOTORS, v.len()))
        })?;
        Ok(ThrusterMixer::to_pwm(&arr).to_vec())
    }

    fn reset(&mut self){
        self.inner.pids_mut().reset();
    }
}

#[pymodule]
fn auv_nav(_py: Python, m: &PyModule) -> PyResult<()>{
    m.add_class::<PyDvlParser>()?;
    m.add_class::<PyEstimator>()?;
    m.add_class::<PyMixer>()?;
    Ok(())
}

#[cfg(test)]
mod tests{
    use super::*;
    use crate::dvl::DatagramBuilder;

    #[test]
    fn test_py_parser_record(){
        let mut parser = PyDvlParser::new();
        let bytes = DatagramBuilder::new().velocity(1, 2, 3).range(4).build();
        assert_eq!(parser.feed(&bytes), 2);
        assert_eq!(parser.record(), (1, 2, 3, 4));
        assert_eq!(parser.stats()["records"], 1);
        assert_eq!(parser.state(), "Sync");
    }

    #[test]
    fn test_py_estimator(){
        let mut est = PyEstimator::new(100.0, 0.005, 5.0);
        let mut t = 0;
        for i in 1..=10u32{
            t = est.compute(100, 200, 0.0, t, i * 100_000);
        }
        let state = est.state();
        assert!((state[1] - 100.0).abs() < 5.0);
        est.reset();
        assert_eq!(est.state(), vec![0.0; 6]);
    }

    #[test]
    fn test_py_mixer(){
        let mut mixer = PyMixer::new();
        assert!(mixer.mix(vec![0.0; 3], 0.5, 0.1).is_err());
        let thrust = mixer.mix(vec![0.0; DOF], 0.5, 0.1).unwrap();
        assert_eq!(thrust.len(), NUM_MOTORS);
        assert_eq!(mixer.to_pwm(vec![0.0; NUM_MOTORS]).unwrap(), vec![1500; NUM_MOTORS]);
        assert!(mixer.to_pwm(vec![0.0; 2]).is_err());
    }
}
