use crate::control::{Attitude, NUM_MOTORS};
use crate::dvl::ParserStatsSnapshot;
use crate::navigator::Telemetry;

//message sizes
pub const ORIENTATION_MSG_SIZE: usize = 12; //3 * f32
pub const DEPTH_MSG_SIZE: usize = 4;        //1 * f32
pub const ALIVE_MSG_SIZE: usize = 1;        //1 * u8
pub const THRUST_PWM_SIZE: usize = 32;      //8 * i32
pub const TELEMETRY_MSG_SIZE: usize = 88;   //6 f32 + 8 f32 + 5 u32 + 3 f32

fn f32_at(data: &[u8], idx: usize) -> f32{
    let mut b = [0u8; 4];
    b.copy_from_slice(&data[idx * 4..idx * 4 + 4]);
    f32::from_le_bytes(b)
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OrientationMsg{
    pub roll: f32,        //degrees
    pub pitch: f32,
    pub yaw: f32,
}

impl OrientationMsg{
    pub fn from_bytes(data: &[u8]) -> Option<Self>{
        if data.len() < ORIENTATION_MSG_SIZE{
            return None;
        }
        Some(OrientationMsg{
            roll: f32_at(data, 0),
            pitch: f32_at(data, 1),
            yaw: f32_at(data, 2),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8>{
        let mut bytes = Vec::with_capacity(ORIENTATION_MSG_SIZE);
        for v in [self.roll, self.pitch, self.yaw]{
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    pub fn attitude(&self) -> Attitude{
        Attitude{ yaw: self.yaw, pitch: self.pitch, roll: self.roll }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DepthMsg{
    pub depth: f32,       //meters
}

impl DepthMsg{
    pub fn from_bytes(data: &[u8]) -> Option<Self>{
        if data.len() < DEPTH_MSG_SIZE{
            return None;
        }
        Some(DepthMsg{ depth: f32_at(data, 0) })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AliveMsg{
    pub alive: bool,
}

impl AliveMsg{
    pub fn from_bytes(data: &[u8]) -> Option<Self>{
        if data.len() < ALIVE_MSG_SIZE{
            return None;
        }
        Some(AliveMsg{ alive: data[0] != 0 })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThrusterPwmCmd{
    pub pwm: [i32; NUM_MOTORS],    //1100-1900 us, thruster order of the orientation matrix
}

impl ThrusterPwmCmd{
    pub fn new(pwm_values: [i32; NUM_MOTORS]) -> Self{
        ThrusterPwmCmd{ pwm: pwm_values }
    }

    pub fn to_bytes(&self) -> Vec<u8>{
        let mut bytes = Vec::with_capacity(THRUST_PWM_SIZE);
        for v in self.pwm{
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self>{
        if data.len() < THRUST_PWM_SIZE{
            return None;
        }
        let mut pwm = [0i32; NUM_MOTORS];
        for (i, v) in pwm.iter_mut().enumerate(){
            let mut b = [0u8; 4];
            b.copy_from_slice(&data[i * 4..i * 4 + 4]);
            *v = i32::from_le_bytes(b);
        }
        Some(ThrusterPwmCmd{ pwm })
    }
}

/// Status frame sent back to the board once per cycle
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TelemetryMsg{
    pub state: [f32; 6],           //X VX AX Y VY AY
    pub thrust: [f32; NUM_MOTORS],
    pub resyncs: u32,
    pub timeouts: u32,
    pub unknown_frames: u32,
    pub records: u32,
    pub degenerate_updates: u32,
    pub inertial_force: [f32; 3],
}

impl TelemetryMsg{
    pub fn with_stats(mut self, stats: &ParserStatsSnapshot) -> Self{
        self.resyncs = stats.resyncs as u32;
        self.timeouts = stats.timeouts as u32;
        self.unknown_frames = stats.unknown_frames as u32;
        self.records = stats.records as u32;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8>{
        let mut bytes = Vec::with_capacity(TELEMETRY_MSG_SIZE);
        for v in self.state.iter().chain(self.thrust.iter()){
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for v in [self.resyncs, self.timeouts, self.unknown_frames, self.records, self.degenerate_updates]{
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for v in self.inertial_force{
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }
}

impl From<&Telemetry> for TelemetryMsg{
    fn from(t: &Telemetry) -> Self{
        TelemetryMsg{
            state: t.estimate,
            thrust: t.thrust,
            degenerate_updates: t.degenerate_updates as u32,
            inertial_force: t.forces.inertial,
            ..Default::default()
        }
        .with_stats(&t.parser)
    }
}

#[cfg(test)]
mod tests{
    use super::*;

    #[test]
    fn test_thruster_pwm_cmd(){
        let cmd = ThrusterPwmCmd::new([1500, 1600, 1400, 1550, 1450, 1500, 1100, 1900]);
        let bytes = cmd.to_bytes();
        assert_eq!(bytes.len(), THRUST_PWM_SIZE);
        assert_eq!(&bytes[..4], &1500i32.to_le_bytes());

        let decoded = ThrusterPwmCmd::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.pwm[2], 1400);
        assert_eq!(decoded.pwm[7], 1900);
    }

    #[test]
    fn test_orientation_msg(){
        let msg = OrientationMsg{ roll: 1.5, pitch: -2.0, yaw: 270.0 };
        let decoded = OrientationMsg::from_bytes(&msg.to_bytes()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.attitude().yaw, 270.0);
        assert!(OrientationMsg::from_bytes(&[0u8; 11]).is_none());
    }

    #[test]
    fn test_alive_and_depth(){
        assert_eq!(AliveMsg::from_bytes(&[1]), Some(AliveMsg{ alive: true }));
        assert_eq!(AliveMsg::from_bytes(&[0]), Some(AliveMsg{ alive: false }));
        assert!(AliveMsg::from_bytes(&[]).is_none());
        assert_eq!(DepthMsg::from_bytes(&2.5f32.to_le_bytes()).unwrap().depth, 2.5);
    }

    #[test]
    fn test_telemetry_size(){
        let stats = ParserStatsSnapshot{ resyncs: 3, records: 9, ..Default::default() };
        let msg = TelemetryMsg::default().with_stats(&stats);
        let bytes = msg.to_bytes();
        assert_eq!(bytes.len(), TELEMETRY_MSG_SIZE);
        //resyncs follows the 14 floats
        assert_eq!(&bytes[56..60], &3u32.to_le_bytes());
    }

    #[test]
    fn test_telemetry_from_snapshot(){
        let mut t = Telemetry::default();
        t.estimate[1] = 12.5;
        t.thrust[7] = -0.25;
        t.degenerate_updates = 2;
        t.parser.timeouts = 4;
        let msg = TelemetryMsg::from(&t);
        assert_eq!(msg.state[1], 12.5);
        assert_eq!(msg.thrust[7], -0.25);
        assert_eq!(msg.degenerate_updates, 2);
        assert_eq!(msg.timeouts, 4);
    }
}
