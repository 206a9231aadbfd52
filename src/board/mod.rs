pub mod protocol;
pub use protocol::*;

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use log::{debug, info};
use serialport::SerialPort;

use crate::config::BoardConfig;
use crate::control::{Attitude, ThrusterMixer, NUM_MOTORS};
use crate::error::{NavError, Result};
use crate::navigator::{AttitudeSource, DepthSource, KillSwitch, Telemetry, ThrustSink};

pub const SYNC_BYTE: u8 = 0xAA;
pub const MAX_MSG_SIZE: usize = 244;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType{
    Depth = 0x02,
    Thrust = 0x03,
    Orientation = 0x05,
    Alive = 0x06,
    Telemetry = 0x07,
}

impl MsgType{
    pub fn from_u8(val: u8) -> Option<Self>{
        match val{
            0x02 => Some(MsgType::Depth),
            0x03 => Some(MsgType::Thrust),
            0x05 => Some(MsgType::Orientation),
            0x06 => Some(MsgType::Alive),
            0x07 => Some(MsgType::Telemetry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardFrame{
    pub msg_type: MsgType,
    pub payload: Vec<u8>,
}

pub fn checksum(data: &[u8]) -> u8{
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// `[SYNC][TYPE][LEN][PAYLOAD...][CHECKSUM]`, checksum over type, len and payload
pub fn encode_frame(msg_type: MsgType, payload: &[u8]) -> Result<Vec<u8>>{
    if payload.len() > MAX_MSG_SIZE{
        return Err(NavError::InvalidFrame(format!("payload of {} bytes", payload.len())));
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.push(SYNC_BYTE);
    frame.push(msg_type as u8);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame[1..]));
    Ok(frame)
}

/// Reassembles frames from an arbitrary byte stream
#[derive(Debug, Default)]
pub struct FrameDecoder{
    rx_buffer: Vec<u8>,
    dropped: u64,
}

impl FrameDecoder{
    pub fn new() -> Self{
        FrameDecoder{ rx_buffer: Vec::with_capacity(512), dropped: 0 }
    }

    pub fn push(&mut self, bytes: &[u8]){
        self.rx_buffer.extend_from_slice(bytes);
    }

    /// Bytes discarded while hunting for a valid frame
    pub fn dropped(&self) -> u64{
        self.dropped
    }

    pub fn buffered(&self) -> usize{
        self.rx_buffer.len()
    }

    pub fn next_frame(&mut self) -> Option<BoardFrame>{
        loop{
            //find sync byte
            let sync_pos = match self.rx_buffer.iter().position(|&b| b == SYNC_BYTE){
                Some(pos) => pos,
                None =>{
                    self.dropped += self.rx_buffer.len() as u64;
                    self.rx_buffer.clear();
                    return None;
                }
            };
            if sync_pos > 0{
                self.dropped += sync_pos as u64;
                self.rx_buffer.drain(0..sync_pos);
            }

            if self.rx_buffer.len() < 4{
                return None;
            }

            let len = self.rx_buffer[2] as usize;
            if len > MAX_MSG_SIZE{
                self.drop_one();
                continue;
            }

            let frame_len = 4 + len; //sync + type + len + payload + checksum
            if self.rx_buffer.len() < frame_len{
                return None;
            }

            let expected = self.rx_buffer[3 + len];
            if expected != checksum(&self.rx_buffer[1..3 + len]){
                debug!("[BOARD] Checksum mismatch, resyncing");
                self.drop_one();
                continue;
            }

            let msg_type = MsgType::from_u8(self.rx_buffer[1]);
            let payload = self.rx_buffer[3..3 + len].to_vec();
            self.rx_buffer.drain(0..frame_len);

            match msg_type{
                Some(msg_type) => return Some(BoardFrame{ msg_type, payload }),
                //well formed but not ours
                None => continue,
            }
        }
    }

    fn drop_one(&mut self){
        self.rx_buffer.remove(0);
        self.dropped += 1;
    }
}

/// Serial link to the I/O board: sensors in, thruster PWM and telemetry out.
///
/// Holds the most recent value of every inbound message, so the navigator
/// can sample it through the accessor traits at its own rate.
pub struct BoardLink<P: Read + Write>{
    port: P,
    decoder: FrameDecoder,
    attitude: Attitude,
    depth: f32,
    alive: bool,
    frames: u64,
    read_buf: [u8; 256],
}

impl BoardLink<Box<dyn SerialPort>>{
    pub fn open(config: &BoardConfig) -> Result<Self>{
        info!("[BOARD] Opening port {} at {} baud...", config.port, config.baud);
        let port = serialport::new(&config.port, config.baud)
            .timeout(Duration::from_millis(10))
            .open()?;
        Ok(BoardLink::new(port))
    }
}

impl<P: Read + Write> BoardLink<P>{
    pub fn new(port: P) -> Self{
        BoardLink{
            port,
            decoder: FrameDecoder::new(),
            attitude: Attitude::default(),
            depth: 0.0,
            alive: false,
            frames: 0,
            read_buf: [0u8; 256],
        }
    }

    pub fn port_mut(&mut self) -> &mut P{
        &mut self.port
    }

    pub fn frames(&self) -> u64{
        self.frames
    }

    pub fn decoder(&self) -> &FrameDecoder{
        &self.decoder
    }

    /// Drain whatever the port has and apply complete frames.
    /// Returns the number of frames applied.
    pub fn poll(&mut self) -> Result<usize>{
        loop{
            match self.port.read(&mut self.read_buf){
                Ok(0) => return Err(NavError::PortClosed),
                Ok(n) =>{
                    self.decoder.push(&self.read_buf[..n]);
                    if n < self.read_buf.len(){
                        break;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }

        let mut applied = 0;
        while let Some(frame) = self.decoder.next_frame(){
            self.apply(&frame);
            applied += 1;
        }
        Ok(applied)
    }

    pub fn apply(&mut self, frame: &BoardFrame){
        match frame.msg_type{
            MsgType::Orientation =>{
                if let Some(msg) = OrientationMsg::from_bytes(&frame.payload){
                    self.attitude = msg.attitude();
                }
            }
            MsgType::Depth =>{
                if let Some(msg) = DepthMsg::from_bytes(&frame.payload){
                    self.depth = msg.depth;
                }
            }
            MsgType::Alive =>{
                if let Some(msg) = AliveMsg::from_bytes(&frame.payload){
                    self.alive = msg.alive;
                }
            }
            //outbound only
            MsgType::Thrust | MsgType::Telemetry => return,
        }
        self.frames += 1;
    }

    pub fn send_frame(&mut self, msg_type: MsgType, payload: &[u8]) -> Result<()>{
        let frame = encode_frame(msg_type, payload)?;
        self.port.write_all(&frame)?;
        self.port.flush()?;
        Ok(())
    }

    pub fn send_thrust(&mut self, pwm: [i32; NUM_MOTORS]) -> Result<()>{
        self.send_frame(MsgType::Thrust, &ThrusterPwmCmd::new(pwm).to_bytes())
    }

    pub fn send_telemetry(&mut self, telemetry: &Telemetry) -> Result<()>{
        let msg = TelemetryMsg::from(telemetry);
        self.send_frame(MsgType::Telemetry, &msg.to_bytes())
    }
}

impl<P: Read + Write> AttitudeSource for BoardLink<P>{
    fn attitude(&self) -> Attitude{
        self.attitude
    }
}

impl<P: Read + Write> DepthSource for BoardLink<P>{
    fn depth(&self) -> f32{
        self.depth
    }
}

impl<P: Read + Write> KillSwitch for BoardLink<P>{
    fn alive(&self) -> bool{
        self.alive
    }
}

impl<P: Read + Write> ThrustSink for BoardLink<P>{
    fn write_thrust(&mut self, thrust: &[f32; NUM_MOTORS]) -> Result<()>{
        self.send_thrust(ThrusterMixer::to_pwm(thrust))
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use std::collections::VecDeque;

    struct MockPort{
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl Read for MockPort{
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>{
            if self.rx.is_empty(){
                return Err(std::io::Error::new(ErrorKind::TimedOut, "timeout"));
            }
            let n = buf.len().min(self.rx.len());
            for slot in buf.iter_mut().take(n){
                *slot = self.rx.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MockPort{
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>{
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()>{
            Ok(())
        }
    }

    fn link_with(rx: &[u8]) -> BoardLink<MockPort>{
        BoardLink::new(MockPort{ rx: rx.iter().copied().collect(), tx: Vec::new() })
    }

    #[test]
    fn test_msg_type_conversion(){
        assert_eq!(MsgType::from_u8(0x05), Some(MsgType::Orientation));
        assert_eq!(MsgType::from_u8(0x02), Some(MsgType::Depth));
        assert_eq!(MsgType::from_u8(0x01), None);
        assert_eq!(MsgType::from_u8(0xFF), None);
    }

    #[test]
    fn test_checksum(){
        let data = [0x01, 0x05, 0xAB, 0xCD];
        assert_eq!(checksum(&data), 0x01u8.wrapping_add(0x05).wrapping_add(0xAB).wrapping_add(0xCD));
    }

    #[test]
    fn test_encode_frame_layout(){
        let frame = encode_frame(MsgType::Alive, &[1]).unwrap();
        assert_eq!(frame, vec![SYNC_BYTE, 0x06, 1, 1, 0x08]);
        assert!(encode_frame(MsgType::Telemetry, &[0u8; MAX_MSG_SIZE + 1]).is_err());
    }

    #[test]
    fn test_decoder_resyncs_after_garbage(){
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0x00, 0x13, SYNC_BYTE, 0x06, 0x01]); //truncated alive frame
        decoder.push(&encode_frame(MsgType::Depth, &1.5f32.to_le_bytes()).unwrap());

        //the first sync's "checksum" slot is really the next frame's sync byte
        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.msg_type, MsgType::Depth);
        assert_eq!(frame.payload, 1.5f32.to_le_bytes().to_vec());
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.buffered(), 0);
        assert!(decoder.dropped() >= 5);
    }

    #[test]
    fn test_decoder_waits_for_partial_frame(){
        let bytes = encode_frame(MsgType::Alive, &[1]).unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes[..3]);
        assert!(decoder.next_frame().is_none());
        decoder.push(&bytes[3..]);
        assert_eq!(decoder.next_frame().unwrap().payload, vec![1]);
    }

    #[test]
    fn test_decoder_skips_unknown_types(){
        let mut bytes = vec![SYNC_BYTE, 0x42, 1, 9];
        bytes.push(checksum(&bytes[1..]));
        bytes.extend(encode_frame(MsgType::Alive, &[0]).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.msg_type, MsgType::Alive);
    }

    #[test]
    fn test_poll_updates_accessors(){
        let mut rx = Vec::new();
        let orientation = OrientationMsg{ roll: 1.0, pitch: 2.0, yaw: 45.0 };
        rx.extend(encode_frame(MsgType::Orientation, &orientation.to_bytes()).unwrap());
        rx.extend(encode_frame(MsgType::Depth, &3.25f32.to_le_bytes()).unwrap());
        rx.extend(encode_frame(MsgType::Alive, &[1]).unwrap());

        let mut link = link_with(&rx);
        assert!(!link.alive());
        assert_eq!(link.poll().unwrap(), 3);
        assert_eq!(link.attitude(), Attitude{ yaw: 45.0, pitch: 2.0, roll: 1.0 });
        assert_eq!(link.depth(), 3.25);
        assert!(link.alive());
        assert_eq!(link.frames(), 3);
        assert_eq!(link.poll().unwrap(), 0);
    }

    #[test]
    fn test_write_thrust_sends_pwm_frame(){
        let mut link = link_with(&[]);
        let mut thrust = [0.0f32; NUM_MOTORS];
        thrust[0] = 1.0;
        thrust[7] = -1.0;
        link.write_thrust(&thrust).unwrap();

        let tx = link.port_mut().tx.clone();
        let mut decoder = FrameDecoder::new();
        decoder.push(&tx);
        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.msg_type, MsgType::Thrust);

        let cmd = ThrusterPwmCmd::from_bytes(&frame.payload).unwrap();
        assert_eq!(cmd.pwm[0], 1900);
        assert_eq!(cmd.pwm[3], 1500);
        assert_eq!(cmd.pwm[7], 1100);
    }

    #[test]
    fn test_send_telemetry(){
        let mut link = link_with(&[]);
        link.send_telemetry(&Telemetry::default()).unwrap();
        let tx = &link.port_mut().tx;
        assert_eq!(tx[1], MsgType::Telemetry as u8);
        assert_eq!(tx[2] as usize, TELEMETRY_MSG_SIZE);
    }

    struct ClosedPort;

    impl Read for ClosedPort{
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize>{
            Ok(0)
        }
    }

    impl Write for ClosedPort{
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>{
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()>{
            Ok(())
        }
    }

    #[test]
    fn test_poll_reports_closed_port(){
        let mut link = BoardLink::new(ClosedPort);
        assert!(matches!(link.poll(), Err(NavError::PortClosed)));
    }
}
