use std::sync::Arc;
use log::{debug, trace};

use crate::tripbuf::TripleWriter;
use super::{DvlRecord, ParserStats};

pub const DATAGRAM_ID: u8 = 0x7F;
pub const HEADER_ID: u8 = 0x7F;
pub const VELOCITY_FRAME_ID: u16 = 0x0358;
pub const RANGE_FRAME_ID: u16 = 0x0458;

//offsets kept per datagram, later sub-frames are ignored
pub const MAX_FRAME_OFFSETS: usize = 4;
//bytes counted in WAIT before the datagram is abandoned
pub const WAIT_TIMEOUT_BYTES: u16 = 1000;
//sync + header id + 2 size bytes + spare + frame count
pub const HEADER_BYTES: u16 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState{
    Sync,
    DataId,
    SizeByte1,
    SizeByte2,
    Spare,
    FrameCount,
    FrameOffsetLoop,
    Wait,
    FrameIdByte2,
    VelocityDataSb,
    VelocityDataFw,
    VelocityDataUp,
    RangeData,
}

//bounded ordered list of sub-frame byte offsets
#[derive(Debug, Clone, Copy, Default)]
struct OffsetTable{
    offsets: [u16; MAX_FRAME_OFFSETS],
    len: usize,
}

impl OffsetTable{
    fn clear(&mut self){
        self.offsets = [0; MAX_FRAME_OFFSETS];
        self.len = 0;
    }

    fn set_low(&mut self, idx: usize, c: u8){
        self.offsets[idx] = c as u16;
        self.len = self.len.max(idx + 1);
    }

    fn set_high(&mut self, idx: usize, c: u8){
        self.offsets[idx] |= (c as u16) << 8;
    }

    fn get(&self, idx: usize) -> Option<u16>{
        if idx < self.len{
            Some(self.offsets[idx])
        }else{
            None
        }
    }
}

/// DVL datagram decoder.
///
/// Feed it one byte at a time from the serial receive path. A completed
/// datagram (one ending in a range sub-frame) is published to the reader
/// side of the triple buffer. Malformed input never surfaces as an error:
/// the decoder drops back to `Sync` and the event is counted in the stats.
pub struct DvlParser{
    rx_state: RxState,
    datagram_bytecount: u16,
    num_data_types: u8,
    //offsets actually read, min(num_data_types, MAX_FRAME_OFFSETS)
    offsets_expected: usize,
    offsets: OffsetTable,
    offset_loop_idx: usize,
    rx_wait_bytecount: u16,
    offset_wait_idx: usize,
    frame_id: u16,
    field_byte_idx: u8,
    field: u32,
    //fields accumulate here and persist across datagrams
    pending: DvlRecord,
    writer: TripleWriter<DvlRecord>,
    stats: Arc<ParserStats>,
}

impl DvlParser{
    pub fn new(writer: TripleWriter<DvlRecord>, stats: Arc<ParserStats>) -> Self{
        DvlParser{
            rx_state: RxState::Sync,
            datagram_bytecount: 0,
            num_data_types: 0,
            offsets_expected: 0,
            offsets: OffsetTable::default(),
            offset_loop_idx: 0,
            rx_wait_bytecount: 0,
            offset_wait_idx: 0,
            frame_id: 0,
            field_byte_idx: 0,
            field: 0,
            pending: DvlRecord::default(),
            writer,
            stats,
        }
    }

    pub fn state(&self) -> RxState{
        self.rx_state
    }

    //declared datagram size of the datagram in progress
    pub fn datagram_bytecount(&self) -> u16{
        self.datagram_bytecount
    }

    pub fn stats(&self) -> &Arc<ParserStats>{
        &self.stats
    }

    /// Drop any partially decoded datagram and wait for the next sync byte.
    pub fn reset(&mut self){
        self.rx_state = RxState::Sync;
        self.datagram_bytecount = 0;
        self.num_data_types = 0;
        self.offsets_expected = 0;
        self.offsets.clear();
        self.offset_loop_idx = 0;
        self.rx_wait_bytecount = 0;
        self.offset_wait_idx = 0;
        self.frame_id = 0;
        self.field_byte_idx = 0;
        self.field = 0;
    }

    //accumulate a little-endian 32 bit field, Some(value) on the 4th byte
    fn take_field_byte(&mut self, c: u8) -> Option<i32>{
        self.field |= (c as u32) << (8 * self.field_byte_idx as u32);
        self.field_byte_idx += 1;
        if self.field_byte_idx < 4{
            return None;
        }
        let value = self.field as i32;
        self.field = 0;
        self.field_byte_idx = 0;
        self.rx_wait_bytecount = self.rx_wait_bytecount.wrapping_add(4);
        Some(value)
    }

    /// Consume one byte. Returns true when a sub-frame boundary was just
    /// completed (a frame id resolved to range/unknown, or a range frame
    /// finished and was published).
    pub fn feed(&mut self, c: u8) -> bool{
        match self.rx_state{
            RxState::Sync =>{
                if c == DATAGRAM_ID{
                    self.rx_state = RxState::DataId;
                }
                false
            }
            RxState::DataId =>{
                if c == HEADER_ID{
                    self.rx_state = RxState::SizeByte1;
                    ParserStats::bump(&self.stats.datagrams);
                }else{
                    trace!("dvl: bad header id {:#04x}, resync", c);
                    ParserStats::bump(&self.stats.resyncs);
                    self.rx_state = RxState::Sync;
                }
                false
            }
            RxState::SizeByte1 =>{
                self.datagram_bytecount = c as u16;
                self.rx_state = RxState::SizeByte2;
                false
            }
            RxState::SizeByte2 =>{
                self.datagram_bytecount |= (c as u16) << 8;
                self.rx_state = RxState::Spare;
                false
            }
            RxState::Spare =>{
                self.rx_state = RxState::FrameCount;
                false
            }
            RxState::FrameCount =>{
                self.num_data_types = c;
                self.offsets_expected = (c as usize).min(MAX_FRAME_OFFSETS);
                self.offset_loop_idx = 0;
                if self.offsets_expected == 0{
                    self.rx_wait_bytecount = HEADER_BYTES;
                    self.rx_state = RxState::Wait;
                }else{
                    self.rx_state = RxState::FrameOffsetLoop;
                }
                false
            }
            RxState::FrameOffsetLoop =>{
                let idx = self.offset_loop_idx / 2;
                if self.offset_loop_idx % 2 == 0{
                    self.offsets.set_low(idx, c);
                }else{
                    self.offsets.set_high(idx, c);
                }

                if self.offset_loop_idx == self.offsets_expected * 2 - 1{
                    self.rx_state = RxState::Wait;
                    self.rx_wait_bytecount = HEADER_BYTES + 2 * self.offsets_expected as u16;
                    return false;
                }
                self.offset_loop_idx += 1;
                false
            }
            RxState::Wait =>{
                if self.offset_wait_idx >= self.offsets_expected{
                    ParserStats::bump(&self.stats.exhausted);
                    self.reset();
                    return false;
                }
                if self.rx_wait_bytecount > WAIT_TIMEOUT_BYTES{
                    debug!("dvl: no sub-frame within {} bytes, resync", WAIT_TIMEOUT_BYTES);
                    ParserStats::bump(&self.stats.timeouts);
                    self.reset();
                    return false;
                }
                if Some(self.rx_wait_bytecount) == self.offsets.get(self.offset_wait_idx){
                    self.frame_id = (c as u16) << 8;
                    self.rx_state = RxState::FrameIdByte2;
                    self.offset_wait_idx += 1;
                }
                self.rx_wait_bytecount = self.rx_wait_bytecount.wrapping_add(1);
                false
            }
            RxState::FrameIdByte2 =>{
                self.frame_id |= c as u16;
                self.rx_wait_bytecount = self.rx_wait_bytecount.wrapping_add(1);
                self.field = 0;
                self.field_byte_idx = 0;
                match self.frame_id{
                    VELOCITY_FRAME_ID =>{
                        self.rx_state = RxState::VelocityDataSb;
                        false
                    }
                    RANGE_FRAME_ID =>{
                        self.rx_state = RxState::RangeData;
                        true
                    }
                    other =>{
                        trace!("dvl: skipping frame {:#06x}", other);
                        ParserStats::bump(&self.stats.unknown_frames);
                        self.rx_state = RxState::Wait;
                        true
                    }
                }
            }
            RxState::VelocityDataSb =>{
                if let Some(v) = self.take_field_byte(c){
                    self.pending.velocity_starboard = v;
                    self.rx_state = RxState::VelocityDataFw;
                }
                false
            }
            RxState::VelocityDataFw =>{
                if let Some(v) = self.take_field_byte(c){
                    self.pending.velocity_forward = v;
                    self.rx_state = RxState::VelocityDataUp;
                }
                false
            }
            RxState::VelocityDataUp =>{
                if let Some(v) = self.take_field_byte(c){
                    self.pending.velocity_upward = v;
                    self.rx_state = RxState::Wait;
                }
                false
            }
            RxState::RangeData =>{
                match self.take_field_byte(c){
                    Some(v) =>{
                        self.pending.range_to_bottom = v;
                        self.writer.publish(self.pending);
                        ParserStats::bump(&self.stats.records);
                        self.reset();
                        true
                    }
                    None => false,
                }
            }
        }
    }

    //feed a whole buffer, return the number of sub-frame boundaries seen
    pub fn feed_all(&mut self, bytes: &[u8]) -> usize{
        bytes.iter().filter(|&&b| self.feed(b)).count()
    }
}

/// Builds well-formed datagrams in the same wire format the decoder reads.
/// Used by the simulator path and by tests.
#[derive(Debug, Clone, Default)]
pub struct DatagramBuilder{
    frames: Vec<Vec<u8>>,
}

impl DatagramBuilder{
    pub fn new() -> Self{
        DatagramBuilder{ frames: Vec::new() }
    }

    //arbitrary sub-frame, id is written high byte first
    pub fn frame(mut self, id: u16, payload: &[u8]) -> Self{
        let mut frame = Vec::with_capacity(2 + payload.len());
        frame.push((id >> 8) as u8);
        frame.push(id as u8);
        frame.extend_from_slice(payload);
        self.frames.push(frame);
        self
    }

    pub fn velocity(self, starboard: i32, forward: i32, upward: i32) -> Self{
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&starboard.to_le_bytes());
        payload.extend_from_slice(&forward.to_le_bytes());
        payload.extend_from_slice(&upward.to_le_bytes());
        self.frame(VELOCITY_FRAME_ID, &payload)
    }

    pub fn range(self, range_to_bottom: i32) -> Self{
        self.frame(RANGE_FRAME_ID, &range_to_bottom.to_le_bytes())
    }

    pub fn build(&self) -> Vec<u8>{
        let count = self.frames.len();
        let mut offset = HEADER_BYTES as usize + 2 * count;
        let total = offset + self.frames.iter().map(|f| f.len()).sum::<usize>();

        let mut out = Vec::with_capacity(total);
        out.push(DATAGRAM_ID);
        out.push(HEADER_ID);
        out.extend_from_slice(&(total as u16).to_le_bytes());
        out.push(0); //spare
        out.push(count as u8);
        for f in &self.frames{
            out.extend_from_slice(&(offset as u16).to_le_bytes());
            offset += f.len();
        }
        for f in &self.frames{
            out.extend_from_slice(f);
        }
        out
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use crate::dvl::channel;

    #[test]
    fn test_velocity_and_range_round_trip(){
        let (mut parser, mut reader) = channel();
        let bytes = DatagramBuilder::new()
            .velocity(200, 100, -7)
            .range(-123_456)
            .build();

        let boundaries = parser.feed_all(&bytes);
        assert_eq!(parser.state(), RxState::Sync);
        //range id + range completion
        assert_eq!(boundaries, 2);

        assert!(reader.update());
        let rec = reader.record();
        assert_eq!(rec.velocity_starboard, 200);
        assert_eq!(rec.velocity_forward, 100);
        assert_eq!(rec.velocity_upward, -7);
        assert_eq!(rec.range_to_bottom, -123_456);
        assert_eq!(reader.stats().records, 1);
        assert!(!reader.update());
    }

    #[test]
    fn test_header_fields(){
        let (mut parser, _reader) = channel();
        let bytes = DatagramBuilder::new().velocity(1, 2, 3).range(4).build();
        //stop right after the size bytes
        for &b in &bytes[..4]{
            parser.feed(b);
        }
        assert_eq!(parser.state(), RxState::Spare);
        assert_eq!(parser.datagram_bytecount() as usize, bytes.len());
    }

    #[test]
    fn test_four_frames_with_unknown_skipped(){
        let (mut parser, mut reader) = channel();
        let bytes = DatagramBuilder::new()
            .frame(0x0000, &[9; 10])
            .velocity(11, 22, 33)
            .frame(0x0100, &[0xFF; 6])
            .range(44)
            .build();

        parser.feed_all(&bytes);
        assert_eq!(parser.state(), RxState::Sync);
        assert!(reader.update());
        assert_eq!(reader.record(), DvlRecord{
            velocity_starboard: 11,
            velocity_forward: 22,
            velocity_upward: 33,
            range_to_bottom: 44,
        });
        assert_eq!(reader.stats().unknown_frames, 2);
    }

    #[test]
    fn test_frames_past_cap_are_ignored(){
        let (mut parser, mut reader) = channel();
        let bytes = DatagramBuilder::new()
            .frame(0x0000, &[0; 4])
            .frame(0x0001, &[0; 4])
            .frame(0x0002, &[0; 4])
            .frame(0x0003, &[0; 4])
            .range(99)
            .build();

        parser.feed_all(&bytes);
        //range was the 5th frame, never reached
        assert!(!reader.update());
        //the next sync byte starts over cleanly
        let good = DatagramBuilder::new().velocity(1, 2, 3).range(4).build();
        parser.feed_all(&good);
        assert!(reader.update());
        assert_eq!(reader.range_to_bottom(), 4);
    }

    #[test]
    fn test_bad_header_resyncs(){
        let (mut parser, _reader) = channel();
        parser.feed(DATAGRAM_ID);
        assert_eq!(parser.state(), RxState::DataId);
        parser.feed(0x00);
        assert_eq!(parser.state(), RxState::Sync);
        assert_eq!(parser.stats().snapshot().resyncs, 1);
    }

    #[test]
    fn test_garbage_never_leaves_sync(){
        let (mut parser, _reader) = channel();
        for b in 0u8..=0x7E{
            parser.feed(b);
            assert_eq!(parser.state(), RxState::Sync);
        }
    }

    #[test]
    fn test_truncated_datagram_recovers(){
        let (mut parser, mut reader) = channel();
        let bytes = DatagramBuilder::new().velocity(1, 2, 3).range(4).build();
        //cut mid velocity frame, then send line noise that never syncs
        parser.feed_all(&bytes[..14]);
        assert_ne!(parser.state(), RxState::Sync);

        let mut steps = 0;
        while parser.state() != RxState::Sync{
            parser.feed(0x00);
            steps += 1;
            assert!(steps <= WAIT_TIMEOUT_BYTES as usize + 16, "parser stuck in {:?}", parser.state());
        }
        assert!(!reader.update());
    }

    #[test]
    fn test_unreachable_offset_times_out(){
        let (mut parser, _reader) = channel();
        //one frame declared at an offset the stream never reaches
        let header = [DATAGRAM_ID, HEADER_ID, 0x10, 0x00, 0x00, 0x01, 0xFF, 0x7F];
        parser.feed_all(&header);
        assert_eq!(parser.state(), RxState::Wait);

        let mut steps = 0;
        while parser.state() != RxState::Sync{
            parser.feed(0xAB);
            steps += 1;
        }
        assert!(steps as u16 <= WAIT_TIMEOUT_BYTES);
        assert_eq!(parser.stats().snapshot().timeouts, 1);
    }

    #[test]
    fn test_zero_frame_count_resets(){
        let (mut parser, _reader) = channel();
        parser.feed_all(&[DATAGRAM_ID, HEADER_ID, 0x06, 0x00, 0x00, 0x00]);
        assert_eq!(parser.state(), RxState::Wait);
        parser.feed(0x00);
        assert_eq!(parser.state(), RxState::Sync);
        assert_eq!(parser.stats().snapshot().exhausted, 1);
    }

    #[test]
    fn test_velocity_only_datagram_is_not_published(){
        let (mut parser, mut reader) = channel();
        let bytes = DatagramBuilder::new().velocity(5, 6, 7).build();
        parser.feed_all(&bytes);
        //needs one more byte to notice the datagram is exhausted
        parser.feed(0x00);
        assert_eq!(parser.state(), RxState::Sync);
        assert!(!reader.update());

        //velocity carries over into the next range-only datagram
        let range = DatagramBuilder::new().range(800).build();
        parser.feed_all(&range);
        assert!(reader.update());
        assert_eq!(reader.forward_velocity(), 6);
        assert_eq!(reader.range_to_bottom(), 800);
    }

    #[test]
    fn test_back_to_back_datagrams(){
        let (mut parser, mut reader) = channel();
        let mut stream = Vec::new();
        for i in 0..5{
            stream.extend(DatagramBuilder::new().velocity(i, i * 10, 0).range(1000 + i).build());
        }
        parser.feed_all(&stream);
        assert!(reader.update());
        assert_eq!(reader.forward_velocity(), 40);
        assert_eq!(reader.range_to_bottom(), 1004);
        assert_eq!(reader.stats().records, 5);
        assert_eq!(reader.stats().datagrams, 5);
    }
}
