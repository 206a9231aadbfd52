/**
 * DVL Module
 *
 * Byte-at-a-time decoder for the DVL binary datagrams plus the serial link
 * that configures the device and feeds the decoder. Completed records are
 * handed to the control loop through a triple buffer, so the receive side
 * never waits on the reader.
 */

pub mod parser;
pub mod link;

pub use parser::{DvlParser, RxState, DatagramBuilder};
pub use link::{DvlLink, CommandState};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::tripbuf::{triple_buffer, TripleReader};

/// One published DVL record. Velocities and range are raw device units
/// (mm/s and mm).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DvlRecord{
    pub velocity_starboard: i32,
    pub velocity_forward: i32,
    pub velocity_upward: i32,
    pub range_to_bottom: i32,
}

/// Decoder counters, written by the receive side and readable anywhere.
#[derive(Debug, Default)]
pub struct ParserStats{
    pub datagrams: AtomicU64,
    pub resyncs: AtomicU64,
    pub timeouts: AtomicU64,
    pub exhausted: AtomicU64,
    pub unknown_frames: AtomicU64,
    pub records: AtomicU64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStatsSnapshot{
    pub datagrams: u64,
    pub resyncs: u64,
    pub timeouts: u64,
    pub exhausted: u64,
    pub unknown_frames: u64,
    pub records: u64,
}

impl ParserStats{
    pub fn snapshot(&self) -> ParserStatsSnapshot{
        ParserStatsSnapshot{
            datagrams: self.datagrams.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            unknown_frames: self.unknown_frames.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64){
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Control-loop side of the DVL hand-off.
pub struct DvlReader{
    reader: TripleReader<DvlRecord>,
    stats: Arc<ParserStats>,
}

impl DvlReader{
    /// Swap in the most recently completed record. Returns false (and keeps
    /// the previous record) when nothing new was published.
    pub fn update(&mut self) -> bool{
        self.reader.update()
    }

    pub fn record(&self) -> DvlRecord{
        *self.reader.read()
    }

    pub fn forward_velocity(&self) -> i32{
        self.reader.read().velocity_forward
    }

    pub fn starboard_velocity(&self) -> i32{
        self.reader.read().velocity_starboard
    }

    pub fn upward_velocity(&self) -> i32{
        self.reader.read().velocity_upward
    }

    pub fn range_to_bottom(&self) -> i32{
        self.reader.read().range_to_bottom
    }

    /// Publish epoch of the record currently visible, 0 before the first.
    pub fn epoch(&self) -> u64{
        self.reader.epoch()
    }

    pub fn stats(&self) -> ParserStatsSnapshot{
        self.stats.snapshot()
    }
}

/// Create a parser and the reader it publishes to.
pub fn channel() -> (DvlParser, DvlReader){
    let (writer, reader) = triple_buffer::<DvlRecord>();
    let stats = Arc::new(ParserStats::default());
    let parser = DvlParser::new(writer, Arc::clone(&stats));
    (parser, DvlReader{ reader, stats })
}
