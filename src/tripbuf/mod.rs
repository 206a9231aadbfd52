use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

//number of record slots: one being written, one being read, one spare
pub const SLOTS: usize = 3;

const INDEX_MASK: u8 = 0b011;
const FRESH_BIT: u8 = 0b100;

//a slot holding data and the epoch of the offer that published it
struct Slot<T>{
    data: T,
    epoch: u64,
}

struct Shared<T>{
    slots: [UnsafeCell<Slot<T>>; SLOTS],
    //index of the spare slot, FRESH_BIT set when it holds an unread offer
    back: AtomicU8,
    write_epoch: AtomicU64,
}

//each slot index is owned by exactly one of writer / reader / back at any time,
//ownership moves only through the atomic swap on `back`
unsafe impl<T: Send> Sync for Shared<T>{}

/// Write side of the hand-off. Lives in the serial-receive context.
pub struct TripleWriter<T>{
    shared: Arc<Shared<T>>,
    write_idx: u8,
}

/// Read side of the hand-off. Lives in the control loop.
pub struct TripleReader<T>{
    shared: Arc<Shared<T>>,
    read_idx: u8,
}

/// Create a single-producer/single-consumer triple buffer.
///
/// The writer fills its private slot and `offer`s it; the reader `update`s
/// to swap in the newest offered slot. Neither side ever blocks and the
/// reader never observes a slot the writer is still filling.
pub fn triple_buffer<T: Default>() -> (TripleWriter<T>, TripleReader<T>){
    let shared = Arc::new(Shared{
        slots: [
            UnsafeCell::new(Slot{ data: T::default(), epoch: 0 }),
            UnsafeCell::new(Slot{ data: T::default(), epoch: 0 }),
            UnsafeCell::new(Slot{ data: T::default(), epoch: 0 }),
        ],
        back: AtomicU8::new(1),
        write_epoch: AtomicU64::new(0),
    });

    let writer = TripleWriter{ shared: Arc::clone(&shared), write_idx: 0 };
    let reader = TripleReader{ shared, read_idx: 2 };
    return (writer, reader);
}

impl<T> TripleWriter<T>{
    //write cursor
    pub fn write_idx(&self) -> usize{
        return self.write_idx as usize;
    }

    //mutable access to the slot being filled (not visible to the reader)
    pub fn slot_mut(&mut self) -> &mut T{
        let cell = &self.shared.slots[self.write_idx as usize];
        unsafe{ &mut (*cell.get()).data }
    }

    //publish the filled slot, return its epoch
    pub fn offer(&mut self) -> u64{
        let epoch = self.shared.write_epoch.load(Ordering::Relaxed) + 1;
        unsafe{ (*self.shared.slots[self.write_idx as usize].get()).epoch = epoch; }
        self.shared.write_epoch.store(epoch, Ordering::Release);

        //hand our slot to back, take whatever was there (possibly an unread offer)
        let prev = self.shared.back.swap(self.write_idx | FRESH_BIT, Ordering::AcqRel);
        self.write_idx = prev & INDEX_MASK;
        return epoch;
    }

    //copy into the write slot and publish
    pub fn publish(&mut self, value: T) -> u64{
        *self.slot_mut() = value;
        return self.offer();
    }

    pub fn latest_epoch(&self) -> u64{
        return self.shared.write_epoch.load(Ordering::Acquire);
    }
}

impl<T> TripleReader<T>{
    //read cursor
    pub fn read_idx(&self) -> usize{
        return self.read_idx as usize;
    }

    //swap in the newest offered slot, false when nothing new was offered
    pub fn update(&mut self) -> bool{
        if self.shared.back.load(Ordering::Relaxed) & FRESH_BIT == 0{
            return false;
        }
        let prev = self.shared.back.swap(self.read_idx, Ordering::AcqRel);
        self.read_idx = prev & INDEX_MASK;
        return true;
    }

    //current read slot (stable until the next update)
    pub fn read(&self) -> &T{
        let cell = &self.shared.slots[self.read_idx as usize];
        unsafe{ &(*cell.get()).data }
    }

    //epoch of the current read slot, 0 before the first update
    pub fn epoch(&self) -> u64{
        let cell = &self.shared.slots[self.read_idx as usize];
        unsafe{ (*cell.get()).epoch }
    }

    pub fn has_fresh(&self) -> bool{
        return self.shared.back.load(Ordering::Acquire) & FRESH_BIT != 0;
    }

    pub fn latest_epoch(&self) -> u64{
        return self.shared.write_epoch.load(Ordering::Acquire);
    }
}
