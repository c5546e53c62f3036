/*!
Bit packing in transmission order.

[`BitExtractor`] turns a value into the levels that go on the wire, and
[`BitAssembler`] turns received levels back into the value. Both honour the
configured [`ShiftOrder`] and support 1 to 64 bits.
*/

use serde::{Deserialize, Serialize};

use crate::settings::ShiftOrder;

/// Logic level of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitLevel {
    Low,
    High,
}

impl BitLevel {
    /// The other level
    pub fn toggled(self) -> Self {
        match self {
            BitLevel::Low => BitLevel::High,
            BitLevel::High => BitLevel::Low,
        }
    }

    pub fn is_high(self) -> bool {
        self == BitLevel::High
    }
}

impl From<bool> for BitLevel {
    fn from(bit: bool) -> Self {
        if bit {
            BitLevel::High
        } else {
            BitLevel::Low
        }
    }
}

/// Yields the bits of a value in transmission order. Consumed as it goes.
#[derive(Debug)]
pub struct BitExtractor {
    value: u64,
    order: ShiftOrder,
    count: u32,
    next: u32,
}

impl BitExtractor {
    /// Extract the low `count` bits of `value`. `count` is clamped to 1..=64.
    pub fn new(value: u64, order: ShiftOrder, count: u32) -> Self {
        Self { value, order, count: count.clamp(1, 64), next: 0 }
    }
}

impl Iterator for BitExtractor {
    type Item = BitLevel;

    fn next(&mut self) -> Option<BitLevel> {
        if self.next >= self.count {
            return None;
        }
        let position = match self.order {
            ShiftOrder::LsbFirst => self.next,
            ShiftOrder::MsbFirst => self.count - 1 - self.next,
        };
        self.next += 1;
        Some(BitLevel::from((self.value >> position) & 1 == 1))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.count - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for BitExtractor {}

/// Rebuilds a value from levels received in transmission order
#[derive(Debug, Clone)]
pub struct BitAssembler {
    value: u64,
    order: ShiftOrder,
    count: u32,
    received: u32,
}

impl BitAssembler {
    /// Expect `count` bits, clamped to 1..=64
    pub fn new(order: ShiftOrder, count: u32) -> Self {
        Self { value: 0, order, count: count.clamp(1, 64), received: 0 }
    }

    /// Place the next received bit. Extra bits past `count` are ignored.
    pub fn push(&mut self, level: BitLevel) {
        if self.received >= self.count {
            return;
        }
        let position = match self.order {
            ShiftOrder::LsbFirst => self.received,
            ShiftOrder::MsbFirst => self.count - 1 - self.received,
        };
        if level.is_high() {
            self.value |= 1u64 << position;
        }
        self.received += 1;
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.count
    }

    /// Value so far; missing bits read as zero
    pub fn value(&self) -> u64 {
        self.value
    }
}
