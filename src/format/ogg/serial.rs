/// Hands out serial numbers for logical streams.
///
/// Every logical stream of a physical Ogg file needs a distinct serial, and a
/// chained segment must not reuse the serials of the previous one.
pub trait SerialAllocator {
    fn next_serial(&mut self) -> u32;
}

/// Counts up from a starting value, wrapping at `u32::MAX`.
#[derive(Debug, Clone)]
pub struct SequentialSerials {
    next: u32,
}

impl SequentialSerials {
    pub fn new(seed: u32) -> Self {
        Self { next: seed }
    }

    /// Starts from a random value
    pub fn random() -> Self {
        Self::new(rand::random())
    }

    /// Starts from `seed` if given, otherwise from a random value
    pub fn from_seed(seed: Option<u32>) -> Self {
        seed.map_or_else(Self::random, Self::new)
    }
}

impl SerialAllocator for SequentialSerials {
    fn next_serial(&mut self) -> u32 {
        let serial = self.next;
        self.next = self.next.wrapping_add(1);
        serial
    }
}

impl<A: SerialAllocator + ?Sized> SerialAllocator for Box<A> {
    fn next_serial(&mut self) -> u32 {
        (**self).next_serial()
    }
}
