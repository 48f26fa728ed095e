use std::collections::VecDeque;

/// Ordered reply slots for one connection.
///
/// A slot is reserved for every frame that will be answered, in parse order.
/// Completions fill their slot in any order; only the contiguous run of
/// filled slots at the head is ever released, so replies leave in request
/// order. A slot filled with `None` is released without producing a reply.
#[derive(Debug)]
pub struct ReplyQueue<T> {
    head: u64,
    slots: VecDeque<Slot<T>>,
}

#[derive(Debug)]
enum Slot<T> {
    Pending,
    Ready(Option<T>),
}

/// Slots released from the head of a [`ReplyQueue`].
#[derive(Debug)]
pub struct Flushed<T> {
    /// Replies to write, in order.
    pub replies: Vec<T>,
    /// Slots released without a reply.
    pub skipped: usize,
}

impl<T> ReplyQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            head: 0,
            slots: VecDeque::new(),
        }
    }

    /// Reserve the next slot and return its sequence number.
    pub fn reserve(&mut self) -> u64 {
        let seq = self.head + self.slots.len() as u64;
        self.slots.push_back(Slot::Pending);
        seq
    }

    /// Fill a pending slot. Returns `false` if `seq` is unknown or already filled.
    pub fn fill(&mut self, seq: u64, reply: Option<T>) -> bool {
        let Some(index) = seq.checked_sub(self.head) else {
            return false;
        };
        let Ok(index) = usize::try_from(index) else {
            return false;
        };
        match self.slots.get_mut(index) {
            Some(slot) if matches!(slot, Slot::Pending) => {
                *slot = Slot::Ready(reply);
                true
            }
            _ => false,
        }
    }

    /// Release every filled slot at the head, stopping at the first pending one.
    pub fn flush(&mut self) -> Flushed<T> {
        let mut flushed = Flushed {
            replies: Vec::new(),
            skipped: 0,
        };
        while let Some(Slot::Ready(_)) = self.slots.front() {
            if let Some(Slot::Ready(reply)) = self.slots.pop_front() {
                self.head += 1;
                match reply {
                    Some(reply) => flushed.replies.push(reply),
                    None => flushed.skipped += 1,
                }
            }
        }
        flushed
    }

    /// Sequence number of the oldest unreleased slot.
    pub fn head(&self) -> u64 {
        self.head
    }

    /// Number of unreleased slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether every reserved slot has been released.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<T> Default for ReplyQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
