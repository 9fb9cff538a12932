//! Frame-counted delays. Everything that would be a wall-clock timer is a
//! job queued here and released by the owning instance's tick.

/// Whole frames needed to cover `ms` at `fps`, rounded up.
pub(crate) fn ms_to_frames(ms: u64, fps: u32) -> u64 {
    (ms * fps as u64).div_ceil(1000)
}

#[derive(Clone, Debug)]
pub(crate) struct Timeline<J> {
    now: u64,
    queue: Vec<(u64, J)>,
}

impl<J> Default for Timeline<J> {
    fn default() -> Self {
        Self {
            now: 0,
            queue: Vec::new(),
        }
    }
}

impl<J> Timeline<J> {
    pub(crate) fn now(&self) -> u64 {
        self.now
    }

    pub(crate) fn advance(&mut self) {
        self.now += 1;
    }

    pub(crate) fn schedule_in(&mut self, frames: u64, job: J) {
        self.queue.push((self.now + frames, job));
    }

    /// Jobs due at or before the current frame, in the order they were queued.
    pub(crate) fn take_due(&mut self) -> Vec<J> {
        let now = self.now;
        let mut due = Vec::new();
        let mut keep = Vec::with_capacity(self.queue.len());
        for (at, job) in self.queue.drain(..) {
            if at <= now {
                due.push(job);
            } else {
                keep.push((at, job));
            }
        }
        self.queue = keep;
        due
    }

    pub(crate) fn any<F: Fn(&J) -> bool>(&self, f: F) -> bool {
        self.queue.iter().any(|(_, j)| f(j))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_round_up_to_frames() {
        assert_eq!(ms_to_frames(30, 60), 2);
        assert_eq!(ms_to_frames(1000, 60), 60);
        assert_eq!(ms_to_frames(500, 30), 15);
        assert_eq!(ms_to_frames(0, 60), 0);
    }

    #[test]
    fn jobs_release_on_their_frame_in_queue_order() {
        let mut t = Timeline::default();
        t.schedule_in(2, "b");
        t.schedule_in(1, "a");
        t.schedule_in(2, "c");
        assert!(t.take_due().is_empty());
        t.advance();
        assert_eq!(t.take_due(), vec!["a"]);
        t.advance();
        assert_eq!(t.take_due(), vec!["b", "c"]);
        assert!(t.is_empty());
    }

    #[test]
    fn zero_delay_is_due_immediately() {
        let mut t = Timeline::default();
        t.schedule_in(0, 7u8);
        assert!(t.any(|j| *j == 7));
        assert_eq!(t.take_due(), vec![7]);
    }
}
