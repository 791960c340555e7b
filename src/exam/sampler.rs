//! Frame sampling
//!
//! Hand detection is expensive, so only one of every `K` incoming frames is
//! handed to the detector. The sampler only counts; it never blocks and never
//! fails.

/// Result of submitting one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameTick<F> {
    /// This frame should be sent to the hand detector
    Sampled(F),
    /// Forward unchanged, no observation for this frame
    PassThrough(F),
}

impl<F> FrameTick<F> {
    pub fn is_sampled(&self) -> bool {
        matches!(self, FrameTick::Sampled(_))
    }

    pub fn into_frame(self) -> F {
        match self {
            FrameTick::Sampled(f) | FrameTick::PassThrough(f) => f,
        }
    }
}

/// Process 1 of every `every` frames
#[derive(Debug, Clone)]
pub struct FrameSampler {
    every: u32,
    counter: u32,
    sampled: u64,
    submitted: u64,
}

impl FrameSampler {
    /// Create a sampler. `every` of 0 is treated as 1 (sample everything).
    pub fn new(every: u32) -> Self {
        Self {
            every: every.max(1),
            counter: 0,
            sampled: 0,
            submitted: 0,
        }
    }

    /// Submit a frame. The first frame is sampled, then every `every`-th.
    pub fn submit<F>(&mut self, frame: F) -> FrameTick<F> {
        let sample = self.counter == 0;
        self.counter = (self.counter + 1) % self.every;
        self.submitted += 1;

        if sample {
            self.sampled += 1;
            FrameTick::Sampled(frame)
        } else {
            FrameTick::PassThrough(frame)
        }
    }

    pub fn every(&self) -> u32 {
        self.every
    }

    /// (sampled, submitted) counters
    pub fn stats(&self) -> (u64, u64) {
        (self.sampled, self.submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_one_in_three() {
        let mut sampler = FrameSampler::new(3);
        let ticks: Vec<bool> = (0..9).map(|i| sampler.submit(i).is_sampled()).collect();
        assert_eq!(
            ticks,
            vec![true, false, false, true, false, false, true, false, false]
        );
        assert_eq!(sampler.stats(), (3, 9));
    }

    #[test]
    fn test_pass_through_keeps_frame() {
        let mut sampler = FrameSampler::new(2);
        assert_eq!(sampler.submit("a"), FrameTick::Sampled("a"));
        assert_eq!(sampler.submit("b"), FrameTick::PassThrough("b"));
        assert_eq!(sampler.submit("c").into_frame(), "c");
    }

    #[test]
    fn test_zero_ratio_samples_everything() {
        let mut sampler = FrameSampler::new(0);
        assert_eq!(sampler.every(), 1);
        assert!((0..5).all(|i| sampler.submit(i).is_sampled()));
    }
}
