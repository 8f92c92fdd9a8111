//! Per-frame cadence decisions

/// What the pipeline does with one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTick {
    /// Process-lifetime frame counter, starting at 1
    pub index: u64,
    pub run_detection: bool,
    pub encode: bool,
}

/// Frame counter driving the detection and encoding cadences.
/// The two are independent; the counter never resets.
#[derive(Debug, Clone)]
pub struct Cadence {
    detect_interval: u64,
    send_interval: u64,
    counter: u64,
}

impl Cadence {
    /// Intervals below 1 are treated as 1
    pub fn new(detect_interval: u64, send_interval: u64) -> Self {
        Self {
            detect_interval: detect_interval.max(1),
            send_interval: send_interval.max(1),
            counter: 0,
        }
    }

    pub fn advance(&mut self) -> FrameTick {
        self.counter += 1;
        FrameTick {
            index: self.counter,
            run_detection: self.counter % self.detect_interval == 0,
            encode: self.counter % self.send_interval == 0,
        }
    }

    /// Frames seen so far
    pub fn current(&self) -> u64 {
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_every_third_frame() {
        let mut cadence = Cadence::new(3, 2);
        let ticks: Vec<FrameTick> = (0..6).map(|_| cadence.advance()).collect();

        let detect: Vec<u64> = ticks.iter().filter(|t| t.run_detection).map(|t| t.index).collect();
        let encode: Vec<u64> = ticks.iter().filter(|t| t.encode).map(|t| t.index).collect();
        assert_eq!(detect, vec![3, 6]);
        assert_eq!(encode, vec![2, 4, 6]);
        assert_eq!(cadence.current(), 6);
    }

    #[test]
    fn test_interval_one_fires_every_frame() {
        let mut cadence = Cadence::new(1, 0);
        for i in 1..=4 {
            let tick = cadence.advance();
            assert_eq!(tick.index, i);
            assert!(tick.run_detection);
            assert!(tick.encode);
        }
    }
}
