const N: usize = 9;

/// Running median of the nine most recent samples. It smooths noisy measurements without the
///  lag of a moving average, and a single outlier never moves it.
#[derive(Debug, Clone)]
pub struct Median9 {
    buf: SampleBuffer,
}

#[derive(Debug, Clone)]
enum SampleBuffer {
    Growing(Vec<f64>),
    Ring {
        buf: [f64; N],
        next: usize,
    },
}

impl Default for Median9 {
    fn default() -> Self {
        Median9 {
            buf: SampleBuffer::Growing(Vec::with_capacity(N)),
        }
    }
}

impl Median9 {
    pub fn new() -> Median9 {
        Default::default()
    }

    pub fn len(&self) -> usize {
        match &self.buf {
            SampleBuffer::Growing(buf) => buf.len(),
            SampleBuffer::Ring { .. } => N,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.buf = SampleBuffer::Growing(Vec::with_capacity(N));
    }

    /// Adds a sample, evicting the oldest one if there are nine already, and returns the new
    ///  median. Samples are expected to be finite.
    pub fn add(&mut self, sample: f64) -> f64 {
        match &mut self.buf {
            SampleBuffer::Growing(buf) => {
                buf.push(sample);
                if buf.len() == N {
                    let mut ring = [0.0; N];
                    ring.copy_from_slice(buf);
                    self.buf = SampleBuffer::Ring { buf: ring, next: 0 };
                }
            }
            SampleBuffer::Ring { buf, next } => {
                buf[*next] = sample;
                *next = (*next + 1) % N;
            }
        }
        // there is at least the sample that was just added
        self.median().unwrap_or(sample)
    }

    pub fn median(&self) -> Option<f64> {
        match &self.buf {
            SampleBuffer::Growing(buf) => sorted_median(buf),
            SampleBuffer::Ring { buf, .. } => Some(opt_med9(*buf)),
        }
    }
}

/// Median by sorting, for fewer than nine samples. An even number of samples has the mean of
///  the two middle values as its median.
fn sorted_median(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    }
    else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Median of exactly nine values with the optimal 19-exchange sorting network: the network only
///  orders the values as far as necessary to move the median to index 4.
fn opt_med9(mut p: [f64; N]) -> f64 {
    fn sort2(p: &mut [f64; N], a: usize, b: usize) {
        if p[a] > p[b] {
            p.swap(a, b);
        }
    }

    sort2(&mut p, 1, 2); sort2(&mut p, 4, 5); sort2(&mut p, 7, 8);
    sort2(&mut p, 0, 1); sort2(&mut p, 3, 4); sort2(&mut p, 6, 7);
    sort2(&mut p, 1, 2); sort2(&mut p, 4, 5); sort2(&mut p, 7, 8);
    sort2(&mut p, 0, 3); sort2(&mut p, 5, 8); sort2(&mut p, 4, 7);
    sort2(&mut p, 3, 6); sort2(&mut p, 1, 4); sort2(&mut p, 2, 5);
    sort2(&mut p, 4, 7); sort2(&mut p, 4, 2); sort2(&mut p, 6, 4);
    sort2(&mut p, 4, 2);
    p[4]
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion::DropRandom;
    use rstest::rstest;

    #[test]
    fn test_empty() {
        let median = Median9::new();
        assert!(median.is_empty());
        assert_eq!(median.median(), None);
    }

    #[rstest]
    #[case::one(vec![5.0], 5.0)]
    #[case::two(vec![5.0, 1.0], 3.0)]
    #[case::three(vec![5.0, 1.0, 3.0], 3.0)]
    #[case::four(vec![4.0, 1.0, 3.0, 10.0], 3.5)]
    #[case::eight(vec![8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0], 4.5)]
    fn test_fewer_than_nine(#[case] samples: Vec<f64>, #[case] expected: f64) {
        let mut median = Median9::new();
        let mut last = f64::NAN;
        for s in &samples {
            last = median.add(*s);
        }
        assert_eq!(median.len(), samples.len());
        assert_eq!(last, expected);
        assert_eq!(median.median(), Some(expected));
    }

    #[test]
    fn test_increasing_nine() {
        let mut median = Median9::new();
        for i in 1..=8 {
            median.add(i as f64);
        }
        assert_eq!(median.add(9.0), 5.0);
        assert_eq!(median.len(), 9);
    }

    #[test]
    fn test_oldest_sample_is_evicted() {
        let mut median = Median9::new();
        for _ in 0..9 {
            median.add(100.0);
        }
        for _ in 0..4 {
            assert_eq!(median.add(1.0), 100.0);
        }
        assert_eq!(median.add(1.0), 1.0);
        assert_eq!(median.len(), 9);
    }

    #[test]
    fn test_single_outlier() {
        let mut median = Median9::new();
        for s in [10.0, 11.0, 9.0, 10.5, 1000.0, 10.0, 9.5, 10.0, 11.0] {
            median.add(s);
        }
        assert_eq!(median.median(), Some(10.0));
    }

    #[test]
    fn test_network_matches_sorting() {
        let mut random = DropRandom::new(77);
        for _ in 0..1000 {
            let mut samples = [0.0; N];
            for s in &mut samples {
                *s = (random.next_u32() % 50) as f64;
            }
            assert_eq!(opt_med9(samples), sorted_median(&samples).unwrap(), "{:?}", samples);
        }
    }

    #[test]
    fn test_clear() {
        let mut median = Median9::new();
        median.add(1.0);
        median.clear();
        assert!(median.is_empty());
        assert_eq!(median.add(7.0), 7.0);
    }
}
