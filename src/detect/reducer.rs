//! Per-reading amplitude reduction

use crate::source::{Channel, Reading};

/// Peak absolute amplitude of one reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelScalar {
    pub channel: Channel,
    /// Non-negative peak amplitude (µV)
    pub value: f64,
    /// Timestamp of the reading it came from (ms since epoch)
    pub timestamp: f64,
}

/// Maximum absolute value of `samples`, or 0 when there are none
///
/// NaN samples (missing data from the headset) are skipped.
pub fn peak_amplitude(samples: &[f64]) -> f64 {
    samples
        .iter()
        .filter(|s| !s.is_nan())
        .fold(0.0, |peak: f64, s| peak.max(s.abs()))
}

/// Reduce a reading to its peak amplitude
pub fn reduce(reading: &Reading) -> ChannelScalar {
    ChannelScalar {
        channel: reading.channel,
        value: peak_amplitude(&reading.samples),
        timestamp: reading.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_samples_reduce_to_zero() {
        assert_eq!(peak_amplitude(&[]), 0.0);

        let reading = Reading::new(Channel::Af7, Vec::new(), 0.0);
        assert_eq!(reduce(&reading).value, 0.0);
    }

    #[test]
    fn test_negative_peak_wins() {
        assert_eq!(peak_amplitude(&[10.0, -950.5, 300.0]), 950.5);
    }

    #[test]
    fn test_nan_samples_skipped() {
        assert_eq!(peak_amplitude(&[f64::NAN, -4.0, 2.0]), 4.0);
        assert_eq!(peak_amplitude(&[f64::NAN]), 0.0);
    }

    #[test]
    fn test_reduce_keeps_channel_and_timestamp() {
        let reading = Reading::new(Channel::Tp10, vec![-1.0, 2.0], 1234.0);
        let scalar = reduce(&reading);
        assert_eq!(scalar.channel, Channel::Tp10);
        assert_eq!(scalar.value, 2.0);
        assert_eq!(scalar.timestamp, 1234.0);
    }
}
