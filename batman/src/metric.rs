//! Dedicated logic for the transmit quality (TQ) metric. TQ is the fraction
//! of an originator's messages that arrived through a given neighbour within
//! the sliding window, so a higher value means a better path.

use core::fmt;

/// The transmit quality of a route through a specific neighbour, as a
/// fraction in `[0, 1]`.
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
pub struct TransmitQuality(f64);

impl TransmitQuality {
    /// Derive a `TransmitQuality` from the amount of messages received in a
    /// window of the given size.
    pub fn new(received: u32, window_size: u32) -> Self {
        if window_size == 0 {
            return TransmitQuality(0.0);
        }
        TransmitQuality((received as f64 / window_size as f64).clamp(0.0, 1.0))
    }

    /// Checks if no messages at all were received through this neighbour.
    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    /// The quality as a fraction in `[0, 1]`.
    pub fn as_fraction(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for TransmitQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::TransmitQuality;

    #[test]
    fn fraction_of_window() {
        let tq = TransmitQuality::new(64, 128);
        assert_eq!(tq.as_fraction(), 0.5);
        assert!(!tq.is_zero());

        assert!(TransmitQuality::new(0, 128).is_zero());
        assert_eq!(TransmitQuality::new(128, 128).as_fraction(), 1.0);
    }

    #[test]
    fn ordering() {
        assert!(TransmitQuality::new(90, 128) > TransmitQuality::new(70, 128));
    }

    #[test]
    fn display_percentage() {
        assert_eq!(TransmitQuality::new(64, 128).to_string(), "50.0%");
    }
}
