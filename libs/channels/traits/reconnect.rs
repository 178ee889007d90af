use std::ops::RangeInclusive;
use std::time::Duration;

/// Close codes reserved by the Channels protocol
pub const PROTOCOL_CLOSE_CODES: RangeInclusive<u16> = 4000..=4999;

/// Delay between automatic reconnect attempts
///
/// The attempt limit is enforced by the engine from
/// `ClientOptions::max_reconnect_attempts`, so a strategy only picks delays.
pub trait ReconnectionStrategy: Send + Sync {
    /// # Arguments
    /// * `attempt` - Attempts already scheduled since the last established connection
    fn delay_for(&self, attempt: usize) -> Duration;
}

/// Waits `attempt²` seconds, capped at `max_gap`
///
/// The first attempt after a drop is therefore immediate.
#[derive(Debug, Clone)]
pub struct QuadraticBackoff {
    max_gap: Duration,
}

impl QuadraticBackoff {
    pub fn new(max_gap: Duration) -> Self {
        Self { max_gap }
    }
}

impl Default for QuadraticBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

impl ReconnectionStrategy for QuadraticBackoff {
    fn delay_for(&self, attempt: usize) -> Duration {
        let secs = (attempt as u64).saturating_mul(attempt as u64);
        Duration::from_secs(secs).min(self.max_gap)
    }
}

/// What a close code asks the client to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCodeAction {
    /// 4000-4099: the same connection attempt would fail again
    DoNotReconnect,
    /// 4100-4199, unknown protocol codes and every non-protocol code
    ReconnectAfterBackoff,
    /// 4200-4299
    ReconnectImmediately,
}

impl CloseCodeAction {
    pub fn for_code(code: Option<u16>) -> Self {
        match code {
            Some(4000..=4099) => CloseCodeAction::DoNotReconnect,
            Some(4200..=4299) => CloseCodeAction::ReconnectImmediately,
            _ => CloseCodeAction::ReconnectAfterBackoff,
        }
    }
}

/// True for close codes that override the auto-reconnect option
pub fn is_protocol_close_code(code: Option<u16>) -> bool {
    code.map_or(false, |c| PROTOCOL_CLOSE_CODES.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_backoff_sequence() {
        let strategy = QuadraticBackoff::new(Duration::from_secs(120));
        let delays: Vec<u64> = (0..5).map(|a| strategy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![0, 1, 4, 9, 16]);
    }

    #[test]
    fn test_quadratic_backoff_caps_at_max_gap() {
        let strategy = QuadraticBackoff::new(Duration::from_secs(10));
        assert_eq!(strategy.delay_for(3), Duration::from_secs(9));
        assert_eq!(strategy.delay_for(4), Duration::from_secs(10));
        assert_eq!(strategy.delay_for(usize::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_close_code_ranges() {
        assert_eq!(CloseCodeAction::for_code(Some(4001)), CloseCodeAction::DoNotReconnect);
        assert_eq!(CloseCodeAction::for_code(Some(4100)), CloseCodeAction::ReconnectAfterBackoff);
        assert_eq!(CloseCodeAction::for_code(Some(4201)), CloseCodeAction::ReconnectImmediately);
        assert_eq!(CloseCodeAction::for_code(Some(4500)), CloseCodeAction::ReconnectAfterBackoff);
        assert_eq!(CloseCodeAction::for_code(Some(1006)), CloseCodeAction::ReconnectAfterBackoff);
        assert_eq!(CloseCodeAction::for_code(None), CloseCodeAction::ReconnectAfterBackoff);
    }

    #[test]
    fn test_protocol_close_code_detection() {
        assert!(is_protocol_close_code(Some(4000)));
        assert!(is_protocol_close_code(Some(4999)));
        assert!(!is_protocol_close_code(Some(1000)));
        assert!(!is_protocol_close_code(None));
    }
}
