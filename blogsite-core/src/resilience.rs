//! Retry policy for outbound provider calls
//!
//! Retries are driven by the `backon` crate. Only transport failures that
//! never reached the provider's application logic (timeouts, refused or reset
//! connections) are retried; HTTP error statuses and malformed bodies are not.

pub mod retry {
    use std::time::Duration;

    use backon::ExponentialBuilder;

    /// First backoff delay between attempts
    pub const MIN_DELAY: Duration = Duration::from_millis(100);

    /// Backoff cap between attempts
    pub const MAX_DELAY: Duration = Duration::from_secs(2);

    /// Bounded exponential backoff with `max_retries` extra attempts
    #[must_use]
    pub fn provider_backoff(max_retries: usize) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(MIN_DELAY)
            .with_max_delay(MAX_DELAY)
            .with_max_times(max_retries)
            .with_jitter()
    }

    /// Whether a failed provider request is worth another attempt
    #[must_use]
    pub fn is_retryable(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || should_retry_error(err)
    }

    /// Check if an error should be retried
    ///
    /// Walks the source chain looking for transient I/O error kinds, then
    /// falls back to the display message for wrapped errors.
    pub fn should_retry_error(err: &(dyn std::error::Error + 'static)) -> bool {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(e) = current {
            if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
                return is_transient_io_error(io_err);
            }
            current = e.source();
        }

        let err_msg = err.to_string().to_lowercase();
        err_msg.contains("timed out")
            || err_msg.contains("timeout")
            || err_msg.contains("connection reset")
            || err_msg.contains("connection refused")
            || err_msg.contains("connection aborted")
            || err_msg.contains("broken pipe")
    }

    fn is_transient_io_error(err: &std::io::Error) -> bool {
        matches!(
            err.kind(),
            std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
        )
    }
}

#[cfg(test)]
mod tests {
    use super::retry::should_retry_error;

    #[test]
    fn test_transient_io_errors_retry() {
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(should_retry_error(&err));
        let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "down");
        assert!(should_retry_error(&err));
    }

    #[test]
    fn test_logical_errors_do_not_retry() {
        let err = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad json");
        assert!(!should_retry_error(&err));
        let err = crate::Error::InvalidInput("missing access_token".to_string());
        assert!(!should_retry_error(&err));
    }
}
