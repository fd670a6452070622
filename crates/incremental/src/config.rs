//! Session configuration.

/// Options of a [`Session`](crate::Session).
///
/// ```rust
/// use trellis_incremental::SessionConfig;
///
/// let config = SessionConfig::new().immediate_propagation(true);
/// assert!(config.is_immediate());
/// assert!(config.coalesces_events());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    immediate_propagation: bool,
    coalesce_events: bool,
}

impl SessionConfig {
    /// Creates the default configuration: deferred and coalesced.
    pub fn new() -> Self {
        Self {
            immediate_propagation: false,
            coalesce_events: true,
        }
    }

    /// Propagates every fact event as soon as it is notified instead of
    /// waiting for `trigger_listeners`.
    pub fn immediate_propagation(mut self, immediate: bool) -> Self {
        self.immediate_propagation = immediate;
        self
    }

    /// Merges queued events of the same fact before they are propagated.
    pub fn coalesce_events(mut self, coalesce: bool) -> Self {
        self.coalesce_events = coalesce;
        self
    }

    #[inline]
    pub fn is_immediate(&self) -> bool {
        self.immediate_propagation
    }

    #[inline]
    pub fn coalesces_events(&self) -> bool {
        self.coalesce_events
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(!config.is_immediate());
        assert!(config.coalesces_events());
        assert_eq!(config, SessionConfig::new());
    }

    #[test]
    fn test_builder_chain() {
        let config = SessionConfig::new()
            .coalesce_events(false)
            .immediate_propagation(true);
        assert!(config.is_immediate());
        assert!(!config.coalesces_events());
    }
}
