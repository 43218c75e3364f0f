//! Feature-flag resolution for sudo mode.

use anyhow::Result;

/// Resolves whether sudo mode is enforced.
///
/// Resolution may fail (remote config, plugin registry, ...); callers must
/// treat a failure as "enabled" so a broken resolver cannot switch the
/// guard off.
pub trait SudoModeFlag: Send + Sync {
    /// Resolve the flag.
    ///
    /// # Errors
    /// Returns an error when the flag cannot be resolved; the guard maps
    /// that to "enabled".
    fn enabled(&self) -> Result<bool>;
}

/// Fixed flag value taken from configuration.
#[derive(Clone, Copy, Debug)]
pub struct StaticSudoFlag {
    enabled: bool,
}

impl StaticSudoFlag {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl SudoModeFlag for StaticSudoFlag {
    fn enabled(&self) -> Result<bool> {
        Ok(self.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::{StaticSudoFlag, SudoModeFlag};

    #[test]
    fn static_flag_resolves_to_its_value() {
        assert_eq!(StaticSudoFlag::new(true).enabled().ok(), Some(true));
        assert_eq!(StaticSudoFlag::new(false).enabled().ok(), Some(false));
    }
}
