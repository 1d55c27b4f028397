//! Build mode configuration for one-shot builds and the dev server.

/// Build mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildMode {
    /// Whether the hot update engine and live-update rooms are active.
    pub hot: bool,

    /// Whether lazy references are cooked eagerly along with their owner.
    pub cook_lazy: bool,
}

impl BuildMode {
    /// One-shot build: everything reachable is cooked, nothing is watched.
    pub const PRODUCTION: Self = Self {
        hot: false,
        cook_lazy: true,
    };

    /// Dev server: lazy references wait for the browser to ask for them.
    pub const DEVELOPMENT: Self = Self {
        hot: true,
        cook_lazy: false,
    };

    /// Check if this is development mode.
    #[inline]
    pub const fn is_dev(&self) -> bool {
        self.hot
    }
}
