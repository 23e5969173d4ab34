//! Configuration for partial redundancy elimination.
//!
//! [`PreConfig`] controls which candidate kinds run, when profile-driven
//! speculation is allowed, and the limits of the min-cut search and of
//! control-dependence hoisting.

/// Settings of the redundancy elimination pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PreConfig {
    /// Run expression candidates.
    pub enable_expression_pre: bool,

    /// Run statement (runtime check) candidates.
    pub enable_statement_pre: bool,

    /// Use profile-driven min-cut speculation when a profile is available.
    pub enable_min_cut: bool,

    /// Candidates numbered above this limit use the classical, non-speculative rules.
    pub pre_use_profile_limit: u32,

    /// Stop after this many candidates per function.
    pub pre_limit: u32,

    /// Multiplier applied to the max flow to obtain the relaxed cut bound.
    pub relaxed_flow_factor: f64,

    /// Number of flow routes from which the cut search skips the exact
    /// attempt and bounds the cut by `max_flow * routes / 10`.
    pub relaxed_route_threshold: usize,

    /// Cap on augmenting routes. Candidates hitting the cap fall back to the
    /// classical rules.
    pub max_flow_routes: usize,

    /// Place computations at control-dependence points.
    pub enable_hoisting: bool,

    /// Control-dependence points with this many successors or more are not
    /// used for hoisting.
    pub max_hoist_successors: usize,

    /// Treat phis at loop headers as speculatively down-safe when a real
    /// occurrence is defined by them.
    pub speculate_loop_headers: bool,
}

impl Default for PreConfig {
    fn default() -> Self {
        Self {
            enable_expression_pre: true,
            enable_statement_pre: true,
            enable_min_cut: true,
            pre_use_profile_limit: u32::MAX,
            pre_limit: u32::MAX,
            relaxed_flow_factor: 1.25,
            relaxed_route_threshold: 20,
            max_flow_routes: 4096,
            enable_hoisting: true,
            max_hoist_successors: 32,
            speculate_loop_headers: false,
        }
    }
}

impl PreConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-speculative redundancy elimination without hoisting.
    #[must_use]
    pub fn classical() -> Self {
        Self {
            enable_min_cut: false,
            enable_hoisting: false,
            ..Self::default()
        }
    }

    /// Speculates at loop headers in addition to the defaults.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            speculate_loop_headers: true,
            ..Self::default()
        }
    }

    /// Returns `true` if at least one candidate kind is enabled.
    #[must_use]
    pub fn any_enabled(&self) -> bool {
        self.enable_expression_pre || self.enable_statement_pre
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PreConfig::new();
        assert!(config.enable_min_cut);
        assert!(config.enable_hoisting);
        assert!(!config.speculate_loop_headers);
        assert_eq!(config.relaxed_route_threshold, 20);
        assert_eq!(config.max_hoist_successors, 32);
        assert!((config.relaxed_flow_factor - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_presets() {
        let classical = PreConfig::classical();
        assert!(!classical.enable_min_cut);
        assert!(!classical.enable_hoisting);
        assert!(classical.any_enabled());

        let aggressive = PreConfig::aggressive();
        assert!(aggressive.speculate_loop_headers);

        let none = PreConfig {
            enable_expression_pre: false,
            enable_statement_pre: false,
            ..PreConfig::default()
        };
        assert!(!none.any_enabled());
    }
}
