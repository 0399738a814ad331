//! Configuration types deserialized from `trellis.toml`.

use serde::{Deserialize, Serialize};

/// Which placement strategy the pipeline should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Pick automatically: row/column placement for uniform-girth cells,
    /// clustering plus beam search otherwise.
    #[default]
    Auto,
    /// Always use the cluster + beam-search placer.
    Beam,
    /// Always use the row/column stack placer.
    Stacks,
}

/// Tunable parameters for a placement run.
///
/// All fields have defaults, so a `trellis.toml` only needs to name the
/// values it changes. The weights shape the beam-search ranking; the stack
/// flags shape the row/column placer; the budget fields bound runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacerConfig {
    /// Number of worker threads for annealing refinement.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    /// Wall-clock budget in seconds. `0` means unlimited.
    #[serde(default)]
    pub runtime_secs: u64,
    /// Number of candidate placements retained by the beam search.
    #[serde(default = "default_trellis_width")]
    pub trellis_width: usize,
    /// Whether cells may take 90/270-degree orientations.
    #[serde(default)]
    pub allow_rotation: bool,
    /// Whether alternate stacks are mirrored in row/column placement.
    #[serde(default)]
    pub flip_alternate_stacks: bool,
    /// Whether the force-directed stack refinement keeps stack lengths equalized.
    #[serde(default = "default_true")]
    pub force_even_stacks: bool,
    /// Weight of the bounding-area term in merge ranking.
    #[serde(default = "default_weight")]
    pub bound_weight: f64,
    /// Weight of the aspect-ratio term in merge ranking.
    #[serde(default = "default_weight")]
    pub aspect_ratio_weight: f64,
    /// Placement strategy override.
    #[serde(default)]
    pub strategy: Strategy,
}

fn default_num_threads() -> usize {
    4
}

fn default_trellis_width() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

impl Default for PlacerConfig {
    fn default() -> Self {
        Self {
            num_threads: default_num_threads(),
            runtime_secs: 0,
            trellis_width: default_trellis_width(),
            allow_rotation: false,
            flip_alternate_stacks: false,
            force_even_stacks: true,
            bound_weight: default_weight(),
            aspect_ratio_weight: default_weight(),
            strategy: Strategy::Auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PlacerConfig::default();
        assert_eq!(config.num_threads, 4);
        assert_eq!(config.runtime_secs, 0);
        assert_eq!(config.trellis_width, 20);
        assert!(!config.allow_rotation);
        assert!(config.force_even_stacks);
        assert_eq!(config.strategy, Strategy::Auto);
    }

    #[test]
    fn strategy_default() {
        assert_eq!(Strategy::default(), Strategy::Auto);
    }

    #[test]
    fn serde_roundtrip() {
        let config = PlacerConfig {
            allow_rotation: true,
            trellis_width: 8,
            ..PlacerConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: PlacerConfig = serde_json::from_str(&json).unwrap();
        assert!(restored.allow_rotation);
        assert_eq!(restored.trellis_width, 8);
    }
}
