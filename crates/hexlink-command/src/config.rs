//! Executor configuration.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DispatcherConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`GuiTaskExecutor`](crate::GuiTaskExecutor).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// How a group move is spread around its target.
    pub move_spread: MoveSpreadConfig,
}

// ---------------------------------------------------------------------------
// MoveSpreadConfig
// ---------------------------------------------------------------------------

/// Spreading of a multi-movable move over hex rings around the target.
///
/// Every peer must use the same values, otherwise the same task places
/// movables differently and the simulations diverge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveSpreadConfig {
    /// Use every n-th in-bounds cell of a ring. 1 uses every cell; 2 leaves
    /// a gap between neighbours so they don't jostle.
    pub ring_cell_stride: usize,

    /// Give up after this many consecutive rings placed nobody.
    pub max_empty_rings: u32,
}

impl Default for MoveSpreadConfig {
    fn default() -> Self {
        Self {
            ring_cell_stride: 2,
            max_empty_rings: 5,
        }
    }
}

impl MoveSpreadConfig {
    /// Raises a zero stride to 1.
    pub fn validated(mut self) -> Self {
        self.ring_cell_stride = self.ring_cell_stride.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_spread_default() {
        let config = MoveSpreadConfig::default();
        assert_eq!(config.ring_cell_stride, 2);
        assert_eq!(config.max_empty_rings, 5);
    }

    #[test]
    fn test_zero_stride_is_raised() {
        let config = MoveSpreadConfig {
            ring_cell_stride: 0,
            ..MoveSpreadConfig::default()
        }
        .validated();
        assert_eq!(config.ring_cell_stride, 1);
    }

    #[test]
    fn test_dispatcher_config_from_partial_json() {
        let config: DispatcherConfig =
            serde_json::from_str(r#"{ "move_spread": { "max_empty_rings": 8 } }"#).unwrap();
        assert_eq!(config.move_spread.max_empty_rings, 8);
        assert_eq!(config.move_spread.ring_cell_stride, 2);
    }
}
