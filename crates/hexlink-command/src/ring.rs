//! Hex rings: all cells at an exact hex distance from a center.

use crate::Position;

/// Neighbour offsets in walking order around a ring.
const DIRECTIONS: [(i32, i32); 6] = [(1, 0), (1, 1), (0, 1), (-1, 0), (-1, -1), (0, -1)];

/// Iterator over the cells of one hex ring.
///
/// Starts at `center + radius * (-1, -1)` and walks `radius` steps along
/// each of the six directions, yielding `6 * radius` distinct cells (or just
/// the center for radius 0). The order is fixed, which keeps group moves
/// deterministic across peers. Cells whose coordinates would overflow `i16`
/// are skipped; bounds against the grid are the caller's concern.
#[derive(Debug, Clone)]
pub struct HexRing {
    current: (i32, i32),
    radius: u32,
    side: usize,
    step: u32,
    remaining: u32,
}

impl HexRing {
    pub fn new(center: Position, radius: u32) -> Self {
        let r = i64::from(radius);
        let start_x = i64::from(center.x) - r;
        let start_y = i64::from(center.y) - r;
        // Radii beyond the i16 range never produce a representable cell.
        let clamp = |v: i64| v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        Self {
            current: (clamp(start_x), clamp(start_y)),
            radius,
            side: 0,
            step: 0,
            remaining: if radius == 0 { 1 } else { radius.saturating_mul(6) },
        }
    }

    fn advance(&mut self) -> (i32, i32) {
        let cell = self.current;
        if self.radius == 0 {
            return cell;
        }
        let (dx, dy) = DIRECTIONS[self.side];
        self.current = (cell.0.saturating_add(dx), cell.1.saturating_add(dy));
        self.step += 1;
        if self.step == self.radius {
            self.step = 0;
            self.side += 1;
        }
        cell
    }
}

impl Iterator for HexRing {
    type Item = Position;

    fn next(&mut self) -> Option<Position> {
        while self.remaining > 0 {
            self.remaining -= 1;
            let (x, y) = self.advance();
            if let (Ok(x), Ok(y)) = (i16::try_from(x), i16::try_from(y)) {
                return Some(Position::new(x, y));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_radius_zero_is_center() {
        let center = Position::new(5, 5);
        assert_eq!(HexRing::new(center, 0).collect::<Vec<_>>(), vec![center]);
    }

    #[test]
    fn test_ring_one_is_the_six_neighbours_in_order() {
        let ring: Vec<_> = HexRing::new(Position::new(0, 0), 1).collect();
        assert_eq!(
            ring,
            vec![
                Position::new(-1, -1),
                Position::new(0, -1),
                Position::new(1, 0),
                Position::new(1, 1),
                Position::new(0, 1),
                Position::new(-1, 0),
            ]
        );
    }

    #[test]
    fn test_every_cell_is_distinct_and_at_radius() {
        let center = Position::new(10, -4);
        for radius in 1..8 {
            let ring: Vec<_> = HexRing::new(center, radius).collect();
            assert_eq!(ring.len(), 6 * radius as usize);
            let unique: HashSet<_> = ring.iter().copied().collect();
            assert_eq!(unique.len(), ring.len());
            assert!(ring.iter().all(|cell| center.hex_distance(*cell) == radius));
        }
    }

    #[test]
    fn test_cells_outside_i16_are_skipped() {
        let ring: Vec<_> = HexRing::new(Position::new(i16::MAX, 0), 1).collect();
        assert!(ring.iter().all(|cell| cell.x <= i16::MAX));
        // (MAX+1, 0) and (MAX+1, 1) fall off the coordinate range.
        assert_eq!(ring.len(), 4);
    }
}
