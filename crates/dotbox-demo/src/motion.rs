use dotbox_engine::coords::Vec2;

/// Period divisor of the circular wobble, in milliseconds.
const WOBBLE_PERIOD_MS: f64 = 500.0;
/// Wobble radius in clip-space units.
const WOBBLE_RADIUS: f64 = 0.05;

/// Clip-space offsets of a `grid_size` x `grid_size` grid centered on the
/// origin, `spacing` apart, shifted together along a circle over time.
///
/// Rows are outer (y), columns inner (x).
pub fn compute_instance_offsets(time_ms: f64, grid_size: usize, spacing: f32) -> Vec<Vec2> {
    let phase = time_ms / WOBBLE_PERIOD_MS;
    let wobble = Vec2::new(
        (phase.cos() * WOBBLE_RADIUS) as f32,
        (phase.sin() * WOBBLE_RADIUS) as f32,
    );
    let half = (grid_size as f32 - 1.0) / 2.0;
    let coord = |i: usize| (i as f32 - half) * spacing;

    let mut offsets = Vec::with_capacity(grid_size * grid_size);
    for y in 0..grid_size {
        for x in 0..grid_size {
            offsets.push(Vec2::new(coord(x), coord(y)) + wobble);
        }
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a.x - b.x).abs() < 1e-5 && (a.y - b.y).abs() < 1e-5
    }

    #[test]
    fn ten_by_ten_at_time_zero() {
        let offsets = compute_instance_offsets(0.0, 10, 0.2);
        assert_eq!(offsets.len(), 100);
        assert!(close(offsets[0], Vec2::new(-0.9 + 0.05, -0.9)));
        assert!(close(offsets[1], Vec2::new(-0.7 + 0.05, -0.9)));
        assert!(close(offsets[10], Vec2::new(-0.9 + 0.05, -0.7)));
        assert!(close(offsets[99], Vec2::new(0.9 + 0.05, 0.9)));
    }

    #[test]
    fn wobble_moves_every_offset_together() {
        let t = 500.0 * std::f64::consts::FRAC_PI_2;
        let offsets = compute_instance_offsets(t, 10, 0.2);
        assert!(close(offsets[0], Vec2::new(-0.9, -0.9 + 0.05)));
        assert!(close(offsets[55], Vec2::new(0.1, 0.1 + 0.05)));
    }

    #[test]
    fn degenerate_grids() {
        assert!(compute_instance_offsets(0.0, 0, 0.2).is_empty());
        let single = compute_instance_offsets(0.0, 1, 0.2);
        assert!(close(single[0], Vec2::new(0.05, 0.0)));
    }
}
