/// Point sizes surfaced by the host toolbar.
pub const FONT_SIZE_LADDER: &[u32] = &[
    6, 8, 9, 10, 11, 12, 14, 16, 18, 20, 22, 24, 26, 28, 36, 48, 72, 96,
];

pub const DEFAULT_FONT_SIZE_PT: u32 = 12;
pub const DEFAULT_FONT_FAMILY: &str = "Sans";

/// Map a point size onto the legacy 1-7 `fontSize` ladder.
pub fn pt_to_legacy_size(pt: u32) -> u8 {
    match pt {
        0..=9 => 1,
        10..=11 => 2,
        12..=14 => 3,
        15..=18 => 4,
        19..=24 => 5,
        25..=36 => 6,
        _ => 7,
    }
}

/// Representative point size for a legacy 1-7 ladder value, used when a
/// caller speaks only the legacy scale.
pub fn legacy_size_to_pt(size: u8) -> u32 {
    match size {
        0 | 1 => 9,
        2 => 11,
        3 => 14,
        4 => 18,
        5 => 24,
        6 => 36,
        _ => 72,
    }
}

/// Inverse of the fixed 96-dpi px/pt ladder: px * 72 / 96, rounded.
pub fn px_to_pt(px: f64) -> u32 {
    (px * 0.75).round().max(1.0) as u32
}

/// Nearest supported size by absolute distance; ties prefer the smaller.
pub fn nearest_ladder_size(pt: u32) -> u32 {
    let mut best = FONT_SIZE_LADDER[0];
    let mut best_dist = best.abs_diff(pt);
    for &candidate in &FONT_SIZE_LADDER[1..] {
        let dist = candidate.abs_diff(pt);
        if dist < best_dist {
            best = candidate;
            best_dist = dist;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_ladder_thresholds() {
        assert_eq!(pt_to_legacy_size(9), 1);
        assert_eq!(pt_to_legacy_size(10), 2);
        assert_eq!(pt_to_legacy_size(11), 2);
        assert_eq!(pt_to_legacy_size(12), 3);
        assert_eq!(pt_to_legacy_size(14), 3);
        assert_eq!(pt_to_legacy_size(18), 4);
        assert_eq!(pt_to_legacy_size(24), 5);
        assert_eq!(pt_to_legacy_size(36), 6);
        assert_eq!(pt_to_legacy_size(37), 7);
        assert_eq!(pt_to_legacy_size(96), 7);
    }

    #[test]
    fn px_to_pt_uses_96_dpi() {
        assert_eq!(px_to_pt(16.0), 12);
        assert_eq!(px_to_pt(96.0), 72);
        assert_eq!(px_to_pt(13.0), 10);
    }

    #[test]
    fn nearest_size_prefers_smaller_on_tie() {
        // 7 is equidistant from 6 and 8.
        assert_eq!(nearest_ladder_size(7), 6);
        assert_eq!(nearest_ladder_size(13), 12);
        assert_eq!(nearest_ladder_size(15), 14);
        assert_eq!(nearest_ladder_size(200), 96);
        assert_eq!(nearest_ladder_size(1), 6);
    }
}
