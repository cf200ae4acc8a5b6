// SPDX-License-Identifier: GPL-3.0-only

//! Capture resolution negotiation

use crate::backends::camera::types::Size;
use crate::errors::{CaptureError, CaptureResult};

/// Manhattan distance between two sizes
pub fn size_distance(a: Size, b: Size) -> u32 {
    a.width.abs_diff(b.width) + a.height.abs_diff(b.height)
}

/// Pick the supported size closest to `requested`
///
/// Closeness is `|Δwidth| + |Δheight|`. On ties the entry that appears first
/// in `supported` wins. An empty list fails with
/// [`CaptureError::NoSupportedSizes`]; falling back to the requested size is
/// the caller's decision.
pub fn select_closest_size(supported: &[Size], requested: Size) -> CaptureResult<Size> {
    // min_by_key returns the last minimum, so fold explicitly to keep the first
    supported
        .iter()
        .copied()
        .fold(None, |best: Option<(Size, u32)>, candidate| {
            let distance = size_distance(candidate, requested);
            match best {
                Some((_, best_distance)) if best_distance <= distance => best,
                _ => Some((candidate, distance)),
            }
        })
        .map(|(size, _)| size)
        .ok_or(CaptureError::NoSupportedSizes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(list: &[(u32, u32)]) -> Vec<Size> {
        list.iter().map(|&(w, h)| Size::new(w, h)).collect()
    }

    #[test]
    fn test_exact_match_wins() {
        let supported = sizes(&[(640, 480), (1280, 720), (1920, 1080)]);
        assert_eq!(
            select_closest_size(&supported, Size::new(1280, 720)),
            Ok(Size::new(1280, 720))
        );
    }

    #[test]
    fn test_closest_by_manhattan_distance() {
        let supported = sizes(&[(640, 480), (1280, 720), (1920, 1080)]);
        // |1200-1280| + |700-720| = 100, far smaller than the others
        assert_eq!(
            select_closest_size(&supported, Size::new(1200, 700)),
            Ok(Size::new(1280, 720))
        );
    }

    #[test]
    fn test_tie_keeps_first_entry() {
        // Both are 100 away from 1000x1000
        let supported = sizes(&[(1100, 1000), (900, 1000)]);
        assert_eq!(
            select_closest_size(&supported, Size::new(1000, 1000)),
            Ok(Size::new(1100, 1000))
        );

        let reversed = sizes(&[(900, 1000), (1100, 1000)]);
        assert_eq!(
            select_closest_size(&reversed, Size::new(1000, 1000)),
            Ok(Size::new(900, 1000))
        );
    }

    #[test]
    fn test_empty_list_fails() {
        assert_eq!(
            select_closest_size(&[], Size::new(720, 1280)),
            Err(CaptureError::NoSupportedSizes)
        );
    }

    #[test]
    fn test_result_is_minimal_for_many_requests() {
        let supported = sizes(&[
            (176, 144),
            (320, 240),
            (640, 480),
            (720, 480),
            (1280, 720),
            (1280, 960),
            (1920, 1080),
        ]);
        for w in (0..2200).step_by(97) {
            for h in (0..1400).step_by(89) {
                let requested = Size::new(w, h);
                let chosen = select_closest_size(&supported, requested).unwrap();
                assert!(supported.contains(&chosen));
                let best = size_distance(chosen, requested);
                assert!(
                    supported
                        .iter()
                        .all(|s| size_distance(*s, requested) >= best),
                    "{} is not minimal for {}",
                    chosen,
                    requested
                );
            }
        }
    }
}
