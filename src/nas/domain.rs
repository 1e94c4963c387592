//! Discrete value domains
//!
//! Helpers for the ordered integer domains (channel widths, layer counts)
//! that mutation walks over.

use rand::Rng;

use crate::error::{Result, SegNasError};

/// Inclusive range `min..=max` stepped by `step`.
pub fn discrete_range(min: u32, max: u32, step: u32) -> Vec<u32> {
    if step == 0 || min > max {
        return Vec::new();
    }
    (min..=max).step_by(step as usize).collect()
}

/// Pick a value adjacent to `current` in `domain`.
///
/// The domain is sorted and deduplicated first. If `current` is not a member,
/// the closest member (lowest on ties) is used as the anchor. An interior
/// anchor always moves one step left or right; at a boundary the anchor itself
/// may be returned.
pub fn random_neighbor<R: Rng + ?Sized>(domain: &[u32], current: u32, rng: &mut R) -> Result<u32> {
    let mut values = domain.to_vec();
    values.sort_unstable();
    values.dedup();

    if values.is_empty() {
        return Err(SegNasError::InvalidInput(
            "Cannot pick a neighbor from an empty domain".to_string(),
        ));
    }

    let anchor = match values.binary_search(&current) {
        Ok(idx) => idx,
        Err(_) => values
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| (i64::from(**v) - i64::from(current)).abs())
            .map(|(idx, _)| idx)
            .unwrap_or(0),
    };

    let has_left = anchor > 0;
    let has_right = anchor + 1 < values.len();
    let offset: i64 = match (has_left, has_right) {
        (true, true) => {
            if rng.gen_bool(0.5) {
                -1
            } else {
                1
            }
        }
        (true, false) => rng.gen_range(-1..=0),
        (false, true) => rng.gen_range(0..=1),
        (false, false) => 0,
    };

    Ok(values[(anchor as i64 + offset) as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_discrete_range() {
        assert_eq!(discrete_range(8, 48, 8), vec![8, 16, 24, 32, 40, 48]);
        assert_eq!(discrete_range(8, 20, 8), vec![8, 16]);
        assert!(discrete_range(8, 4, 8).is_empty());
        assert!(discrete_range(8, 16, 0).is_empty());
    }

    #[test]
    fn test_neighbor_stays_in_domain() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let domain = [8, 16, 24, 32, 40, 48];
        for current in [0, 8, 13, 24, 48, 100] {
            for _ in 0..50 {
                let v = random_neighbor(&domain, current, &mut rng).unwrap();
                assert!(domain.contains(&v));
            }
        }
    }

    #[test]
    fn test_neighbor_of_interior_value_moves() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let domain = [8, 16, 24];
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let v = random_neighbor(&domain, 16, &mut rng).unwrap();
            assert_ne!(v, 16);
            seen.insert(v);
        }
        assert!(seen.contains(&8));
        assert!(seen.contains(&24));
    }

    #[test]
    fn test_interior_anchor_never_repeats() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(99);
        let domain = [8, 16, 24, 32, 40, 48];
        for current in [16, 24, 32, 40] {
            let unchanged = (0..300)
                .filter(|_| random_neighbor(&domain, current, &mut rng).unwrap() == current)
                .count();
            assert_eq!(unchanged, 0, "interior value {} was returned unchanged", current);
        }
    }

    #[test]
    fn test_single_value_domain() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        for current in [1, 8, 64] {
            assert_eq!(random_neighbor(&[8], current, &mut rng).unwrap(), 8);
        }
    }

    #[test]
    fn test_boundary_collapses_to_available_side() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        for _ in 0..100 {
            let v = random_neighbor(&[1, 2, 3], 1, &mut rng).unwrap();
            assert!(v == 1 || v == 2);
            let v = random_neighbor(&[1, 2, 3], 3, &mut rng).unwrap();
            assert!(v == 2 || v == 3);
        }
    }

    #[test]
    fn test_off_domain_value_anchors_to_closest() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        for _ in 0..100 {
            // closest to 45 is 48, the upper boundary
            let v = random_neighbor(&[8, 16, 24, 32, 40, 48], 45, &mut rng).unwrap();
            assert!(v == 40 || v == 48);
        }
    }

    #[test]
    fn test_empty_domain_is_error() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        assert!(random_neighbor(&[], 8, &mut rng).is_err());
    }
}
