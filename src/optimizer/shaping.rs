//! Turns a raw replica-count solution into an integer traffic-percentage
//! split: largest-remainder normalization, rate-limited smoothing against
//! the current split, and GPU-revision damping (spec.md §4.5).

use std::collections::HashMap;

/// Distributes `total` (normally 100) across `weights` proportionally,
/// rounding down and handing the leftover units to the largest fractional
/// remainders first. Mirrors `scale_dict_values_to_100_integers` /
/// `scale_to_100_integers` in the Python prototype.
pub fn largest_remainder(weights: &[(String, f64)], total: u32) -> Vec<(String, u32)> {
    let sum: f64 = weights.iter().map(|(_, w)| w.max(0.0)).sum();
    if sum <= 0.0 || weights.is_empty() {
        return even_split(weights, total);
    }

    let scaled: Vec<(String, f64)> = weights
        .iter()
        .map(|(name, w)| (name.clone(), w.max(0.0) / sum * total as f64))
        .collect();

    let mut floors: Vec<(String, u32, f64)> = scaled
        .iter()
        .map(|(name, v)| (name.clone(), v.floor() as u32, v.fract()))
        .collect();

    let assigned: u32 = floors.iter().map(|(_, f, _)| *f).sum();
    let mut remainder = total.saturating_sub(assigned);

    let mut order: Vec<usize> = (0..floors.len()).collect();
    order.sort_by(|&a, &b| {
        floors[b]
            .2
            .partial_cmp(&floors[a].2)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for &idx in order.iter() {
        if remainder == 0 {
            break;
        }
        floors[idx].1 += 1;
        remainder -= 1;
    }

    floors.into_iter().map(|(name, count, _)| (name, count)).collect()
}

fn even_split(weights: &[(String, f64)], total: u32) -> Vec<(String, u32)> {
    if weights.is_empty() {
        return Vec::new();
    }
    let base = total / weights.len() as u32;
    let mut remainder = total % weights.len() as u32;
    weights
        .iter()
        .map(|(name, _)| {
            let extra = if remainder > 0 {
                remainder -= 1;
                1
            } else {
                0
            };
            (name.clone(), base + extra)
        })
        .collect()
}

/// Caps the per-tick change in each revision's traffic percentage to
/// `adjustment_factor * max(current, proposed, 1.0)`, then renormalizes and
/// largest-remainder-redistributes back to an integer split summing to 100
/// (spec.md §4.5 smoothing, `get_small_traffic_adjustments`).
pub fn smooth(
    current: &HashMap<String, u32>,
    proposed: &HashMap<String, u32>,
    adjustment_factor: f64,
) -> Vec<(String, u32)> {
    let mut names: Vec<String> = proposed.keys().cloned().collect();
    names.sort();

    let mut next: Vec<(String, f64)> = names
        .iter()
        .map(|name| {
            let current_v = *current.get(name).unwrap_or(&0) as f64;
            let proposed_v = *proposed.get(name).unwrap_or(&0) as f64;
            let cap = adjustment_factor * current_v.max(proposed_v).max(1.0);
            let delta = (proposed_v - current_v).clamp(-cap, cap);
            (name.clone(), (current_v + delta).max(0.0))
        })
        .collect();

    let sum: f64 = next.iter().map(|(_, v)| *v).sum();
    if sum <= 0.0 {
        next = names.iter().map(|n| (n.clone(), 1.0)).collect();
    }

    largest_remainder(&next, 100)
}

/// Replaces each GPU-bearing revision's weight with `weight / divisor`
/// (floored) and redistributes the released amount equally across the
/// other revisions present, then renormalizes to 100 (spec.md §4.5, §9 Open
/// Question (b): `divisor` is configurable, default 8).
pub fn dampen_gpu(weights: Vec<(String, u32)>, gpu_revisions: &[String], divisor: u32) -> Vec<(String, u32)> {
    if divisor == 0 || gpu_revisions.is_empty() {
        return weights;
    }

    let non_gpu_count = weights
        .iter()
        .filter(|(name, _)| !gpu_revisions.contains(name))
        .count();

    let mut released = 0u32;
    let mut dampened: Vec<(String, u32)> = weights
        .into_iter()
        .map(|(name, weight)| {
            if gpu_revisions.contains(&name) {
                let reduced = weight / divisor;
                released += weight - reduced;
                (name, reduced)
            } else {
                (name, weight)
            }
        })
        .collect();

    if non_gpu_count > 0 && released > 0 {
        let share = released / non_gpu_count as u32;
        let mut extra = released % non_gpu_count as u32;
        for (name, weight) in dampened.iter_mut() {
            if gpu_revisions.contains(name) {
                continue;
            }
            *weight += share;
            if extra > 0 {
                *weight += 1;
                extra -= 1;
            }
        }
    }

    correct_overshoot(dampened)
}

/// After integer redistribution the total can drift slightly off 100;
/// decrement the smallest positive entries until it's exact again.
fn correct_overshoot(mut weights: Vec<(String, u32)>) -> Vec<(String, u32)> {
    let total: i64 = weights.iter().map(|(_, w)| *w as i64).sum();
    let mut overshoot = total - 100;

    if overshoot > 0 {
        let mut order: Vec<usize> = (0..weights.len()).collect();
        order.sort_by_key(|&i| weights[i].1);
        for idx in order {
            if overshoot == 0 {
                break;
            }
            if weights[idx].1 > 0 {
                weights[idx].1 -= 1;
                overshoot -= 1;
            }
        }
    } else if overshoot < 0 {
        let mut order: Vec<usize> = (0..weights.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(weights[i].1));
        for idx in order {
            if overshoot == 0 {
                break;
            }
            weights[idx].1 += 1;
            overshoot += 1;
        }
    }

    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn largest_remainder_sums_to_total() {
        let weights = vec![
            ("a".to_string(), 1.0),
            ("b".to_string(), 1.0),
            ("c".to_string(), 1.0),
        ];
        let result = largest_remainder(&weights, 100);
        assert_eq!(result.iter().map(|(_, v)| *v).sum::<u32>(), 100);
    }

    #[test]
    fn smooth_caps_large_jumps() {
        let mut current = HashMap::new();
        current.insert("a".to_string(), 90u32);
        current.insert("b".to_string(), 10u32);
        let mut proposed = HashMap::new();
        proposed.insert("a".to_string(), 10u32);
        proposed.insert("b".to_string(), 90u32);

        let result = smooth(&current, &proposed, 0.25);
        let a = result.iter().find(|(n, _)| n == "a").unwrap().1;
        assert!(a >= 65 && a <= 95, "a changed too abruptly: {a}");
        assert_eq!(result.iter().map(|(_, v)| *v).sum::<u32>(), 100);
    }

    #[test]
    fn dampen_gpu_redistributes_and_sums_to_100() {
        let weights = vec![
            ("cpu-rev".to_string(), 50),
            ("gpu-rev".to_string(), 50),
        ];
        let result = dampen_gpu(weights, &["gpu-rev".to_string()], 8);
        assert_eq!(result.iter().map(|(_, v)| *v).sum::<u32>(), 100);
        let gpu = result.iter().find(|(n, _)| n == "gpu-rev").unwrap().1;
        assert_eq!(gpu, 50 / 8);
    }
}
