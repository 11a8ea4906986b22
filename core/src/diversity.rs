//! Domain-diversity re-ranking: bounds per-domain dominance near the top
//! of a fused result list without disturbing relative score order.

/// Reorder and truncate a score-ordered result list so no domain
/// contributes more than `max_per_domain` results, then backfill from
/// saturated domains only if `target_count` is not yet reached.
///
/// Relative order among accepted results is preserved, both overall and
/// within a domain; a lower-scored result can only pass a higher-scored
/// one through the cap-skip itself.
pub fn diversify<T, F>(
    ranked: Vec<T>,
    domain_of: F,
    max_per_domain: usize,
    target_count: usize,
) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    if max_per_domain == 0 {
        return Vec::new();
    }

    let mut selected: Vec<T> = Vec::new();
    let mut overflow: Vec<T> = Vec::new();
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for item in ranked {
        if selected.len() >= target_count {
            break;
        }
        let count = counts.entry(domain_of(&item).to_string()).or_insert(0);
        if *count < max_per_domain {
            *count += 1;
            selected.push(item);
        } else {
            overflow.push(item);
        }
    }

    // Backfill pass: saturated-domain results, still in score order.
    for item in overflow {
        if selected.len() >= target_count {
            break;
        }
        selected.push(item);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(domain: &str, score: u32) -> (String, u32) {
        (domain.to_string(), score)
    }

    #[test]
    fn caps_dominant_domain_and_backfills() {
        // x.com sweeps the top five, y.com trails.
        let mut ranked = Vec::new();
        for s in (5..10).rev() {
            ranked.push(item("x.com", s + 10));
        }
        for s in (0..5).rev() {
            ranked.push(item("y.com", s));
        }
        let out = diversify(ranked, |r| r.0.as_str(), 2, 10);
        assert_eq!(out[0].0, "x.com");
        assert_eq!(out[1].0, "x.com");
        // Third slot goes to the best y.com result, not the 3rd-best x.com.
        assert_eq!(out[2].0, "y.com");
        assert_eq!(out[2].1, 4);
        // Everything survives via backfill.
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn constrained_prefix_respects_cap() {
        let ranked = vec![
            item("a.com", 9),
            item("a.com", 8),
            item("a.com", 7),
            item("b.com", 6),
            item("c.com", 5),
        ];
        let out = diversify(ranked, |r| r.0.as_str(), 1, 3);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], item("a.com", 9));
        assert_eq!(out[1], item("b.com", 6));
        assert_eq!(out[2], item("c.com", 5));
    }

    #[test]
    fn same_domain_order_is_never_swapped() {
        let ranked = vec![
            item("a.com", 9),
            item("b.com", 8),
            item("a.com", 7),
            item("a.com", 6),
            item("b.com", 5),
        ];
        let out = diversify(ranked, |r| r.0.as_str(), 2, 5);
        let a_scores: Vec<u32> = out.iter().filter(|r| r.0 == "a.com").map(|r| r.1).collect();
        assert_eq!(a_scores, vec![9, 7, 6]);
    }

    #[test]
    fn truncates_to_target() {
        let ranked = vec![item("a.com", 3), item("b.com", 2), item("c.com", 1)];
        let out = diversify(ranked, |r| r.0.as_str(), 3, 2);
        assert_eq!(out.len(), 2);
    }
}
