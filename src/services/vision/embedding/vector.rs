//! Fixed-dimension vector contract and score normalization

/// Pads with zeros on the right or truncates so the result has exactly `dim` entries.
///
/// Every vector that crosses the extractor/store boundary goes through here.
pub fn fit_dimension(mut vector: Vec<f32>, dim: usize) -> Vec<f32> {
    if vector.len() > dim {
        vector.truncate(dim);
    } else if vector.len() < dim {
        vector.resize(dim, 0.0);
    }
    vector
}

/// Numerically stable softmax over one row of logits.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }

    let max = logits
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    let max = if max.is_finite() { max } else { 0.0 };

    let exps: Vec<f32> = logits.iter().map(|&value| (value - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        let uniform = 1.0 / logits.len() as f32;
        return vec![uniform; logits.len()];
    }

    exps.into_iter().map(|value| value / sum).collect()
}

/// Index and value of the largest entry.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, value)| !value.is_nan())
        .fold(None, |best, (idx, value)| match best {
            Some((_, best_value)) if best_value >= value => best,
            _ => Some((idx, value)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pads_short_vectors() {
        assert_eq!(fit_dimension(vec![1.0, 2.0], 4), vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn truncates_long_vectors() {
        assert_eq!(fit_dimension(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
    }

    #[test]
    fn mock_three_values_fill_768() {
        let fitted = fit_dimension(vec![0.1, 0.2, 0.3], 768);
        assert_eq!(fitted.len(), 768);
        assert_eq!(&fitted[..3], &[0.1, 0.2, 0.3]);
        assert!(fitted[3..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn softmax_of_equal_logits_is_uniform() {
        let probs = softmax(&[2.0, 2.0, 2.0, 2.0]);
        assert!(probs.iter().all(|p| (p - 0.25).abs() < 1e-6));
    }

    #[test]
    fn softmax_survives_huge_logits() {
        let probs = softmax(&[1000.0, 1000.0, -1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
        assert!(probs[2] < 1e-6);
    }

    #[test]
    fn softmax_of_empty_is_empty() {
        assert!(softmax(&[]).is_empty());
    }

    #[test]
    fn argmax_picks_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(argmax(&[]), None);
    }

    proptest! {
        #[test]
        fn longer_vectors_keep_prefix(v in prop::collection::vec(-10.0f32..10.0, 1..2048), dim in 1usize..1024) {
            prop_assume!(v.len() > dim);
            let fitted = fit_dimension(v.clone(), dim);
            prop_assert_eq!(&fitted[..], &v[..dim]);
        }

        #[test]
        fn shorter_vectors_are_zero_padded(v in prop::collection::vec(-10.0f32..10.0, 0..512), extra in 1usize..512) {
            let dim = v.len() + extra;
            let fitted = fit_dimension(v.clone(), dim);
            prop_assert_eq!(fitted.len(), dim);
            prop_assert_eq!(&fitted[..v.len()], &v[..]);
            prop_assert!(fitted[v.len()..].iter().all(|x| *x == 0.0));
        }

        #[test]
        fn equal_length_passes_through(v in prop::collection::vec(-10.0f32..10.0, 1..1024)) {
            let dim = v.len();
            prop_assert_eq!(fit_dimension(v.clone(), dim), v);
        }

        #[test]
        fn softmax_sums_to_one(logits in prop::collection::vec(-50.0f32..50.0, 1..1000)) {
            let probs = softmax(&logits);
            let sum: f32 = probs.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-3);
            prop_assert!(probs.iter().all(|p| *p >= 0.0 && *p <= 1.0));
        }
    }
}
