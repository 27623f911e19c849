#[cfg(test)]
mod property_tests {
    use gymkit::algorithms::gae;
    use gymkit::memory::ReplayBuffer;
    use gymkit::metrics::{Aggregator, HistoricalValue};
    use gymkit::qtable::QTable;
    use gymkit::tensor::{
        clip, expand_dims, from_flat, hash_state, one_hot, squeeze, vector, z_norm, EqualWidthBinner, MinMaxNorm,
    };
    use ndarray::Array1;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn values_strategy(max_len: usize) -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(-100.0f32..100.0, 1..=max_len)
    }

    // A shape of up to three axes and matching flat data
    fn tensor_strategy() -> impl Strategy<Value = (Vec<f32>, Vec<usize>)> {
        prop::collection::vec(1usize..=4, 1..=3).prop_flat_map(|shape| {
            let size: usize = shape.iter().product();
            (prop::collection::vec(-10.0f32..10.0, size), Just(shape))
        })
    }

    proptest! {
        #[test]
        fn test_expand_then_squeeze_is_identity((data, shape) in tensor_strategy(), axis in 0usize..=3) {
            let x = from_flat(data, &shape).unwrap();
            let axis = axis.min(x.ndim());
            let expanded = expand_dims(&x, axis).unwrap();
            prop_assert_eq!(expanded.ndim(), x.ndim() + 1);
            prop_assert_eq!(squeeze(&expanded, axis).unwrap(), x);
        }

        #[test]
        fn test_max_aggregate_bounds_mean(values in prop::collection::vec(-100.0f64..100.0, 1..=50)) {
            let history: Vec<HistoricalValue> = values
                .iter()
                .enumerate()
                .map(|(t, &value)| HistoricalValue { name: "score".to_string(), value, timestep: t, episode: 0 })
                .collect();
            let max = Aggregator::Max.aggregate(&history);
            let mean = Aggregator::Mean.aggregate(&history);
            prop_assert!(max >= mean - 1e-9);
            prop_assert!(Aggregator::Min.aggregate(&history) <= mean + 1e-9);
        }

        #[test]
        fn test_hash_is_stable_for_clones((data, shape) in tensor_strategy()) {
            let x = from_flat(data, &shape).unwrap();
            prop_assert_eq!(hash_state(&x), hash_state(&x.clone()));
        }

        #[test]
        fn test_min_max_roundtrip(values in prop::collection::vec(-50.0f32..50.0, 1..=8)) {
            let low = vector(&vec![-50.0; values.len()]);
            let high = vector(&vec![50.0; values.len()]);
            let norm = MinMaxNorm::new(low, high).unwrap();
            let y = vector(&values).mapv(|v| (v + 50.0) / 100.0);
            let back = norm.norm(&norm.unnorm(&y).unwrap()).unwrap();
            for (a, b) in back.iter().zip(y.iter()) {
                prop_assert!((a - b).abs() < 1e-6);
            }
        }

        #[test]
        fn test_one_hot_has_single_one(n in 1usize..64, offset in 0usize..64) {
            let index = offset % n;
            let v = one_hot(index, n).unwrap();
            prop_assert_eq!(v.sum(), 1.0);
            prop_assert_eq!(v[index], 1.0);
        }

        #[test]
        fn test_clip_is_idempotent(values in values_strategy(20), a in -50.0f32..0.0, b in 0.0f32..50.0) {
            let x = vector(&values);
            let once = clip(&x, a, b);
            prop_assert_eq!(clip(&once, a, b), once.clone());
            prop_assert!(once.iter().all(|v| (a..=b).contains(v)));
        }

        #[test]
        fn test_z_norm_is_centered(values in values_strategy(30)) {
            let z = z_norm(Array1::from(values).view());
            prop_assert!((z.sum() / z.len() as f32).abs() < 1e-3);
        }

        #[test]
        fn test_qtable_returns_last_set(keys in prop::collection::vec((0u8..8, 0usize..3, -5.0f32..5.0), 1..40)) {
            let mut table = QTable::new(3);
            let mut expected = std::collections::HashMap::new();
            for (key, action, value) in keys {
                let state = vector(&[key as f32]);
                table.set(&state, action, value).unwrap();
                expected.insert((key, action), value);
            }
            for ((key, action), value) in expected {
                prop_assert_eq!(table.get(&vector(&[key as f32]), action).unwrap(), value);
            }
        }

        #[test]
        fn test_binner_stays_in_range(n in 1usize..20, t in 0.0f32..=1.0) {
            let binner = EqualWidthBinner::new(vec![n], vec![-2.0], vec![3.0]).unwrap();
            let value = -2.0 + t * 5.0;
            let bin = binner.bin(&vector(&[value])).unwrap()[0] as usize;
            prop_assert!(bin < n);
            if t == 1.0 {
                prop_assert_eq!(bin, n - 1);
            }
            if t == 0.0 {
                prop_assert_eq!(bin, 0);
            }
        }

        #[test]
        fn test_gae_output_lengths(rewards in values_strategy(40), gamma in 0.0f32..=1.0, lambda in 0.0f32..=1.0) {
            let t = rewards.len();
            let values = Array1::zeros(t + 1);
            let masks = Array1::from_shape_fn(t, |i| if i + 1 == t { 0.0 } else { 1.0 });
            let (returns, advantage) =
                gae(values.view(), masks.view(), Array1::from(rewards).view(), gamma, lambda).unwrap();
            prop_assert_eq!(returns.len(), t);
            prop_assert_eq!(advantage.len(), t);
        }

        #[test]
        fn test_full_sample_returns_everything(n in 1usize..50, seed in any::<u64>()) {
            let mut buffer = ReplayBuffer::new(n);
            for i in 0..n {
                buffer.remember(i);
            }
            let mut sampled: Vec<usize> =
                buffer.sample(n, &mut StdRng::seed_from_u64(seed)).unwrap().into_iter().copied().collect();
            sampled.sort_unstable();
            prop_assert_eq!(sampled, (0..n).collect::<Vec<_>>());
        }
    }
}
