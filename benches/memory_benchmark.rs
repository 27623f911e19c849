//! Replay sampling and policy prediction throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gymkit::activations::Activation;
use gymkit::env::Outcome;
use gymkit::memory::{Event, ReplayBuffer};
use gymkit::policy::{Policy, PolicyConfig};
use gymkit::tensor::{stack_rows, vector, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn filled_buffer(size: usize, rng: &mut StdRng) -> ReplayBuffer<Event> {
    let mut buffer = ReplayBuffer::new(size);
    for _ in 0..size {
        let state = vector(&[rng.gen(), rng.gen(), rng.gen(), rng.gen()]);
        let outcome = Outcome { observation: state.clone(), action: 0, reward: 1.0, done: false };
        buffer.remember(Event::new(state, 0, outcome));
    }
    buffer
}

fn bench_replay_sampling(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let buffer = filled_buffer(10_000, &mut rng);

    let mut group = c.benchmark_group("replay_sample");
    for batch_size in [32, 128, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, &n| {
            b.iter(|| {
                let batch = buffer.sample(n, &mut rng).unwrap();
                let states: Vec<&Tensor> = batch.iter().map(|e| &e.state).collect();
                black_box(stack_rows(&states).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_policy_prediction(c: &mut Criterion) {
    let config = PolicyConfig::default().hidden(vec![64, 64]).output_activation(Activation::Linear).seed(0);
    let mut policy = Policy::new("bench", 4, 2, &config).unwrap();
    let state = vector(&[0.1, -0.2, 0.3, -0.4]);
    c.bench_function("policy_predict", |b| b.iter(|| black_box(policy.predict(&state).unwrap())));

    let mut rng = StdRng::seed_from_u64(7);
    let buffer = filled_buffer(256, &mut rng);
    let states: Vec<&Tensor> = buffer.iter().map(|e| &e.state).collect();
    let batch = stack_rows(&states).unwrap();
    c.bench_function("policy_predict_batch_256", |b| {
        b.iter(|| black_box(policy.predict_batch(batch.view()).unwrap()))
    });
}

criterion_group!(benches, bench_replay_sampling, bench_policy_prediction);
criterion_main!(benches);
