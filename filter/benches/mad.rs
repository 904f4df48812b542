use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use oracle_filter::{execute, FilterCosts, FILTER_TYPE_MAD};
use oracle_gas::GasMeter;
use oracle_primitives::{Identity, Reveal, RevealBody};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::hint::black_box;

const COSTS: FilterCosts = FilterCosts {
    none: 0,
    mode_multiplier: 0,
    mad_multiplier: 0,
};

fn input(path: &str) -> Vec<u8> {
    let mut input = vec![FILTER_TYPE_MAD];
    input.extend_from_slice(&1_500_000u64.to_be_bytes());
    input.push(0x07);
    input.extend_from_slice(&(path.len() as u64).to_be_bytes());
    input.extend_from_slice(path.as_bytes());
    input
}

fn bench_mad(c: &mut Criterion) {
    let mut group = c.benchmark_group("mad");
    let input = input("$.price");
    for &n in &[10u16, 50, 100] {
        let mut rng = StdRng::seed_from_u64(n as u64);
        let reveals: Vec<Reveal> = (0..n)
            .map(|i| {
                let price: u128 = rng.gen_range(1_000_000_000_000..1_000_100_000_000);
                Reveal {
                    executor: Identity::new(i.to_be_bytes().to_vec()),
                    body: RevealBody {
                        reveal: format!(r#"{{"price":{price}}}"#).into_bytes(),
                        ..Default::default()
                    },
                }
            })
            .collect();
        group.bench_with_input(BenchmarkId::new("u256", n), &reveals, |b, reveals| {
            b.iter(|| {
                let mut meter = GasMeter::new(u64::MAX, u64::MAX, 0, 1, 0);
                black_box(execute(reveals, &input, n, &COSTS, &mut meter));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_mad);
criterion_main!(benches);
