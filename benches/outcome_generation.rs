use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal_macros::dec;
use wagering::games::{OutcomeGenerator, PayTable};

fn bench_generate(c: &mut Criterion) {
    let three = OutcomeGenerator::new(PayTable::three_reel(), dec!(96.5)).unwrap();
    let five = OutcomeGenerator::new(PayTable::five_reel(), dec!(96.5)).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    c.bench_function("generate_three_reel", |b| {
        b.iter(|| three.generate(black_box(dec!(1.00)), &mut rng))
    });
    c.bench_function("generate_five_reel", |b| {
        b.iter(|| five.generate(black_box(dec!(1.00)), &mut rng))
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let table = PayTable::five_reel();
    let reels = [0usize, 0, 0, 3, 4];
    c.bench_function("evaluate_five_reel", |b| {
        b.iter(|| table.evaluate(black_box(&reels)))
    });
}

criterion_group!(benches, bench_generate, bench_evaluate);
criterion_main!(benches);
