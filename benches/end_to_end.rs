use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use toy_rns_he::{BfvRnsBBuilder, BfvRnsBuilder, BgvRnsBuilder, CkksBuilder, CryptoContext};

fn packed_pipeline(c: &mut Criterion, name: &str, mut cc: CryptoContext) {
    let mut rng = ChaCha20Rng::seed_from_u64(123);
    let keys = cc.key_gen(&mut rng).unwrap();
    cc.eval_mult_key_gen(&keys.secret, &mut rng).unwrap();
    let values: Vec<i64> = (0..cc.batch_size() as i64).map(|i| i % 100).collect();
    let pt = cc.make_packed_plaintext(&values).unwrap();
    let ct = cc.encrypt(&keys.public, &pt, &mut rng).unwrap();

    let mut group = c.benchmark_group(name);
    group.bench_function("encrypt", |b| {
        b.iter(|| black_box(cc.encrypt(&keys.public, &pt, &mut rng).unwrap()));
    });
    group.bench_function("eval_mult_and_relinearize", |b| {
        b.iter(|| black_box(cc.eval_mult_and_relinearize(&ct, &ct).unwrap()));
    });
    group.bench_function("decrypt", |b| {
        b.iter(|| black_box(cc.decrypt(&keys.secret, &ct).unwrap()));
    });
    group.finish();
}

fn bench_bfv(c: &mut Criterion) {
    packed_pipeline(c, "bfvrns", BfvRnsBuilder::new().eval_mults(1).build().unwrap());
    packed_pipeline(c, "bfvrnsb", BfvRnsBBuilder::new().eval_mults(1).build().unwrap());
}

fn bench_bgv(c: &mut Criterion) {
    packed_pipeline(c, "bgvrns", BgvRnsBuilder::new().multiplicative_depth(2).build().unwrap());
}

fn bench_ckks(c: &mut Criterion) {
    let mut cc = CkksBuilder::new().multiplicative_depth(2).scale_bits(40).build().unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(321);
    let keys = cc.key_gen(&mut rng).unwrap();
    cc.eval_mult_key_gen(&keys.secret, &mut rng).unwrap();
    cc.eval_at_index_key_gen(&keys.secret, &[1], &mut rng).unwrap();
    let values: Vec<f64> = (0..cc.batch_size()).map(|i| i as f64 * 0.01).collect();
    let ct = cc
        .encrypt(&keys.public, &cc.make_real_packed_plaintext(&values).unwrap(), &mut rng)
        .unwrap();

    let mut group = c.benchmark_group("ckks");
    group.bench_function("mult_rescale", |b| {
        b.iter(|| black_box(cc.rescale(&cc.eval_mult_and_relinearize(&ct, &ct).unwrap()).unwrap()));
    });
    group.bench_function("rotate", |b| {
        b.iter(|| black_box(cc.eval_at_index(&ct, 1).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_bfv, bench_bgv, bench_ckks);
criterion_main!(benches);
