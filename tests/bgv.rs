mod common;

use common::{init_tracing, rng, slotwise};
use rand_chacha::ChaCha20Rng;
use toy_rns_he::crypto::params::SecurityLevel;
use toy_rns_he::{BgvRnsBuilder, CryptoContext, ErrorKind, HeError};

fn context() -> CryptoContext {
    BgvRnsBuilder::new()
        .plaintext_modulus(65537)
        .security_level(SecurityLevel::NotSet)
        .ring_dim(64)
        .multiplicative_depth(2)
        .max_depth(3)
        .build()
        .unwrap()
}

#[test]
fn mod_reduce_after_every_product() {
    init_tracing();
    let mut cc = context();
    assert_eq!(cc.max_level(), 3);
    let mut rng = rng(11);
    let keys = cc.key_gen(&mut rng).unwrap();
    cc.eval_mult_key_gen(&keys.secret, &mut rng).unwrap();
    let a = [3, -4, 5, 100];
    let b = [7, 2, -9, 50];
    let c = [-1, 6, 2, 3];
    let encrypt = |v: &[i64], rng: &mut ChaCha20Rng| {
        cc.encrypt(&keys.public, &cc.make_packed_plaintext(v).unwrap(), rng)
            .unwrap()
    };
    let (ca, cb, cc_) = (encrypt(&a, &mut rng), encrypt(&b, &mut rng), encrypt(&c, &mut rng));

    let mut product = cc.eval_mult_and_relinearize(&ca, &cb).unwrap();
    cc.mod_reduce_in_place(&mut product).unwrap();
    assert_eq!(product.level(), 2);

    // `cc_` is still at the top level and is switched down to meet `product`.
    let mut product = cc.eval_mult_and_relinearize(&product, &cc_).unwrap();
    assert_eq!(product.level(), 2);
    cc.mod_reduce_in_place(&mut product).unwrap();
    assert_eq!(product.level(), 1);

    let mut out = cc.decrypt(&keys.secret, &product).unwrap();
    out.set_length(4);
    let expected = slotwise(&slotwise(&a, &b, |x, y| x * y), &c, |x, y| x * y);
    assert_eq!(out.packed_value().unwrap(), expected);

    let err = cc.mod_reduce(&product).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Capacity);
}

#[test]
fn mixed_levels_add_after_alignment() {
    let cc = context();
    let mut rng = rng(12);
    let keys = cc.key_gen(&mut rng).unwrap();
    let a = [1, 2, 3];
    let b = [10, 20, 30];
    let ca = cc.encrypt(&keys.public, &cc.make_packed_plaintext(&a).unwrap(), &mut rng).unwrap();
    let cb = cc.encrypt(&keys.public, &cc.make_packed_plaintext(&b).unwrap(), &mut rng).unwrap();
    let low = cc.compress(&cb, 1).unwrap();
    assert_eq!(low.level(), 1);

    let sum = cc.eval_add(&ca, &low).unwrap();
    assert_eq!(sum.level(), 1);
    let mut out = cc.decrypt(&keys.secret, &sum).unwrap();
    out.set_length(3);
    assert_eq!(out.packed_value().unwrap(), &[11, 22, 33]);

    let dropped = cc.level_reduce(&ca, 1).unwrap();
    assert_eq!(dropped.level(), 2);
    let mut out = cc.decrypt(&keys.secret, &dropped).unwrap();
    out.set_length(3);
    assert_eq!(out.packed_value().unwrap(), &a);

    assert!(matches!(cc.level_reduce(&ca, 3).unwrap_err(), HeError::OutOfLevels { .. }));
    assert!(matches!(cc.compress(&ca, 0).unwrap_err(), HeError::OutOfLevels { .. }));
}

#[test]
fn plaintext_operands_follow_the_ciphertext_level() {
    let cc = context();
    let mut rng = rng(13);
    let keys = cc.key_gen(&mut rng).unwrap();
    let ct = cc
        .encrypt(&keys.public, &cc.make_packed_plaintext(&[4, 5, 6]).unwrap(), &mut rng)
        .unwrap();
    let ct = cc.mod_reduce(&ct).unwrap();
    let pt = cc.make_packed_plaintext(&[2, -1, 3]).unwrap();

    let mut out = cc.decrypt(&keys.secret, &cc.eval_add_plain(&ct, &pt).unwrap()).unwrap();
    out.set_length(3);
    assert_eq!(out.packed_value().unwrap(), &[6, 4, 9]);

    let mut out = cc.decrypt(&keys.secret, &cc.eval_mult_plain(&ct, &pt).unwrap()).unwrap();
    out.set_length(3);
    assert_eq!(out.packed_value().unwrap(), &[8, -5, 18]);
}

#[test]
fn rotations_after_switching_down() {
    let mut cc = context();
    let mut rng = rng(14);
    let keys = cc.key_gen(&mut rng).unwrap();
    cc.eval_at_index_key_gen(&keys.secret, &[2], &mut rng).unwrap();
    let values: Vec<i64> = (1..=32).collect();
    let ct = cc
        .encrypt(&keys.public, &cc.make_packed_plaintext(&values).unwrap(), &mut rng)
        .unwrap();
    let ct = cc.mod_reduce(&ct).unwrap();
    let mut out = cc.decrypt(&keys.secret, &cc.eval_at_index(&ct, 2).unwrap()).unwrap();
    out.set_length(32);
    let mut expected = values.clone();
    expected.rotate_left(2);
    assert_eq!(out.packed_value().unwrap(), expected);
}
