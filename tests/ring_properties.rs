use std::sync::Arc;

use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use toy_rns_he::math::primes::{first_prime, previous_prime};
use toy_rns_he::rings::{DcrtParams, DcrtPoly, Format, NttEngine};

const ORDER: u32 = 128;

fn params() -> Arc<DcrtParams> {
    let m = ORDER as u64;
    let q0 = first_prime(40, m).unwrap();
    let q1 = previous_prime(q0, m).unwrap();
    let q2 = first_prime(55, m).unwrap();
    Arc::new(DcrtParams::from_moduli(ORDER, &[q0, q1, q2], &NttEngine::new()).unwrap())
}

fn random_poly(params: &Arc<DcrtParams>, seed: u64, format: Format) -> DcrtPoly {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let values = params
        .moduli()
        .iter()
        .map(|&q| (0..params.ring_dim()).map(|_| rng.random_range(0..q)).collect())
        .collect();
    DcrtPoly::from_tower_values(params.clone(), values, format).unwrap()
}

fn odd_index() -> impl Strategy<Value = u64> {
    (0..ORDER as u64 / 2).prop_map(|k| 2 * k + 1)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn ntt_round_trip(seed in any::<u64>()) {
        let x = random_poly(&params(), seed, Format::Coefficient);
        let mut y = x.clone();
        y.switch_format();
        prop_assert_eq!(y.format(), Format::Evaluation);
        y.switch_format();
        prop_assert_eq!(y, x);
    }

    #[test]
    fn multiplication_distributes_over_addition(a in any::<u64>(), b in any::<u64>(), c in any::<u64>()) {
        let params = params();
        let (a, b, c) = (
            random_poly(&params, a, Format::Evaluation),
            random_poly(&params, b, Format::Evaluation),
            random_poly(&params, c, Format::Evaluation),
        );
        let left = a.times(&b.plus(&c).unwrap()).unwrap();
        let right = a.times(&b).unwrap().plus(&a.times(&c).unwrap()).unwrap();
        prop_assert_eq!(left, right);
    }

    #[test]
    fn automorphism_commutes_with_the_transform(seed in any::<u64>(), k in odd_index()) {
        let x = random_poly(&params(), seed, Format::Coefficient);
        let coefficient_side = x.automorphism_transform(k).unwrap().with_format(Format::Evaluation);
        let evaluation_side = x.with_format(Format::Evaluation).automorphism_transform(k).unwrap();
        prop_assert_eq!(coefficient_side, evaluation_side);
    }

    #[test]
    fn automorphisms_compose(seed in any::<u64>(), i in odd_index(), j in odd_index()) {
        let x = random_poly(&params(), seed, Format::Evaluation);
        let twice = x.automorphism_transform(i).unwrap().automorphism_transform(j).unwrap();
        let once = x.automorphism_transform(i * j % ORDER as u64).unwrap();
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn automorphisms_are_ring_homomorphisms(a in any::<u64>(), b in any::<u64>(), k in odd_index()) {
        let params = params();
        let a = random_poly(&params, a, Format::Evaluation);
        let b = random_poly(&params, b, Format::Evaluation);
        let left = a.times(&b).unwrap().automorphism_transform(k).unwrap();
        let right = a
            .automorphism_transform(k)
            .unwrap()
            .times(&b.automorphism_transform(k).unwrap())
            .unwrap();
        prop_assert_eq!(left, right);
    }
}

#[test]
fn even_indices_are_rejected() {
    let x = random_poly(&params(), 1, Format::Evaluation);
    assert!(x.automorphism_transform(4).is_err());
}
