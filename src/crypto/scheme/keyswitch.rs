//! BV key switching.
//!
//! A component `c` multiplying an old secret `s'` is split into digits
//! `d_i` with `sum d_i g_i(s') = c s'`; pairing the digits with the key
//! components gives `(sum d_i b_i, sum d_i a_i)`, which decrypts to `c s'`
//! under the target secret plus a small error.

use tracing::{debug, instrument};

use crate::crypto::errors::{HeError, HeResult};
use crate::crypto::types::Ciphertext;
use crate::keys::EvalKey;
use crate::rings::{DcrtPoly, Format};

/// The pair `(delta_0, delta_1)` replacing `c` in a ciphertext.
pub fn switch_component(key: &EvalKey, c: &DcrtPoly) -> HeResult<(DcrtPoly, DcrtPoly)> {
    let towers = c.len();
    let count = key.components_for(towers)?;
    let digits = c.crt_decompose(key.window())?;
    if digits.len() != count {
        return Err(HeError::ComponentCount {
            operation: "key_switch",
            expected: count,
            actual: digits.len(),
        });
    }
    let params = c.params().clone();
    let mut delta_0 = DcrtPoly::zero(params.clone(), Format::Evaluation);
    let mut delta_1 = DcrtPoly::zero(params, Format::Evaluation);
    for (digit, (b, a)) in digits.iter().zip(key.b.iter().zip(&key.a)) {
        if b.len() == towers {
            delta_0.plus_assign(&digit.times(b)?)?;
            delta_1.plus_assign(&digit.times(a)?)?;
        } else {
            delta_0.plus_assign(&digit.times(&b.truncated(towers)?)?)?;
            delta_1.plus_assign(&digit.times(&a.truncated(towers)?)?)?;
        }
    }
    Ok((delta_0, delta_1))
}

/// Re-encrypts a two-component ciphertext under the key's target secret:
/// `(c_0 + delta_0, delta_1)`.
#[instrument(skip_all)]
pub fn key_switch_in_place(key: &EvalKey, ciphertext: &mut Ciphertext) -> HeResult<()> {
    if ciphertext.len() != 2 {
        return Err(HeError::ComponentCount {
            operation: "key_switch",
            expected: 2,
            actual: ciphertext.len(),
        });
    }
    let elements = ciphertext.elements_mut();
    let (delta_0, delta_1) = switch_component(key, &elements[1])?;
    elements[0].set_format(Format::Evaluation);
    elements[0].plus_assign(&delta_0)?;
    elements[1] = delta_1;
    ciphertext.set_key_tag(key.key_tag());
    Ok(())
}

/// Folds components `c_j`, `j >= 2`, back into `(c_0, c_1)` using the keys
/// `s^j -> s`; `keys[j - 2]` switches from `s^j`.
#[instrument(skip_all, fields(components = ciphertext.len()))]
pub fn relinearize_in_place(keys: &[EvalKey], ciphertext: &mut Ciphertext) -> HeResult<()> {
    let highest = ciphertext.len() - 1;
    if highest < 2 {
        return Ok(());
    }
    if highest - 1 > keys.len() {
        return Err(HeError::DepthExceeded {
            depth: highest,
            max: keys.len() + 1,
        });
    }
    let elements = ciphertext.elements_mut();
    for e in elements.iter_mut().take(2) {
        e.set_format(Format::Evaluation);
    }
    while elements.len() > 2 {
        let j = elements.len() - 1;
        let Some(c_j) = elements.pop() else { break };
        let (delta_0, delta_1) = switch_component(&keys[j - 2], &c_j)?;
        elements[0].plus_assign(&delta_0)?;
        elements[1].plus_assign(&delta_1)?;
    }
    debug!("relinearized to two components");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::crypto::params::{CkksParams, RlweParams, RlweSettings, SecurityLevel};
    use crate::keys::SecretKey;
    use crate::math::bigint::CrtReconstruction;

    fn params(window: u32) -> RlweParams {
        let settings = RlweSettings {
            security_level: SecurityLevel::NotSet,
            relin_window: window,
            ..RlweSettings::default()
        };
        CkksParams::from_chain(settings, 30, 64, &[1073741953, 1073742209, 1073742721])
            .unwrap()
            .rlwe()
            .clone()
    }

    fn max_noise(x: &DcrtPoly) -> f64 {
        let crt = CrtReconstruction::new(&x.params().moduli()).unwrap();
        let coeff = x.clone().with_format(Format::Coefficient);
        coeff
            .crt_interpolate_f64(&crt)
            .unwrap()
            .into_iter()
            .fold(0.0, |m, v| m.max(v.abs()))
    }

    fn check_switch(window: u32, towers: usize) {
        let params = params(window);
        let mut rng = ChaCha20Rng::seed_from_u64(21 + window as u64);
        let old = SecretKey::generate(&params, &mut rng).unwrap();
        let new = SecretKey::generate(&params, &mut rng).unwrap();
        let key = EvalKey::generate(&old.s, &new, &params, 1, &mut rng).unwrap();

        let level = params.params_at(towers).unwrap();
        let c = params.sample_uniform(&level, &mut rng).unwrap();
        let (d0, d1) = switch_component(&key, &c).unwrap();

        let expected = c.times(&old.at_level(towers).unwrap()).unwrap();
        let got = d0.plus(&d1.times(&new.at_level(towers).unwrap()).unwrap()).unwrap();
        let error = got.minus(&expected).unwrap();
        let bound = if window == 0 { 2f64.powi(40) } else { 2f64.powi(25) };
        let noise = max_noise(&error);
        assert!(noise < bound, "window {window}: {noise}");
    }

    #[test]
    fn switching_preserves_the_product_up_to_small_error() {
        check_switch(0, 3);
        check_switch(8, 3);
    }

    #[test]
    fn keys_cover_lower_levels() {
        check_switch(0, 2);
        check_switch(8, 1);
    }
}
