//! `CryptoContext`: the user-facing handle tying a scheme's parameters to
//! its encoders and evaluation keys.
//!
//! Every binary operation checks that its operands come from the same scheme
//! and key, then brings them to a common level (and, for CKKS, a common
//! scale degree) before combining them. Evaluation keys are stored per secret
//! key tag, so one context can serve several key pairs.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use num_complex::Complex64;
use rand::Rng;
use tracing::{debug, instrument, warn};

use super::errors::{HeError, HeResult};
use super::params::{CkksParams, RlweParams, SchemeKind, SchemeParams};
use super::scheme::{Decrypted, SchemeOps, keyswitch};
use super::types::{Ciphertext, Plaintext};
use crate::encoding::{
    CkksEncoder, EncodingError, EncodingKind, PackedEncoder, PlaintextValue, ckks_packed::scaled_element, coef_packed,
    string,
};
use crate::keys::{EvalKey, KeyPair, KeyTag, PublicKey, SecretKey};
use crate::math::modular::{centered, inv_mod, pow_mod};
use crate::rings::{DcrtParams, DcrtPoly, Format, RingResult};

/// Generator of the rotation subgroup of `Z_m^*`.
const ROTATION_GENERATOR: u64 = 5;

#[derive(Debug, Clone)]
pub struct CryptoContext {
    params: Arc<SchemeParams>,
    packed: Option<PackedEncoder>,
    ckks: Option<CkksEncoder>,
    batch_size: usize,
    mult_keys: HashMap<KeyTag, Vec<EvalKey>>,
    rotation_keys: HashMap<KeyTag, BTreeMap<u64, EvalKey>>,
}

impl CryptoContext {
    /// Wraps a parameter set, building its CRT tables first if needed.
    pub fn new(mut params: SchemeParams) -> HeResult<Self> {
        if !params.is_precomputed() {
            params.precompute()?;
        }
        let kind = params.kind();
        let rlwe = params.rlwe();
        let n = rlwe.ring_dim();
        let (batch_size, packed, ckks) = if kind == SchemeKind::Ckks {
            let slots = match rlwe.batch_size() {
                0 => n / 2,
                b => b,
            };
            (slots, None, Some(CkksEncoder::new(n, slots)?))
        } else {
            let packed = PackedEncoder::new(rlwe.plaintext_modulus(), rlwe.cyclotomic_order()).ok();
            if packed.is_none() {
                debug!(t = rlwe.plaintext_modulus(), "plaintext modulus does not support packing");
            }
            let slots = match rlwe.batch_size() {
                0 => n,
                b => b.min(n),
            };
            (slots, packed, None)
        };
        debug!(scheme = ?kind, ring_dim = n, towers = rlwe.element_params().len(), batch_size, "crypto context");
        Ok(Self {
            params: Arc::new(params),
            packed,
            ckks,
            batch_size,
            mult_keys: HashMap::new(),
            rotation_keys: HashMap::new(),
        })
    }

    pub fn params(&self) -> &SchemeParams {
        &self.params
    }

    pub fn scheme(&self) -> SchemeKind {
        self.params.kind()
    }

    pub fn rlwe(&self) -> &RlweParams {
        self.params.rlwe()
    }

    pub fn ring_dim(&self) -> usize {
        self.rlwe().ring_dim()
    }

    pub fn cyclotomic_order(&self) -> u32 {
        self.rlwe().cyclotomic_order()
    }

    pub fn plaintext_modulus(&self) -> u64 {
        self.rlwe().plaintext_modulus()
    }

    pub fn element_params(&self) -> &Arc<DcrtParams> {
        self.rlwe().element_params()
    }

    /// Slots carried by a packed plaintext.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of towers in the full chain.
    pub fn max_level(&self) -> usize {
        self.element_params().len()
    }

    fn ckks_params(&self, operation: &'static str) -> HeResult<&CkksParams> {
        match &*self.params {
            SchemeParams::Ckks(p) => Ok(p),
            other => Err(HeError::NotImplemented {
                operation,
                scheme: other.kind(),
            }),
        }
    }

    fn not_implemented(&self, operation: &'static str) -> HeError {
        HeError::NotImplemented {
            operation,
            scheme: self.scheme(),
        }
    }

    // ─── Keys ────────────────────────────────────────────────────────────────

    #[instrument(skip_all, fields(scheme = ?self.scheme()))]
    pub fn key_gen<R: Rng + ?Sized>(&self, rng: &mut R) -> HeResult<KeyPair> {
        self.params.key_gen(rng)
    }

    /// Key switching from `old` to `new`.
    pub fn key_switch_gen<R: Rng + ?Sized>(
        &self,
        old: &SecretKey,
        new: &SecretKey,
        rng: &mut R,
    ) -> HeResult<EvalKey> {
        EvalKey::generate(&old.s, new, self.rlwe(), self.params.noise_scale(), rng)
    }

    /// Relinearization keys `s^j -> s` for `j = 2 ..= max_depth`.
    #[instrument(skip_all, fields(max_depth = self.rlwe().max_depth()))]
    pub fn eval_mult_key_gen<R: Rng + ?Sized>(&mut self, secret_key: &SecretKey, rng: &mut R) -> HeResult<()> {
        let max_depth = self.rlwe().max_depth().max(2);
        let mut keys = Vec::with_capacity(max_depth - 1);
        let mut power = secret_key.s.clone();
        for _ in 2..=max_depth {
            power.times_assign(&secret_key.s)?;
            keys.push(self.key_switch_gen_from(&power, secret_key, rng)?);
        }
        self.mult_keys.insert(secret_key.key_tag(), keys);
        Ok(())
    }

    fn key_switch_gen_from<R: Rng + ?Sized>(
        &self,
        old: &DcrtPoly,
        target: &SecretKey,
        rng: &mut R,
    ) -> HeResult<EvalKey> {
        EvalKey::generate(old, target, self.rlwe(), self.params.noise_scale(), rng)
    }

    pub fn eval_mult_keys(&self, key_tag: KeyTag) -> Option<&[EvalKey]> {
        self.mult_keys.get(&key_tag).map(Vec::as_slice)
    }

    pub fn eval_mult_key_tags(&self) -> impl Iterator<Item = KeyTag> + '_ {
        self.mult_keys.keys().copied()
    }

    pub fn eval_automorphism_key_tags(&self) -> impl Iterator<Item = KeyTag> + '_ {
        self.rotation_keys.keys().copied()
    }

    pub fn clear_eval_mult_keys(&mut self) {
        self.mult_keys.clear();
    }

    /// Rotation keys for slot offsets; negative offsets rotate right.
    pub fn eval_at_index_key_gen<R: Rng + ?Sized>(
        &mut self,
        secret_key: &SecretKey,
        indices: &[i32],
        rng: &mut R,
    ) -> HeResult<()> {
        let automorphisms = indices
            .iter()
            .map(|&i| self.find_automorphism_index(i))
            .collect::<HeResult<Vec<_>>>()?;
        self.eval_automorphism_key_gen(secret_key, &automorphisms, rng)
    }

    /// Keys switching `sigma_k(s)` back to `s` for each automorphism index `k`.
    #[instrument(skip_all, fields(count = indices.len()))]
    pub fn eval_automorphism_key_gen<R: Rng + ?Sized>(
        &mut self,
        secret_key: &SecretKey,
        indices: &[u64],
        rng: &mut R,
    ) -> HeResult<()> {
        let mut generated = BTreeMap::new();
        for &k in indices {
            let permuted = secret_key.s.automorphism_transform(k)?;
            generated.insert(k, self.key_switch_gen_from(&permuted, secret_key, rng)?);
        }
        self.rotation_keys
            .entry(secret_key.key_tag())
            .or_default()
            .extend(generated);
        Ok(())
    }

    pub fn eval_automorphism_keys(&self, key_tag: KeyTag) -> Option<&BTreeMap<u64, EvalKey>> {
        self.rotation_keys.get(&key_tag)
    }

    pub fn clear_eval_automorphism_keys(&mut self) {
        self.rotation_keys.clear();
    }

    pub(crate) fn insert_eval_mult_keys(&mut self, key_tag: KeyTag, keys: Vec<EvalKey>) {
        self.mult_keys.insert(key_tag, keys);
    }

    pub(crate) fn insert_automorphism_key(&mut self, key_tag: KeyTag, index: u64, key: EvalKey) {
        self.rotation_keys.entry(key_tag).or_default().insert(index, key);
    }

    /// Automorphism index `5^index mod m` realizing a left rotation by
    /// `index` slots.
    pub fn find_automorphism_index(&self, index: i32) -> HeResult<u64> {
        let m = self.cyclotomic_order() as u64;
        let generator = if index < 0 {
            inv_mod(ROTATION_GENERATOR, m).ok_or(HeError::InvalidParameter {
                name: "index",
                message: format!("{ROTATION_GENERATOR} is not invertible modulo {m}"),
            })?
        } else {
            ROTATION_GENERATOR
        };
        Ok(pow_mod(generator, index.unsigned_abs() as u64, m))
    }

    // ─── Plaintexts ──────────────────────────────────────────────────────────

    fn packed_encoder(&self) -> HeResult<&PackedEncoder> {
        if self.scheme() == SchemeKind::Ckks {
            return Err(self.not_implemented("packed encoding"));
        }
        self.packed.as_ref().ok_or_else(|| {
            EncodingError::PackingUnsupported {
                modulus: self.plaintext_modulus(),
                cyclotomic_order: self.cyclotomic_order(),
            }
            .into()
        })
    }

    fn ckks_encoder(&self) -> HeResult<&CkksEncoder> {
        self.ckks.as_ref().ok_or_else(|| self.not_implemented("CKKS encoding"))
    }

    /// Centred lift of coefficients modulo `t` over the full chain.
    fn integer_element(&self, coefficients: &[u64]) -> HeResult<DcrtPoly> {
        let t = self.plaintext_modulus();
        let signed: Vec<i64> = coefficients.iter().map(|&c| centered(c % t, t)).collect();
        Ok(DcrtPoly::from_signed(self.element_params().clone(), &signed, Format::Evaluation)?)
    }

    fn require_integer_scheme(&self, operation: &'static str) -> HeResult<()> {
        if self.scheme() == SchemeKind::Ckks {
            return Err(self.not_implemented(operation));
        }
        Ok(())
    }

    pub fn make_packed_plaintext(&self, values: &[i64]) -> HeResult<Plaintext> {
        let coefficients = self.packed_encoder()?.encode(values)?;
        let element = self.integer_element(&coefficients)?;
        Ok(Plaintext::new(PlaintextValue::Packed(values.to_vec()), element, 1))
    }

    pub fn make_coef_packed_plaintext(&self, values: &[i64]) -> HeResult<Plaintext> {
        self.require_integer_scheme("coefficient encoding")?;
        let coefficients = coef_packed::encode(values, self.plaintext_modulus(), self.ring_dim())?;
        let element = self.integer_element(&coefficients)?;
        Ok(Plaintext::new(PlaintextValue::CoefPacked(values.to_vec()), element, 1))
    }

    pub fn make_string_plaintext(&self, text: &str) -> HeResult<Plaintext> {
        self.require_integer_scheme("string encoding")?;
        let coefficients = string::encode(text, self.plaintext_modulus(), self.ring_dim())?;
        let element = self.integer_element(&coefficients)?;
        Ok(Plaintext::new(PlaintextValue::String(text.to_owned()), element, 1))
    }

    /// CKKS plaintext at scale `Delta` over the full chain.
    pub fn make_ckks_packed_plaintext(&self, values: &[Complex64]) -> HeResult<Plaintext> {
        self.make_ckks_packed_plaintext_at(values, 1, self.max_level())
    }

    /// CKKS plaintext at scale `Delta^depth` over the first `towers` moduli.
    pub fn make_ckks_packed_plaintext_at(
        &self,
        values: &[Complex64],
        depth: usize,
        towers: usize,
    ) -> HeResult<Plaintext> {
        let ckks = self.ckks_params("CKKS encoding")?;
        let coefficients = self.ckks_encoder()?.encode(values)?;
        let element = scaled_element(
            &coefficients,
            ckks.scale_bits(),
            depth.max(1),
            self.rlwe().params_at(towers)?,
        )?;
        Ok(Plaintext::new(PlaintextValue::CkksPacked(values.to_vec()), element, depth.max(1)))
    }

    /// Real-valued convenience wrapper over [`Self::make_ckks_packed_plaintext`].
    pub fn make_real_packed_plaintext(&self, values: &[f64]) -> HeResult<Plaintext> {
        let complex: Vec<Complex64> = values.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        self.make_ckks_packed_plaintext(&complex)
    }

    fn check_plaintext(&self, plaintext: &Plaintext) -> HeResult<()> {
        let is_ckks = plaintext.encoding() == EncodingKind::CkksPacked;
        if is_ckks == (self.scheme() == SchemeKind::Ckks) {
            return Ok(());
        }
        let expected = if is_ckks {
            EncodingKind::Packed
        } else {
            EncodingKind::CkksPacked
        };
        Err(EncodingError::WrongEncoding {
            expected,
            actual: plaintext.encoding(),
        }
        .into())
    }

    fn check_ciphertext(&self, ciphertext: &Ciphertext, operation: &'static str) -> HeResult<()> {
        if ciphertext.scheme() != self.scheme() {
            return Err(HeError::ContextMismatch { operation });
        }
        Ok(())
    }

    // ─── Encryption ──────────────────────────────────────────────────────────

    pub fn encrypt<R: Rng + ?Sized>(
        &self,
        public_key: &PublicKey,
        plaintext: &Plaintext,
        rng: &mut R,
    ) -> HeResult<Ciphertext> {
        self.check_plaintext(plaintext)?;
        self.params.encrypt(public_key, plaintext, rng)
    }

    pub fn encrypt_with_secret_key<R: Rng + ?Sized>(
        &self,
        secret_key: &SecretKey,
        plaintext: &Plaintext,
        rng: &mut R,
    ) -> HeResult<Ciphertext> {
        self.check_plaintext(plaintext)?;
        self.params.encrypt_with_secret_key(secret_key, plaintext, rng)
    }

    /// Decrypts and decodes according to the ciphertext's encoding. Packed
    /// results are truncated to the batch size; use
    /// [`Plaintext::set_length`] to trim further.
    pub fn decrypt(&self, secret_key: &SecretKey, ciphertext: &Ciphertext) -> HeResult<Plaintext> {
        self.check_ciphertext(ciphertext, "decrypt")?;
        let t = self.plaintext_modulus();
        let (value, element) = match self.params.decrypt_raw(secret_key, ciphertext)? {
            Decrypted::Integer(coefficients) => {
                let value = match ciphertext.encoding() {
                    EncodingKind::Packed => PlaintextValue::Packed(self.packed_encoder()?.decode(&coefficients)?),
                    EncodingKind::CoefPacked => PlaintextValue::CoefPacked(coef_packed::decode(&coefficients, t)),
                    EncodingKind::String => PlaintextValue::String(string::decode(&coefficients)),
                    EncodingKind::CkksPacked => {
                        return Err(EncodingError::WrongEncoding {
                            expected: EncodingKind::Packed,
                            actual: EncodingKind::CkksPacked,
                        }
                        .into());
                    }
                };
                (value, self.integer_element(&coefficients)?)
            }
            Decrypted::Real(coefficients) => {
                let ckks = self.ckks_params("decrypt")?;
                let slots = self.ckks_encoder()?.decode(&coefficients)?;
                let element = scaled_element(&coefficients, ckks.scale_bits(), 1, self.element_params().clone())?;
                (PlaintextValue::CkksPacked(slots), element)
            }
        };
        let packed = matches!(value, PlaintextValue::Packed(_));
        let mut plaintext = Plaintext::new(value, element, 1);
        if packed {
            plaintext.set_length(self.batch_size);
        }
        Ok(plaintext)
    }

    // ─── Level and scale alignment ───────────────────────────────────────────

    /// Lowers `ciphertext` to `towers` towers: modulus switching for BGV,
    /// plain tower dropping for CKKS.
    fn lower_to(&self, ciphertext: &mut Ciphertext, towers: usize) -> HeResult<()> {
        match self.scheme() {
            SchemeKind::BgvRns => {
                while ciphertext.level() > towers {
                    self.params.mod_reduce_in_place(ciphertext)?;
                }
                Ok(())
            }
            SchemeKind::Ckks => {
                let drop = ciphertext.level().saturating_sub(towers);
                if drop > 0 {
                    self.level_reduce_in_place(ciphertext, drop)?;
                }
                Ok(())
            }
            _ => Err(self.not_implemented("level alignment")),
        }
    }

    /// `Delta^(to - from)` modulo every tower of `params`.
    fn scale_factors(&self, params: &DcrtParams, from: usize, to: usize) -> HeResult<Vec<u64>> {
        let scale_bits = self.ckks_params("scale alignment")?.scale_bits() as u64;
        let exponent = scale_bits * to.saturating_sub(from) as u64;
        Ok(params.moduli().into_iter().map(|q| pow_mod(2, exponent, q)).collect())
    }

    /// Multiplies a CKKS ciphertext by `Delta^k` so it reaches `depth`.
    fn raise_depth(&self, ciphertext: &mut Ciphertext, depth: usize) -> HeResult<()> {
        let factors = self.scale_factors(ciphertext.element_params(), ciphertext.depth(), depth)?;
        for element in ciphertext.elements_mut() {
            element.times_scalars_assign(&factors)?;
        }
        ciphertext.set_depth(depth);
        Ok(())
    }

    /// Brings `a` (in place) and `b` (copied only when it must change) to a
    /// common level and, for CKKS, a common scale degree.
    fn align<'b>(&self, a: &mut Ciphertext, b: &'b Ciphertext) -> HeResult<Cow<'b, Ciphertext>> {
        let mut b = Cow::Borrowed(b);
        if !self.params.aligns_levels() {
            return Ok(b);
        }
        if a.level() > b.level() {
            self.lower_to(a, b.level())?;
        } else if b.level() > a.level() {
            let towers = a.level();
            self.lower_to(b.to_mut(), towers)?;
        }
        if self.scheme() == SchemeKind::Ckks && a.depth() != b.depth() {
            debug!(left = a.depth(), right = b.depth(), "aligning scale degrees");
            if a.depth() < b.depth() {
                self.raise_depth(a, b.depth())?;
            } else {
                let depth = a.depth();
                self.raise_depth(b.to_mut(), depth)?;
            }
        }
        Ok(b)
    }

    /// The plaintext element at the ciphertext's level and, for CKKS, scale
    /// degree. May lower or rescale `ciphertext` when the plaintext sits
    /// lower or deeper.
    fn plain_operand(&self, ciphertext: &mut Ciphertext, plaintext: &Plaintext, match_depth: bool) -> HeResult<DcrtPoly> {
        self.check_plaintext(plaintext)?;
        let mut element = plaintext.element().clone();
        if element.len() < ciphertext.level() {
            if !self.params.aligns_levels() {
                return Err(HeError::OutOfLevels {
                    requested: ciphertext.level(),
                    available: element.len(),
                });
            }
            self.lower_to(ciphertext, element.len())?;
        }
        if element.len() > ciphertext.level() {
            element = element.truncated(ciphertext.level())?;
        }
        if match_depth && self.scheme() == SchemeKind::Ckks {
            if plaintext.depth() < ciphertext.depth() {
                let factors = self.scale_factors(element.params(), plaintext.depth(), ciphertext.depth())?;
                element.times_scalars_assign(&factors)?;
            } else if plaintext.depth() > ciphertext.depth() {
                self.raise_depth(ciphertext, plaintext.depth())?;
            }
        }
        Ok(element.with_format(Format::Evaluation))
    }

    // ─── Additive operations ─────────────────────────────────────────────────

    fn combine_in_place(
        &self,
        a: &mut Ciphertext,
        b: &Ciphertext,
        operation: &'static str,
        op: fn(&mut DcrtPoly, &DcrtPoly) -> RingResult<()>,
    ) -> HeResult<()> {
        self.check_ciphertext(a, operation)?;
        a.check_compatible(b, operation)?;
        let b = self.align(a, b)?;
        let elements = a.elements_mut();
        for (i, y) in b.elements().iter().enumerate() {
            if let Some(x) = elements.get_mut(i) {
                op(x, y)?;
            } else {
                let mut x = DcrtPoly::zero(y.params().clone(), y.format());
                op(&mut x, y)?;
                elements.push(x);
            }
        }
        Ok(())
    }

    pub fn eval_add_in_place(&self, a: &mut Ciphertext, b: &Ciphertext) -> HeResult<()> {
        self.combine_in_place(a, b, "eval_add", DcrtPoly::plus_assign)
    }

    pub fn eval_add(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Ciphertext> {
        let mut out = a.clone();
        self.eval_add_in_place(&mut out, b)?;
        Ok(out)
    }

    pub fn eval_sub_in_place(&self, a: &mut Ciphertext, b: &Ciphertext) -> HeResult<()> {
        self.combine_in_place(a, b, "eval_sub", DcrtPoly::minus_assign)
    }

    pub fn eval_sub(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Ciphertext> {
        let mut out = a.clone();
        self.eval_sub_in_place(&mut out, b)?;
        Ok(out)
    }

    fn combine_plain_in_place(
        &self,
        ciphertext: &mut Ciphertext,
        plaintext: &Plaintext,
        operation: &'static str,
        op: fn(&mut DcrtPoly, &DcrtPoly) -> RingResult<()>,
    ) -> HeResult<()> {
        self.check_ciphertext(ciphertext, operation)?;
        let element = self.plain_operand(ciphertext, plaintext, true)?;
        let message = self.params.scale_message(&element)?;
        op(&mut ciphertext.elements_mut()[0], &message)?;
        Ok(())
    }

    pub fn eval_add_plain_in_place(&self, ciphertext: &mut Ciphertext, plaintext: &Plaintext) -> HeResult<()> {
        self.combine_plain_in_place(ciphertext, plaintext, "eval_add_plain", DcrtPoly::plus_assign)
    }

    pub fn eval_add_plain(&self, ciphertext: &Ciphertext, plaintext: &Plaintext) -> HeResult<Ciphertext> {
        let mut out = ciphertext.clone();
        self.eval_add_plain_in_place(&mut out, plaintext)?;
        Ok(out)
    }

    pub fn eval_sub_plain_in_place(&self, ciphertext: &mut Ciphertext, plaintext: &Plaintext) -> HeResult<()> {
        self.combine_plain_in_place(ciphertext, plaintext, "eval_sub_plain", DcrtPoly::minus_assign)
    }

    pub fn eval_sub_plain(&self, ciphertext: &Ciphertext, plaintext: &Plaintext) -> HeResult<Ciphertext> {
        let mut out = ciphertext.clone();
        self.eval_sub_plain_in_place(&mut out, plaintext)?;
        Ok(out)
    }

    /// Adds a real constant to every CKKS slot.
    pub fn eval_add_const(&self, ciphertext: &Ciphertext, constant: f64) -> HeResult<Ciphertext> {
        self.check_ciphertext(ciphertext, "eval_add_const")?;
        let ckks = self.ckks_params("eval_add_const")?;
        let mut coefficients = vec![0.0; self.ring_dim()];
        coefficients[0] = constant;
        let element = scaled_element(
            &coefficients,
            ckks.scale_bits(),
            ciphertext.depth(),
            ciphertext.element_params().clone(),
        )?;
        let mut out = ciphertext.clone();
        out.elements_mut()[0].plus_assign(&element)?;
        Ok(out)
    }

    pub fn eval_negate(&self, ciphertext: &Ciphertext) -> HeResult<Ciphertext> {
        self.check_ciphertext(ciphertext, "eval_negate")?;
        let mut out = ciphertext.clone();
        for element in out.elements_mut() {
            element.negate_assign();
        }
        Ok(out)
    }

    // ─── Multiplicative operations ───────────────────────────────────────────

    /// Tensor product without relinearization: `k + l - 1` components for
    /// operands with `k` and `l`.
    #[instrument(skip_all, fields(scheme = ?self.scheme()))]
    pub fn eval_mult(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Ciphertext> {
        self.check_ciphertext(a, "eval_mult")?;
        a.check_compatible(b, "eval_mult")?;
        let mut left = a.clone();
        let right = self.align(&mut left, b)?;
        let elements = self.params.tensor(&left, &right)?;
        Ciphertext::new(
            elements,
            left.depth() + right.depth(),
            left.encoding(),
            left.scheme(),
            left.key_tag(),
        )
    }

    pub fn relinearize_in_place(&self, ciphertext: &mut Ciphertext) -> HeResult<()> {
        if ciphertext.len() <= 2 {
            return Ok(());
        }
        let keys = self
            .mult_keys
            .get(&ciphertext.key_tag())
            .ok_or(HeError::MissingKey {
                kind: "relinearization",
                index: 2,
            })?;
        keyswitch::relinearize_in_place(keys, ciphertext)
    }

    pub fn relinearize(&self, ciphertext: &Ciphertext) -> HeResult<Ciphertext> {
        let mut out = ciphertext.clone();
        self.relinearize_in_place(&mut out)?;
        Ok(out)
    }

    pub fn eval_mult_and_relinearize(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Ciphertext> {
        let mut product = self.eval_mult(a, b)?;
        self.relinearize_in_place(&mut product)?;
        Ok(product)
    }

    /// Product of all inputs as a balanced tree, relinearizing every product
    /// and switching the modulus down after each round while levels remain.
    #[instrument(skip_all, fields(count = ciphertexts.len()))]
    pub fn eval_mult_many(&self, ciphertexts: &[Ciphertext]) -> HeResult<Ciphertext> {
        let mut round: Vec<Ciphertext> = ciphertexts.to_vec();
        if round.is_empty() {
            return Err(HeError::InvalidParameter {
                name: "ciphertexts",
                message: "nothing to multiply".into(),
            });
        }
        while round.len() > 1 {
            let mut next = Vec::with_capacity(round.len().div_ceil(2));
            let mut operands = round.into_iter();
            while let Some(a) = operands.next() {
                let Some(b) = operands.next() else {
                    next.push(a);
                    break;
                };
                let mut product = self.eval_mult_and_relinearize(&a, &b)?;
                if self.params.aligns_levels() && product.level() > 1 {
                    self.params.mod_reduce_in_place(&mut product)?;
                }
                next.push(product);
            }
            round = next;
        }
        Ok(round.remove(0))
    }

    pub fn eval_mult_plain_in_place(&self, ciphertext: &mut Ciphertext, plaintext: &Plaintext) -> HeResult<()> {
        self.check_ciphertext(ciphertext, "eval_mult_plain")?;
        let element = self.plain_operand(ciphertext, plaintext, false)?;
        for c in ciphertext.elements_mut() {
            c.times_assign(&element)?;
        }
        if self.scheme() == SchemeKind::Ckks {
            let depth = ciphertext.depth() + plaintext.depth();
            self.ckks_params("eval_mult_plain")?.check_depth(depth, ciphertext.level())?;
            ciphertext.set_depth(depth);
        }
        Ok(())
    }

    pub fn eval_mult_plain(&self, ciphertext: &Ciphertext, plaintext: &Plaintext) -> HeResult<Ciphertext> {
        let mut out = ciphertext.clone();
        self.eval_mult_plain_in_place(&mut out, plaintext)?;
        Ok(out)
    }

    // ─── Key switching and levels ────────────────────────────────────────────

    pub fn key_switch_in_place(&self, ciphertext: &mut Ciphertext, key: &EvalKey) -> HeResult<()> {
        self.check_ciphertext(ciphertext, "key_switch")?;
        keyswitch::key_switch_in_place(key, ciphertext)
    }

    pub fn key_switch(&self, ciphertext: &Ciphertext, key: &EvalKey) -> HeResult<Ciphertext> {
        let mut out = ciphertext.clone();
        self.key_switch_in_place(&mut out, key)?;
        Ok(out)
    }

    /// Drops the last tower with scaling: modulus switching for BGV,
    /// rescaling for CKKS.
    pub fn mod_reduce_in_place(&self, ciphertext: &mut Ciphertext) -> HeResult<()> {
        self.check_ciphertext(ciphertext, "mod_reduce")?;
        self.params.mod_reduce_in_place(ciphertext)
    }

    pub fn mod_reduce(&self, ciphertext: &Ciphertext) -> HeResult<Ciphertext> {
        let mut out = ciphertext.clone();
        self.mod_reduce_in_place(&mut out)?;
        Ok(out)
    }

    pub fn rescale_in_place(&self, ciphertext: &mut Ciphertext) -> HeResult<()> {
        self.ckks_params("rescale")?;
        self.mod_reduce_in_place(ciphertext)
    }

    pub fn rescale(&self, ciphertext: &Ciphertext) -> HeResult<Ciphertext> {
        let mut out = ciphertext.clone();
        self.rescale_in_place(&mut out)?;
        Ok(out)
    }

    /// Drops `levels` towers without scaling.
    pub fn level_reduce_in_place(&self, ciphertext: &mut Ciphertext, levels: usize) -> HeResult<()> {
        self.check_ciphertext(ciphertext, "level_reduce")?;
        if !self.params.aligns_levels() {
            return Err(self.not_implemented("level_reduce"));
        }
        if levels >= ciphertext.level() {
            return Err(HeError::OutOfLevels {
                requested: levels,
                available: ciphertext.level() - 1,
            });
        }
        for element in ciphertext.elements_mut() {
            element.drop_last_elements(levels)?;
        }
        Ok(())
    }

    pub fn level_reduce(&self, ciphertext: &Ciphertext, levels: usize) -> HeResult<Ciphertext> {
        let mut out = ciphertext.clone();
        self.level_reduce_in_place(&mut out, levels)?;
        Ok(out)
    }

    /// BGV: switches the modulus down until `towers_left` towers remain.
    pub fn compress(&self, ciphertext: &Ciphertext, towers_left: usize) -> HeResult<Ciphertext> {
        self.check_ciphertext(ciphertext, "compress")?;
        if self.scheme() != SchemeKind::BgvRns {
            return Err(self.not_implemented("compress"));
        }
        if towers_left == 0 || towers_left > ciphertext.level() {
            return Err(HeError::OutOfLevels {
                requested: ciphertext.level().saturating_sub(towers_left.max(1)),
                available: ciphertext.level() - 1,
            });
        }
        let mut out = ciphertext.clone();
        self.lower_to(&mut out, towers_left)?;
        Ok(out)
    }

    // ─── Rotations ───────────────────────────────────────────────────────────

    /// Applies `X -> X^index` and switches back to the original key.
    pub fn eval_automorphism(&self, ciphertext: &Ciphertext, index: u64) -> HeResult<Ciphertext> {
        self.check_ciphertext(ciphertext, "eval_automorphism")?;
        if ciphertext.len() != 2 {
            return Err(HeError::ComponentCount {
                operation: "eval_automorphism",
                expected: 2,
                actual: ciphertext.len(),
            });
        }
        let key = self
            .rotation_keys
            .get(&ciphertext.key_tag())
            .and_then(|keys| keys.get(&index))
            .ok_or(HeError::MissingKey {
                kind: "automorphism",
                index,
            })?;
        let elements = ciphertext
            .elements()
            .iter()
            .map(|c| c.automorphism_transform(index))
            .collect::<RingResult<Vec<_>>>()?;
        let mut out = Ciphertext::new(
            elements,
            ciphertext.depth(),
            ciphertext.encoding(),
            ciphertext.scheme(),
            ciphertext.key_tag(),
        )?;
        keyswitch::key_switch_in_place(key, &mut out)?;
        Ok(out)
    }

    /// Rotates slots left by `index` (right when negative).
    pub fn eval_at_index(&self, ciphertext: &Ciphertext, index: i32) -> HeResult<Ciphertext> {
        let automorphism = self.find_automorphism_index(index)?;
        self.eval_automorphism(ciphertext, automorphism)
    }

    /// Packs slot 0 of the `i`-th input into slot `i` of one ciphertext.
    /// Needs rotation keys for `-1 .. -(len - 1)`.
    #[instrument(skip_all, fields(count = ciphertexts.len()))]
    pub fn eval_merge(&self, ciphertexts: &[Ciphertext]) -> HeResult<Ciphertext> {
        let Some(first) = ciphertexts.first() else {
            return Err(HeError::InvalidParameter {
                name: "ciphertexts",
                message: "nothing to merge".into(),
            });
        };
        if ciphertexts.len() > self.batch_size {
            warn!(count = ciphertexts.len(), batch_size = self.batch_size, "merge wraps around the slots");
        }
        let mask = match self.scheme() {
            SchemeKind::Ckks => self.make_ckks_packed_plaintext_at(&[Complex64::new(1.0, 0.0)], 1, first.level())?,
            _ => self.make_packed_plaintext(&[1])?,
        };
        let mut merged: Option<Ciphertext> = None;
        for (i, ciphertext) in ciphertexts.iter().enumerate() {
            let mut masked = self.eval_mult_plain(ciphertext, &mask)?;
            if self.scheme() == SchemeKind::Ckks && masked.level() > 1 {
                self.rescale_in_place(&mut masked)?;
            }
            let rotated = if i == 0 {
                masked
            } else {
                self.eval_at_index(&masked, -(i as i32))?
            };
            merged = Some(match merged {
                Some(mut acc) => {
                    self.eval_add_in_place(&mut acc, &rotated)?;
                    acc
                }
                None => rotated,
            });
        }
        merged.ok_or(HeError::InvalidParameter {
            name: "ciphertexts",
            message: "nothing to merge".into(),
        })
    }
}
