//! Versioned persistence of parameters, keys, ciphertexts and whole
//! contexts.
//!
//! Records carry the modulus chain and plaintext modulus as decimal strings
//! and never the precomputed CRT tables; loading parameters rebuilds them
//! unless [`LoadOptions::precompute`] is off. A record written by a newer
//! library version is refused rather than guessed at.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::context::CryptoContext;
use super::errors::{HeError, HeResult};
use super::params::{
    BfvRnsBParams, BfvRnsParams, BgvRnsParams, CkksParams, RlweSettings, SchemeKind, SchemeParams,
};
use super::types::Ciphertext;
use crate::encoding::EncodingKind;
use crate::keys::{EvalKey, KeyTag, PublicKey, SecretKey};
use crate::rings::{DcrtParams, DcrtPoly, Format};

/// A persisted record with a format version.
pub trait Versioned {
    const TYPE_NAME: &'static str;
    const SERIALIZED_VERSION: u32;

    fn version(&self) -> u32;

    /// Refuses records written by a newer format.
    fn check_version(&self) -> HeResult<()> {
        let found = self.version();
        if found > Self::SERIALIZED_VERSION {
            return Err(HeError::VersionTooNew {
                type_name: Self::TYPE_NAME,
                found,
                supported: Self::SERIALIZED_VERSION,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Rebuild the CRT tables after loading parameters.
    pub precompute: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { precompute: true }
    }
}

fn malformed(message: impl Into<String>) -> HeError {
    HeError::Malformed {
        message: message.into(),
    }
}

fn parse_decimal(text: &str, what: &str) -> HeResult<u64> {
    text.parse()
        .map_err(|e| malformed(format!("{what} `{text}` is not a decimal integer: {e}")))
}

pub fn to_json<T: Serialize>(record: &T) -> HeResult<String> {
    Ok(serde_json::to_string(record)?)
}

/// Parses a record and checks its version.
pub fn from_json<T: DeserializeOwned + Versioned>(json: &str) -> HeResult<T> {
    let record: T = serde_json::from_str(json)?;
    record.check_version()?;
    Ok(record)
}

// ─── Parameters ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedParams {
    pub version: u32,
    pub scheme: SchemeKind,
    pub settings: RlweSettings,
    pub cyclotomic_order: u32,
    pub plaintext_modulus: String,
    pub moduli: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_bits: Option<u32>,
}

impl Versioned for SerializedParams {
    const TYPE_NAME: &'static str = "SerializedParams";
    const SERIALIZED_VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

impl SerializedParams {
    pub fn save(params: &SchemeParams) -> Self {
        let rlwe = params.rlwe();
        let scale_bits = match params {
            SchemeParams::Ckks(p) => Some(p.scale_bits()),
            _ => None,
        };
        Self {
            version: Self::SERIALIZED_VERSION,
            scheme: params.kind(),
            settings: rlwe.settings().clone(),
            cyclotomic_order: rlwe.cyclotomic_order(),
            plaintext_modulus: rlwe.plaintext_modulus().to_string(),
            moduli: rlwe.moduli().iter().map(u64::to_string).collect(),
            scale_bits,
        }
    }

    #[instrument(skip_all, fields(scheme = ?self.scheme, precompute = options.precompute))]
    pub fn load(&self, options: LoadOptions) -> HeResult<SchemeParams> {
        self.check_version()?;
        let t = parse_decimal(&self.plaintext_modulus, "plaintext modulus")?;
        let moduli = self
            .moduli
            .iter()
            .map(|q| parse_decimal(q, "modulus"))
            .collect::<HeResult<Vec<_>>>()?;
        let settings = self.settings.clone();
        let m = self.cyclotomic_order;
        let mut params = match self.scheme {
            SchemeKind::BfvRns => SchemeParams::BfvRns(BfvRnsParams::from_chain(settings, t, m, &moduli)?),
            SchemeKind::BfvRnsB => SchemeParams::BfvRnsB(BfvRnsBParams::from_chain(settings, t, m, &moduli)?),
            SchemeKind::BgvRns => SchemeParams::BgvRns(BgvRnsParams::from_chain(settings, t, m, &moduli)?),
            SchemeKind::Ckks => {
                let scale_bits = self
                    .scale_bits
                    .ok_or_else(|| malformed("CKKS parameters without scale_bits"))?;
                SchemeParams::Ckks(CkksParams::from_chain(settings, scale_bits, m, &moduli)?)
            }
        };
        if options.precompute {
            params.precompute()?;
        }
        debug!(towers = moduli.len(), "parameters loaded");
        Ok(params)
    }
}

// ─── Ring elements ───────────────────────────────────────────────────────────

/// Residues per tower. The chain is implied by the tower count: element
/// `k` towers deep lives over the first `k` moduli of its context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPoly {
    pub format: Format,
    pub towers: Vec<Vec<u64>>,
}

impl SerializedPoly {
    pub fn save(poly: &DcrtPoly) -> Self {
        Self {
            format: poly.format(),
            towers: poly.towers().iter().map(|t| t.values().to_vec()).collect(),
        }
    }

    pub fn load(&self, chain: &Arc<DcrtParams>) -> HeResult<DcrtPoly> {
        if self.towers.is_empty() || self.towers.len() > chain.len() {
            return Err(malformed(format!(
                "element with {} towers over a {}-tower chain",
                self.towers.len(),
                chain.len()
            )));
        }
        let params = if self.towers.len() == chain.len() {
            chain.clone()
        } else {
            Arc::new(chain.truncated(self.towers.len())?)
        };
        DcrtPoly::from_tower_values(params, self.towers.clone(), self.format).map_err(|e| malformed(e.to_string()))
    }
}

fn load_polys(polys: &[SerializedPoly], chain: &Arc<DcrtParams>) -> HeResult<Vec<DcrtPoly>> {
    polys.iter().map(|p| p.load(chain)).collect()
}

// ─── Ciphertexts ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedCiphertext {
    pub version: u32,
    pub scheme: SchemeKind,
    pub encoding: EncodingKind,
    pub depth: usize,
    pub key_tag: KeyTag,
    pub elements: Vec<SerializedPoly>,
}

impl Versioned for SerializedCiphertext {
    const TYPE_NAME: &'static str = "SerializedCiphertext";
    const SERIALIZED_VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

impl SerializedCiphertext {
    pub fn save(ciphertext: &Ciphertext) -> Self {
        Self {
            version: Self::SERIALIZED_VERSION,
            scheme: ciphertext.scheme(),
            encoding: ciphertext.encoding(),
            depth: ciphertext.depth(),
            key_tag: ciphertext.key_tag(),
            elements: ciphertext.elements().iter().map(SerializedPoly::save).collect(),
        }
    }

    pub fn load(&self, context: &CryptoContext) -> HeResult<Ciphertext> {
        self.check_version()?;
        if self.scheme != context.scheme() {
            return Err(HeError::ContextMismatch {
                operation: "load ciphertext",
            });
        }
        let elements = load_polys(&self.elements, context.element_params())?;
        Ciphertext::new(elements, self.depth, self.encoding, self.scheme, self.key_tag)
    }
}

// ─── Keys ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    Public,
    Secret,
    Eval,
}

/// Any key: `[s]` for secret keys, `[b, a]` for public keys and the `b`
/// digits followed by the `a` digits for evaluation keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedKey {
    pub version: u32,
    pub kind: KeyKind,
    pub key_tag: KeyTag,
    #[serde(default)]
    pub window: u32,
    pub elements: Vec<SerializedPoly>,
}

impl Versioned for SerializedKey {
    const TYPE_NAME: &'static str = "SerializedKey";
    const SERIALIZED_VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

impl SerializedKey {
    fn new(kind: KeyKind, key_tag: KeyTag, window: u32, elements: Vec<SerializedPoly>) -> Self {
        Self {
            version: Self::SERIALIZED_VERSION,
            kind,
            key_tag,
            window,
            elements,
        }
    }

    pub fn save_secret(key: &SecretKey) -> Self {
        Self::new(KeyKind::Secret, key.key_tag(), 0, vec![SerializedPoly::save(&key.s)])
    }

    pub fn save_public(key: &PublicKey) -> Self {
        Self::new(
            KeyKind::Public,
            key.key_tag(),
            0,
            vec![SerializedPoly::save(&key.b), SerializedPoly::save(&key.a)],
        )
    }

    pub fn save_eval(key: &EvalKey) -> Self {
        let elements = key.b.iter().chain(&key.a).map(SerializedPoly::save).collect();
        Self::new(KeyKind::Eval, key.key_tag(), key.window(), elements)
    }

    fn expect(&self, kind: KeyKind) -> HeResult<()> {
        self.check_version()?;
        if self.kind != kind {
            return Err(malformed(format!("expected a {kind:?} key, found {:?}", self.kind)));
        }
        Ok(())
    }

    pub fn load_secret(&self, context: &CryptoContext) -> HeResult<SecretKey> {
        self.expect(KeyKind::Secret)?;
        match load_polys(&self.elements, context.element_params())?.as_slice() {
            [s] => Ok(SecretKey::from_parts(s.clone(), self.key_tag)),
            other => Err(malformed(format!("secret key with {} elements", other.len()))),
        }
    }

    pub fn load_public(&self, context: &CryptoContext) -> HeResult<PublicKey> {
        self.expect(KeyKind::Public)?;
        let mut elements = load_polys(&self.elements, context.element_params())?;
        if elements.len() != 2 {
            return Err(malformed(format!("public key with {} elements", elements.len())));
        }
        let a = elements.pop();
        let b = elements.pop();
        match (b, a) {
            (Some(b), Some(a)) => Ok(PublicKey::from_parts(b, a, self.key_tag)),
            _ => Err(malformed("public key without components")),
        }
    }

    pub fn load_eval(&self, context: &CryptoContext) -> HeResult<EvalKey> {
        self.expect(KeyKind::Eval)?;
        let mut b = load_polys(&self.elements, context.element_params())?;
        if b.len() % 2 != 0 {
            return Err(malformed(format!("eval key with {} elements", b.len())));
        }
        let a = b.split_off(b.len() / 2);
        EvalKey::from_parts(b, a, self.key_tag, self.window)
    }
}

// ─── Contexts ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedRotationKey {
    pub index: u64,
    pub key: SerializedKey,
}

/// Parameters plus every evaluation key the context holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedContext {
    pub version: u32,
    pub params: SerializedParams,
    #[serde(default)]
    pub eval_mult_keys: Vec<Vec<SerializedKey>>,
    #[serde(default)]
    pub rotation_keys: Vec<SerializedRotationKey>,
}

impl Versioned for SerializedContext {
    const TYPE_NAME: &'static str = "SerializedContext";
    const SERIALIZED_VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

impl SerializedContext {
    pub fn save(context: &CryptoContext) -> Self {
        let mut eval_mult_keys: Vec<Vec<SerializedKey>> = context
            .eval_mult_key_tags()
            .filter_map(|tag| context.eval_mult_keys(tag))
            .map(|keys| keys.iter().map(SerializedKey::save_eval).collect())
            .collect();
        eval_mult_keys.sort_by_key(|keys| keys.first().map(|k| k.key_tag));
        let mut rotation_keys: Vec<SerializedRotationKey> = context
            .eval_automorphism_key_tags()
            .filter_map(|tag| context.eval_automorphism_keys(tag))
            .flat_map(|keys| {
                keys.iter().map(|(&index, key)| SerializedRotationKey {
                    index,
                    key: SerializedKey::save_eval(key),
                })
            })
            .collect();
        rotation_keys.sort_by_key(|r| (r.key.key_tag, r.index));
        Self {
            version: Self::SERIALIZED_VERSION,
            params: SerializedParams::save(context.params()),
            eval_mult_keys,
            rotation_keys,
        }
    }

    /// Rebuilds the context; its tables are always precomputed.
    pub fn load(&self) -> HeResult<CryptoContext> {
        self.check_version()?;
        let mut context = CryptoContext::new(self.params.load(LoadOptions::default())?)?;
        for keys in &self.eval_mult_keys {
            let loaded = keys
                .iter()
                .map(|k| k.load_eval(&context))
                .collect::<HeResult<Vec<_>>>()?;
            if let Some(first) = loaded.first() {
                context.insert_eval_mult_keys(first.key_tag(), loaded);
            }
        }
        for rotation in &self.rotation_keys {
            let key = rotation.key.load_eval(&context)?;
            context.insert_automorphism_key(key.key_tag(), rotation.index, key);
        }
        Ok(context)
    }
}

impl CryptoContext {
    pub fn to_json(&self) -> HeResult<String> {
        to_json(&SerializedContext::save(self))
    }

    pub fn from_json(json: &str) -> HeResult<Self> {
        from_json::<SerializedContext>(json)?.load()
    }

    pub fn ciphertext_to_json(&self, ciphertext: &Ciphertext) -> HeResult<String> {
        to_json(&SerializedCiphertext::save(ciphertext))
    }

    pub fn ciphertext_from_json(&self, json: &str) -> HeResult<Ciphertext> {
        from_json::<SerializedCiphertext>(json)?.load(self)
    }

    pub fn secret_key_from_json(&self, json: &str) -> HeResult<SecretKey> {
        from_json::<SerializedKey>(json)?.load_secret(self)
    }

    pub fn public_key_from_json(&self, json: &str) -> HeResult<PublicKey> {
        from_json::<SerializedKey>(json)?.load_public(self)
    }

    pub fn eval_key_from_json(&self, json: &str) -> HeResult<EvalKey> {
        from_json::<SerializedKey>(json)?.load_eval(self)
    }
}

impl SecretKey {
    pub fn to_json(&self) -> HeResult<String> {
        to_json(&SerializedKey::save_secret(self))
    }
}

impl PublicKey {
    pub fn to_json(&self) -> HeResult<String> {
        to_json(&SerializedKey::save_public(self))
    }
}

impl EvalKey {
    pub fn to_json(&self) -> HeResult<String> {
        to_json(&SerializedKey::save_eval(self))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::crypto::builder::{BgvRnsBuilder, CkksBuilder};
    use crate::crypto::errors::ErrorKind;
    use crate::crypto::params::SecurityLevel;

    fn bgv() -> CryptoContext {
        BgvRnsBuilder::new()
            .security_level(SecurityLevel::NotSet)
            .ring_dim(64)
            .multiplicative_depth(1)
            .build()
            .unwrap()
    }

    #[test]
    fn parameters_keep_their_chain_and_skip_tables_on_request() {
        let cc = bgv();
        let record = SerializedParams::save(cc.params());
        assert!(record.moduli.iter().all(|q| q.parse::<u64>().is_ok()));
        let json = to_json(&record).unwrap();

        let lazy = from_json::<SerializedParams>(&json)
            .unwrap()
            .load(LoadOptions { precompute: false })
            .unwrap();
        assert!(!lazy.is_precomputed());
        assert_eq!(lazy.rlwe().moduli(), cc.rlwe().moduli());

        let eager = record.load(LoadOptions::default()).unwrap();
        assert!(eager.is_precomputed());
    }

    #[test]
    fn newer_records_are_refused() {
        let cc = bgv();
        let mut record = SerializedParams::save(cc.params());
        record.version = SerializedParams::SERIALIZED_VERSION + 1;
        let err = from_json::<SerializedParams>(&to_json(&record).unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialize);
        assert!(matches!(err, HeError::VersionTooNew { found: 2, supported: 1, .. }));
    }

    #[test]
    fn ciphertexts_and_keys_survive_json() {
        let mut cc = CkksBuilder::new()
            .security_level(SecurityLevel::NotSet)
            .ring_dim(64)
            .multiplicative_depth(1)
            .scale_bits(40)
            .batch_size(4)
            .build()
            .unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(31);
        let keys = cc.key_gen(&mut rng).unwrap();
        cc.eval_mult_key_gen(&keys.secret, &mut rng).unwrap();
        cc.eval_at_index_key_gen(&keys.secret, &[1], &mut rng).unwrap();
        let ct = cc
            .encrypt(&keys.public, &cc.make_real_packed_plaintext(&[1.0, 2.0]).unwrap(), &mut rng)
            .unwrap();

        let restored = CryptoContext::from_json(&cc.to_json().unwrap()).unwrap();
        assert_eq!(restored.rlwe().moduli(), cc.rlwe().moduli());
        assert_eq!(restored.eval_mult_keys(keys.key_tag()).map(<[_]>::len), Some(1));
        assert!(restored.eval_automorphism_keys(keys.key_tag()).is_some());

        let ct2 = restored.ciphertext_from_json(&cc.ciphertext_to_json(&ct).unwrap()).unwrap();
        assert_eq!(ct2, ct);
        let sk = restored.secret_key_from_json(&keys.secret.to_json().unwrap()).unwrap();
        assert_eq!(sk.s, keys.secret.s);
        let pk = restored.public_key_from_json(&keys.public.to_json().unwrap()).unwrap();
        assert_eq!((pk.b, pk.a), (keys.public.b.clone(), keys.public.a.clone()));

        let wrong = restored.public_key_from_json(&keys.secret.to_json().unwrap()).unwrap_err();
        assert_eq!(wrong.kind(), ErrorKind::Deserialize);
    }
}
