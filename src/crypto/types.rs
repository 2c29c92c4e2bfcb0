use std::sync::Arc;

use num_complex::Complex64;

use super::errors::{HeError, HeResult};
use super::params::SchemeKind;
use crate::encoding::{EncodingError, EncodingKind, PlaintextValue};
use crate::keys::KeyTag;
use crate::rings::{DcrtParams, DcrtPoly};

/// An RLWE ciphertext `(c_0, c_1, ..., c_k)` decrypting as `sum c_i s^i`.
///
/// `depth` is the scale degree: fresh ciphertexts have depth 1, a product
/// adds the depths of its factors and CKKS rescaling lowers it by one. The
/// level is the number of towers left in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    elements: Vec<DcrtPoly>,
    depth: usize,
    encoding: EncodingKind,
    scheme: SchemeKind,
    key_tag: KeyTag,
}

impl Ciphertext {
    pub fn new(
        elements: Vec<DcrtPoly>,
        depth: usize,
        encoding: EncodingKind,
        scheme: SchemeKind,
        key_tag: KeyTag,
    ) -> HeResult<Self> {
        let Some(first) = elements.first() else {
            return Err(HeError::ComponentCount {
                operation: "Ciphertext::new",
                expected: 2,
                actual: 0,
            });
        };
        if elements
            .iter()
            .any(|e| e.len() != first.len() || e.format() != first.format())
        {
            return Err(HeError::Malformed {
                message: "ciphertext components disagree on level or format".into(),
            });
        }
        Ok(Self {
            elements,
            depth,
            encoding,
            scheme,
            key_tag,
        })
    }

    pub fn elements(&self) -> &[DcrtPoly] {
        &self.elements
    }

    pub(crate) fn elements_mut(&mut self) -> &mut Vec<DcrtPoly> {
        &mut self.elements
    }

    pub fn into_elements(self) -> Vec<DcrtPoly> {
        self.elements
    }

    /// Number of components; 2 after relinearization.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Towers left in the modulus chain.
    pub fn level(&self) -> usize {
        self.elements[0].len()
    }

    pub fn element_params(&self) -> &Arc<DcrtParams> {
        self.elements[0].params()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    pub fn encoding(&self) -> EncodingKind {
        self.encoding
    }

    pub fn scheme(&self) -> SchemeKind {
        self.scheme
    }

    pub fn key_tag(&self) -> KeyTag {
        self.key_tag
    }

    pub(crate) fn set_key_tag(&mut self, key_tag: KeyTag) {
        self.key_tag = key_tag;
    }

    /// Both operands were produced in the same scheme under the same key.
    pub(crate) fn check_compatible(&self, other: &Self, operation: &'static str) -> HeResult<()> {
        if self.scheme != other.scheme || self.key_tag != other.key_tag {
            return Err(HeError::ContextMismatch { operation });
        }
        Ok(())
    }
}

/// Encoded message: the user-facing values plus their ring element over the
/// chain in evaluation format.
#[derive(Debug, Clone, PartialEq)]
pub struct Plaintext {
    value: PlaintextValue,
    element: DcrtPoly,
    depth: usize,
    length: usize,
}

impl Plaintext {
    pub fn new(value: PlaintextValue, element: DcrtPoly, depth: usize) -> Self {
        let length = value.len();
        Self {
            value,
            element,
            depth,
            length,
        }
    }

    pub fn value(&self) -> &PlaintextValue {
        &self.value
    }

    pub fn encoding(&self) -> EncodingKind {
        self.value.kind()
    }

    pub fn element(&self) -> &DcrtPoly {
        &self.element
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn level(&self) -> usize {
        self.element.len()
    }

    /// Visible length of the decoded values.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Restricts what the value accessors return; decrypted plaintexts come
    /// back with every slot populated.
    pub fn set_length(&mut self, length: usize) {
        self.length = length.min(self.value.len());
    }

    fn wrong(&self, expected: EncodingKind) -> HeError {
        EncodingError::WrongEncoding {
            expected,
            actual: self.value.kind(),
        }
        .into()
    }

    pub fn packed_value(&self) -> HeResult<&[i64]> {
        match &self.value {
            PlaintextValue::Packed(v) => Ok(&v[..self.length]),
            _ => Err(self.wrong(EncodingKind::Packed)),
        }
    }

    pub fn coef_packed_value(&self) -> HeResult<&[i64]> {
        match &self.value {
            PlaintextValue::CoefPacked(v) => Ok(&v[..self.length]),
            _ => Err(self.wrong(EncodingKind::CoefPacked)),
        }
    }

    pub fn string_value(&self) -> HeResult<&str> {
        match &self.value {
            PlaintextValue::String(s) => Ok(s.get(..self.length).unwrap_or(s)),
            _ => Err(self.wrong(EncodingKind::String)),
        }
    }

    pub fn ckks_packed_value(&self) -> HeResult<&[Complex64]> {
        match &self.value {
            PlaintextValue::CkksPacked(v) => Ok(&v[..self.length]),
            _ => Err(self.wrong(EncodingKind::CkksPacked)),
        }
    }

    /// Real parts of the CKKS slots.
    pub fn real_packed_value(&self) -> HeResult<Vec<f64>> {
        Ok(self.ckks_packed_value()?.iter().map(|z| z.re).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rings::{Format, NttEngine};

    fn element() -> DcrtPoly {
        let engine = NttEngine::new();
        let params = Arc::new(DcrtParams::from_moduli(16, &[97, 113], &engine).unwrap());
        DcrtPoly::zero(params, Format::Evaluation)
    }

    #[test]
    fn accessors_respect_the_encoding_and_length() {
        let mut pt = Plaintext::new(PlaintextValue::Packed(vec![1, 2, 3, 4]), element(), 1);
        assert_eq!(pt.len(), 4);
        pt.set_length(2);
        assert_eq!(pt.packed_value().unwrap(), &[1, 2]);
        pt.set_length(10);
        assert_eq!(pt.len(), 4);
        let err = pt.string_value().unwrap_err();
        assert_eq!(err.kind(), crate::crypto::errors::ErrorKind::Format);
    }

    #[test]
    fn ciphertext_components_must_agree() {
        let a = element();
        let b = a.truncated(1).unwrap();
        assert!(Ciphertext::new(vec![a.clone(), b], 1, EncodingKind::Packed, SchemeKind::BgvRns, 1).is_err());
        assert!(Ciphertext::new(vec![], 1, EncodingKind::Packed, SchemeKind::BgvRns, 1).is_err());
        let ct = Ciphertext::new(vec![a.clone(), a], 1, EncodingKind::Packed, SchemeKind::BgvRns, 1).unwrap();
        assert_eq!(ct.level(), 2);
        assert_eq!(ct.len(), 2);
    }
}
