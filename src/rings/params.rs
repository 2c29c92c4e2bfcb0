use std::sync::Arc;

use super::{
    errors::{RingError, RingResult},
    ntt::{NttEngine, NttTable},
};
use crate::math::primes::root_of_unity;

/// Parameters of one tower: modulus, root of unity and the NTT tables built
/// for them. Shared read-only by every element living modulo this prime.
#[derive(Debug, Clone)]
pub struct ElementParams {
    cyclotomic_order: u32,
    modulus: u64,
    root_of_unity: u64,
    ntt: Arc<NttTable>,
}

impl ElementParams {
    pub fn new(
        cyclotomic_order: u32,
        modulus: u64,
        root_of_unity: u64,
        engine: &NttEngine,
    ) -> RingResult<Self> {
        let ntt = engine.precompute(root_of_unity, cyclotomic_order, modulus)?;
        Ok(Self {
            cyclotomic_order,
            modulus,
            root_of_unity: ntt.root_of_unity(),
            ntt,
        })
    }

    /// Builds tower parameters, deriving the root of unity from the modulus.
    pub fn with_modulus(cyclotomic_order: u32, modulus: u64, engine: &NttEngine) -> RingResult<Self> {
        let root = root_of_unity(cyclotomic_order as u64, modulus).ok_or(
            RingError::MissingRootOfUnity {
                modulus,
                cyclotomic_order,
            },
        )?;
        Self::new(cyclotomic_order, modulus, root, engine)
    }

    pub fn cyclotomic_order(&self) -> u32 {
        self.cyclotomic_order
    }

    pub fn ring_dim(&self) -> usize {
        (self.cyclotomic_order / 2) as usize
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    pub fn root_of_unity(&self) -> u64 {
        self.root_of_unity
    }

    pub fn ntt(&self) -> &NttTable {
        &self.ntt
    }
}

impl PartialEq for ElementParams {
    fn eq(&self, other: &Self) -> bool {
        self.cyclotomic_order == other.cyclotomic_order
            && self.modulus == other.modulus
            && self.root_of_unity == other.root_of_unity
    }
}

impl Eq for ElementParams {}

/// An ordered modulus chain `q_0, ..., q_{L-1}` over one cyclotomic ring.
///
/// # Invariants
/// - at least one tower
/// - every tower shares `cyclotomic_order`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcrtParams {
    cyclotomic_order: u32,
    towers: Vec<Arc<ElementParams>>,
}

impl DcrtParams {
    pub fn new(
        cyclotomic_order: u32,
        moduli: &[u64],
        roots: &[u64],
        engine: &NttEngine,
    ) -> RingResult<Self> {
        if moduli.len() != roots.len() {
            return Err(RingError::LengthMismatch {
                expected: moduli.len(),
                actual: roots.len(),
            });
        }
        let towers = moduli
            .iter()
            .zip(roots)
            .map(|(&q, &root)| ElementParams::new(cyclotomic_order, q, root, engine).map(Arc::new))
            .collect::<RingResult<Vec<_>>>()?;
        Self::from_towers(towers)
    }

    pub fn from_moduli(cyclotomic_order: u32, moduli: &[u64], engine: &NttEngine) -> RingResult<Self> {
        let towers = moduli
            .iter()
            .map(|&q| ElementParams::with_modulus(cyclotomic_order, q, engine).map(Arc::new))
            .collect::<RingResult<Vec<_>>>()?;
        Self::from_towers(towers)
    }

    pub fn from_towers(towers: Vec<Arc<ElementParams>>) -> RingResult<Self> {
        let first = towers.first().ok_or(RingError::EmptyBasis)?;
        let cyclotomic_order = first.cyclotomic_order();
        if towers.iter().any(|t| t.cyclotomic_order() != cyclotomic_order) {
            return Err(RingError::ParamsMismatch {
                operation: "DcrtParams::from_towers",
            });
        }
        Ok(Self {
            cyclotomic_order,
            towers,
        })
    }

    pub fn cyclotomic_order(&self) -> u32 {
        self.cyclotomic_order
    }

    pub fn ring_dim(&self) -> usize {
        (self.cyclotomic_order / 2) as usize
    }

    pub fn len(&self) -> usize {
        self.towers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.towers.is_empty()
    }

    pub fn towers(&self) -> &[Arc<ElementParams>] {
        &self.towers
    }

    pub fn tower(&self, index: usize) -> &Arc<ElementParams> {
        &self.towers[index]
    }

    pub fn moduli(&self) -> Vec<u64> {
        self.towers.iter().map(|t| t.modulus()).collect()
    }

    pub fn roots(&self) -> Vec<u64> {
        self.towers.iter().map(|t| t.root_of_unity()).collect()
    }

    pub fn modulus_bits(&self) -> u32 {
        self.towers
            .iter()
            .map(|t| 64 - t.modulus().leading_zeros())
            .sum()
    }

    /// The first `len` towers of the chain.
    pub fn truncated(&self, len: usize) -> RingResult<Self> {
        if len == 0 || len > self.len() {
            return Err(RingError::OutOfTowers {
                requested: self.len().saturating_sub(len),
                available: self.len(),
            });
        }
        Ok(Self {
            cyclotomic_order: self.cyclotomic_order,
            towers: self.towers[..len].to_vec(),
        })
    }

    /// Concatenation `{self} U {other}` (for example `Q U P`).
    pub fn extended(&self, other: &DcrtParams) -> RingResult<Self> {
        if self.cyclotomic_order != other.cyclotomic_order {
            return Err(RingError::ParamsMismatch {
                operation: "DcrtParams::extended",
            });
        }
        let mut towers = self.towers.clone();
        towers.extend(other.towers.iter().cloned());
        Ok(Self {
            cyclotomic_order: self.cyclotomic_order,
            towers,
        })
    }

    /// Towers `start..end` as their own chain.
    pub fn slice(&self, start: usize, end: usize) -> RingResult<Self> {
        if start >= end || end > self.len() {
            return Err(RingError::OutOfTowers {
                requested: end,
                available: self.len(),
            });
        }
        Self::from_towers(self.towers[start..end].to_vec())
    }
}

/// Cheap identity check before falling back to structural equality.
pub fn same_params(a: &Arc<DcrtParams>, b: &Arc<DcrtParams>) -> bool {
    Arc::ptr_eq(a, b) || a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_operations_preserve_order() {
        let engine = NttEngine::new();
        let params = DcrtParams::from_moduli(16, &[17, 97, 113], &engine).unwrap();
        assert_eq!(params.ring_dim(), 8);
        assert_eq!(params.truncated(2).unwrap().moduli(), vec![17, 97]);
        assert_eq!(params.slice(1, 3).unwrap().moduli(), vec![97, 113]);
        let other = DcrtParams::from_moduli(16, &[193], &engine).unwrap();
        assert_eq!(params.extended(&other).unwrap().moduli(), vec![17, 97, 113, 193]);
        assert_eq!(engine.len(), 4);
    }

    #[test]
    fn rejects_empty_and_invalid_chains() {
        let engine = NttEngine::new();
        assert!(matches!(
            DcrtParams::from_moduli(16, &[], &engine),
            Err(RingError::EmptyBasis)
        ));
        assert!(matches!(
            DcrtParams::from_moduli(16, &[19], &engine),
            Err(RingError::MissingRootOfUnity { .. })
        ));
        let params = DcrtParams::from_moduli(16, &[17], &engine).unwrap();
        assert!(matches!(params.truncated(0), Err(RingError::OutOfTowers { .. })));
    }
}
