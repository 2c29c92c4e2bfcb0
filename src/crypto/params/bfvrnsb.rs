//! BFVrnsB parameters: the BFV chain with BEHZ tables instead of HPS.

use std::sync::Arc;

use tracing::instrument;

use super::bfvrns::{BfvWorkload, bfv_batch_size, bfv_chain, delta_residues, rlwe_over_chain};
use super::{RlweParams, RlweSettings, SchemeKind};
use crate::crypto::errors::{HeError, HeResult};
use crate::rings::behz::BehzTables;

#[derive(Debug, Clone)]
pub struct BfvRnsBTables {
    delta: Vec<u64>,
    behz: Arc<BehzTables>,
}

impl BfvRnsBTables {
    pub fn delta(&self) -> &[u64] {
        &self.delta
    }

    pub fn behz(&self) -> &BehzTables {
        &self.behz
    }
}

#[derive(Debug, Clone)]
pub struct BfvRnsBParams {
    rlwe: RlweParams,
    tables: Option<BfvRnsBTables>,
}

impl BfvRnsBParams {
    pub fn generate(
        mut settings: RlweSettings,
        plaintext_modulus: u64,
        workload: BfvWorkload,
        dcrt_bits: u32,
        ring_dim: usize,
    ) -> HeResult<Self> {
        let (n, moduli) = bfv_chain(&settings, plaintext_modulus, workload, dcrt_bits, ring_dim)?;
        settings.batch_size = bfv_batch_size(settings.batch_size, n)?;
        let mut params = Self::from_chain(settings, plaintext_modulus, 2 * n as u32, &moduli)?;
        params.precompute()?;
        Ok(params)
    }

    pub fn from_chain(
        settings: RlweSettings,
        plaintext_modulus: u64,
        cyclotomic_order: u32,
        moduli: &[u64],
    ) -> HeResult<Self> {
        Ok(Self {
            rlwe: rlwe_over_chain(settings, plaintext_modulus, cyclotomic_order, moduli)?,
            tables: None,
        })
    }

    pub fn rlwe(&self) -> &RlweParams {
        &self.rlwe
    }

    pub fn tables(&self) -> HeResult<&BfvRnsBTables> {
        self.tables.as_ref().ok_or(HeError::TablesNotPrecomputed {
            scheme: SchemeKind::BfvRnsB,
        })
    }

    #[instrument(skip_all)]
    pub fn precompute(&mut self) -> HeResult<()> {
        let q_params = self.rlwe.element_params().clone();
        let t = self.rlwe.plaintext_modulus();
        let behz = BehzTables::new(q_params.clone(), t, self.rlwe.engine())?;
        self.tables = Some(BfvRnsBTables {
            delta: delta_residues(&q_params.moduli(), t),
            behz: Arc::new(behz),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::params::SecurityLevel;

    #[test]
    fn tables_are_built_on_generation_only() {
        let settings = RlweSettings {
            security_level: SecurityLevel::NotSet,
            ..RlweSettings::default()
        };
        let workload = BfvWorkload {
            eval_mults: 1,
            ..BfvWorkload::default()
        };
        let params = BfvRnsBParams::generate(settings.clone(), 65537, workload, 50, 1024).unwrap();
        let tables = params.tables().unwrap();
        assert_eq!(tables.delta().len(), params.rlwe().moduli().len());
        assert_eq!(params.rlwe().batch_size(), 1024);

        let bare = BfvRnsBParams::from_chain(settings, 65537, 2048, &params.rlwe().moduli()).unwrap();
        assert!(matches!(
            bare.tables(),
            Err(HeError::TablesNotPrecomputed { scheme: SchemeKind::BfvRnsB })
        ));
    }
}
