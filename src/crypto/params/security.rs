//! HomomorphicEncryption.org security table: the largest `log2 Q` a ring
//! dimension supports at each classical security level.

use super::SecurityLevel;
use crate::crypto::errors::{HeError, HeResult};

/// Distribution the secret key is drawn from; the table differs slightly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistributionKind {
    Ternary,
    Error,
}

/// `(ring_dim, [128, 192, 256])` rows.
const TERNARY: [(usize, [u32; 3]); 6] = [
    (1024, [27, 19, 14]),
    (2048, [54, 37, 29]),
    (4096, [109, 75, 58]),
    (8192, [218, 152, 118]),
    (16384, [438, 305, 237]),
    (32768, [881, 611, 476]),
];

const ERROR: [(usize, [u32; 3]); 6] = [
    (1024, [29, 21, 16]),
    (2048, [56, 39, 31]),
    (4096, [111, 77, 60]),
    (8192, [220, 154, 120]),
    (16384, [440, 307, 239]),
    (32768, [880, 612, 478]),
];

fn column(level: SecurityLevel) -> Option<usize> {
    match level {
        SecurityLevel::Classic128 => Some(0),
        SecurityLevel::Classic192 => Some(1),
        SecurityLevel::Classic256 => Some(2),
        SecurityLevel::NotSet => None,
    }
}

fn table(distribution: DistributionKind) -> &'static [(usize, [u32; 3])] {
    match distribution {
        DistributionKind::Ternary => &TERNARY,
        DistributionKind::Error => &ERROR,
    }
}

/// Largest modulus size (bits) allowed for `ring_dim`; `None` when the level
/// is unset or the dimension is not tabulated.
pub fn max_log_q(distribution: DistributionKind, level: SecurityLevel, ring_dim: usize) -> Option<u32> {
    let col = column(level)?;
    table(distribution)
        .iter()
        .find(|(n, _)| *n == ring_dim)
        .map(|(_, row)| row[col])
}

/// Smallest tabulated ring dimension supporting a `log_q`-bit modulus.
pub fn find_ring_dim(distribution: DistributionKind, level: SecurityLevel, log_q: u32) -> Option<usize> {
    let col = column(level)?;
    table(distribution)
        .iter()
        .find(|(_, row)| row[col] >= log_q)
        .map(|&(n, _)| n)
}

/// Ring dimension for a `log_q`-bit chain: the requested one when it is
/// secure enough, otherwise the smallest secure one. `requested == 0` means
/// "pick for me" and is only valid with a security level.
pub fn resolve_ring_dim(
    distribution: DistributionKind,
    level: SecurityLevel,
    requested: usize,
    log_q: u32,
) -> HeResult<usize> {
    if level == SecurityLevel::NotSet {
        if requested == 0 {
            return Err(HeError::ParamsGen {
                message: "specify the ring dimension or a security level".into(),
            });
        }
        return Ok(requested);
    }
    let secure = find_ring_dim(distribution, level, log_q).ok_or_else(|| HeError::ParamsGen {
        message: format!("no tabulated ring dimension supports a {log_q}-bit modulus at {level:?}"),
    })?;
    match requested {
        0 => Ok(secure),
        n if n < secure => Err(HeError::ParamsGen {
            message: format!(
                "ring dimension {n} is below the {secure} required for a {log_q}-bit modulus at {level:?}"
            ),
        }),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smallest_dimension_is_chosen() {
        let d = DistributionKind::Ternary;
        assert_eq!(find_ring_dim(d, SecurityLevel::Classic128, 27), Some(1024));
        assert_eq!(find_ring_dim(d, SecurityLevel::Classic128, 28), Some(2048));
        assert_eq!(find_ring_dim(d, SecurityLevel::Classic256, 400), Some(32768));
        assert_eq!(find_ring_dim(d, SecurityLevel::Classic128, 900), None);
        assert_eq!(find_ring_dim(d, SecurityLevel::NotSet, 10), None);
    }

    #[test]
    fn error_table_is_slightly_looser() {
        assert_eq!(
            max_log_q(DistributionKind::Error, SecurityLevel::Classic192, 8192),
            Some(154)
        );
        assert_eq!(
            max_log_q(DistributionKind::Ternary, SecurityLevel::Classic192, 8192),
            Some(152)
        );
        assert_eq!(max_log_q(DistributionKind::Ternary, SecurityLevel::Classic128, 512), None);
    }

    #[test]
    fn requested_dimension_must_be_secure() {
        let d = DistributionKind::Ternary;
        assert_eq!(resolve_ring_dim(d, SecurityLevel::Classic128, 0, 100).unwrap(), 4096);
        assert_eq!(resolve_ring_dim(d, SecurityLevel::Classic128, 8192, 100).unwrap(), 8192);
        assert!(resolve_ring_dim(d, SecurityLevel::Classic128, 2048, 100).is_err());
        assert_eq!(resolve_ring_dim(d, SecurityLevel::NotSet, 64, 500).unwrap(), 64);
        assert!(resolve_ring_dim(d, SecurityLevel::NotSet, 0, 50).is_err());
    }
}
