//! Generator module - enumerates every free polyomino of a given rank
//!
//! Minos of rank `n` are grown from the minos of rank `n - 1`: each parent is
//! extended by every empty neighbouring cell, the candidate is reduced to its
//! canonical form and duplicates are dropped by canonical encoding. The result
//! is ordered by that encoding, so the same rank always yields the same list
//! in the same order.
//!
//! | Rank | Minos |
//! |------|-------|
//! | 1 | 1 |
//! | 2 | 1 |
//! | 3 | 2 |
//! | 4 | 5 |
//! | 5 | 12 |

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::GenerationError;
use crate::mino::Mino;

/// Generate the canonical minos of exactly `rank` cells
pub fn generate(rank: i32) -> Result<Vec<Mino>, GenerationError> {
    match rank {
        r if r < 0 => Err(GenerationError::InvalidRank(r)),
        0 => Ok(Vec::new()),
        1 => Ok(vec![Mino::unit()]),
        _ => Ok(extend(&generate(rank - 1)?)),
    }
}

fn extend<'a>(parents: impl IntoIterator<Item = &'a Mino>) -> Vec<Mino> {
    let mut seen: BTreeMap<String, Mino> = BTreeMap::new();
    for parent in parents {
        for cell in parent.neighborhood() {
            let candidate = parent.with_cell(cell).canonical();
            seen.entry(candidate.to_string()).or_insert(candidate);
        }
    }
    seen.into_values().collect()
}

/// Memoizing generator
///
/// Owned by whoever needs minos (the server, a client session); there is no
/// process-wide cache.
#[derive(Debug, Default)]
pub struct Generator {
    cache: HashMap<i32, Vec<Arc<Mino>>>,
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same as [`generate`], but shares results between calls
    pub fn generate(&mut self, rank: i32) -> Result<Vec<Arc<Mino>>, GenerationError> {
        if let Some(minos) = self.cache.get(&rank) {
            return Ok(minos.clone());
        }

        let minos: Vec<Arc<Mino>> = match rank {
            r if r < 0 => return Err(GenerationError::InvalidRank(r)),
            0 => Vec::new(),
            1 => vec![Arc::new(Mino::unit())],
            _ => {
                let parents = self.generate(rank - 1)?;
                extend(parents.iter().map(|m| m.as_ref()))
                    .into_iter()
                    .map(Arc::new)
                    .collect()
            }
        };

        self.cache.insert(rank, minos.clone());
        Ok(minos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_rank_is_rejected() {
        assert_eq!(generate(-1), Err(GenerationError::InvalidRank(-1)));
        assert!(Generator::new().generate(-3).is_err());
    }

    #[test]
    fn test_small_ranks() {
        assert!(generate(0).unwrap().is_empty());
        assert_eq!(generate(1).unwrap(), vec![Mino::unit()]);
        assert_eq!(generate(2).unwrap().len(), 1);
    }

    #[test]
    fn test_generator_cache_matches_plain_generate() {
        let mut gen = Generator::new();
        let cached: Vec<Mino> = gen
            .generate(4)
            .unwrap()
            .iter()
            .map(|m| m.as_ref().clone())
            .collect();
        assert_eq!(cached, generate(4).unwrap());

        let again = gen.generate(4).unwrap();
        assert_eq!(again.len(), 5);
    }

    #[test]
    fn test_output_is_sorted_by_encoding() {
        let minos = generate(5).unwrap();
        let keys: Vec<String> = minos.iter().map(|m| m.to_string()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
