use dashmap::DashMap;
use ndarray::{Array2, ArrayView2};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::structs::dictionary::Dictionary;

/// Key identifying one memoized operation, hashed over the operation name
/// and the bit patterns of its arguments
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn for_projection(
        dictionary: &Dictionary,
        samples: ArrayView2<'_, f64>,
        alpha: f64,
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        "projection".hash(&mut hasher);
        alpha.to_bits().hash(&mut hasher);
        for value in dictionary.matrix().iter() {
            value.to_bits().hash(&mut hasher);
        }
        for value in samples.iter() {
            value.to_bits().hash(&mut hasher);
        }
        CacheKey(hasher.finish())
    }
}

/// An injectable memoization service for projection batches
///
/// Optional around the projector; correctness never depends on it. Entries
/// are keyed by [CacheKey], so a cache hit requires bit-identical inputs.
#[derive(Debug, Default)]
pub struct ProjectionCache {
    entries: DashMap<CacheKey, Array2<f64>>,
}

impl ProjectionCache {
    pub fn new() -> Self {
        ProjectionCache::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Array2<f64>> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn insert(&self, key: CacheKey, loadings: Array2<f64>) {
        self.entries.insert(key, loadings);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_key_is_sensitive_to_arguments() {
        let mut rng = StdRng::seed_from_u64(1);
        let dictionary = Dictionary::random(2, 4, &mut rng);
        let samples = Array2::<f64>::ones((3, 4));

        let base = CacheKey::for_projection(&dictionary, samples.view(), 0.1);
        let other_alpha = CacheKey::for_projection(&dictionary, samples.view(), 0.2);
        let same = CacheKey::for_projection(&dictionary, samples.view(), 0.1);

        assert_ne!(base, other_alpha);
        assert_eq!(base, same);
    }

    #[test]
    fn test_round_trip() {
        let cache = ProjectionCache::new();
        let mut rng = StdRng::seed_from_u64(1);
        let dictionary = Dictionary::random(2, 4, &mut rng);
        let samples = Array2::<f64>::zeros((3, 4));
        let key = CacheKey::for_projection(&dictionary, samples.view(), 0.1);

        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), Array2::zeros((3, 2)));
        assert_eq!(cache.get(&key), Some(Array2::zeros((3, 2))));
        assert_eq!(cache.len(), 1);
    }
}
