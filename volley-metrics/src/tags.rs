use crate::key::KeyId;
use smallvec::SmallVec;

/// Sorted `(key, value)` pairs identifying one series of a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // Series rarely carry more than a handful of tags.
    pub(crate) tags: SmallVec<[(KeyId, KeyId); 4]>,
}

impl TagSet {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        let mut tags: SmallVec<[(KeyId, KeyId); 4]> = pairs.into_iter().collect();
        tags.sort_unstable();
        tags.dedup_by(|a, b| a.0 == b.0);
        Self { tags }
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.tags.iter().copied()
    }
}
