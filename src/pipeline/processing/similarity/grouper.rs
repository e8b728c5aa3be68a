use super::features::ContactFeatures;
use super::SimilarityGrouper;
use crate::domain::NormalizedContact;

/// A pair of contacts scoring at or above the threshold
#[derive(Debug, Clone)]
pub struct ScoredPair<'a> {
    pub first_index: usize,
    pub second_index: usize,
    pub first: &'a NormalizedContact,
    pub second: &'a NormalizedContact,
    pub features: ContactFeatures,
    pub similarity_score: f64,
}

/// Weighted-feature grouper used by default
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureGrouper;

impl FeatureGrouper {
    pub fn new() -> Self {
        Self
    }
}

impl SimilarityGrouper for FeatureGrouper {
    fn group(
        &self,
        batch: &[NormalizedContact],
        threshold: f64,
    ) -> anyhow::Result<Vec<Vec<NormalizedContact>>> {
        Ok(group_similar_contacts(batch, threshold))
    }

    fn name(&self) -> &str {
        "weighted_features_v1"
    }
}

fn score(a: &NormalizedContact, b: &NormalizedContact) -> (ContactFeatures, f64) {
    let features = ContactFeatures::extract(a, b);
    let score = features.score();
    (features, score)
}

/// Every unordered pair at or above `threshold`, in input order
pub fn detect_duplicates(contacts: &[NormalizedContact], threshold: f64) -> Vec<ScoredPair<'_>> {
    let mut pairs = Vec::new();
    for (i, first) in contacts.iter().enumerate() {
        for (j, second) in contacts.iter().enumerate().skip(i + 1) {
            let (features, similarity_score) = score(first, second);
            if similarity_score >= threshold {
                pairs.push(ScoredPair {
                    first_index: i,
                    second_index: j,
                    first,
                    second,
                    features,
                    similarity_score,
                });
            }
        }
    }
    pairs
}

/// Partition `contacts` into similarity groups.
///
/// Each unclaimed pair seeds a group, which then absorbs every unclaimed
/// contact similar to the pair's first member. Contacts left over become
/// singleton groups, in input order.
pub fn group_similar_contacts(
    contacts: &[NormalizedContact],
    threshold: f64,
) -> Vec<Vec<NormalizedContact>> {
    let n = contacts.len();
    let mut claimed = vec![false; n];
    let mut groups: Vec<Vec<usize>> = Vec::new();

    let seeds: Vec<(usize, usize)> = detect_duplicates(contacts, threshold)
        .iter()
        .map(|pair| (pair.first_index, pair.second_index))
        .collect();

    for (i, j) in seeds {
        if claimed[i] || claimed[j] {
            continue;
        }
        claimed[i] = true;
        claimed[j] = true;
        let mut group = vec![i, j];

        for k in 0..n {
            if claimed[k] {
                continue;
            }
            if score(&contacts[i], &contacts[k]).1 >= threshold {
                claimed[k] = true;
                group.push(k);
            }
        }
        groups.push(group);
    }

    for (k, taken) in claimed.iter().enumerate() {
        if !taken {
            groups.push(vec![k]);
        }
    }

    groups
        .into_iter()
        .map(|group| group.into_iter().map(|k| contacts[k].clone()).collect())
        .collect()
}
