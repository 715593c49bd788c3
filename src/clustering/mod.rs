//! Respondent clustering.
//!
//! Respondents are encoded into numeric feature vectors
//! ([`encode_features`]) and partitioned by a [`Clusterer`]. The resulting
//! [`Clustering`] assigns each respondent an optional cluster id; `None`
//! marks respondents whose cluster was excluded from synthesis.

pub mod features;
pub mod kmedoids;

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array2, ArrayView1};

use crate::error::ClusteringError;

pub use features::{encode_features, FeatureMatrix, ONE_HOT_LIMIT};
pub use kmedoids::{KMedoids, DEFAULT_MAX_ROUNDS};

/// Partitions N feature vectors into k groups.
pub trait Clusterer {
    /// Clusters the rows of `features` into `k` groups.
    ///
    /// # Errors
    ///
    /// Fails when `features` has no rows or `k` is outside `1..=n`.
    fn fit(&self, features: &Array2<f64>, k: usize) -> Result<Clustering, ClusteringError>;
}

/// Cluster assignment for every respondent plus one center per cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    labels: Vec<Option<usize>>,
    centers: Array2<f64>,
}

impl Clustering {
    /// Creates a clustering from per-respondent labels and cluster centers.
    pub fn new(labels: Vec<Option<usize>>, centers: Array2<f64>) -> Self {
        Self { labels, centers }
    }

    /// Per-respondent cluster id; `None` once excluded.
    pub fn labels(&self) -> &[Option<usize>] {
        &self.labels
    }

    /// One center row per cluster id.
    pub fn centers(&self) -> &Array2<f64> {
        &self.centers
    }

    /// Number of clusters the model was fitted with.
    pub fn k(&self) -> usize {
        self.centers.nrows()
    }

    /// Respondent indices assigned to `cluster`.
    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == Some(cluster))
            .map(|(i, _)| i)
            .collect()
    }

    /// Member counts for every cluster id with at least one respondent.
    pub fn counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for label in self.labels.iter().flatten() {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }

    /// The member of `cluster` nearest to its center.
    pub fn representative(&self, features: &Array2<f64>, cluster: usize) -> Option<usize> {
        if cluster >= self.k() {
            return None;
        }
        let center = self.centers.row(cluster);
        self.members(cluster)
            .into_iter()
            .map(|i| (i, euclidean_distance(features.row(i), center)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Relabels every respondent of the given clusters as unassigned.
    ///
    /// Returns the number of respondents dropped.
    pub fn exclude(&mut self, clusters: &BTreeSet<usize>) -> usize {
        let mut dropped = 0;
        for label in self.labels.iter_mut() {
            if label.is_some_and(|c| clusters.contains(&c)) {
                *label = None;
                dropped += 1;
            }
        }
        dropped
    }
}

/// Euclidean distance between two vectors of equal length.
pub fn euclidean_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Symmetric matrix of pairwise Euclidean distances between rows.
pub fn pairwise_euclidean_distance(features: &Array2<f64>) -> Array2<f64> {
    let n = features.nrows();
    let mut distances = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = euclidean_distance(features.row(i), features.row(j));
            distances[[i, j]] = d;
            distances[[j, i]] = d;
        }
    }
    distances
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn fixture() -> (Array2<f64>, Clustering) {
        let features = array![[0.0, 0.0], [1.0, 0.0], [5.0, 5.0], [6.0, 5.0], [9.0, 9.0]];
        let centers = array![[0.9, 0.0], [5.0, 5.0]];
        let labels = vec![Some(0), Some(0), Some(1), Some(1), None];
        (features, Clustering::new(labels, centers))
    }

    #[test]
    fn test_members_and_counts() {
        let (_, clustering) = fixture();
        assert_eq!(clustering.members(1), vec![2, 3]);
        assert_eq!(clustering.counts(), BTreeMap::from([(0, 2), (1, 2)]));
        assert_eq!(clustering.k(), 2);
    }

    #[test]
    fn test_representative_is_nearest_to_center() {
        let (features, clustering) = fixture();
        assert_eq!(clustering.representative(&features, 0), Some(1));
        assert_eq!(clustering.representative(&features, 1), Some(2));
        assert_eq!(clustering.representative(&features, 5), None);
    }

    #[test]
    fn test_exclude_relabels_members() {
        let (_, mut clustering) = fixture();
        let dropped = clustering.exclude(&BTreeSet::from([1]));
        assert_eq!(dropped, 2);
        assert_eq!(clustering.labels(), &[Some(0), Some(0), None, None, None]);
        assert_eq!(clustering.counts(), BTreeMap::from([(0, 2)]));
    }

    #[test]
    fn test_pairwise_distance_is_symmetric() {
        let (features, _) = fixture();
        let d = pairwise_euclidean_distance(&features);
        assert_eq!(d[[0, 1]], 1.0);
        assert_eq!(d[[1, 0]], 1.0);
        assert_eq!(d[[2, 2]], 0.0);
    }
}
