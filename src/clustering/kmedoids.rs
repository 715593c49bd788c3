//! Deterministic k-medoids (PAM-style alternation).

use ndarray::Array2;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::{pairwise_euclidean_distance, Clusterer, Clustering};
use crate::error::ClusteringError;

/// Default cap on assignment/update rounds.
pub const DEFAULT_MAX_ROUNDS: usize = 50;

/// k-medoids with maxmin initialisation.
///
/// The first medoid is drawn from the seeded RNG; each further medoid is the
/// point farthest from every medoid chosen so far. Rounds then alternate
/// between assigning points to their nearest medoid and moving each medoid to
/// the member minimizing total in-cluster distance, until the medoids stop
/// changing or `max_rounds` is reached.
#[derive(Debug, Clone)]
pub struct KMedoids {
    seed: Option<u64>,
    max_rounds: usize,
}

impl Default for KMedoids {
    fn default() -> Self {
        Self {
            seed: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl KMedoids {
    /// Creates a clusterer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the random seed for reproducible initialisation.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn create_rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }

    /// Selects k initial medoids using the maxmin strategy.
    fn select_initial_medoids(&self, distances: &Array2<f64>, k: usize) -> Vec<usize> {
        let n = distances.nrows();
        let mut rng = self.create_rng();
        let first = (0..n)
            .collect::<Vec<_>>()
            .choose(&mut rng)
            .copied()
            .unwrap_or(0);

        let mut medoids = Vec::with_capacity(k);
        medoids.push(first);
        let mut min_distances: Vec<f64> = (0..n).map(|j| distances[[first, j]]).collect();

        while medoids.len() < k {
            let mut best_idx = None;
            let mut best_dist = f64::NEG_INFINITY;
            for (j, &d) in min_distances.iter().enumerate() {
                if !medoids.contains(&j) && d > best_dist {
                    best_dist = d;
                    best_idx = Some(j);
                }
            }
            let Some(next) = best_idx else { break };
            medoids.push(next);
            for (j, d) in min_distances.iter_mut().enumerate() {
                *d = d.min(distances[[next, j]]);
            }
        }

        medoids
    }
}

/// Index into `medoids` of the nearest medoid for every point.
///
/// Ties go to the earlier medoid.
fn assign(distances: &Array2<f64>, medoids: &[usize]) -> Vec<usize> {
    (0..distances.nrows())
        .map(|i| {
            let mut best = 0;
            for (c, &m) in medoids.iter().enumerate().skip(1) {
                if distances[[i, m]] < distances[[i, medoids[best]]] {
                    best = c;
                }
            }
            best
        })
        .collect()
}

/// Member of `cluster` with the smallest total distance to the others.
fn best_medoid(distances: &Array2<f64>, assignments: &[usize], cluster: usize) -> Option<usize> {
    let members: Vec<usize> = assignments
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c == cluster)
        .map(|(i, _)| i)
        .collect();

    members
        .iter()
        .map(|&candidate| {
            let cost: f64 = members.iter().map(|&m| distances[[candidate, m]]).sum();
            (candidate, cost)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}

impl Clusterer for KMedoids {
    fn fit(&self, features: &Array2<f64>, k: usize) -> Result<Clustering, ClusteringError> {
        let n = features.nrows();
        if n == 0 {
            return Err(ClusteringError::Empty);
        }
        if k == 0 || k > n {
            return Err(ClusteringError::InvalidK { k, n });
        }

        let distances = pairwise_euclidean_distance(features);
        let mut medoids = self.select_initial_medoids(&distances, k);
        let mut assignments = assign(&distances, &medoids);
        let mut rounds = 0;

        while rounds < self.max_rounds {
            rounds += 1;
            let updated: Vec<usize> = medoids
                .iter()
                .enumerate()
                .map(|(c, &current)| best_medoid(&distances, &assignments, c).unwrap_or(current))
                .collect();
            if updated == medoids {
                break;
            }
            medoids = updated;
            assignments = assign(&distances, &medoids);
        }

        tracing::debug!(k, n, rounds, "k-medoids converged");

        let mut centers = Array2::zeros((medoids.len(), features.ncols()));
        for (c, &m) in medoids.iter().enumerate() {
            centers.row_mut(c).assign(&features.row(m));
        }

        Ok(Clustering::new(
            assignments.into_iter().map(Some).collect(),
            centers,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.2],
            [10.0, 10.0],
            [10.1, 10.0],
            [9.9, 10.2],
        ]
    }

    #[test]
    fn test_separates_obvious_groups() {
        let clustering = KMedoids::new()
            .with_seed(Some(7))
            .fit(&two_blobs(), 2)
            .expect("fits");

        let labels = clustering.labels();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
        assert_eq!(clustering.centers().dim(), (2, 2));
    }

    #[test]
    fn test_same_seed_same_result() {
        let a = KMedoids::new().with_seed(Some(42)).fit(&two_blobs(), 3).expect("fits");
        let b = KMedoids::new().with_seed(Some(42)).fit(&two_blobs(), 3).expect("fits");
        assert_eq!(a.labels(), b.labels());
        assert_eq!(a.centers(), b.centers());
    }

    #[test]
    fn test_invalid_k() {
        let err = KMedoids::new().fit(&two_blobs(), 7).unwrap_err();
        assert!(matches!(err, ClusteringError::InvalidK { k: 7, n: 6 }));
        assert!(matches!(
            KMedoids::new().fit(&two_blobs(), 0),
            Err(ClusteringError::InvalidK { .. })
        ));
        assert!(matches!(
            KMedoids::new().fit(&Array2::zeros((0, 3)), 1),
            Err(ClusteringError::Empty)
        ));
    }

    #[test]
    fn test_k_equals_n() {
        let clustering = KMedoids::new().with_seed(Some(1)).fit(&two_blobs(), 6).expect("fits");
        let mut labels: Vec<usize> = clustering.labels().iter().flatten().copied().collect();
        labels.sort_unstable();
        assert_eq!(labels, vec![0, 1, 2, 3, 4, 5]);
    }
}
