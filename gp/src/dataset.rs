//! Seeded permutation and train/test split of a buckling dataset.

use crate::errors::{GpError, Result};
use crate::parameters::Role;
use linfa::dataset::Dataset;
use log::{info, warn};
use ndarray::{ArrayBase, Axis, Data, Ix1, Ix2};
use ndarray_rand::rand::seq::SliceRandom;
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

/// Default seed of the random permutation
pub const DEFAULT_SEED: u64 = 1234567;

/// Disjoint training and held-out subsets of a shuffled dataset
#[derive(Clone, Debug)]
pub struct TrainTestSplit {
    /// First `n_train` shuffled rows
    pub train: Dataset<f64, f64, Ix1>,
    /// Next `n_test` shuffled rows (possibly fewer than requested)
    pub test: Dataset<f64, f64, Ix1>,
    /// Row indices of the original dataset in shuffled order
    pub permutation: Vec<usize>,
}

impl TrainTestSplit {
    /// Number of training rows
    pub fn n_train(&self) -> usize {
        self.train.records().nrows()
    }

    /// Number of held-out rows
    pub fn n_test(&self) -> usize {
        self.test.records().nrows()
    }
}

/// Shuffle rows of (`records`, `targets`) with a generator seeded by `seed`
/// then take the first `n_train` rows for training and the next `n_test`
/// for testing.
///
/// `n_test` is clipped to the rows remaining after the training set.
/// Fails when `n_train` is zero or exceeds the number of rows.
pub fn shuffle_split(
    records: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    targets: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    n_train: usize,
    n_test: usize,
    seed: u64,
) -> Result<TrainTestSplit> {
    shuffle_split_as(Role::Coordinator, records, targets, n_train, n_test, seed)
}

/// Same as [shuffle_split], logging only when `role` is the coordinator
pub fn shuffle_split_as(
    role: Role,
    records: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    targets: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    n_train: usize,
    n_test: usize,
    seed: u64,
) -> Result<TrainTestSplit> {
    let n_data = records.nrows();
    if targets.len() != n_data {
        return Err(GpError::ConfigurationError(format!(
            "{} records but {} targets",
            n_data,
            targets.len()
        )));
    }
    if n_train == 0 || n_train > n_data {
        return Err(GpError::ConfigurationError(format!(
            "Cannot take {n_train} training rows out of {n_data}"
        )));
    }
    let n_test = if n_train + n_test > n_data {
        let clipped = n_data - n_train;
        if role.is_coordinator() {
            warn!("Requested {n_test} test rows, only {clipped} left after training rows");
        }
        clipped
    } else {
        n_test
    };
    if role.is_coordinator() {
        info!("Training on {n_train} / {n_data} data points, testing on {n_test}");
    }

    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    let mut permutation: Vec<usize> = (0..n_data).collect();
    permutation.shuffle(&mut rng);

    let take = |idx: &[usize]| {
        Dataset::new(
            records.select(Axis(0), idx),
            targets.select(Axis(0), idx),
        )
    };
    let train = take(&permutation[..n_train]);
    let test = take(&permutation[n_train..n_train + n_test]);
    Ok(TrainTestSplit {
        train,
        test,
        permutation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 4), |(i, j)| (i * 4 + j) as f64);
        let y = Array1::from_shape_fn(n, |i| i as f64);
        (x, y)
    }

    #[test]
    fn test_split_is_deterministic() {
        let (x, y) = data(30);
        let s1 = shuffle_split(&x, &y, 20, 5, 42).unwrap();
        let s2 = shuffle_split(&x, &y, 20, 5, 42).unwrap();
        assert_eq!(s1.permutation, s2.permutation);
        assert_eq!(s1.train.records(), s2.train.records());
        assert_eq!(s1.test.targets(), s2.test.targets());

        let s3 = shuffle_split(&x, &y, 20, 5, 43).unwrap();
        assert_ne!(s1.permutation, s3.permutation);
    }

    #[test]
    fn test_split_is_disjoint_and_consistent() {
        let (x, y) = data(30);
        let split = shuffle_split(&x, &y, 20, 5, DEFAULT_SEED).unwrap();
        assert_eq!(split.n_train(), 20);
        assert_eq!(split.n_test(), 5);
        let mut seen: Vec<usize> = split.permutation[..25].to_vec();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 25);
        // records and targets stay paired
        for (row, t) in split.train.records().rows().into_iter().zip(split.train.targets()) {
            assert_eq!(row[0], 4. * t);
        }
    }

    #[test]
    fn test_test_size_is_clipped() {
        let (x, y) = data(20);
        let split = shuffle_split(&x, &y, 15, 10, DEFAULT_SEED).unwrap();
        assert_eq!(split.n_train(), 15);
        assert_eq!(split.n_test(), 5);

        let split = shuffle_split(&x, &y, 20, 10, DEFAULT_SEED).unwrap();
        assert_eq!(split.n_test(), 0);
    }

    #[test]
    fn test_split_does_not_depend_on_role() {
        let (x, y) = data(30);
        let s1 = shuffle_split(&x, &y, 20, 15, 7).unwrap();
        let s2 = shuffle_split_as(Role::Worker(3), &x, &y, 20, 15, 7).unwrap();
        assert_eq!(s1.permutation, s2.permutation);
        assert_eq!(s1.n_test(), s2.n_test());
        assert_eq!(s1.test.targets(), s2.test.targets());
    }

    #[test]
    fn test_too_many_training_rows() {
        let (x, y) = data(10);
        assert!(matches!(
            shuffle_split(&x, &y, 11, 0, DEFAULT_SEED),
            Err(GpError::ConfigurationError(_))
        ));
    }
}
