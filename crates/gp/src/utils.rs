use linfa::Float;
use ndarray::{Array2, ArrayBase, Data, Ix2, Zip};

/// A structure to retain absolute differences between all pairs of distinct
/// training points, used to build a symmetric covariance matrix
#[derive(Debug)]
pub struct DiffMatrix<F: Float> {
    /// Differences as (n_obs * (n_obs-1))/2, nx) array
    pub d: Array2<F>,
    /// Indices (i, j) with i < j of the differences in the original data array
    pub d_indices: Array2<usize>,
    /// Number of observations
    pub n_obs: usize,
}

impl<F: Float> DiffMatrix<F> {
    /// Compute differences given points given as an array (n_obs, nx)
    pub fn new(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> DiffMatrix<F> {
        let (d, d_indices) = Self::condensed_diffs(x);
        let n_obs = x.nrows();

        DiffMatrix {
            d,
            d_indices,
            n_obs,
        }
    }

    /// Condensed differences feeding [`gram_from_diffs`](crate::linalg::gram_from_diffs)
    /// and the hyperparameter jacobians of the covariance matrix: row `r` holds
    /// `|x_k - x_i|` for the r-th pair `(k, i)`, `k < i`, the upper triangle being
    /// walked row by row. A single point gives no pair.
    fn condensed_diffs(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> (Array2<F>, Array2<usize>) {
        let n_obs = x.nrows();
        let n_pairs = n_obs * n_obs.saturating_sub(1) / 2;
        let mut indices = Array2::<usize>::zeros((n_pairs, 2));
        let mut d = Array2::zeros((n_pairs, x.ncols()));
        let pairs = (0..n_obs).flat_map(|k| ((k + 1)..n_obs).map(move |i| (k, i)));
        for (r, (k, i)) in pairs.enumerate() {
            indices[[r, 0]] = k;
            indices[[r, 1]] = i;
            Zip::from(d.row_mut(r))
                .and(x.row(k))
                .and(x.row(i))
                .for_each(|d, &a, &b| *d = num_traits::Float::abs(a - b));
        }
        (d, indices)
    }
}
