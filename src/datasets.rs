//! Synthetic datasets used by the demo and the tests.
use ndarray::{Array, Array1, Array2, Axis, Zip};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

/// Standard deviation of the phase noise of [`classification_toy`]
pub const TOY_NOISE_STD: f64 = 0.05;

/// Binary labels of a noisy cosine wave.
///
/// Returns `n` sorted points drawn uniformly in `[-1, 1]` as a `(n, 1)` matrix and
/// labels `0.5 * sign(cos(3x + e)) + 0.5` with `e ~ N(0, 0.05^2)`, as a `(n, 1)` matrix
/// of 0s and 1s. The same seed gives the same dataset.
pub fn classification_toy(n: usize, seed: u64) -> (Array2<f64>, Array2<f64>) {
    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    let mut x: Vec<f64> = Array::random_using(n, Uniform::new(-1., 1.), &mut rng).to_vec();
    x.sort_by(|a: &f64, b| a.total_cmp(b));
    let x = Array1::from(x).insert_axis(Axis(1));
    // std is a positive constant
    let noise = Normal::new(0., TOY_NOISE_STD).unwrap();
    let e = Array::random_using((n, 1), noise, &mut rng);
    let y = Zip::from(&x)
        .and(&e)
        .map_collect(|&x: &f64, &e: &f64| 0.5 * (3. * x + e).cos().signum() + 0.5);
    (x, y)
}

/// `n` evenly spaced test points over `[-1.05, 1.05]` as a `(n, 1)` matrix
pub fn test_grid(n: usize) -> Array2<f64> {
    Array::linspace(-1.05, 1.05, n).insert_axis(Axis(1))
}
