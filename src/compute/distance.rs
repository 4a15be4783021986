//! Distance functions between batches of flattened observations.

use rayon::prelude::*;

/// Row-wise distance between two batches of observations.
///
/// Both batches are row-major with `width` values per walker and hold the
/// same number of rows. The result has one entry per row.
pub trait DistanceFunction: Send + Sync {
    fn distance(&self, a: &[f64], b: &[f64], width: usize) -> Vec<f64>;
}

/// Any per-row closure is a distance function.
impl<F> DistanceFunction for F
where
    F: Fn(&[f64], &[f64]) -> f64 + Send + Sync,
{
    fn distance(&self, a: &[f64], b: &[f64], width: usize) -> Vec<f64> {
        a.par_chunks(width)
            .zip(b.par_chunks(width))
            .map(|(x, y)| self(x, y))
            .collect()
    }
}

/// L2 norm of the row difference.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl DistanceFunction for Euclidean {
    fn distance(&self, a: &[f64], b: &[f64], width: usize) -> Vec<f64> {
        euclidean.distance(a, b, width)
    }
}

/// L2 distance between two rows.
#[inline]
pub fn euclidean(x: &[f64], y: &[f64]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt()
}

/// Gather rows of `data` in the order given by `index`.
pub fn gather_rows(data: &[f64], width: usize, index: &[usize]) -> Vec<f64> {
    let mut out = Vec::with_capacity(index.len() * width);
    for &i in index {
        out.extend_from_slice(&data[i * width..(i + 1) * width]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_rows() {
        let a = [0.0, 0.0, 1.0, 1.0];
        let b = [3.0, 4.0, 1.0, 1.0];
        assert_eq!(Euclidean.distance(&a, &b, 2), vec![5.0, 0.0]);
    }

    #[test]
    fn test_closure_distance() {
        let manhattan =
            |x: &[f64], y: &[f64]| x.iter().zip(y).map(|(a, b)| (a - b).abs()).sum::<f64>();
        let a = [0.0, 0.0, 1.0, 2.0];
        let b = [3.0, 4.0, 1.0, 1.0];
        assert_eq!(manhattan.distance(&a, &b, 2), vec![7.0, 1.0]);
    }

    #[test]
    fn test_gather_rows() {
        let data = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(gather_rows(&data, 2, &[2, 0]), vec![4.0, 5.0, 0.0, 1.0]);
    }
}
