use ndarray::{Array, Array2, ArrayView1, Axis, Dimension};

pub fn outer_product(column: ArrayView1<f64>, row: ArrayView1<f64>) -> Array2<f64> {
    let a = column.insert_axis(Axis(1));
    let b = row.insert_axis(Axis(0));

    a.dot(&b)
}

/// Elementwise clamp into `[-limit, limit]`.
pub fn clip<D: Dimension>(values: &Array<f64, D>, limit: f64) -> Array<f64, D> {
    values.mapv(|v| v.clamp(-limit, limit))
}

/// Rounds to six decimal places, the precision reported for epoch costs.
pub fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_outer_product() {
        let product = outer_product(array![1.0, 2.0].view(), array![3.0, 4.0, 5.0].view());
        assert_eq!(product, array![[3.0, 4.0, 5.0], [6.0, 8.0, 10.0]]);
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip(&array![5.0, -3.0, 0.5], 1.0), array![1.0, -1.0, 0.5]);
    }

    #[test]
    fn test_round6() {
        assert_eq!(round6(0.12345678), 0.123457);
    }
}
