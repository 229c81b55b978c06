use rayon::prelude::*;

/// Per-channel z-score transform.
///
/// A channel without spread keeps scale 1 so it passes through centred.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StandardScaler {
    pub mean: [f64; 2],
    pub scale: [f64; 2],
}

impl Default for StandardScaler {
    fn default() -> Self {
        StandardScaler { mean: [0.0; 2], scale: [1.0; 2] }
    }
}

impl StandardScaler {
    pub fn fit(points: &[[f64; 2]]) -> Self {
        if points.is_empty() {
            return StandardScaler::default();
        }
        let n = points.len() as f64;

        let mut mean = [0.0; 2];
        let mut scale = [1.0; 2];
        for c in 0..2 {
            let m = points.iter().map(|p| p[c]).sum::<f64>() / n;
            let var = points.iter().map(|p| (p[c] - m).powi(2)).sum::<f64>() / n;
            let sd = var.sqrt();
            mean[c] = m;
            scale[c] = if sd.is_finite() && sd > 0.0 { sd } else { 1.0 };
        }
        StandardScaler { mean, scale }
    }

    #[inline]
    pub fn transform(&self, p: [f64; 2]) -> [f64; 2] {
        [(p[0] - self.mean[0]) / self.scale[0], (p[1] - self.mean[1]) / self.scale[1]]
    }

    pub fn fit_transform(points: &[[f64; 2]]) -> (Self, Vec<[f64; 2]>) {
        let scaler = StandardScaler::fit(points);
        let scaled = points.par_iter().map(|p| scaler.transform(*p)).collect();
        (scaler, scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_mean_unit_variance() {
        let points = vec![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let (scaler, scaled) = StandardScaler::fit_transform(&points);
        assert!((scaler.mean[0] - 2.5).abs() < 1e-12);
        assert!((scaler.mean[1] - 25.0).abs() < 1e-12);

        for c in 0..2 {
            let m: f64 = scaled.iter().map(|p| p[c]).sum::<f64>() / 4.0;
            let v: f64 = scaled.iter().map(|p| (p[c] - m).powi(2)).sum::<f64>() / 4.0;
            assert!(m.abs() < 1e-12);
            assert!((v - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_constant_channel_left_unscaled() {
        let points = vec![[5.0, 1.0], [5.0, 3.0]];
        let (scaler, scaled) = StandardScaler::fit_transform(&points);
        assert_eq!(scaler.scale[0], 1.0);
        assert_eq!(scaled[0][0], 0.0);
        assert!((scaled[1][1] - 1.0).abs() < 1e-12);
    }
}
