use log::debug;

use crate::config::PreprocessParams;
use crate::data::droplet::{Droplet, RawDroplet};
use crate::data::well::WellId;
use crate::error::AnalysisError;

/// Cleaned droplets of one well.
#[derive(Clone, Debug)]
pub struct Preprocessed {
    pub droplets: Vec<Droplet>,
    pub dropped: usize,
}

#[inline]
fn in_bounds(v: f64, params: &PreprocessParams) -> bool {
    params.min_amplitude.map_or(true, |lo| v >= lo) && params.max_amplitude.map_or(true, |hi| v <= hi)
}

/// Drops non-finite and out-of-range rows, applies channel scaling and keeps
/// input order.
pub fn preprocess(
    well: WellId,
    raw: &[RawDroplet],
    params: &PreprocessParams,
) -> Result<Preprocessed, AnalysisError> {
    let droplets: Vec<Droplet> = raw
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_finite())
        .map(|(i, r)| Droplet::new(well, i, r.ch1 * params.ch1_scale, r.ch2 * params.ch2_scale))
        .filter(|d| in_bounds(d.ch1, params) && in_bounds(d.ch2, params))
        .collect();

    let dropped = raw.len() - droplets.len();
    debug!("{}: {} valid droplets, {} dropped", well, droplets.len(), dropped);

    if droplets.len() < params.min_valid_droplets {
        return Err(AnalysisError::InsufficientData {
            valid: droplets.len(),
            dropped,
            required: params.min_valid_droplets,
        });
    }

    Ok(Preprocessed { droplets, dropped })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn well() -> WellId {
        "B03".parse().unwrap()
    }

    fn params(min: usize) -> PreprocessParams {
        PreprocessParams { min_valid_droplets: min, ..Default::default() }
    }

    #[test]
    fn test_invalid_rows_dropped() {
        let raw = vec![
            RawDroplet::new(1.0, 2.0),
            RawDroplet::new(f64::NAN, 2.0),
            RawDroplet::new(3.0, f64::INFINITY),
            RawDroplet::new(4.0, 5.0),
        ];
        let out = preprocess(well(), &raw, &params(1)).unwrap();
        assert_eq!(out.dropped, 2);
        assert_eq!(out.droplets.len(), 2);
        assert_eq!(out.droplets[1].source_index, 3);
        assert!(out.droplets.iter().all(|d| d.label.is_noise() && d.well == well()));
    }

    #[test]
    fn test_scaling_and_bounds() {
        let raw = vec![RawDroplet::new(10.0, 20.0), RawDroplet::new(500.0, 20.0)];
        let p = PreprocessParams {
            min_valid_droplets: 1,
            ch1_scale: 2.0,
            ch2_scale: 0.5,
            min_amplitude: None,
            max_amplitude: Some(100.0),
        };
        let out = preprocess(well(), &raw, &p).unwrap();
        assert_eq!(out.droplets.len(), 1);
        assert_eq!(out.dropped, 1);
        assert_eq!(out.droplets[0].ch1, 20.0);
        assert_eq!(out.droplets[0].ch2, 10.0);
    }

    #[test]
    fn test_insufficient_data() {
        let raw = vec![RawDroplet::new(1.0, 1.0); 5];
        match preprocess(well(), &raw, &params(10)) {
            Err(AnalysisError::InsufficientData { valid, required, .. }) => {
                assert_eq!(valid, 5);
                assert_eq!(required, 10);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
