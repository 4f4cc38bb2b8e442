//! Ground control points and their winding order

use std::cmp::Ordering;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minimum number of control points a request must carry
pub const MIN_CONTROL_POINTS: usize = 4;

/// Upper bound on control points per request; spline fitting is cubic in
/// the point count and every output pixel evaluates one kernel per point
pub const MAX_CONTROL_POINTS: usize = 256;

/// A correspondence between a source pixel and a geographic coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    /// Pixel column in the source image
    pub px: f64,
    /// Pixel row in the source image
    pub py: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Latitude in degrees
    pub lat: f64,
}

impl ControlPoint {
    pub fn new(px: f64, py: f64, lon: f64, lat: f64) -> Self {
        Self { px, py, lon, lat }
    }

    fn is_finite(&self) -> bool {
        self.px.is_finite() && self.py.is_finite() && self.lon.is_finite() && self.lat.is_finite()
    }
}

/// Checks that a point set is usable before any work starts.
///
/// Degenerate layouts (coincident or collinear points) are not rejected
/// here; the warp stage fails on them.
pub fn validate_control_points(points: &[ControlPoint]) -> Result<()> {
    if points.len() < MIN_CONTROL_POINTS {
        return Err(Error::Validation(format!(
            "At least {} GCPs required, got {}",
            MIN_CONTROL_POINTS,
            points.len()
        )));
    }

    if points.len() > MAX_CONTROL_POINTS {
        return Err(Error::Validation(format!(
            "At most {} GCPs allowed, got {}",
            MAX_CONTROL_POINTS,
            points.len()
        )));
    }

    if let Some(index) = points.iter().position(|p| !p.is_finite()) {
        return Err(Error::Validation(format!(
            "GCP {} has a non-finite coordinate",
            index
        )));
    }

    Ok(())
}

/// Reorders points by ascending polar angle of their pixel offset from the
/// pixel centroid.
///
/// The output is a permutation of the input. Points sitting exactly on the
/// centroid get angle 0. The sort is stable, so exact ties keep input order.
pub fn order_clockwise(mut points: Vec<ControlPoint>) -> Vec<ControlPoint> {
    if points.is_empty() {
        return points;
    }

    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.px).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.py).sum::<f64>() / n;

    points.sort_by(|a, b| {
        polar_angle(a, cx, cy)
            .partial_cmp(&polar_angle(b, cx, cy))
            .unwrap_or(Ordering::Equal)
    });

    points
}

/// Polar angle of a point around `(cx, cy)` in `(-π, π]`
pub fn polar_angle(point: &ControlPoint, cx: f64, cy: f64) -> f64 {
    let dx = point.px - cx;
    let dy = point.py - cy;

    if dx == 0.0 && dy == 0.0 {
        0.0
    } else {
        dy.atan2(dx)
    }
}

/// Reads control points from CSV with a `px,py,lon,lat` header
pub fn read_control_points_csv<R: Read>(reader: R) -> Result<Vec<ControlPoint>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut points = Vec::new();
    for (row, record) in csv_reader.deserialize::<ControlPoint>().enumerate() {
        let point = record
            .map_err(|e| Error::Validation(format!("Invalid GCP row {}: {}", row + 1, e)))?;
        points.push(point);
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn corners() -> Vec<ControlPoint> {
        vec![
            ControlPoint::new(0.0, 0.0, 0.0, 50.0),
            ControlPoint::new(100.0, 100.0, 1.0, 49.0),
            ControlPoint::new(100.0, 0.0, 1.0, 50.0),
            ControlPoint::new(0.0, 100.0, 0.0, 49.0),
        ]
    }

    fn is_permutation(a: &[ControlPoint], b: &[ControlPoint]) -> bool {
        a.len() == b.len() && a.iter().all(|p| b.contains(p)) && b.iter().all(|p| a.contains(p))
    }

    #[test]
    fn test_order_is_permutation_with_ascending_angle() {
        let input = corners();
        let ordered = order_clockwise(input.clone());

        assert!(is_permutation(&input, &ordered));

        let cx = input.iter().map(|p| p.px).sum::<f64>() / 4.0;
        let cy = input.iter().map(|p| p.py).sum::<f64>() / 4.0;
        let angles: Vec<f64> = ordered.iter().map(|p| polar_angle(p, cx, cy)).collect();
        assert!(angles.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_order_corners() {
        let ordered = order_clockwise(corners());
        let pixels: Vec<(f64, f64)> = ordered.iter().map(|p| (p.px, p.py)).collect();

        // atan2 over image rows (y down): top-left, top-right, bottom-right, bottom-left
        assert_eq!(
            pixels,
            vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]
        );
    }

    #[test]
    fn test_order_irregular_set() {
        let input = vec![
            ControlPoint::new(12.0, 80.0, 5.1, 40.2),
            ControlPoint::new(300.0, 15.0, 5.9, 40.9),
            ControlPoint::new(150.0, 150.0, 5.5, 40.5),
            ControlPoint::new(280.0, 260.0, 5.8, 40.0),
            ControlPoint::new(40.0, 240.0, 5.2, 39.9),
            ControlPoint::new(160.0, 5.0, 5.5, 41.0),
        ];
        let ordered = order_clockwise(input.clone());
        assert!(is_permutation(&input, &ordered));

        let cx = input.iter().map(|p| p.px).sum::<f64>() / input.len() as f64;
        let cy = input.iter().map(|p| p.py).sum::<f64>() / input.len() as f64;
        let angles: Vec<f64> = ordered.iter().map(|p| polar_angle(p, cx, cy)).collect();
        assert!(angles.windows(2).all(|w| w[0] <= w[1]));
    }

    fn sorted_bits(points: &[ControlPoint]) -> Vec<[u64; 4]> {
        let mut bits: Vec<[u64; 4]> = points
            .iter()
            .map(|p| [p.px.to_bits(), p.py.to_bits(), p.lon.to_bits(), p.lat.to_bits()])
            .collect();
        bits.sort_unstable();
        bits
    }

    #[test]
    fn test_order_random_sets() {
        let mut rng = StdRng::seed_from_u64(0x6e0_4ef);

        for _ in 0..500 {
            let n = rng.random_range(MIN_CONTROL_POINTS..40);
            let mut input: Vec<ControlPoint> = (0..n)
                .map(|_| {
                    ControlPoint::new(
                        rng.random_range(0..64) as f64,
                        rng.random_range(0..64) as f64,
                        rng.random_range(-180.0..180.0),
                        rng.random_range(-90.0..90.0),
                    )
                })
                .collect();
            // duplicates, including exact copies
            for _ in 0..rng.random_range(0..4) {
                let copy = input[rng.random_range(0..input.len())];
                input.push(copy);
            }

            let ordered = order_clockwise(input.clone());
            assert_eq!(sorted_bits(&input), sorted_bits(&ordered));

            let count = input.len() as f64;
            let cx = input.iter().map(|p| p.px).sum::<f64>() / count;
            let cy = input.iter().map(|p| p.py).sum::<f64>() / count;
            let angles: Vec<f64> = ordered.iter().map(|p| polar_angle(p, cx, cy)).collect();
            assert!(angles.iter().all(|a| a.is_finite()));
            assert!(angles.windows(2).all(|w| w[0] <= w[1]), "{:?}", angles);
        }
    }

    #[test]
    fn test_coincident_points_do_not_panic() {
        let input = vec![ControlPoint::new(5.0, 5.0, 1.0, 1.0); 4];
        let ordered = order_clockwise(input.clone());
        assert_eq!(ordered, input);
        assert_eq!(polar_angle(&input[0], 5.0, 5.0), 0.0);
    }

    #[test]
    fn test_values_unchanged() {
        let input = corners();
        let ordered = order_clockwise(input.clone());
        for point in &ordered {
            let original = input.iter().find(|p| p.px == point.px && p.py == point.py).unwrap();
            assert_eq!(original, point);
        }
    }

    #[test]
    fn test_validate_too_few() {
        let err = validate_control_points(&corners()[..3]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_validate_too_many() {
        let points: Vec<ControlPoint> = (0..=MAX_CONTROL_POINTS)
            .map(|i| ControlPoint::new(i as f64, (i * i % 97) as f64, i as f64 * 0.01, 45.0))
            .collect();
        let err = validate_control_points(&points).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(validate_control_points(&points[..MAX_CONTROL_POINTS]).is_ok());
    }

    #[test]
    fn test_validate_non_finite() {
        let mut points = corners();
        points[2].lat = f64::NAN;
        assert!(matches!(
            validate_control_points(&points),
            Err(Error::Validation(_))
        ));
        assert!(validate_control_points(&corners()).is_ok());
    }

    #[test]
    fn test_read_csv() {
        let data = "# exported gcps\npx,py,lon,lat\n\
                    0,0,0,50\n100, 0, 1, 50\n100,100,1,49\n0,100,0,49\n";
        let points = read_control_points_csv(data.as_bytes()).unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(points[1], ControlPoint::new(100.0, 0.0, 1.0, 50.0));
    }

    #[test]
    fn test_read_csv_bad_row() {
        let data = "px,py,lon,lat\n0,0,zero,50\n";
        assert!(matches!(
            read_control_points_csv(data.as_bytes()),
            Err(Error::Validation(_))
        ));
    }
}
