use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Meters spanned by one degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("a pond must have at least 3 points, got {found}")]
    TooFewPoints { found: usize },
    #[error("point {index} is not a finite coordinate")]
    NonFinite { index: usize },
    #[error("point {index} is out of range (lat {lat}, lng {lng})")]
    OutOfRange { index: usize, lat: f64, lng: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl From<[f64; 2]> for LatLng {
    fn from([lat, lng]: [f64; 2]) -> Self {
        Self { lat, lng }
    }
}

impl From<LatLng> for [f64; 2] {
    fn from(point: LatLng) -> Self {
        [point.lat, point.lng]
    }
}

/// An open polygon ring; the last vertex implicitly connects to the first.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    points: Vec<LatLng>,
}

impl Boundary {
    pub fn new(raw: Vec<[f64; 2]>) -> Result<Self, GeometryError> {
        let mut points: Vec<LatLng> = raw.into_iter().map(LatLng::from).collect();

        for (index, point) in points.iter().enumerate() {
            if !point.lat.is_finite() || !point.lng.is_finite() {
                return Err(GeometryError::NonFinite { index });
            }
            if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
                return Err(GeometryError::OutOfRange {
                    index,
                    lat: point.lat,
                    lng: point.lng,
                });
            }
        }

        // Repeated taps on the same vertex add nothing to the ring.
        points.dedup();
        // Clients often send a closed ring; store it open.
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }

        let distinct = distinct_count(&points);
        if distinct < 3 {
            return Err(GeometryError::TooFewPoints { found: distinct });
        }

        Ok(Self { points })
    }

    pub fn points(&self) -> &[LatLng] {
        &self.points
    }

    pub fn to_pairs(&self) -> Vec<[f64; 2]> {
        self.points.iter().copied().map(<[f64; 2]>::from).collect()
    }

    pub fn area_sqm(&self) -> f64 {
        polygon_area_sqm(&self.points)
    }
}

fn distinct_count(points: &[LatLng]) -> usize {
    // Adding 0.0 folds -0.0 into 0.0 so both hash alike.
    points
        .iter()
        .map(|point| ((point.lat + 0.0).to_bits(), (point.lng + 0.0).to_bits()))
        .collect::<HashSet<_>>()
        .len()
}

/// Planar Shoelace area in square meters. Good enough for farm-sized ponds;
/// there is no geodesic correction.
pub fn polygon_area_sqm(points: &[LatLng]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let projected: Vec<(f64, f64)> = points.iter().map(project).collect();
    let twice_area: f64 = projected
        .iter()
        .zip(projected.iter().cycle().skip(1))
        .map(|((x1, y1), (x2, y2))| x1 * y2 - x2 * y1)
        .sum();

    twice_area.abs() / 2.0
}

fn project(point: &LatLng) -> (f64, f64) {
    let x = point.lng * METERS_PER_DEGREE * point.lat.to_radians().cos();
    let y = point.lat * METERS_PER_DEGREE;
    (x, y)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
