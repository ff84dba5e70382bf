// Pure reductions over building sets.

use crate::catalog::Building;
use serde::Serialize;

/// Count, min, average and max of a set of values. All three are `None` when `count` is 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStats {
    pub count: usize,
    pub min: Option<f64>,
    pub avg: Option<f64>,
    pub max: Option<f64>,
}

/// Volume totals. `total` is 0 when nothing had a volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumeStats {
    pub count: usize,
    pub total: f64,
    pub avg: Option<f64>,
    pub max: Option<f64>,
}

// Count, sum, min and max in one pass
fn accumulate(values: impl IntoIterator<Item = f64>) -> (usize, f64, f64, f64) {
    values.into_iter().fold(
        (0, 0.0, f64::INFINITY, f64::NEG_INFINITY),
        |(count, sum, min, max), v| (count + 1, sum + v, min.min(v), max.max(v)),
    )
}

pub fn summarize(values: impl IntoIterator<Item = f64>) -> SummaryStats {
    let (count, sum, min, max) = accumulate(values);
    if count == 0 {
        return SummaryStats {
            count,
            min: None,
            avg: None,
            max: None,
        };
    }
    SummaryStats {
        count,
        min: Some(min),
        avg: Some(sum / count as f64),
        max: Some(max),
    }
}

pub fn summarize_volume(values: impl IntoIterator<Item = f64>) -> VolumeStats {
    let (count, total, _, max) = accumulate(values);
    VolumeStats {
        count,
        total,
        avg: (count > 0).then(|| total / count as f64),
        max: (count > 0).then_some(max),
    }
}

/// Statistics over defined heights only.
pub fn height_stats<'a>(buildings: impl IntoIterator<Item = &'a Building>) -> SummaryStats {
    summarize(buildings.into_iter().filter_map(Building::height_m))
}

pub fn footprint_stats<'a>(buildings: impl IntoIterator<Item = &'a Building>) -> SummaryStats {
    summarize(buildings.into_iter().map(Building::footprint_area_m2))
}

pub fn total_volume<'a>(buildings: impl IntoIterator<Item = &'a Building>) -> VolumeStats {
    summarize_volume(buildings.into_iter().filter_map(Building::volume_m3))
}

/// Building with the greatest defined height; ties go to the lowest id.
pub fn tallest<'a>(buildings: impl IntoIterator<Item = &'a Building>) -> Option<&'a Building> {
    let mut best: Option<(&Building, f64)> = None;
    for building in buildings {
        let Some(height) = building.height_m() else {
            continue;
        };
        best = match best {
            Some((current, current_height))
                if current_height > height
                    || (current_height == height && current.id <= building.id) =>
            {
                Some((current, current_height))
            }
            _ => Some((building, height)),
        };
    }
    best.map(|(building, _)| building)
}
