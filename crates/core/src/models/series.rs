use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single dated observation (close price, FX rate or portfolio value).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }
}

/// Daily series with strictly increasing dates and finite values.
///
/// All lookups are binary searches over the sorted points. Re-alignment
/// onto another date index only ever carries values forward in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<PricePoint>", into = "Vec<PricePoint>")]
pub struct TimeSeries {
    points: Vec<PricePoint>,
}

impl From<Vec<PricePoint>> for TimeSeries {
    fn from(points: Vec<PricePoint>) -> Self {
        Self::new(points)
    }
}

impl From<TimeSeries> for Vec<PricePoint> {
    fn from(series: TimeSeries) -> Self {
        series.points
    }
}

impl TimeSeries {
    /// Build a series from unordered points. Non-finite values are dropped;
    /// for duplicate dates the last point wins.
    pub fn new(points: Vec<PricePoint>) -> Self {
        let mut points: Vec<PricePoint> =
            points.into_iter().filter(|p| p.price.is_finite()).collect();
        // stable sort keeps input order among equal dates
        points.sort_by_key(|p| p.date);
        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => deduped.push(point),
            }
        }
        Self { points: deduped }
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(date, price)| PricePoint { date, price })
                .collect(),
        )
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    /// Exact observation on `date`, if any.
    pub fn value_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| self.points[idx].price)
    }

    /// Most recent observation on or before `date` (forward fill).
    pub fn value_as_of(&self, date: NaiveDate) -> Option<f64> {
        match self.points.binary_search_by_key(&date, |p| p.date) {
            Ok(idx) => Some(self.points[idx].price),
            Err(0) => None,
            Err(idx) => Some(self.points[idx - 1].price),
        }
    }

    /// Align onto `index` (ascending dates), forward-filling gaps.
    /// Dates before the first observation stay `None`.
    pub fn forward_fill(&self, index: &[NaiveDate]) -> Vec<Option<f64>> {
        index.iter().map(|d| self.value_as_of(*d)).collect()
    }

    /// Points with `date >= from`.
    pub fn since(&self, from: NaiveDate) -> TimeSeries {
        let start = self
            .points
            .binary_search_by_key(&from, |p| p.date)
            .unwrap_or_else(|pos| pos);
        Self {
            points: self.points[start..].to_vec(),
        }
    }

    /// Multiply every value by `factor`.
    pub fn scaled(&self, factor: f64) -> TimeSeries {
        Self::new(
            self.points
                .iter()
                .map(|p| PricePoint::new(p.date, p.price * factor))
                .collect(),
        )
    }

    /// Percentage change from the first to the last point. `None` with fewer
    /// than two points or a zero starting value.
    pub fn return_pct(&self) -> Option<f64> {
        if self.points.len() < 2 {
            return None;
        }
        let first = self.points.first()?.price;
        let last = self.points.last()?.price;
        if first == 0.0 {
            return None;
        }
        Some((last - first) / first * 100.0)
    }
}

/// Dates present in every one of `series`, ascending.
/// Empty input yields an empty index.
pub fn intersect_dates<'a>(series: impl IntoIterator<Item = &'a TimeSeries>) -> Vec<NaiveDate> {
    let mut iter = series.into_iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };
    let mut common = first.dates();
    for s in iter {
        common.retain(|d| s.value_on(*d).is_some());
        if common.is_empty() {
            break;
        }
    }
    common
}
