//! Bound and property filtering applied while streaming features.
//!
//! Every dimension follows the open-world default: a feature that carries no
//! value for a filtered dimension (no time, no geometry, no such property) is
//! included rather than excluded.

use crate::types::{Bounder, Feature, PropertyFilter};

/// Outcome of offering a feature to a [`StreamFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Deliver the feature to the consumer
    Emit,
    /// Drop the feature and keep streaming
    Skip,
    /// No later feature can pass; stop streaming
    Exhausted,
}

/// Stateful filter for one streaming request.
///
/// The index dimension counts features that passed the time, extent and
/// property checks, in delivery order.
#[derive(Debug)]
pub struct StreamFilter<'a> {
    bounds: &'a Bounder,
    properties: Option<&'a PropertyFilter>,
    position: u64,
}

impl<'a> StreamFilter<'a> {
    pub fn new(bounds: &'a Bounder, properties: Option<&'a PropertyFilter>) -> Self {
        Self {
            bounds,
            properties,
            position: 0,
        }
    }

    pub fn admit(&mut self, feature: &Feature) -> Admission {
        if let Some(index) = &self.bounds.index {
            if self.position >= index.end {
                return Admission::Exhausted;
            }
        }

        if !within_time(self.bounds, feature)
            || !within_extent(self.bounds, feature)
            || !matches_properties(feature, self.properties)
        {
            return Admission::Skip;
        }

        let position = self.position;
        self.position += 1;

        match &self.bounds.index {
            Some(index) if !index.contains(position) => Admission::Skip,
            _ => Admission::Emit,
        }
    }
}

/// Time dimension; features without a time are within all time bounds
pub fn within_time(bounds: &Bounder, feature: &Feature) -> bool {
    match (&bounds.time, &feature.time) {
        (Some(extent), Some(time)) => extent.contains(time),
        _ => true,
    }
}

/// Spatial dimension by envelope; features without geometry are within all extents
pub fn within_extent(bounds: &Bounder, feature: &Feature) -> bool {
    match (&bounds.extent, feature.envelope()) {
        (Some(extent), Some(envelope)) => extent.intersects(&envelope),
        _ => true,
    }
}

/// Every filtered property the feature carries must match. Properties the
/// feature lacks do not exclude it.
pub fn matches_properties(feature: &Feature, properties: Option<&PropertyFilter>) -> bool {
    let Some(properties) = properties else {
        return true;
    };

    properties.iter().all(|(key, expected)| match feature.tag(key) {
        Some(actual) => values_match(actual, expected),
        None => true,
    })
}

/// Loose equality: exact text, or equal after numeric or boolean conversion
pub fn values_match(actual: &str, expected: &str) -> bool {
    if actual == expected {
        return true;
    }

    let (actual, expected) = (actual.trim(), expected.trim());
    if let (Ok(a), Ok(b)) = (actual.parse::<f64>(), expected.parse::<f64>()) {
        return a == b;
    }
    if let (Ok(a), Ok(b)) = (
        actual.to_ascii_lowercase().parse::<bool>(),
        expected.to_ascii_lowercase().parse::<bool>(),
    ) {
        return a == b;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Extent, IndexExtent, TimeExtent};
    use chrono::{TimeZone, Utc};
    use geo_types::point;
    use std::collections::HashMap;

    fn height_filter() -> PropertyFilter {
        HashMap::from([("height".to_string(), "9".to_string())])
    }

    #[test]
    fn test_property_filter_is_permissive_for_missing_keys() {
        let filter = height_filter();

        let matching = Feature::new().with_tag("height", "9");
        let missing = Feature::new().with_tag("name", "tower");
        let different = Feature::new().with_tag("height", "5");

        assert!(matches_properties(&matching, Some(&filter)));
        assert!(matches_properties(&missing, Some(&filter)));
        assert!(!matches_properties(&different, Some(&filter)));
        assert!(matches_properties(&different, None));
    }

    #[test]
    fn test_values_match_coerces() {
        assert!(values_match("9", "9.0"));
        assert!(values_match("TRUE", "true"));
        assert!(!values_match("9", "nine"));
        assert!(!values_match("false", "true"));
    }

    #[test]
    fn test_extent_dimension() {
        let bounds = Bounder::new().with_extent(Extent::new(0.0, 0.0, 10.0, 10.0));

        let inside = Feature::new().with_geometry(point!(x: 5.0, y: 5.0));
        let outside = Feature::new().with_geometry(point!(x: 50.0, y: 5.0));
        let no_geometry = Feature::new();

        assert!(within_extent(&bounds, &inside));
        assert!(!within_extent(&bounds, &outside));
        assert!(within_extent(&bounds, &no_geometry));
    }

    #[test]
    fn test_time_dimension() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bounds = Bounder::new().with_time(TimeExtent::new(Some(start), None));

        let early = Feature::new().with_time(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        let late = Feature::new().with_time(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());

        assert!(!within_time(&bounds, &early));
        assert!(within_time(&bounds, &late));
        assert!(within_time(&bounds, &Feature::new()));
    }

    #[test]
    fn test_stream_filter_index_window() {
        let bounds = Bounder::new().with_index(IndexExtent::new(1, 3));
        let mut filter = StreamFilter::new(&bounds, None);
        let feature = Feature::new();

        assert_eq!(filter.admit(&feature), Admission::Skip);
        assert_eq!(filter.admit(&feature), Admission::Emit);
        assert_eq!(filter.admit(&feature), Admission::Emit);
        assert_eq!(filter.admit(&feature), Admission::Exhausted);
    }

    #[test]
    fn test_index_counts_only_admitted_features() {
        let bounds = Bounder::new().with_index(IndexExtent::new(0, 1));
        let filter_props = height_filter();
        let mut filter = StreamFilter::new(&bounds, Some(&filter_props));

        let rejected = Feature::new().with_tag("height", "5");
        let accepted = Feature::new().with_tag("height", "9");

        assert_eq!(filter.admit(&rejected), Admission::Skip);
        assert_eq!(filter.admit(&accepted), Admission::Emit);
        assert_eq!(filter.admit(&accepted), Admission::Exhausted);
    }
}
