//! Pure client-side filtering of the asset collection.

use super::state::Filters;
use crate::models::stop::BusStop;

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Search is a case-insensitive substring match on code, address, district
/// and landmark. District, status and condition match exactly when set.
pub fn matches(stop: &BusStop, filters: &Filters) -> bool {
    let query = filters.search.trim().to_lowercase();
    if !query.is_empty() {
        let hit = contains_ci(&stop.stop_id, &query)
            || contains_ci(&stop.address, &query)
            || contains_ci(&stop.district, &query)
            || stop
                .landmark
                .as_deref()
                .is_some_and(|l| contains_ci(l, &query));
        if !hit {
            return false;
        }
    }

    if let Some(district) = filters.district.as_deref().filter(|d| !d.is_empty()) {
        if stop.district != district {
            return false;
        }
    }
    if filters.status.is_some_and(|s| s != stop.status) {
        return false;
    }
    if filters.condition.is_some_and(|c| c != stop.condition) {
        return false;
    }
    true
}

/// Matching assets in collection order.
pub fn filter_assets<'a>(assets: &'a [BusStop], filters: &Filters) -> Vec<&'a BusStop> {
    assets.iter().filter(|s| matches(s, filters)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stop::{Condition, StopStatus};

    fn stop(id: i64, code: &str, district: &str, status: StopStatus) -> BusStop {
        BusStop {
            id,
            stop_id: code.into(),
            address: format!("{id} Main Street"),
            district: district.into(),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_status_filter_keeps_order() {
        let assets = vec![
            stop(1, "BS-001", "North", StopStatus::Active),
            stop(2, "BS-002", "North", StopStatus::Repair),
            stop(3, "BS-003", "South", StopStatus::Active),
        ];
        let filters = Filters {
            status: Some(StopStatus::Active),
            ..Default::default()
        };
        let ids: Vec<i64> = filter_assets(&assets, &filters).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_search_is_case_insensitive_across_fields() {
        let mut with_landmark = stop(4, "BS-004", "East", StopStatus::Active);
        with_landmark.landmark = Some("Central Market".into());
        let assets = vec![stop(1, "BS-001", "North", StopStatus::Active), with_landmark];

        let by = |q: &str| {
            let filters = Filters {
                search: q.into(),
                ..Default::default()
            };
            filter_assets(&assets, &filters).iter().map(|s| s.id).collect::<Vec<_>>()
        };
        assert_eq!(by("bs-00"), vec![1, 4]);
        assert_eq!(by("NORTH"), vec![1]);
        assert_eq!(by("market"), vec![4]);
        assert_eq!(by("main street"), vec![1, 4]);
        assert!(by("nowhere").is_empty());
    }

    #[test]
    fn test_exact_district_and_condition() {
        let mut critical = stop(2, "BS-002", "North", StopStatus::Active);
        critical.condition = Condition::Critical;
        let assets = vec![stop(1, "BS-001", "Northside", StopStatus::Active), critical];

        let filters = Filters {
            district: Some("North".into()),
            ..Default::default()
        };
        assert_eq!(filter_assets(&assets, &filters).len(), 1);

        let filters = Filters {
            condition: Some(Condition::Critical),
            ..Default::default()
        };
        assert_eq!(filter_assets(&assets, &filters)[0].id, 2);
    }

    #[test]
    fn test_empty_filters_match_everything() {
        let assets = vec![
            stop(1, "BS-001", "North", StopStatus::Active),
            stop(2, "BS-002", "South", StopStatus::Dismantled),
        ];
        let filters = Filters {
            district: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(filter_assets(&assets, &filters).len(), 2);
    }
}
