use crate::models::PropertyRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Optional filters over the full listing table. Ranges are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingQuery {
    pub property_type: Option<String>,
    pub price: Option<(f64, f64)>,
    pub rooms: Option<(i64, i64)>,
}

impl ListingQuery {
    /// Records passing every active filter; a record missing a filtered field is excluded
    pub fn apply<'a>(&self, records: &'a [PropertyRecord]) -> Vec<&'a PropertyRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }

    pub fn matches(&self, record: &PropertyRecord) -> bool {
        if let Some(wanted) = &self.property_type {
            if record.property_type.as_deref() != Some(wanted.as_str()) {
                return false;
            }
        }
        if let Some((lo, hi)) = self.price {
            match record.price {
                Some(p) if p >= lo && p <= hi => {}
                _ => return false,
            }
        }
        if let Some((lo, hi)) = self.rooms {
            match record.rooms {
                Some(r) if r >= lo && r <= hi => {}
                _ => return false,
            }
        }
        true
    }
}

/// Distinct property types, sorted
pub fn property_types(records: &[PropertyRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.property_type.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn price_range(records: &[PropertyRecord]) -> Option<(f64, f64)> {
    records
        .iter()
        .filter_map(|r| r.price)
        .filter(|p| p.is_finite())
        .fold(None, |acc, p| match acc {
            None => Some((p, p)),
            Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
        })
}

pub fn rooms_range(records: &[PropertyRecord]) -> Option<(i64, i64)> {
    let rooms = records.iter().filter_map(|r| r.rooms);
    let min = rooms.clone().min()?;
    let max = rooms.max()?;
    Some((min, max))
}

/// Mean of all usable coordinates, for centering a map view
pub fn map_center<'a, I>(records: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = &'a PropertyRecord>,
{
    let (sum_lat, sum_lon, n) = records
        .into_iter()
        .filter_map(PropertyRecord::coordinates)
        .fold((0.0, 0.0, 0usize), |(la, lo, n), (lat, lon)| {
            (la + lat, lo + lon, n + 1)
        });
    if n == 0 {
        None
    } else {
        Some((sum_lat / n as f64, sum_lon / n as f64))
    }
}

/// One-line description used as a map marker label
pub fn tooltip(record: &PropertyRecord) -> String {
    fn or_dash<T: ToString>(v: Option<T>) -> String {
        v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
    }

    format!(
        "Type: {} | Price: {} | Rooms: {} | Bathrooms: {} | Sqft: {}",
        record.property_type.as_deref().unwrap_or("-"),
        record
            .price
            .map(format_money)
            .unwrap_or_else(|| "-".to_string()),
        or_dash(record.rooms),
        or_dash(record.bathroom),
        record
            .sqft
            .map(|s| format_thousands(s.round() as i64))
            .unwrap_or_else(|| "-".to_string()),
    )
}

/// `$1,234,567.89`
pub fn format_money(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as i64;
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, format_thousands(cents / 100), cents % 100)
}

pub fn format_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0 {
        out.insert(0, '-');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, ty: &str, price: Option<f64>, rooms: Option<i64>) -> PropertyRecord {
        PropertyRecord {
            property_type: Some(ty.to_string()),
            price,
            rooms,
            ..PropertyRecord::new(id)
        }
    }

    fn sample() -> Vec<PropertyRecord> {
        vec![
            listing("a", "House", Some(100.0), Some(3)),
            listing("b", "Apartment", Some(250.0), Some(1)),
            listing("c", "House", Some(400.0), Some(5)),
            listing("d", "House", None, Some(2)),
        ]
    }

    #[test]
    fn filters_are_inclusive_and_combined() {
        let records = sample();
        let query = ListingQuery {
            property_type: Some("House".into()),
            price: Some((100.0, 400.0)),
            rooms: Some((3, 5)),
        };
        let ids: Vec<_> = query
            .apply(&records)
            .iter()
            .map(|r| r.property_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn missing_field_excluded_only_when_filtered() {
        let records = sample();
        assert_eq!(ListingQuery::default().apply(&records).len(), 4);

        let priced = ListingQuery {
            price: Some((0.0, f64::MAX)),
            ..Default::default()
        };
        assert_eq!(priced.apply(&records).len(), 3);
    }

    #[test]
    fn ranges_and_types() {
        let records = sample();
        assert_eq!(property_types(&records), vec!["Apartment", "House"]);
        assert_eq!(price_range(&records), Some((100.0, 400.0)));
        assert_eq!(rooms_range(&records), Some((1, 5)));
        assert_eq!(price_range(&[]), None);
        assert_eq!(rooms_range(&[]), None);
    }

    #[test]
    fn map_center_averages_located_records() {
        let mut a = PropertyRecord::new("a");
        a.latitude = Some(18.0);
        a.longitude = Some(-76.0);
        let mut b = PropertyRecord::new("b");
        b.latitude = Some(18.2);
        b.longitude = Some(-76.4);
        let unlocated = PropertyRecord::new("c");

        let (lat, lon) = map_center(&[a, b, unlocated]).unwrap();
        assert!((lat - 18.1).abs() < 1e-9);
        assert!((lon + 76.2).abs() < 1e-9);
        assert_eq!(map_center(&[PropertyRecord::new("x")]), None);
    }

    #[test]
    fn money_and_tooltip_formatting() {
        assert_eq!(format_money(1_234_567.891), "$1,234,567.89");
        assert_eq!(format_money(5.0), "$5.00");
        assert_eq!(format_thousands(-1000), "-1,000");

        let mut record = listing("a", "House", Some(250_000.0), Some(3));
        record.sqft = Some(1849.6);
        assert_eq!(
            tooltip(&record),
            "Type: House | Price: $250,000.00 | Rooms: 3 | Bathrooms: - | Sqft: 1,850"
        );
    }
}
