use crate::models::ExtractedListing;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

/// Machine-readable facts a listing page exposes in its markup.
///
/// Used to fill gaps the vision model leaves, never to override it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageHints {
    pub price: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl PageHints {
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut hints = PageHints::default();

        let geo_meta = |name: &str| {
            let selector = Selector::parse(&format!(
                r#"meta[property="place:location:{0}"], meta[property="og:{0}"]"#,
                name
            ))
            .unwrap();
            document
                .select(&selector)
                .next()
                .and_then(|el| el.value().attr("content"))
                .and_then(|s| s.trim().parse::<f64>().ok())
        };
        hints.latitude = geo_meta("latitude");
        hints.longitude = geo_meta("longitude");

        let ld_json = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
        for script in document.select(&ld_json) {
            let text = script.text().collect::<String>();
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => hints.absorb_ld(&value),
                Err(err) => debug!("Skipping unparseable JSON-LD block: {}", err),
            }
        }

        hints
    }

    /// Fill fields `listing` does not have
    pub fn fill(&self, listing: &mut ExtractedListing) {
        if listing.price.is_none() {
            listing.price = self.price;
        }
        if listing.latitude.is_none() && listing.longitude.is_none() {
            listing.latitude = self.latitude;
            listing.longitude = self.longitude;
        }
    }

    fn absorb_ld(&mut self, value: &Value) {
        match value {
            Value::Array(items) => items.iter().for_each(|v| self.absorb_ld(v)),
            Value::Object(map) => {
                if let Some(geo) = map.get("geo") {
                    if self.latitude.is_none() {
                        self.latitude = geo.get("latitude").and_then(number);
                    }
                    if self.longitude.is_none() {
                        self.longitude = geo.get("longitude").and_then(number);
                    }
                }
                if self.price.is_none() {
                    if let Some(offers) = map.get("offers") {
                        let offer = offers.as_array().and_then(|a| a.first()).unwrap_or(offers);
                        self.price = offer.get("price").and_then(number);
                    }
                }
                for nested in map.values().filter(|v| v.is_object() || v.is_array()) {
                    self.absorb_ld(nested);
                }
            }
            _ => {}
        }
    }
}

/// Numbers as JSON numbers or as loosely formatted strings ("$1,250,000")
pub(crate) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let clean: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            clean.parse().ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head>
          <title>3 Bed House in Barbican</title>
          <script type="application/ld+json">
            {"@type": "SingleFamilyResidence",
             "geo": {"latitude": "18.0179", "longitude": -76.8099},
             "offers": [{"price": "JMD 48,500,000"}]}
          </script>
          <script type="application/ld+json">{ not json</script>
        </head><body></body></html>
    "#;

    #[test]
    fn reads_json_ld_geo_and_offer_price() {
        let hints = PageHints::from_html(PAGE);
        assert_eq!(hints.latitude, Some(18.0179));
        assert_eq!(hints.longitude, Some(-76.8099));
        assert_eq!(hints.price, Some(48_500_000.0));
    }

    #[test]
    fn reads_place_meta_coordinates() {
        let html = r#"<html><head><title> Flat </title>
            <meta property="place:location:latitude" content="18.01">
            <meta property="place:location:longitude" content="-76.79">
            </head></html>"#;
        let hints = PageHints::from_html(html);
        assert_eq!(hints.latitude, Some(18.01));
        assert_eq!(hints.longitude, Some(-76.79));
        assert_eq!(hints.price, None);
    }

    #[test]
    fn fill_never_overrides_model_values() {
        let hints = PageHints {
            price: Some(1.0),
            latitude: Some(2.0),
            longitude: Some(3.0),
        };
        let mut listing = ExtractedListing {
            price: Some(99.0),
            ..Default::default()
        };
        hints.fill(&mut listing);
        assert_eq!(listing.price, Some(99.0));
        assert_eq!(listing.latitude, Some(2.0));

        let mut half_located = ExtractedListing {
            latitude: Some(10.0),
            ..Default::default()
        };
        hints.fill(&mut half_located);
        assert_eq!(half_located.longitude, None);
    }
}
