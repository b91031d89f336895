//! Wire types for the marketplace search endpoint. Field names and nesting
//! mirror the JSON envelope exactly; the empty structs stand in for filter
//! blocks the service expects to be present but we never populate.

use serde::{Deserialize, Serialize};

/// Body of one search POST. Encoded as the request payload, decoded back in
/// tests to confirm the round trip is lossless.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub algorithm: String,
    pub from: u32,
    pub size: u32,
    pub filters: Filters,
    pub listing_search: ListingSearch,
    pub context: RequestContext,
    pub sort: Sort,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    pub term: TermFilter,
    pub range: RangeFilter,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermFilter {
    pub product_line_name: Vec<String>,
    pub product_type_name: Vec<String>,
    pub set_name: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeFilter {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSearch {
    pub filters: ListingFilters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFilters {
    pub term: EmptyTerm,
    pub range: RangeFilter,
    pub exclude: Exclude,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyTerm {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exclude {
    pub channel_exclusion: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub cart: Cart,
    pub shipping_country: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sort {}

impl RequestPayload {
    /// Build a filter descriptor for one search. Empty strings leave the
    /// corresponding term list empty, meaning "no constraint on this field".
    /// The product line is matched lowercased and the product type
    /// title-cased, as the service indexes them.
    pub fn new(product_line: &str, product_type: &str, set_name: &str, result_size: u32) -> Self {
        let mut payload = Self {
            size: result_size,
            ..Self::default()
        };
        if !product_line.is_empty() {
            payload
                .filters
                .term
                .product_line_name
                .push(product_line.to_lowercase());
        }
        if !product_type.is_empty() {
            payload
                .filters
                .term
                .product_type_name
                .push(title_case(product_type));
        }
        if !set_name.is_empty() {
            payload.filters.term.set_name.push(set_name.to_string());
        }
        payload.context.shipping_country = "US".to_string();
        payload
    }

    /// Display label for logging: the set filter when present, otherwise the
    /// product line filter.
    pub fn label(&self) -> &str {
        self.filters
            .term
            .set_name
            .first()
            .or_else(|| self.filters.term.product_line_name.first())
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Uppercase the first letter of every whitespace-separated word.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Decoded search response envelope. Only `results[0]` is ever consumed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponsePayload {
    pub errors: Vec<String>,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchResult {
    pub aggregations: Aggregations,
    pub algorithm: String,
    #[serde(rename = "resultID", alias = "resultId")]
    pub result_id: String,
    pub results: Vec<CardAttrs>,
    pub total_results: f64,
}

/// Faceted counts the service returns alongside each page; set and product
/// type entries drive pagination, the active product line entry becomes the
/// catalog header row.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Aggregations {
    pub card_type: Vec<ItemInfo>,
    pub product_line_name: Vec<ItemInfo>,
    pub product_type_name: Vec<ItemInfo>,
    pub rarity_name: Vec<ItemInfo>,
    pub set_name: Vec<ItemInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemInfo {
    pub count: f64,
    pub is_active: bool,
    pub url_value: String,
    pub value: String,
}

/// All attributes of a single catalog item as returned by the service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardAttrs {
    pub custom_attributes: CustomAttrs,
    pub foil_only: bool,
    pub lowest_price: Option<f64>,
    pub lowest_price_with_shipping: Option<f64>,
    pub max_fulfillable_quantity: Option<f64>,
    pub market_price: Option<f64>,
    #[serde(alias = "productID")]
    pub product_id: f64,
    #[serde(alias = "productLineID")]
    pub product_line_id: f64,
    pub product_line_name: String,
    pub product_line_url_name: String,
    pub product_name: String,
    pub product_url_name: String,
    pub rarity_name: Option<String>,
    pub score: f64,
    #[serde(alias = "setID")]
    pub set_id: f64,
    pub set_name: String,
    pub set_url_name: String,
    pub total_listings: Option<f64>,
}

/// Per-game attributes; most are null for items that are not single cards,
/// so everything is optional here and defaulted at row-build time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomAttrs {
    pub attack: Option<String>,
    pub attribute: Option<Vec<String>>,
    pub card_type: Option<Vec<String>>,
    pub card_type_b: Option<String>,
    pub defense: Option<String>,
    pub description: Option<String>,
    pub link_arrows: Option<Vec<String>>,
    pub link_rating: Option<String>,
    pub level: Option<String>,
    pub monster_type: Option<Vec<String>>,
    pub number: Option<String>,
    pub rarity_db_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_payload_round_trips_through_json() {
        let payload = RequestPayload::new("YuGiOh", "cards", "duelist-league-promo", 42);
        let encoded = serde_json::to_string(&payload).unwrap();
        let decoded: RequestPayload = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.filters.term.product_line_name, vec!["yugioh"]);
        assert_eq!(decoded.filters.term.product_type_name, vec!["Cards"]);
        assert_eq!(
            decoded.filters.term.set_name,
            vec!["duelist-league-promo"]
        );
        assert_eq!(decoded.from, payload.from);
        assert_eq!(decoded.size, payload.size);
    }

    #[test]
    fn request_payload_uses_wire_field_names() {
        let payload = RequestPayload::new("yugioh", "", "", 0);
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["filters"]["term"]["productLineName"][0], "yugioh");
        assert_eq!(value["filters"]["term"]["productTypeName"], serde_json::json!([]));
        assert_eq!(
            value["listingSearch"]["filters"]["exclude"]["channelExclusion"],
            0
        );
        assert_eq!(value["context"]["shippingCountry"], "US");
        assert_eq!(value["context"]["cart"], serde_json::json!({}));
        assert_eq!(value["sort"], serde_json::json!({}));
    }

    #[test]
    fn empty_filters_mean_no_constraint() {
        let payload = RequestPayload::new("", "", "", 0);
        assert!(payload.filters.term.product_line_name.is_empty());
        assert!(payload.filters.term.product_type_name.is_empty());
        assert!(payload.filters.term.set_name.is_empty());
        assert_eq!(payload.label(), "");
    }

    #[test]
    fn title_case_capitalizes_each_word() {
        assert_eq!(title_case("cards"), "Cards");
        assert_eq!(title_case("sealed products"), "Sealed Products");
        assert_eq!(title_case("Cards"), "Cards");
    }

    #[test]
    fn response_decodes_with_missing_and_null_fields() {
        let raw = r#"{
            "errors": [],
            "results": [{
                "aggregations": {
                    "productLineName": [
                        {"count": 12050.0, "isActive": true, "urlValue": "yugioh", "value": "YuGiOh"}
                    ],
                    "productTypeName": [
                        {"count": 12050.0, "isActive": false, "urlValue": "Cards", "value": "Cards"}
                    ],
                    "setName": [
                        {"count": 61.0, "isActive": false, "urlValue": "duelist-league-promo", "value": "Duelist League Promo"}
                    ]
                },
                "algorithm": "",
                "resultID": "abc123",
                "results": [{
                    "customAttributes": {
                        "attack": null,
                        "description": " A trap card. ",
                        "number": "DL11-EN001"
                    },
                    "marketPrice": 1.25,
                    "productId": 39111,
                    "productName": "Mirror Force",
                    "rarityName": "Rare",
                    "setName": "Duelist League Promo"
                }],
                "totalResults": 61
            }]
        }"#;

        let decoded: ResponsePayload = serde_json::from_str(raw).unwrap();
        let result = &decoded.results[0];
        assert_eq!(result.total_results, 61.0);
        assert_eq!(result.aggregations.set_name.len(), 1);
        assert!(result.aggregations.product_line_name[0].is_active);
        assert_eq!(result.aggregations.rarity_name.len(), 0);

        let card = &result.results[0];
        assert_eq!(card.product_id, 39111.0);
        assert_eq!(card.custom_attributes.attack, None);
        assert_eq!(
            card.custom_attributes.number.as_deref(),
            Some("DL11-EN001")
        );
        assert_eq!(card.market_price, Some(1.25));
    }
}
