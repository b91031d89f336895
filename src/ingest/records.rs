//! Storage row types and the per-product-line record-builder registry.

use tracing::warn;

use crate::catalog::types::{CardAttrs, ItemInfo, SearchResult};

use super::set_index::SetIndex;

/// Row destined for the `product_lines` table. Written once per run from
/// the first active product line entry in the aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductLineRow {
    pub name: String,
    pub url_name: String,
    pub set_count: u64,
    pub card_count: u64,
}

/// Row destined for the `set_infos` table.
#[derive(Debug, Clone, PartialEq)]
pub struct SetRow {
    pub name: String,
    pub url_name: String,
    pub card_count: u64,
    pub product_line_id: u64,
}

/// Row destined for the `card_infos` table. Numeric card attributes are kept
/// as text because the catalog routinely reports values like "?" or "X000".
#[derive(Debug, Clone, PartialEq)]
pub struct CardRow {
    pub attack: String,
    pub attribute: String,
    pub card_type: String,
    pub card_type_b: String,
    pub defense: String,
    pub description: String,
    pub link_arrows: String,
    pub level: String,
    pub monster_type: String,
    pub name: String,
    pub url_name: String,
    pub number: String,
    pub rarity: String,
    pub market_price: f64,
    pub set_id: u64,
    pub product_line_id: u64,
    /// Remote marketplace product id; only used to locate the card's image.
    pub product_id: u64,
}

/// Build the catalog header row from the first active product line entry.
/// Returns None when the aggregation names no active product line.
pub fn product_line_row(result: &SearchResult) -> Option<ProductLineRow> {
    let active = result
        .aggregations
        .product_line_name
        .iter()
        .find(|entry| entry.is_active)?;
    Some(ProductLineRow {
        name: active.value.clone(),
        url_name: active.url_value.clone(),
        set_count: result.aggregations.set_name.len() as u64,
        card_count: result.total_results as u64,
    })
}

/// Expand the set-name aggregation into set rows under one product line.
pub fn set_rows(product_line_id: u64, sets: &[ItemInfo]) -> Vec<SetRow> {
    sets.iter()
        .map(|entry| SetRow {
            name: entry.value.clone(),
            url_name: entry.url_value.clone(),
            card_count: entry.count as u64,
            product_line_id,
        })
        .collect()
}

/// Strategy for turning decoded per-item records into storage rows for one
/// product line's schema. Resolved from the registry once per run, before
/// any worker starts.
pub trait CardRecordBuilder: Send + Sync {
    fn product_line(&self) -> &'static str;

    /// Transform a fetched page into card rows, resolving foreign keys
    /// through the set index. Records whose set name is absent from the
    /// index are skipped (and counted), never written with dangling keys.
    fn build(&self, attrs: &[CardAttrs], index: &SetIndex) -> Vec<CardRow>;
}

/// Resolve the record builder for a product line's URL-safe name.
pub fn builder_for(url_name: &str) -> Option<&'static dyn CardRecordBuilder> {
    match url_name.to_ascii_lowercase().as_str() {
        "yugioh" => Some(&YuGiOhBuilder),
        _ => None,
    }
}

pub struct YuGiOhBuilder;

impl CardRecordBuilder for YuGiOhBuilder {
    fn product_line(&self) -> &'static str {
        "yugioh"
    }

    fn build(&self, attrs: &[CardAttrs], index: &SetIndex) -> Vec<CardRow> {
        let mut rows = Vec::with_capacity(attrs.len());
        let mut missing = 0usize;
        for attr in attrs {
            let Some(set_ref) = index.get(&attr.set_name) else {
                missing += 1;
                continue;
            };
            let custom = &attr.custom_attributes;
            rows.push(CardRow {
                attack: custom.attack.clone().unwrap_or_default(),
                attribute: join(&custom.attribute),
                // The upstream feed stores the monster type list in both
                // card_type and monster_type columns.
                card_type: join(&custom.monster_type),
                card_type_b: custom.card_type_b.clone().unwrap_or_default(),
                defense: custom.defense.clone().unwrap_or_default(),
                description: custom
                    .description
                    .as_deref()
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                link_arrows: join(&custom.link_arrows),
                level: custom.level.clone().unwrap_or_default(),
                monster_type: join(&custom.monster_type).trim().to_string(),
                name: attr.product_name.clone(),
                url_name: attr.product_url_name.clone(),
                number: custom.number.clone().unwrap_or_default(),
                rarity: attr.rarity_name.clone().unwrap_or_default(),
                market_price: attr.market_price.unwrap_or(0.0),
                set_id: set_ref.set_id,
                product_line_id: set_ref.product_line_id,
                product_id: attr.product_id as u64,
            });
        }
        if missing > 0 {
            warn!(
                product_line = self.product_line(),
                skipped = missing,
                "records referencing unknown set names were skipped"
            );
        }
        rows
    }
}

fn join(list: &Option<Vec<String>>) -> String {
    match list {
        Some(items) => items.join(","),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::{Aggregations, CustomAttrs};
    use crate::ingest::set_index::SetRef;

    fn index() -> SetIndex {
        SetIndex::from_rows(vec![(
            "Duelist League Promo".to_string(),
            SetRef {
                set_id: 7,
                product_line_id: 1,
            },
        )])
    }

    fn card(set_name: &str) -> CardAttrs {
        CardAttrs {
            custom_attributes: CustomAttrs {
                attack: Some("2500".into()),
                attribute: Some(vec!["DARK".into()]),
                defense: Some("2100".into()),
                description: Some("  Cannot be destroyed by battle.  ".into()),
                level: Some("7".into()),
                link_arrows: None,
                monster_type: Some(vec!["Dragon".into(), "Effect".into()]),
                number: Some("DL11-EN001".into()),
                ..CustomAttrs::default()
            },
            market_price: Some(3.5),
            product_id: 39111.0,
            product_name: "Red-Eyes B. Dragon".into(),
            product_url_name: "red-eyes-b-dragon".into(),
            rarity_name: Some("Rare".into()),
            set_name: set_name.into(),
            ..CardAttrs::default()
        }
    }

    #[test]
    fn builds_rows_with_resolved_foreign_keys() {
        let rows = YuGiOhBuilder.build(&[card("Duelist League Promo")], &index());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.set_id, 7);
        assert_eq!(row.product_line_id, 1);
        assert_eq!(row.product_id, 39111);
        assert_eq!(row.attribute, "DARK");
        assert_eq!(row.monster_type, "Dragon,Effect");
        assert_eq!(row.card_type, "Dragon,Effect");
        assert_eq!(row.description, "Cannot be destroyed by battle.");
        assert_eq!(row.market_price, 3.5);
    }

    #[test]
    fn unknown_set_names_are_skipped() {
        let rows = YuGiOhBuilder.build(
            &[card("No Such Set"), card("Duelist League Promo")],
            &index(),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].set_id, 7);
    }

    #[test]
    fn absent_attributes_become_empty_strings() {
        let mut attrs = card("Duelist League Promo");
        attrs.custom_attributes = CustomAttrs::default();
        attrs.market_price = None;
        attrs.rarity_name = None;

        let rows = YuGiOhBuilder.build(&[attrs], &index());
        let row = &rows[0];
        assert_eq!(row.attack, "");
        assert_eq!(row.attribute, "");
        assert_eq!(row.rarity, "");
        assert_eq!(row.market_price, 0.0);
    }

    #[test]
    fn registry_resolves_known_product_lines() {
        assert!(builder_for("yugioh").is_some());
        assert!(builder_for("YuGiOh").is_some());
        assert!(builder_for("pokemon").is_none());
    }

    #[test]
    fn product_line_row_uses_first_active_entry() {
        let result = SearchResult {
            aggregations: Aggregations {
                product_line_name: vec![
                    ItemInfo {
                        count: 100.0,
                        is_active: false,
                        url_value: "magic".into(),
                        value: "Magic".into(),
                    },
                    ItemInfo {
                        count: 12050.0,
                        is_active: true,
                        url_value: "yugioh".into(),
                        value: "YuGiOh".into(),
                    },
                ],
                set_name: vec![ItemInfo::default(), ItemInfo::default()],
                ..Aggregations::default()
            },
            total_results: 12050.0,
            ..SearchResult::default()
        };

        let row = product_line_row(&result).unwrap();
        assert_eq!(row.name, "YuGiOh");
        assert_eq!(row.url_name, "yugioh");
        assert_eq!(row.set_count, 2);
        assert_eq!(row.card_count, 12050);
    }

    #[test]
    fn product_line_row_requires_an_active_entry() {
        let result = SearchResult::default();
        assert_eq!(product_line_row(&result), None);
    }

    #[test]
    fn set_rows_carry_parent_id() {
        let sets = vec![ItemInfo {
            count: 61.0,
            is_active: false,
            url_value: "duelist-league-promo".into(),
            value: "Duelist League Promo".into(),
        }];
        let rows = set_rows(3, &sets);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].card_count, 61);
        assert_eq!(rows[0].product_line_id, 3);
        assert_eq!(rows[0].url_name, "duelist-league-promo");
    }
}
