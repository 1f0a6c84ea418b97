use time::OffsetDateTime;

use super::expiry::{self, ExpiryStatus};
use crate::model::{format_quantity, Item};

/// Items whose name contains `filter`, ignoring case, in their original
/// order. An empty filter keeps everything.
pub fn filter_items<'a>(items: &'a [Item], filter: &str) -> Vec<&'a Item> {
    let needle = filter.to_lowercase();
    items
        .iter()
        .filter(|item| needle.is_empty() || item.name.to_lowercase().contains(&needle))
        .collect()
}

pub fn total_quantity(items: &[Item]) -> f64 {
    items.iter().map(|item| item.quantity.as_number()).sum()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewRow<'a> {
    pub item: &'a Item,
    pub expiry: Option<ExpiryStatus>,
}

impl ViewRow<'_> {
    pub fn quantity_text(&self) -> String {
        self.item.quantity.to_text()
    }
}

/// What the presentation layer renders for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PantryView<'a> {
    pub rows: Vec<ViewRow<'a>>,
    /// Sum over every item, filtered out or not.
    pub total: f64,
    pub item_count: usize,
}

impl<'a> PantryView<'a> {
    pub fn compute(
        items: &'a [Item],
        filter: &str,
        now: OffsetDateTime,
        soon_within_days: u32,
    ) -> Self {
        let rows = filter_items(items, filter)
            .into_iter()
            .map(|item| ViewRow {
                item,
                expiry: item
                    .expiry_date
                    .as_deref()
                    .and_then(|text| expiry::status_of(text, now, soon_within_days)),
            })
            .collect();
        Self {
            rows,
            total: total_quantity(items),
            item_count: items.len(),
        }
    }

    pub fn show_total(&self) -> bool {
        self.item_count > 0
    }

    pub fn total_text(&self) -> String {
        format_quantity(self.total)
    }

    pub fn is_filtered_empty(&self) -> bool {
        self.rows.is_empty() && self.item_count > 0
    }
}
