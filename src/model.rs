use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{to_fields, Document, Fields};
use crate::error::BackendResult;

/// Name of the document collection that holds pantry items.
pub const ITEMS_COLLECTION: &str = "items";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub uid: UserId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl UserIdentity {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

/// Quantity as it is found in a stored document: either a JSON number or
/// the raw text the user typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(f64),
    Text(String),
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::Text(String::new())
    }
}

impl Quantity {
    pub fn as_number(&self) -> f64 {
        match self {
            Quantity::Number(value) if value.is_finite() => *value,
            Quantity::Number(_) => 0.0,
            Quantity::Text(text) => coerce_number(text),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Quantity::Number(value) => format_quantity(*value),
            Quantity::Text(text) => text.clone(),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Numeric value of a quantity token. Empty or non-numeric text counts as 0.
pub fn coerce_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

pub fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(skip)]
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub quantity: Quantity,
    #[serde(rename = "userId", default)]
    pub owner_id: UserId,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
}

impl Item {
    pub fn from_document(document: &Document) -> Result<Self, serde_json::Error> {
        let mut item: Item = serde_json::from_value(Value::Object(document.fields.clone()))?;
        item.id = ItemId::new(document.id.clone());
        Ok(item)
    }
}

/// Create payload. Optional fields are only written when present.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub name: String,
    pub quantity: String,
    #[serde(rename = "userId")]
    pub owner_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl NewItem {
    pub fn new(name: &str, quantity: &str, owner_id: UserId) -> Self {
        Self {
            name: name.trim().to_string(),
            quantity: quantity.to_string(),
            owner_id,
            expiry_date: None,
            image_url: None,
        }
    }

    pub fn with_expiry_date(mut self, expiry_date: impl Into<String>) -> Self {
        self.expiry_date = Some(expiry_date.into());
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn to_fields(&self) -> BackendResult<Fields> {
        to_fields(self)
    }
}

/// Update payload for an edit. The expiry date is written as given, empty
/// text included.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    pub name: String,
    pub quantity: f64,
    pub expiry_date: String,
}

impl ItemPatch {
    pub fn to_fields(&self) -> BackendResult<Fields> {
        to_fields(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Ok(Self { file_name, bytes })
    }
}
