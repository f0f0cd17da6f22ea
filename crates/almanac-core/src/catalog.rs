//! Product catalog and calendar layout constants.
//!
//! The theme table itself is supplied by the caller (it belongs to the
//! image-generation collaborator); this module only defines its shape and
//! the fixed numbers the persistence core validates against.

use crate::error::{AlmanacError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Month numbers created by the preview wave (no cover slot).
pub const PREVIEW_MONTH_NUMBERS: [u8; 3] = [1, 2, 3];

/// Total month slots in a fully generated calendar: cover (0) + 1..=12.
pub const FULL_MONTH_COUNT: usize = 13;

/// How long an unconfirmed preview stays valid.
pub const PREVIEW_TTL_HOURS: i64 = 48;

/// Hard cap on regeneration attempts per month.
pub const RETRY_LIMIT: u8 = 2;

/// Cart quantity bounds (inclusive).
pub const MIN_QUANTITY: u32 = 1;
pub const MAX_QUANTITY: u32 = 99;

/// Purchasable product types with their fixed prices.
///
/// The price table must stay in sync with the checkout collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Desktop,
    WallCalendar,
}

impl ProductType {
    /// Unit price in USD.
    pub fn price(self) -> f64 {
        match self {
            ProductType::Desktop => 19.99,
            ProductType::WallCalendar => 29.99,
        }
    }

    /// The wire tag used in persisted records and by collaborators.
    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::Desktop => "desktop",
            ProductType::WallCalendar => "wall_calendar",
        }
    }
}

impl FromStr for ProductType {
    type Err = AlmanacError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "desktop" => Ok(ProductType::Desktop),
            "wall_calendar" => Ok(ProductType::WallCalendar),
            other => Err(AlmanacError::InvalidProductType(other.to_string())),
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the externally supplied theme table.
///
/// Only used to seed `prompt`/`title`/`description` at month creation;
/// never interpreted afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthTheme {
    /// 0 = cover, 1..=12 = calendar months
    pub month_number: u8,
    /// Display name of the slot ("Cover", "January", ...)
    pub name: String,
    /// Short theme title
    pub title: String,
    /// Human-readable theme description
    pub description: String,
    /// Full generation prompt passed to the image collaborator
    pub prompt: String,
}

/// Looks up the theme for a month number, failing with a typed error when
/// the supplied table has a hole.
pub fn theme_for<'a>(themes: &'a [MonthTheme], month_number: u8) -> Result<&'a MonthTheme> {
    themes
        .iter()
        .find(|t| t.month_number == month_number)
        .ok_or(AlmanacError::MissingTheme(month_number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_type_round_trip() {
        for product in [ProductType::Desktop, ProductType::WallCalendar] {
            assert_eq!(product.as_str().parse::<ProductType>().unwrap(), product);
        }
    }

    #[test]
    fn test_unknown_product_type_rejected() {
        let err = "poster".parse::<ProductType>().unwrap_err();
        assert_eq!(err, AlmanacError::InvalidProductType("poster".to_string()));
    }

    #[test]
    fn test_prices_match_table() {
        assert_eq!(ProductType::Desktop.price(), 19.99);
        assert_eq!(ProductType::WallCalendar.price(), 29.99);
    }

    #[test]
    fn test_theme_lookup() {
        let themes = vec![MonthTheme {
            month_number: 1,
            name: "January".to_string(),
            title: "Winter".to_string(),
            description: "Snowy scene".to_string(),
            prompt: "a snowy scene".to_string(),
        }];

        assert_eq!(theme_for(&themes, 1).unwrap().title, "Winter");
        assert_eq!(theme_for(&themes, 2).unwrap_err(), AlmanacError::MissingTheme(2));
    }
}
