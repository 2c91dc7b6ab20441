use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel returned by safe element reads when the element is missing or hidden.
pub const NOT_SPECIFIED: &str = "Not specified";

/// Sentinel stored in place of a price that could not be recognised.
pub const PRICE_NOT_SPECIFIED: &str = "Price not specified";

/// Product category recognised from the leading tokens of a listing name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    Beer,
    Cider,
    Mead,
    Drink,
    #[default]
    Unknown,
}

impl Category {
    /// Label as it appears on the storefront.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Beer => "Пиво",
            Category::Cider => "Сидр",
            Category::Mead => "Медовуха",
            Category::Drink => "Напиток",
            Category::Unknown => "Неизвестный тип",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorTag {
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClarificationTag {
    Clear,
    Hazy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilteringTag {
    Filtered,
    Unfiltered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PasteurizationTag {
    Pasteurized,
    Unpasteurized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SweetnessTag {
    Sweet,
    SemiSweet,
    SemiDry,
    Dry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PackagingTag {
    #[default]
    GlassBottle,
    #[serde(rename = "PET")]
    Pet,
    AluminumCan,
}

impl PackagingTag {
    pub fn label(&self) -> &'static str {
        match self {
            PackagingTag::GlassBottle => "с/б",
            PackagingTag::Pet => "ПЭТ",
            PackagingTag::AluminumCan => "ж/б",
        }
    }
}

/// Display fields read from a product card alongside its name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListingFields {
    pub volume_text: String,
    pub price_text: String,
    pub image_url: Option<String>,
}

/// One classified catalog entry.
///
/// Produced once by the name classifier and then handled as a value: later
/// stages only ever build new records from it (see [`ScrapedProductRecord::with_listing`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedProductRecord {
    pub raw_name: String,
    pub cleaned_name: String,
    pub category: Category,
    /// Second word of a generic "напиток <subtype>" listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drink_subtype: Option<String>,
    pub color_tag: Option<ColorTag>,
    pub clarification_tag: Option<ClarificationTag>,
    pub is_alcoholic: bool,
    pub filtering_tag: Option<FilteringTag>,
    pub pasteurization_tag: Option<PasteurizationTag>,
    pub sweetness_tag: Option<SweetnessTag>,
    pub packaging_tag: PackagingTag,
    pub alcohol_percentage: Option<f64>,
    pub volume_text: String,
    pub price_text: String,
    pub image_url: Option<String>,
}

impl ScrapedProductRecord {
    /// Record for a name that could not be classified: raw name kept verbatim,
    /// every tag unset, defaults for the rest.
    pub fn unclassified(raw_name: &str) -> Self {
        Self {
            raw_name: raw_name.to_string(),
            cleaned_name: raw_name.to_string(),
            category: Category::Unknown,
            drink_subtype: None,
            color_tag: None,
            clarification_tag: None,
            is_alcoholic: true,
            filtering_tag: None,
            pasteurization_tag: None,
            sweetness_tag: None,
            packaging_tag: PackagingTag::default(),
            alcohol_percentage: None,
            volume_text: String::new(),
            price_text: String::new(),
            image_url: None,
        }
    }

    /// Attach the card's display fields, producing the final record.
    pub fn with_listing(self, listing: ListingFields) -> Self {
        Self {
            volume_text: listing.volume_text,
            price_text: listing.price_text,
            image_url: listing.image_url,
            ..self
        }
    }

    /// Category label including the drink subtype, e.g. "Напиток пивной".
    pub fn category_label(&self) -> String {
        match (&self.category, &self.drink_subtype) {
            (Category::Drink, Some(subtype)) => format!("{} {}", self.category.label(), subtype),
            (category, _) => category.label().to_string(),
        }
    }

    /// Numeric price parsed from the display string ("129,99 ₽" -> 129.99).
    pub fn price_value(&self) -> Option<f64> {
        let numeric: String = self
            .price_text
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
            .collect();
        if numeric.is_empty() {
            return None;
        }
        numeric.replace(',', ".").parse::<f64>().ok()
    }
}

/// Ordered records produced by one run.
pub type Catalog = Vec<ScrapedProductRecord>;

/// Exported form of a catalog: `{address, timestamp, products}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub address: String,
    pub timestamp: DateTime<Utc>,
    pub products: Catalog,
}

impl CatalogDocument {
    pub fn new(address: &str, products: Catalog) -> Self {
        Self {
            address: address.to_string(),
            timestamp: Utc::now(),
            products,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unclassified_defaults() {
        let record = ScrapedProductRecord::unclassified("что-то непонятное");
        assert_eq!(record.category, Category::Unknown);
        assert_eq!(record.cleaned_name, "что-то непонятное");
        assert!(record.is_alcoholic);
        assert_eq!(record.packaging_tag, PackagingTag::GlassBottle);
        assert!(record.color_tag.is_none());
        assert!(record.alcohol_percentage.is_none());
    }

    #[test]
    fn test_with_listing_keeps_classification() {
        let mut base = ScrapedProductRecord::unclassified("Балтика 7");
        base.category = Category::Beer;

        let record = base.with_listing(ListingFields {
            volume_text: "0.45 л".to_string(),
            price_text: "89,99 ₽".to_string(),
            image_url: Some("https://cdn.example.com/1.png".to_string()),
        });

        assert_eq!(record.category, Category::Beer);
        assert_eq!(record.volume_text, "0.45 л");
        assert_eq!(record.price_value(), Some(89.99));
    }

    #[test]
    fn test_json_field_names() {
        let mut record = ScrapedProductRecord::unclassified("Сидр яблочный");
        record.packaging_tag = PackagingTag::Pet;
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["rawName"], "Сидр яблочный");
        assert_eq!(json["packagingTag"], "PET");
        assert_eq!(json["isAlcoholic"], true);
        assert!(json["colorTag"].is_null());
        assert!(json.get("drinkSubtype").is_none());
    }

    #[test]
    fn test_category_label_with_subtype() {
        let mut record = ScrapedProductRecord::unclassified("напиток пивной");
        record.category = Category::Drink;
        record.drink_subtype = Some("пивной".to_string());
        assert_eq!(record.category_label(), "Напиток пивной");
    }

    #[test]
    fn test_price_value_sentinel() {
        let mut record = ScrapedProductRecord::unclassified("x");
        record.price_text = PRICE_NOT_SPECIFIED.to_string();
        assert_eq!(record.price_value(), None);
    }
}
