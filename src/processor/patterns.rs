//! Lexical rules consumed by the name classifier.
//!
//! Table order is significant: within one table the first entry that matches
//! wins, so wider stems that share a prefix with a narrower one must be
//! declared with that in mind.

use crate::models::{
    Category, ClarificationTag, ColorTag, FilteringTag, PackagingTag, PasteurizationTag,
    SweetnessTag,
};

/// Category keywords, compared case-insensitively against whole tokens.
pub const CATEGORY_KEYWORDS: &[(&str, Category)] = &[
    ("пиво", Category::Beer),
    ("сидр", Category::Cider),
    ("медовуха", Category::Mead),
    ("напиток", Category::Drink),
];

/// Leading word of a composite "напиток <subtype>" listing.
pub const BEVERAGE_KEYWORD: &str = "напиток";

pub const COLOR_STEMS: &[(&str, ColorTag)] = &[
    ("светл", ColorTag::Light),
    ("темн", ColorTag::Dark),
    ("бел", ColorTag::Light),
    ("черн", ColorTag::Dark),
];

pub const CLARIFICATION_STEMS: &[(&str, ClarificationTag)] = &[
    ("осветл", ClarificationTag::Clear),
    ("неосветл", ClarificationTag::Hazy),
];

/// A match clears the default `is_alcoholic = true`.
pub const ALCOHOL_FREE_STEMS: &[(&str, ())] = &[("безалко", ())];

pub const FILTERING_STEMS: &[(&str, FilteringTag)] = &[
    ("фильтр", FilteringTag::Filtered),
    ("нефильтр", FilteringTag::Unfiltered),
];

pub const PASTEURIZATION_STEMS: &[(&str, PasteurizationTag)] = &[
    ("пастер", PasteurizationTag::Pasteurized),
    ("непастер", PasteurizationTag::Unpasteurized),
];

pub const SWEETNESS_STEMS: &[(&str, SweetnessTag)] = &[
    ("сладк", SweetnessTag::Sweet),
    ("полусладк", SweetnessTag::SemiSweet),
    ("полусух", SweetnessTag::SemiDry),
    ("сух", SweetnessTag::Dry),
];

/// Matched as exact words, no grammatical suffix.
pub const PACKAGING_WORDS: &[(&str, PackagingTag)] = &[
    ("ж/б", PackagingTag::AluminumCan),
    ("пэт", PackagingTag::Pet),
    ("с/б", PackagingTag::GlassBottle),
];

/// Alcohol percentage captures, tried in this order; the first that matches
/// anywhere in the name wins.
pub const PERCENTAGE_PATTERNS: [&str; 5] = [
    r"(\d+[,.]?\d*)%",
    r"не\s+менее\s+(\d+[,.]?\d*)%",
    r"не\s+более\s+(\d+[,.]?\d*)%",
    r"от\s+(\d+[,.]?\d*)%",
    r"до\s+(\d+[,.]?\d*)%",
];

/// Percentage phrases stripped from the cleaned name whether or not they
/// produced the extracted value.
pub const PERCENT_PHRASE_PATTERNS: [&str; 5] = [
    r"\d+[,.]?\d*%",
    r"не\s+менее\s+\d+[,.]?\d*%",
    r"не\s+более\s+\d+[,.]?\d*%",
    r"от\s+\d+[,.]?\d*%",
    r"до\s+\d+[,.]?\d*%",
];

/// Connector words left dangling once their percentage is gone.
pub const CONNECTOR_PATTERNS: [&str; 4] = [
    r"(?i)\bне\s+менее\b",
    r"(?i)\bне\s+более\b",
    r"(?i)\bот\b",
    r"(?i)\bдо\b",
];

/// Standalone abbreviation of "алкогольное".
pub const ALCOHOLIC_ABBREVIATION: &str = r"(?i)\bалк\b";

/// A lone `0` at the end of the name, optionally followed by the fraction
/// digits a split volume token ("0.5" -> "0 5") leaves behind.
pub const TRAILING_ZERO_FRAGMENT: &str = r"\s*\b0(?:\s+\d+)?\s*$";

pub fn category_for_keyword(token: &str) -> Option<Category> {
    let token = token.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(keyword, _)| *keyword == token)
        .map(|(_, category)| *category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_keywords_case_insensitive() {
        assert_eq!(category_for_keyword("Пиво"), Some(Category::Beer));
        assert_eq!(category_for_keyword("СИДР"), Some(Category::Cider));
        assert_eq!(category_for_keyword("медовуха"), Some(Category::Mead));
        assert_eq!(category_for_keyword("пивной"), None);
    }

    #[test]
    fn test_percentage_patterns_compile() {
        for pattern in PERCENTAGE_PATTERNS
            .iter()
            .chain(PERCENT_PHRASE_PATTERNS.iter())
            .chain(CONNECTOR_PATTERNS.iter())
        {
            assert!(regex::Regex::new(pattern).is_ok(), "bad pattern {}", pattern);
        }
    }
}
