use anyhow::{Context, Result};
use regex::Regex;
use tracing::warn;

use crate::models::{Category, ScrapedProductRecord};
use crate::processor::patterns::{
    category_for_keyword, ALCOHOLIC_ABBREVIATION, ALCOHOL_FREE_STEMS, BEVERAGE_KEYWORD,
    CLARIFICATION_STEMS, COLOR_STEMS, CONNECTOR_PATTERNS, FILTERING_STEMS, PACKAGING_WORDS,
    PASTEURIZATION_STEMS, PERCENTAGE_PATTERNS, PERCENT_PHRASE_PATTERNS, SWEETNESS_STEMS,
    TRAILING_ZERO_FRAGMENT,
};
use crate::processor::stem_matcher::{take_first, MatchMode};

/// Turns a free-text listing name into a structured record.
///
/// Holds only compiled patterns, so one instance can be shared read-only by
/// any number of runs.
pub struct NameClassifier {
    percentage_patterns: Vec<Regex>,
    percent_phrase_patterns: Vec<Regex>,
    connector_patterns: Vec<Regex>,
    separators: Regex,
    whitespace: Regex,
    trailing_zero: Regex,
    alcoholic_abbreviation: Regex,
    repeated_periods: Regex,
    trailing_period: Regex,
}

/// Outcome of category detection: the category and the name with the
/// category word(s) removed.
struct CategoryMatch {
    category: Category,
    drink_subtype: Option<String>,
    remainder: String,
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).with_context(|| format!("Invalid name pattern: {}", pattern))
        })
        .collect()
}

fn starts_uppercase(token: &str) -> bool {
    token.chars().next().is_some_and(char::is_uppercase)
}

impl NameClassifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            percentage_patterns: compile_all(&PERCENTAGE_PATTERNS)?,
            percent_phrase_patterns: compile_all(&PERCENT_PHRASE_PATTERNS)?,
            connector_patterns: compile_all(&CONNECTOR_PATTERNS)?,
            separators: Regex::new(r"[,.]")?,
            whitespace: Regex::new(r"\s+")?,
            trailing_zero: Regex::new(TRAILING_ZERO_FRAGMENT)?,
            alcoholic_abbreviation: Regex::new(ALCOHOLIC_ABBREVIATION)?,
            repeated_periods: Regex::new(r"\.+")?,
            trailing_period: Regex::new(r"\.$")?,
        })
    }

    /// Classify one listing name. Never fails: anything that goes wrong
    /// internally degrades to an `Unknown` record carrying the raw name.
    pub fn classify(&self, raw_name: &str) -> ScrapedProductRecord {
        match self.try_classify(raw_name) {
            Ok(record) => record,
            Err(e) => {
                warn!("Error processing product name '{}': {:#}", raw_name, e);
                ScrapedProductRecord::unclassified(raw_name)
            }
        }
    }

    fn try_classify(&self, raw_name: &str) -> Result<ScrapedProductRecord> {
        let Some(category_match) = detect_category(raw_name) else {
            return Ok(ScrapedProductRecord::unclassified(raw_name));
        };

        let mut name = category_match.remainder;
        let mut record = ScrapedProductRecord::unclassified(raw_name);
        record.category = category_match.category;
        record.drink_subtype = category_match.drink_subtype;

        // Each rule sees the name with every earlier match already removed.
        record.color_tag = take_first(&mut name, COLOR_STEMS, MatchMode::Stem);
        record.clarification_tag = take_first(&mut name, CLARIFICATION_STEMS, MatchMode::Stem);
        record.is_alcoholic = take_first(&mut name, ALCOHOL_FREE_STEMS, MatchMode::Stem).is_none();
        record.filtering_tag = take_first(&mut name, FILTERING_STEMS, MatchMode::Stem);
        record.pasteurization_tag = take_first(&mut name, PASTEURIZATION_STEMS, MatchMode::Stem);
        record.sweetness_tag = take_first(&mut name, SWEETNESS_STEMS, MatchMode::Stem);
        if let Some(packaging) = take_first(&mut name, PACKAGING_WORDS, MatchMode::Exact) {
            record.packaging_tag = packaging;
        }

        record.alcohol_percentage = self.extract_percentage(&name)?;
        record.cleaned_name = self.clean_name(&name);

        Ok(record)
    }

    /// First capture across the percentage patterns, in pattern order.
    fn extract_percentage(&self, name: &str) -> Result<Option<f64>> {
        let lowered = name.to_lowercase();
        for pattern in &self.percentage_patterns {
            if let Some(captures) = pattern.captures(&lowered) {
                let number = captures[1].replace(',', ".");
                let value = number
                    .parse::<f64>()
                    .with_context(|| format!("Unparseable alcohol percentage: {}", number))?;
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn clean_name(&self, name: &str) -> String {
        let mut cleaned = name.to_string();

        for pattern in &self.percent_phrase_patterns {
            cleaned = pattern.replace_all(&cleaned, "").trim().to_string();
        }
        for pattern in &self.connector_patterns {
            cleaned = pattern.replace_all(&cleaned, "").trim().to_string();
        }

        cleaned = self.separators.replace_all(&cleaned, " ").to_string();
        cleaned = self.whitespace.replace_all(&cleaned, " ").trim().to_string();
        // Stripping one fragment can expose another ("0 0 45", "0 5 алк").
        loop {
            let stripped = self.trailing_zero.replace(&cleaned, "").trim().to_string();
            let stripped = self.alcoholic_abbreviation.replace_all(&stripped, "");
            let stripped = self.whitespace.replace_all(&stripped, " ").trim().to_string();
            if stripped == cleaned {
                break;
            }
            cleaned = stripped;
        }
        cleaned = self.repeated_periods.replace_all(&cleaned, ".").trim().to_string();
        cleaned = self.trailing_period.replace(&cleaned, "").trim().to_string();

        self.whitespace.replace_all(&cleaned, " ").to_string()
    }
}

/// Category from the leading token(s).
///
/// A category keyword in first position (any case) is consumed directly, with
/// "напиток <subtype>" consuming both words. Otherwise a capitalised first
/// word is a brand: the first category keyword after it is consumed, and a
/// brand with no keyword is beer. A lowercase first word that is not a
/// keyword leaves the name unclassified.
fn detect_category(raw_name: &str) -> Option<CategoryMatch> {
    let words: Vec<&str> = raw_name.split_whitespace().collect();
    let first = *words.first()?;

    if first.to_lowercase() == BEVERAGE_KEYWORD && words.len() >= 2 {
        return Some(CategoryMatch {
            category: Category::Drink,
            drink_subtype: Some(words[1].to_lowercase()),
            remainder: words[2..].join(" "),
        });
    }

    if let Some(category) = category_for_keyword(first) {
        return Some(CategoryMatch {
            category,
            drink_subtype: None,
            remainder: words[1..].join(" "),
        });
    }

    if !starts_uppercase(first) {
        return None;
    }

    let found = words
        .iter()
        .enumerate()
        .skip(1)
        .find_map(|(index, word)| category_for_keyword(word).map(|category| (index, category)));

    match found {
        Some((index, category)) => {
            let remainder: Vec<&str> = words
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, word)| *word)
                .collect();
            Some(CategoryMatch {
                category,
                drink_subtype: None,
                remainder: remainder.join(" "),
            })
        }
        None => Some(CategoryMatch {
            category: Category::Beer,
            drink_subtype: None,
            remainder: raw_name.trim().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ClarificationTag, ColorTag, FilteringTag, PackagingTag, PasteurizationTag, SweetnessTag,
    };

    fn classifier() -> NameClassifier {
        NameClassifier::new().unwrap()
    }

    #[test]
    fn test_branded_listing_end_to_end() {
        let record = classifier()
            .classify("Балтика 7 Светлое Фильтрованное Пастеризованное 4,5% 0.5");

        assert_eq!(record.category, Category::Beer);
        assert_eq!(record.color_tag, Some(ColorTag::Light));
        assert_eq!(record.filtering_tag, Some(FilteringTag::Filtered));
        assert_eq!(record.pasteurization_tag, Some(PasteurizationTag::Pasteurized));
        assert_eq!(record.alcohol_percentage, Some(4.5));
        assert_eq!(record.cleaned_name, "Балтика 7");
        assert_eq!(
            record.raw_name,
            "Балтика 7 Светлое Фильтрованное Пастеризованное 4,5% 0.5"
        );
    }

    #[test]
    fn test_bare_percent_has_priority() {
        let record = classifier().classify("Пиво светлое 4,5% не менее 5%");
        assert_eq!(record.alcohol_percentage, Some(4.5));
        assert_eq!(record.color_tag, Some(ColorTag::Light));
        assert_eq!(record.cleaned_name, "");
    }

    #[test]
    fn test_first_bare_percent_wins() {
        let record = classifier().classify("пиво Охота не менее 8% крепкое 7,2%");
        assert_eq!(record.alcohol_percentage, Some(8.0));
        assert_eq!(record.cleaned_name, "Охота крепкое");
    }

    #[test]
    fn test_lowercase_unknown_short_circuits() {
        let raw = "вино красное сухое 12%";
        let record = classifier().classify(raw);
        assert_eq!(record.category, Category::Unknown);
        assert_eq!(record.cleaned_name, raw);
        assert!(record.color_tag.is_none());
        assert!(record.sweetness_tag.is_none());
        assert!(record.alcohol_percentage.is_none());
        assert!(record.is_alcoholic);
    }

    #[test]
    fn test_brand_with_category_later() {
        let record = classifier().classify("Strongbow Сидр яблочный полусладкий 4,5% ж/б");
        assert_eq!(record.category, Category::Cider);
        assert_eq!(record.sweetness_tag, Some(SweetnessTag::SemiSweet));
        assert_eq!(record.packaging_tag, PackagingTag::AluminumCan);
        assert_eq!(record.cleaned_name, "Strongbow яблочный");
    }

    #[test]
    fn test_beverage_composite() {
        let record = classifier().classify("напиток пивной Essa ананас грейпфрут 6,5% 0.45");
        assert_eq!(record.category, Category::Drink);
        assert_eq!(record.drink_subtype.as_deref(), Some("пивной"));
        assert_eq!(record.category_label(), "Напиток пивной");
        assert_eq!(record.alcohol_percentage, Some(6.5));
    }

    #[test]
    fn test_alcohol_free_marker() {
        let record = classifier().classify("Пиво безалкогольное Балтика 0 светлое");
        assert!(!record.is_alcoholic);
        assert_eq!(record.color_tag, Some(ColorTag::Light));
        assert_eq!(record.cleaned_name, "Балтика");
    }

    #[test]
    fn test_filtering_priority_pair() {
        let record = classifier().classify("пиво Жигули фильтрованное нефильтрованное");
        assert_eq!(record.filtering_tag, Some(FilteringTag::Filtered));

        let record = classifier().classify("пиво Жигули нефильтрованное");
        assert_eq!(record.filtering_tag, Some(FilteringTag::Unfiltered));
        assert_eq!(record.cleaned_name, "Жигули");
    }

    #[test]
    fn test_clarification_and_pasteurization_pairs() {
        let record = classifier().classify("пиво Хмельное неосветленное непастеризованное");
        assert_eq!(record.clarification_tag, Some(ClarificationTag::Hazy));
        assert_eq!(record.pasteurization_tag, Some(PasteurizationTag::Unpasteurized));
        assert_eq!(record.cleaned_name, "Хмельное");

        let record = classifier().classify("пиво Хмельное осветленное пастеризованное");
        assert_eq!(record.clarification_tag, Some(ClarificationTag::Clear));
        assert_eq!(record.pasteurization_tag, Some(PasteurizationTag::Pasteurized));
    }

    #[test]
    fn test_sweetness_priority_pair() {
        let record = classifier().classify("сидр Fine полусухой");
        assert_eq!(record.sweetness_tag, Some(SweetnessTag::SemiDry));

        let record = classifier().classify("сидр Fine сухой");
        assert_eq!(record.sweetness_tag, Some(SweetnessTag::Dry));
    }

    #[test]
    fn test_both_markers_in_one_name() {
        let classifier = classifier();

        let record = classifier.classify("пиво Хмельное неосветленное осветленное");
        assert_eq!(record.clarification_tag, Some(ClarificationTag::Clear));
        assert_eq!(record.cleaned_name, "Хмельное неосветленное");

        let record = classifier.classify("пиво Хмельное непастеризованное пастеризованное");
        assert_eq!(record.pasteurization_tag, Some(PasteurizationTag::Pasteurized));
        assert_eq!(record.cleaned_name, "Хмельное непастеризованное");

        let record = classifier.classify("сидр Fine полусладкий сладкий");
        assert_eq!(record.sweetness_tag, Some(SweetnessTag::Sweet));
        assert_eq!(record.cleaned_name, "Fine полусладкий");

        let record = classifier.classify("сидр Fine сухой полусухой");
        assert_eq!(record.sweetness_tag, Some(SweetnessTag::SemiDry));
        assert_eq!(record.cleaned_name, "Fine сухой");

        let record = classifier.classify("пиво Хмельное белое светлое");
        assert_eq!(record.color_tag, Some(ColorTag::Light));
        assert_eq!(record.cleaned_name, "Хмельное белое");
    }

    #[test]
    fn test_packaging_default_and_pet() {
        let record = classifier().classify("пиво Три медведя светлое");
        assert_eq!(record.packaging_tag, PackagingTag::GlassBottle);

        let record = classifier().classify("пиво Три медведя светлое ПЭТ 1.35");
        assert_eq!(record.packaging_tag, PackagingTag::Pet);
        assert!(!record.cleaned_name.to_lowercase().contains("пэт"));
    }

    #[test]
    fn test_dangling_connectors_and_abbreviation_removed() {
        let record = classifier().classify("медовуха Старая алк от 5,5% до 7%");
        assert_eq!(record.category, Category::Mead);
        assert_eq!(record.alcohol_percentage, Some(5.5));
        assert_eq!(record.cleaned_name, "Старая");
    }

    #[test]
    fn test_cleaned_name_is_fixed_point() {
        let classifier = classifier();
        let first = classifier.classify("пиво жигулевское светлое 4% 0.5");
        assert_eq!(first.cleaned_name, "жигулевское");

        let second = classifier.classify(&first.cleaned_name);
        assert_eq!(second.category, Category::Unknown);
        assert_eq!(second.cleaned_name, first.cleaned_name);

        let branded = classifier.classify("Балтика 7 Светлое 4,5% 0.5");
        let again = classifier.classify(&branded.cleaned_name);
        assert_eq!(again.cleaned_name, branded.cleaned_name);
        assert!(again.color_tag.is_none());
    }

    #[test]
    fn test_stacked_trailing_fragments_are_stable() {
        let classifier = classifier();

        let zeros = classifier.classify("Пиво безалкогольное Балтика 0 светлое 0,45");
        assert_eq!(zeros.cleaned_name, "Балтика");
        assert_eq!(classifier.classify(&zeros.cleaned_name).cleaned_name, zeros.cleaned_name);

        let abbreviated = classifier.classify("Балтика 7 Светлое 4,5% 0.5 алк.");
        assert_eq!(abbreviated.cleaned_name, "Балтика 7");
        assert_eq!(
            classifier.classify(&abbreviated.cleaned_name).cleaned_name,
            abbreviated.cleaned_name
        );
    }

    #[test]
    fn test_empty_name() {
        let record = classifier().classify("   ");
        assert_eq!(record.category, Category::Unknown);
        assert_eq!(record.cleaned_name, "   ");
    }

    #[test]
    fn test_at_most_one_value_per_field() {
        let record = classifier().classify("пиво Тёмное черное светлое белое");
        // Table order: "светл" is declared before "темн" and "черн".
        assert_eq!(record.color_tag, Some(ColorTag::Light));
        assert!(record.cleaned_name.contains("черное"));
    }
}
