//! Tokenization and term normalization.
//!
//! The same normalization applies at insertion and at query time:
//!
//! - text is split on Unicode word boundaries, every word is NFKC-normalized
//!   and lowercased;
//! - exact terms (keywords, booleans, query terms) are NFKC-normalized and
//!   lowercased without splitting;
//! - numbers print in a canonical decimal form, see [`normalize_number`];
//! - exact values of `Int64` and `Float64` fields always take the numeric
//!   form, see [`normalize_exact`].

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::schema::DataType;

/// A normalized word and its position within the tokenized element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub position: u32,
}

/// Split `text` into normalized word tokens.
pub fn tokenize(text: &str) -> impl Iterator<Item = Token> + '_ {
    text.unicode_words()
        .map(normalize_term)
        .filter(|word| !word.is_empty())
        .enumerate()
        .map(|(position, text)| Token {
            text,
            position: position as u32,
        })
}

/// Normalize a value that is indexed or queried as one exact term.
pub fn normalize_term(text: &str) -> String {
    text.trim().nfkc().flat_map(char::to_lowercase).collect()
}

/// Normalize a numeric term to its canonical textual form.
///
/// Integers print in decimal, floats with an integral value print like the
/// integer, other floats use Rust's shortest round-trip form. Text that is not
/// a number falls back to [`normalize_term`].
pub fn normalize_number(text: &str) -> String {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return value.to_string();
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        return format_float(value);
    }
    normalize_term(trimmed)
}

/// Normalize a value indexed as one exact term of a `data_type` field.
pub fn normalize_exact(data_type: DataType, text: &str) -> String {
    match data_type {
        DataType::Int64 | DataType::Float64 => normalize_number(text),
        DataType::String | DataType::Bool => normalize_term(text),
    }
}

/// Normalize a numeric query term for a tokenized field.
///
/// The text goes through the tokenizer like field text does, so `42.0` stays
/// `42.0` and `+7` becomes `7`. Text that is not one word falls back to
/// [`normalize_term`].
pub fn normalize_number_as_text(text: &str) -> String {
    let mut tokens = tokenize(text);
    match (tokens.next(), tokens.next()) {
        (Some(token), None) => token.text,
        _ => normalize_term(text),
    }
}

pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_positions() {
        let tokens: Vec<Token> = tokenize("Red  Shoes, red!").collect();
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["red", "shoes", "red"]);
        assert_eq!(tokens[2].position, 2);
    }

    #[test]
    fn test_normalize_term_folds_width_and_case() {
        // Fullwidth letters fold to ASCII under NFKC.
        assert_eq!(normalize_term("ＡＢＣ"), "abc");
        assert_eq!(normalize_term("  Shoes "), "shoes");
    }

    #[test]
    fn test_normalize_number() {
        assert_eq!(normalize_number("42"), "42");
        assert_eq!(normalize_number("+42"), "42");
        assert_eq!(normalize_number("42.0"), "42");
        assert_eq!(normalize_number("2.5"), "2.5");
        assert_eq!(normalize_number("Forty"), "forty");
        assert_eq!(format_float(-3.0), "-3");
        assert_eq!(format_float(0.125), "0.125");
    }

    #[test]
    fn test_normalize_exact_by_type() {
        assert_eq!(normalize_exact(DataType::Int64, "+2024"), "2024");
        assert_eq!(normalize_exact(DataType::Float64, "3.50"), "3.5");
        assert_eq!(normalize_exact(DataType::String, "+2024"), "+2024");
        assert_eq!(normalize_exact(DataType::Bool, "TRUE"), "true");
    }

    #[test]
    fn test_number_as_text_matches_tokenizer() {
        let words: Vec<String> = tokenize("size 42.0 and 007").map(|t| t.text).collect();
        assert!(words.contains(&normalize_number_as_text("42.0")));
        assert!(words.contains(&normalize_number_as_text("007")));
        assert_eq!(normalize_number_as_text("+7"), "7");
        assert_eq!(normalize_number_as_text("1 2"), "1 2");
    }
}
