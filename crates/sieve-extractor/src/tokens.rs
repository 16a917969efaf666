//! Heuristic token estimation
//!
//! The completion service bills in tokens we cannot count locally without
//! its tokenizer, so the estimate picks a characters-per-token divisor from
//! the shape of the text. Dense text (code, symbols, non-Latin scripts)
//! tokenizes into more pieces per character than English prose.

/// Shape of a text as far as token density is concerned
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextShape {
    /// Brackets and operators above 10% of characters
    CodeLike,
    /// Non-alphanumeric symbols above 15% of characters
    SymbolDense,
    /// Non-ASCII characters above 10% of characters
    NonAscii,
    /// Everything else
    Prose,
}

impl TextShape {
    /// Characters per token for this shape
    pub fn chars_per_token(&self) -> f64 {
        match self {
            TextShape::CodeLike => 3.0,
            TextShape::SymbolDense => 3.5,
            TextShape::NonAscii => 3.2,
            TextShape::Prose => 4.0,
        }
    }
}

const CODE_RATIO: f64 = 0.10;
const SYMBOL_RATIO: f64 = 0.15;
const NON_ASCII_RATIO: f64 = 0.10;

fn is_code_char(c: char) -> bool {
    matches!(
        c,
        '{' | '}' | '[' | ']' | '(' | ')' | '<' | '>' | ';' | '=' | '+' | '*' | '/' | '\\'
            | '|' | '&' | '^' | '%' | '$' | '#' | '@' | '~' | '`'
    )
}

/// Classify text by its character mix
pub fn classify(text: &str) -> TextShape {
    let mut total = 0usize;
    let mut code = 0usize;
    let mut symbols = 0usize;
    let mut non_ascii = 0usize;

    for c in text.chars() {
        total += 1;
        if is_code_char(c) {
            code += 1;
        }
        if !c.is_alphanumeric() && !c.is_whitespace() {
            symbols += 1;
        }
        if !c.is_ascii() {
            non_ascii += 1;
        }
    }

    if total == 0 {
        return TextShape::Prose;
    }

    let total = total as f64;
    if code as f64 / total > CODE_RATIO {
        TextShape::CodeLike
    } else if symbols as f64 / total > SYMBOL_RATIO {
        TextShape::SymbolDense
    } else if non_ascii as f64 / total > NON_ASCII_RATIO {
        TextShape::NonAscii
    } else {
        TextShape::Prose
    }
}

/// Estimate the number of tokens in `text`
///
/// # Examples
///
/// ```
/// use sieve_extractor::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert_eq!(estimate_tokens("reset the router"), 4);
/// ```
pub fn estimate(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count() as f64;
    (chars / classify(text).chars_per_token()).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(estimate(""), 0);
    }

    #[test]
    fn test_prose_uses_four_chars_per_token() {
        let text = "Please restart the application and try again";
        assert_eq!(classify(text), TextShape::Prose);
        assert_eq!(estimate(text), (text.len() as f64 / 4.0).ceil() as u64);
    }

    #[test]
    fn test_code_like() {
        let text = "fn main() { let x = vec![1, 2]; println!(\"{:?}\", x); }";
        assert_eq!(classify(text), TextShape::CodeLike);
        assert_eq!(estimate(text), (text.chars().count() as f64 / 3.0).ceil() as u64);
    }

    #[test]
    fn test_symbol_dense() {
        let text = "wait... what?! no, no, no -- it's 'broken' again!!";
        assert_eq!(classify(text), TextShape::SymbolDense);
    }

    #[test]
    fn test_non_ascii() {
        let text = "Как сбросить пароль? Откройте настройки и выберите сброс.";
        assert_eq!(classify(text), TextShape::NonAscii);
        assert_eq!(estimate(text), (text.chars().count() as f64 / 3.2).ceil() as u64);
    }

    #[test]
    fn test_single_char() {
        assert_eq!(estimate("a"), 1);
    }
}
