//! Rule-based password generation and strength scoring.
//!
//! Generation guarantees minimum-per-class counts deterministically:
//! required characters are drawn first, the remainder comes from the
//! union alphabet, and the result is shuffled so required characters are
//! not positionally predictable. All randomness comes from `OsRng`.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Result, VaultError};
use crate::models::{StrengthCategory, StrengthReport};

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";
const AMBIGUOUS: &str = "0O1lI|";

const MIN_LENGTH: usize = 4;
const MAX_LENGTH: usize = 128;

/// Generation rules. Defaults mirror a 16-character password drawing on
/// all four classes with one of each guaranteed.
#[derive(Debug, Clone)]
pub struct PasswordSpec {
    pub length: usize,
    pub uppercase: bool,
    pub lowercase: bool,
    pub digits: bool,
    pub symbols: bool,
    pub min_uppercase: usize,
    pub min_lowercase: usize,
    pub min_digits: usize,
    pub min_symbols: usize,
    pub exclude_ambiguous: bool,
    /// Replaces the default symbol set when non-empty.
    pub custom_symbols: String,
    /// Characters stripped from every class.
    pub forbidden: String,
}

impl Default for PasswordSpec {
    fn default() -> Self {
        Self {
            length: 16,
            uppercase: true,
            lowercase: true,
            digits: true,
            symbols: true,
            min_uppercase: 1,
            min_lowercase: 1,
            min_digits: 1,
            min_symbols: 1,
            exclude_ambiguous: false,
            custom_symbols: String::new(),
            forbidden: String::new(),
        }
    }
}

impl PasswordSpec {
    /// The four class alphabets after exclusions, in a fixed order:
    /// upper, lower, digits, symbols. Excluded classes come back empty.
    fn class_alphabets(&self) -> [Vec<char>; 4] {
        let symbols: &str = if self.custom_symbols.is_empty() {
            SYMBOLS
        } else {
            &self.custom_symbols
        };
        let filter = |class: &str, included: bool| -> Vec<char> {
            if !included {
                return Vec::new();
            }
            class
                .chars()
                .filter(|c| !self.forbidden.contains(*c))
                .filter(|c| !(self.exclude_ambiguous && AMBIGUOUS.contains(*c)))
                .collect()
        };
        [
            filter(UPPERCASE, self.uppercase),
            filter(LOWERCASE, self.lowercase),
            filter(DIGITS, self.digits),
            filter(symbols, self.symbols),
        ]
    }

    fn minimums(&self) -> [usize; 4] {
        [
            if self.uppercase { self.min_uppercase } else { 0 },
            if self.lowercase { self.min_lowercase } else { 0 },
            if self.digits { self.min_digits } else { 0 },
            if self.symbols { self.min_symbols } else { 0 },
        ]
    }
}

/// Generate a password satisfying the spec.
pub fn generate(spec: &PasswordSpec) -> Result<String> {
    if spec.length < MIN_LENGTH || spec.length > MAX_LENGTH {
        return Err(VaultError::Validation(format!(
            "password length must be between {MIN_LENGTH} and {MAX_LENGTH}"
        )));
    }
    if !(spec.uppercase || spec.lowercase || spec.digits || spec.symbols) {
        return Err(VaultError::Validation(
            "at least one character class must be included".into(),
        ));
    }

    let alphabets = spec.class_alphabets();
    let minimums = spec.minimums();

    let union: Vec<char> = alphabets.iter().flatten().copied().collect();
    if union.is_empty() {
        return Err(VaultError::Validation(
            "exclusion rules leave no characters to draw from".into(),
        ));
    }
    for (alphabet, &min) in alphabets.iter().zip(&minimums) {
        if min > 0 && alphabet.is_empty() {
            return Err(VaultError::Validation(
                "a required character class has no characters left after exclusions".into(),
            ));
        }
    }

    let required: usize = minimums.iter().sum();
    if required > spec.length {
        return Err(VaultError::Validation(format!(
            "minimum character requirements ({required}) exceed password length ({})",
            spec.length
        )));
    }

    let mut rng = OsRng;
    let mut chars: Vec<char> = Vec::with_capacity(spec.length);

    // Required minimums first: this makes the guarantee structural
    // rather than probabilistic.
    for (alphabet, &min) in alphabets.iter().zip(&minimums) {
        for _ in 0..min {
            chars.push(alphabet[rng.gen_range(0..alphabet.len())]);
        }
    }
    while chars.len() < spec.length {
        chars.push(union[rng.gen_range(0..union.len())]);
    }
    chars.shuffle(&mut rng);

    Ok(chars.into_iter().collect())
}

/// Entropy-based strength estimate with actionable feedback.
pub fn score_strength(password: &str) -> StrengthReport {
    let length = password.chars().count();
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digits = password.chars().any(|c| c.is_ascii_digit());
    let has_symbols = password.chars().any(|c| SYMBOLS.contains(c) || !c.is_alphanumeric());

    let mut alphabet = 0usize;
    if has_uppercase {
        alphabet += 26;
    }
    if has_lowercase {
        alphabet += 26;
    }
    if has_digits {
        alphabet += 10;
    }
    if has_symbols {
        alphabet += SYMBOLS.len();
    }
    let entropy_bits = if alphabet > 0 {
        length as f64 * (alphabet as f64).log2()
    } else {
        0.0
    };

    let classes = [has_uppercase, has_lowercase, has_digits, has_symbols]
        .iter()
        .filter(|&&b| b)
        .count();

    let mut score: i32 = 0;
    score += match length {
        0..=5 => 0,
        6..=7 => 5,
        8..=11 => 15,
        _ => 25,
    };
    score += classes as i32 * 15;
    score += if entropy_bits >= 60.0 {
        20
    } else if entropy_bits >= 40.0 {
        10
    } else {
        0
    };

    let lower = password.to_lowercase();
    let common_pattern = ["password", "123456", "qwerty"]
        .iter()
        .any(|p| lower.contains(p));
    if common_pattern {
        score -= 50;
    }
    let score = score.clamp(0, 100) as u8;

    let category = match score {
        0..=19 => StrengthCategory::VeryWeak,
        20..=39 => StrengthCategory::Weak,
        40..=59 => StrengthCategory::Fair,
        60..=79 => StrengthCategory::Strong,
        _ => StrengthCategory::VeryStrong,
    };

    let mut feedback = Vec::new();
    if length < 8 {
        feedback.push("use at least 8 characters".to_string());
    }
    if !has_uppercase {
        feedback.push("add uppercase letters".to_string());
    }
    if !has_lowercase {
        feedback.push("add lowercase letters".to_string());
    }
    if !has_digits {
        feedback.push("add digits".to_string());
    }
    if !has_symbols {
        feedback.push("add symbols".to_string());
    }
    if common_pattern {
        feedback.push("avoid common patterns like 'password' or '123456'".to_string());
    }

    StrengthReport {
        score,
        category,
        feedback,
        entropy_bits,
        length,
        has_uppercase,
        has_lowercase,
        has_digits,
        has_symbols,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_in(password: &str, class: &str) -> usize {
        password.chars().filter(|c| class.contains(*c)).count()
    }

    #[test]
    fn minimum_counts_are_guaranteed() {
        let spec = PasswordSpec {
            length: 10,
            min_symbols: 2,
            min_digits: 3,
            ..Default::default()
        };
        // Regenerate a few times; the guarantee must hold every run.
        for _ in 0..50 {
            let pw = generate(&spec).unwrap();
            assert_eq!(pw.chars().count(), 10);
            assert!(count_in(&pw, SYMBOLS) >= 2, "symbols missing in {pw:?}");
            assert!(count_in(&pw, DIGITS) >= 3, "digits missing in {pw:?}");
            assert!(count_in(&pw, UPPERCASE) >= 1);
            assert!(count_in(&pw, LOWERCASE) >= 1);
        }
    }

    #[test]
    fn minimums_exceeding_length_fail() {
        let spec = PasswordSpec {
            length: 8,
            min_uppercase: 4,
            min_lowercase: 4,
            min_digits: 1,
            min_symbols: 0,
            symbols: false,
            ..Default::default()
        };
        assert!(matches!(generate(&spec), Err(VaultError::Validation(_))));
    }

    #[test]
    fn all_classes_excluded_fails() {
        let spec = PasswordSpec {
            uppercase: false,
            lowercase: false,
            digits: false,
            symbols: false,
            ..Default::default()
        };
        assert!(matches!(generate(&spec), Err(VaultError::Validation(_))));
    }

    #[test]
    fn ambiguous_and_forbidden_are_excluded() {
        let spec = PasswordSpec {
            length: 64,
            exclude_ambiguous: true,
            forbidden: "aA9".into(),
            min_symbols: 0,
            symbols: false,
            ..Default::default()
        };
        let pw = generate(&spec).unwrap();
        for bad in AMBIGUOUS.chars().chain("aA9".chars()) {
            assert!(!pw.contains(bad), "{bad:?} leaked into {pw:?}");
        }
    }

    #[test]
    fn custom_symbols_replace_default_set() {
        let spec = PasswordSpec {
            length: 32,
            uppercase: false,
            lowercase: false,
            digits: false,
            min_uppercase: 0,
            min_lowercase: 0,
            min_digits: 0,
            min_symbols: 1,
            custom_symbols: "#%".into(),
            ..Default::default()
        };
        let pw = generate(&spec).unwrap();
        assert!(pw.chars().all(|c| c == '#' || c == '%'));
    }

    #[test]
    fn strength_categories_are_ordered() {
        let weak = score_strength("abc");
        let strong = score_strength("T#9mK2$vLq8pW!zD");
        assert!(weak.score < strong.score);
        assert_eq!(strong.category, StrengthCategory::VeryStrong);
        assert!(weak.feedback.iter().any(|f| f.contains("8 characters")));
    }

    #[test]
    fn common_patterns_are_penalized() {
        let report = score_strength("Password123!");
        assert!(report
            .feedback
            .iter()
            .any(|f| f.contains("common patterns")));
        assert!(report.score < score_strength("Xk2!pQv9#mTz").score);
    }

    #[test]
    fn missing_class_feedback_is_specific() {
        let report = score_strength("lowercaseonly");
        assert!(report.feedback.iter().any(|f| f.contains("uppercase")));
        assert!(report.feedback.iter().any(|f| f.contains("digits")));
        assert!(report.feedback.iter().any(|f| f.contains("symbols")));
        assert!(!report.feedback.iter().any(|f| f.contains("add lowercase")));
    }
}
