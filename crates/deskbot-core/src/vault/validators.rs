//! API key format checks
//!
//! Each check is an independent [`KeyValidator`]; a [`ValidatorChain`] runs
//! them in order. None of them touch the network.

use serde::Serialize;

use crate::constants::vault::{KEY_LENGTH, KEY_PREFIX};

const DISTINCT_CHARS_FOR_POINT: usize = 20;

/// A single failed check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub check: &'static str,
    pub message: String,
}

/// One link in the validation chain
pub trait KeyValidator: Send + Sync {
    /// Short identifier reported when the check fails
    fn name(&self) -> &'static str;

    fn check(&self, key: &str) -> Result<(), String>;
}

struct NonEmpty;

impl KeyValidator for NonEmpty {
    fn name(&self) -> &'static str {
        "non_empty"
    }

    fn check(&self, key: &str) -> Result<(), String> {
        if key.trim().is_empty() {
            return Err("API key is empty".to_string());
        }
        Ok(())
    }
}

struct ExactLength(usize);

impl KeyValidator for ExactLength {
    fn name(&self) -> &'static str {
        "length"
    }

    fn check(&self, key: &str) -> Result<(), String> {
        let len = key.chars().count();
        if len != self.0 {
            return Err(format!("expected {} characters, got {}", self.0, len));
        }
        Ok(())
    }
}

struct RequiredPrefix(&'static str);

impl KeyValidator for RequiredPrefix {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn check(&self, key: &str) -> Result<(), String> {
        if !key.starts_with(self.0) {
            return Err(format!("must start with '{}'", self.0));
        }
        Ok(())
    }
}

struct AllowedCharset;

impl KeyValidator for AllowedCharset {
    fn name(&self) -> &'static str {
        "charset"
    }

    fn check(&self, key: &str) -> Result<(), String> {
        match key
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            Some(_) => Err("only letters, digits, '-' and '_' are allowed".to_string()),
            None => Ok(()),
        }
    }
}

struct MinimumStrength(u8);

impl KeyValidator for MinimumStrength {
    fn name(&self) -> &'static str {
        "strength"
    }

    fn check(&self, key: &str) -> Result<(), String> {
        let points = strength_points(key);
        if points < self.0 {
            return Err(format!(
                "key is too weak ({} of {} required strength points)",
                points, self.0
            ));
        }
        Ok(())
    }
}

/// Coarse strength bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStrength {
    Weak,
    Medium,
    Strong,
}

impl KeyStrength {
    pub fn from_points(points: u8) -> Self {
        match points {
            3.. => KeyStrength::Strong,
            2 => KeyStrength::Medium,
            _ => KeyStrength::Weak,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            KeyStrength::Weak => "weak",
            KeyStrength::Medium => "medium",
            KeyStrength::Strong => "strong",
        }
    }
}

/// Strength points (0-3): character variety, mixed case with digits, separators
pub fn strength_points(key: &str) -> u8 {
    let mut seen: Vec<char> = key.chars().collect();
    seen.sort_unstable();
    seen.dedup();

    let mut points = 0;
    if seen.len() >= DISTINCT_CHARS_FOR_POINT {
        points += 1;
    }
    let upper = key.chars().any(|c| c.is_ascii_uppercase());
    let lower = key.chars().any(|c| c.is_ascii_lowercase());
    let digit = key.chars().any(|c| c.is_ascii_digit());
    if upper && lower && digit {
        points += 1;
    }
    if key.contains(['-', '_']) {
        points += 1;
    }
    points
}

/// Public outcome of a format check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<KeyStrength>,
}

/// Ordered list of validators
pub struct ValidatorChain {
    validators: Vec<Box<dyn KeyValidator>>,
}

impl ValidatorChain {
    pub fn empty() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    /// Provider key rules followed by the minimum-strength gate
    pub fn standard(min_strength: u8) -> Self {
        Self::empty()
            .with(NonEmpty)
            .with(ExactLength(KEY_LENGTH))
            .with(RequiredPrefix(KEY_PREFIX))
            .with(AllowedCharset)
            .with(MinimumStrength(min_strength))
    }

    pub fn with(mut self, validator: impl KeyValidator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Stop at the first failing check
    pub fn validate(&self, key: &str) -> Result<(), ValidationFailure> {
        for validator in &self.validators {
            validator.check(key).map_err(|message| ValidationFailure {
                check: validator.name(),
                message,
            })?;
        }
        Ok(())
    }

    /// Run every check and collect all failures
    pub fn validate_all(&self, key: &str) -> Vec<ValidationFailure> {
        self.validators
            .iter()
            .filter_map(|validator| {
                validator.check(key).err().map(|message| ValidationFailure {
                    check: validator.name(),
                    message,
                })
            })
            .collect()
    }

    pub fn validate_format(&self, key: &str) -> FormatCheck {
        match self.validate(key) {
            Ok(()) => FormatCheck {
                valid: true,
                error: None,
                strength: Some(KeyStrength::from_points(strength_points(key))),
            },
            Err(failure) => FormatCheck {
                valid: false,
                error: Some(failure.message),
                strength: None,
            },
        }
    }
}

impl Default for ValidatorChain {
    fn default() -> Self {
        Self::standard(1)
    }
}
