//! Input validation for text entries.
//!
//! A [`Validator`] looks at the text a user typed and either accepts it,
//! possibly normalized, or rejects it. A
//! [`ValidatingField`](crate::widget::ValidatingField) runs its validator on
//! every edit and falls back to the last accepted text when the edit is
//! rejected.
//!
//! # Built-in validators
//!
//! - [`IntegerValidator`]: whole numbers
//! - [`FloatValidator`]: decimal numbers
//! - [`RangeValidator`]: numbers between optional, inclusive or exclusive bounds
//! - [`DateValidator`]: dates in a `chrono` format
//!
//! ```
//! use trellis::validation::{RangeValidator, Validator};
//!
//! let percent = RangeValidator::<u8>::new().with_minimum(0, true).with_maximum(100, true);
//! assert_eq!(percent.validate(" 42 "), Some("42".to_string()));
//! assert_eq!(percent.validate("101"), None);
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;

/// Checks user input.
pub trait Validator: Send + Sync {
    /// Check `input`.
    ///
    /// Returns the text to keep, which may be a normalized form of `input`,
    /// or `None` to reject it.
    fn validate(&self, input: &str) -> Option<String>;
}

impl<V: Validator + ?Sized> Validator for Arc<V> {
    fn validate(&self, input: &str) -> Option<String> {
        (**self).validate(input)
    }
}

impl<V: Validator + ?Sized> Validator for Box<V> {
    fn validate(&self, input: &str) -> Option<String> {
        (**self).validate(input)
    }
}

/// Accepts any input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, input: &str) -> Option<String> {
        Some(input.to_string())
    }
}

/// Accepts whole numbers, surrounding whitespace ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerValidator;

impl Validator for IntegerValidator {
    fn validate(&self, input: &str) -> Option<String> {
        input.trim().parse::<i64>().ok().map(|value| value.to_string())
    }
}

/// Accepts decimal numbers, surrounding whitespace ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatValidator;

impl Validator for FloatValidator {
    fn validate(&self, input: &str) -> Option<String> {
        input
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(|value| value.to_string())
    }
}

/// A bound of a [`RangeValidator`].
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bound<T> {
    value: T,
    inclusive: bool,
}

/// Accepts numbers of type `T` between optional bounds.
///
/// Each bound is either inclusive or exclusive. A range without bounds
/// accepts every number that parses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeValidator<T> {
    minimum: Option<Bound<T>>,
    maximum: Option<Bound<T>>,
}

impl<T: PartialOrd> RangeValidator<T> {
    /// A range without bounds.
    pub fn new() -> Self {
        Self {
            minimum: None,
            maximum: None,
        }
    }

    /// Set the lower bound.
    pub fn with_minimum(mut self, value: T, inclusive: bool) -> Self {
        self.minimum = Some(Bound { value, inclusive });
        self
    }

    /// Set the upper bound.
    pub fn with_maximum(mut self, value: T, inclusive: bool) -> Self {
        self.maximum = Some(Bound { value, inclusive });
        self
    }

    /// Whether `value` lies within the bounds.
    pub fn contains(&self, value: &T) -> bool {
        let above = self.minimum.as_ref().is_none_or(|bound| {
            *value > bound.value || (bound.inclusive && *value == bound.value)
        });
        let below = self.maximum.as_ref().is_none_or(|bound| {
            *value < bound.value || (bound.inclusive && *value == bound.value)
        });
        above && below
    }
}

impl<T: PartialOrd> Default for RangeValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Validator for RangeValidator<T>
where
    T: PartialOrd + FromStr + fmt::Display + Send + Sync,
{
    fn validate(&self, input: &str) -> Option<String> {
        let value = input.trim().parse::<T>().ok()?;
        self.contains(&value).then(|| value.to_string())
    }
}

/// The date format used when none is given.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Accepts calendar dates written in a `chrono` format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateValidator {
    format: String,
}

impl DateValidator {
    /// Accept dates written in `format`, e.g. `"%d/%m/%Y"`.
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    /// The accepted format.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Parse `input` as a date.
    pub fn parse(&self, input: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(input.trim(), &self.format).ok()
    }
}

impl Default for DateValidator {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMAT)
    }
}

impl Validator for DateValidator {
    fn validate(&self, input: &str) -> Option<String> {
        self.parse(input)
            .map(|date| date.format(&self.format).to_string())
    }
}

static_assertions::assert_impl_all!(RangeValidator<f64>: Validator);
static_assertions::assert_impl_all!(DateValidator: Validator);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_trimmed_and_normalized() {
        assert_eq!(IntegerValidator.validate(" 12"), Some("12".to_string()));
        assert_eq!(IntegerValidator.validate("+7"), Some("7".to_string()));
        assert_eq!(IntegerValidator.validate("1.5"), None);
        assert_eq!(IntegerValidator.validate(""), None);

        assert_eq!(FloatValidator.validate("2.50"), Some("2.5".to_string()));
        assert_eq!(FloatValidator.validate("3"), Some("3".to_string()));
        assert_eq!(FloatValidator.validate("inf"), None);
        assert_eq!(FloatValidator.validate("abc"), None);
    }

    #[test]
    fn inclusive_bounds_accept_their_endpoints() {
        let range = RangeValidator::new()
            .with_minimum(0, true)
            .with_maximum(10, true);
        assert!(range.contains(&0));
        assert!(range.contains(&10));
        assert!(!range.contains(&-1));
        assert!(!range.contains(&11));
    }

    #[test]
    fn exclusive_bounds_reject_their_endpoints() {
        let range = RangeValidator::new()
            .with_minimum(0.0, false)
            .with_maximum(1.0, false);
        assert!(!range.contains(&0.0));
        assert!(!range.contains(&1.0));
        assert!(range.contains(&0.5));
        assert_eq!(range.validate("1"), None);
        assert_eq!(range.validate("0.25"), Some("0.25".to_string()));
    }

    #[test]
    fn open_ranges() {
        let at_least_one = RangeValidator::new().with_minimum(1u32, true);
        assert!(at_least_one.contains(&u32::MAX));
        assert!(!at_least_one.contains(&0));
        assert_eq!(at_least_one.validate("-3"), None);

        let anything = RangeValidator::<i32>::default();
        assert_eq!(anything.validate("-3"), Some("-3".to_string()));
        assert_eq!(anything.validate("x"), None);
    }

    #[test]
    fn dates_follow_the_format() {
        let iso = DateValidator::default();
        assert_eq!(iso.validate("2024-02-29"), Some("2024-02-29".to_string()));
        assert_eq!(iso.validate("2023-02-29"), None);
        assert_eq!(iso.validate("29/02/2024"), None);

        let european = DateValidator::new("%d/%m/%Y");
        assert_eq!(european.validate("1/3/2024"), Some("01/03/2024".to_string()));
        assert_eq!(european.parse("01/03/2024"), NaiveDate::from_ymd_opt(2024, 3, 1));
    }
}
