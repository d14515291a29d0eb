//! Declarative field validation.
//!
//! A [`Schema`] maps field names to [`FieldRule`]s; [`Schema::validate`]
//! returns one message per failing field, keyed by field name. Each rule
//! reports only its first failure, in the order required, type, length,
//! range, pattern.

use regex::Regex;
use std::{collections::BTreeMap, sync::LazyLock};

pub const NAME_MIN_LEN: usize = 1;
pub const NAME_MAX_LEN: usize = 100;
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;

/// Field name → message.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
}

/// Constraints for one field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    /// Human label used at the start of every message (e.g. "Folder name").
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Length bounds count characters, not bytes.
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    /// Lower bound for integer fields.
    pub min: Option<i64>,
    pub pattern: Option<(Regex, &'static str)>,
}

impl FieldRule {
    pub fn text(label: &'static str) -> Self {
        Self {
            label,
            kind: FieldKind::Text,
            required: false,
            min_len: None,
            max_len: None,
            min: None,
            pattern: None,
        }
    }

    pub fn integer(label: &'static str) -> Self {
        Self {
            kind: FieldKind::Integer,
            ..Self::text(label)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn len(mut self, min: usize, max: usize) -> Self {
        self.min_len = Some(min);
        self.max_len = Some(max);
        self
    }

    pub fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    /// Require a full match of `pattern`; `hint` completes the message.
    pub fn pattern(mut self, pattern: &str, hint: &'static str) -> Self {
        let anchored = format!("^(?:{})$", pattern);
        // Patterns are compile-time literals in this crate.
        self.pattern = Regex::new(&anchored).ok().map(|re| (re, hint));
        self
    }

    fn check(&self, value: Option<&str>) -> Option<String> {
        let value = match value.map(str::trim_end) {
            Some(v) if !v.is_empty() => v,
            _ if self.required => return Some(format!("{} is required", self.label)),
            _ => return None,
        };

        if self.kind == FieldKind::Integer {
            let parsed = match value.parse::<i64>() {
                Ok(n) => n,
                Err(_) => return Some(format!("{} must be a whole number", self.label)),
            };
            if let Some(min) = self.min.filter(|min| parsed < *min) {
                return Some(format!("{} must be at least {}", self.label, min));
            }
            return None;
        }

        let len = value.chars().count();
        if let Some(min) = self.min_len.filter(|min| len < *min) {
            return Some(format!("{} must contain at least {} letters", self.label, min));
        }
        if let Some(max) = self.max_len.filter(|max| len > *max) {
            return Some(format!("{} can contain at most {} letters", self.label, max));
        }
        if let Some((re, hint)) = &self.pattern {
            if !re.is_match(value) {
                return Some(format!("{} {}", self.label, hint));
            }
        }
        None
    }
}

/// An ordered set of field rules.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(&'static str, FieldRule)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &'static str, rule: FieldRule) -> Self {
        self.fields.push((name, rule));
        self
    }

    /// Validate `input`; fields absent from the map count as missing.
    pub fn validate(&self, input: &[(&str, Option<&str>)]) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        for (name, rule) in &self.fields {
            let value = input
                .iter()
                .find(|(field, _)| field == name)
                .and_then(|(_, value)| *value);
            if let Some(message) = rule.check(value) {
                errors.insert((*name).to_string(), message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub static FOLDER_FORM: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new().field(
        "name",
        FieldRule::text("Folder name")
            .required()
            .len(NAME_MIN_LEN, NAME_MAX_LEN),
    )
});

pub static FILE_FORM: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new().field(
        "name",
        FieldRule::text("File name")
            .required()
            .len(NAME_MIN_LEN, NAME_MAX_LEN),
    )
});

pub static SHARE_FORM: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new().field("days", FieldRule::integer("Share duration").required().min(1))
});

pub static PRINCIPAL: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new().field(
        "username",
        FieldRule::text("A username")
            .required()
            .len(USERNAME_MIN_LEN, USERNAME_MAX_LEN)
            .pattern(
                r"[A-Za-z0-9._-]+",
                "can contain dots, hyphens, underscores, letters, and numbers",
            ),
    )
});
