//! Record validators
//!
//! A validator inspects a record and reports problems with
//! `Record::add_error`. Errors returned from a validator abort the save.

use crate::errors::Result;
use crate::record::Record;
use std::rc::Rc;

pub type Validator = Rc<dyn Fn(&Record) -> Result<()>>;

/// Bounds for `validates_length_of`, in characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthOptions {
    pub min: usize,
    pub max: usize,
    /// Replaces both the too-short and the too-long message
    pub message: Option<String>,
}

impl Default for LengthOptions {
    fn default() -> Self {
        Self {
            min: 1,
            max: 9999,
            message: None,
        }
    }
}

impl LengthOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: usize) -> Self {
        self.min = min;
        self
    }

    pub fn max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Fails when the field is falsy: null, empty text, zero or false
pub fn presence_of(field: &str, message: Option<&str>) -> Validator {
    let field = field.to_string();
    let message = message
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} is not present.", field));
    Rc::new(move |record: &Record| {
        if !record.get(&field).is_truthy() {
            record.add_error(message.clone());
        }
        Ok(())
    })
}

/// Fails when the string form of the field is outside `options.min..=options.max`
pub fn length_of(field: &str, options: LengthOptions) -> Validator {
    let field = field.to_string();
    Rc::new(move |record: &Record| {
        let value = record.get(&field);
        let length = if value.is_null() {
            0
        } else {
            value.to_string().chars().count()
        };
        if length < options.min {
            record.add_error(
                options
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("{} is too short.", field)),
            );
        } else if length > options.max {
            record.add_error(
                options
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("{} is too long.", field)),
            );
        }
        Ok(())
    })
}
