//! Parsing error types for marketplace HTML

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("No valid selectors compiled for '{field}'")]
    NoSelectors { field: String },

    #[error("Required field '{field}' not found in HTML for {asin}")]
    RequiredFieldMissing { field: String, asin: String },
}

impl ParsingError {
    pub fn required_field_missing(field: &str, asin: &str) -> Self {
        Self::RequiredFieldMissing {
            field: field.to_string(),
            asin: asin.to_string(),
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
