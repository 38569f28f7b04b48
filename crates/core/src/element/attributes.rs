//! Attributes of a form tag and their typed readers.

use crate::{FormError, FormResult};
use indexmap::IndexMap;
use std::str::FromStr;

/// Attributes of one form tag, as handed over by the form-definition compiler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagAttributes {
    values: IndexMap<String, String>,
}

impl TagAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Trimmed value of `name`. Blank values count as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Raw value of `name`, present even when blank.
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// # Errors
    ///
    /// Returns [`FormError::MissingAttribute`] when `name` is absent or blank.
    pub fn required(&self, name: &str) -> FormResult<&str> {
        self.get(name)
            .ok_or_else(|| FormError::MissingAttribute(name.to_owned()))
    }

    /// Boolean attribute, `true`/`false` in any case.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::InvalidAttribute`] for any other value.
    pub fn flag(&self, name: &str, default: bool) -> FormResult<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(FormError::invalid_attribute(name, v)),
        }
    }

    /// Parse `name` with [`FromStr`], `None` when absent.
    pub fn parse<T: FromStr>(&self, name: &str) -> FormResult<Option<T>> {
        self.get(name)
            .map(|v| v.parse::<T>().map_err(|_| FormError::invalid_attribute(name, v)))
            .transpose()
    }

    /// Comma-separated list, with blank entries dropped.
    pub fn list(&self, name: &str) -> Vec<&str> {
        self.get(name)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}
