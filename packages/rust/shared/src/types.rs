//! Core domain types shared across zivi crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ZiviError;

// ---------------------------------------------------------------------------
// Locale
// ---------------------------------------------------------------------------

/// Locale sent to the remote service in the `x-zivi-locale` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "de-CH")]
    DeCh,
    #[serde(rename = "fr-CH")]
    FrCh,
    #[serde(rename = "it-CH")]
    ItCh,
}

impl Locale {
    /// Header value, e.g. `de-CH`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeCh => "de-CH",
            Self::FrCh => "fr-CH",
            Self::ItCh => "it-CH",
        }
    }

    /// Display language used to pick localized record fields.
    pub fn language(&self) -> Language {
        match self {
            Self::DeCh => Language::De,
            Self::FrCh => Language::Fr,
            Self::ItCh => Language::It,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = ZiviError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "de-CH" => Ok(Self::DeCh),
            "fr-CH" => Ok(Self::FrCh),
            "it-CH" => Ok(Self::ItCh),
            other => Err(ZiviError::validation(format!(
                "unsupported locale '{other}': expected de-CH, fr-CH or it-CH"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Display language of localized text fields (`textDe`, `textFr`, `textIt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    De,
    Fr,
    It,
}

impl Language {
    /// Key of the localized text field in a record, e.g. `textDe`.
    pub fn text_key(&self) -> &'static str {
        match self {
            Self::De => "textDe",
            Self::Fr => "textFr",
            Self::It => "textIt",
        }
    }
}

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Output encoding: hierarchical document or flat table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl OutputFormat {
    /// File extension for units written in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ZiviError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(ZiviError::validation(format!(
                "unsupported format '{other}': expected json or csv"
            ))),
        }
    }
}
