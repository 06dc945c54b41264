//! Search query parameters and their validation.

use serde::Serialize;

use zivi_shared::{Result, ZiviError};

/// Largest accepted search radius in km.
pub const MAX_RADIUS_KM: u32 = 25;

/// Radius granularity in km.
pub const RADIUS_STEP_KM: u32 = 5;

/// Accepted assignment durations in weeks.
pub const DURATION_WEEKS: std::ops::RangeInclusive<u32> = 1..=52;

/// Most language ids a query may carry.
pub const MAX_LANGUAGES: usize = 3;

/// Most special-marking codes a query may carry.
pub const MAX_SPECIAL_CODES: usize = 3;

/// Filters of one search, serialized as the service's request payload.
///
/// Absent filters are left out of the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    #[serde(rename = "searchText", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(rename = "einsatzortId", skip_serializing_if = "Option::is_none")]
    pub location_id: Option<u64>,

    /// Radius around the location in km.
    #[serde(rename = "umkreis", skip_serializing_if = "Option::is_none")]
    pub radius_km: Option<u32>,

    /// Duration in weeks.
    #[serde(rename = "einsatzdauer", skip_serializing_if = "Option::is_none")]
    pub duration_weeks: Option<u32>,

    #[serde(rename = "taetigkeitsbereichId", skip_serializing_if = "Option::is_none")]
    pub activity_areas: Option<Vec<u64>>,

    #[serde(rename = "spracheId", skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<u64>>,

    #[serde(
        rename = "pflichtenheftKennzeichnungSpeziellCodeList",
        skip_serializing_if = "Option::is_none"
    )]
    pub special_codes: Option<Vec<String>>,
}

impl SearchQuery {
    /// Check every filter against the service's accepted ranges.
    pub fn validate(&self) -> Result<()> {
        if let Some(radius) = self.radius_km {
            if radius > MAX_RADIUS_KM || radius % RADIUS_STEP_KM != 0 {
                return Err(ZiviError::validation(format!(
                    "radius must be between 0 and {MAX_RADIUS_KM} in steps of {RADIUS_STEP_KM}, got {radius}"
                )));
            }
        }

        if let Some(weeks) = self.duration_weeks {
            if !DURATION_WEEKS.contains(&weeks) {
                return Err(ZiviError::validation(format!(
                    "duration must be between {} and {} weeks, got {weeks}",
                    DURATION_WEEKS.start(),
                    DURATION_WEEKS.end()
                )));
            }
        }

        if let Some(languages) = &self.languages {
            if languages.len() > MAX_LANGUAGES {
                return Err(ZiviError::validation(format!(
                    "at most {MAX_LANGUAGES} language ids allowed, got {}",
                    languages.len()
                )));
            }
        }

        if let Some(codes) = &self.special_codes {
            if codes.len() > MAX_SPECIAL_CODES {
                return Err(ZiviError::validation(format!(
                    "at most {MAX_SPECIAL_CODES} special codes allowed, got {}",
                    codes.len()
                )));
            }
        }

        Ok(())
    }
}
