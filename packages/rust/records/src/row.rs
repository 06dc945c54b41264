//! Detail record → flat table row.

use std::path::Path;

use tracing::{debug, instrument};

use zivi_shared::{Result, RowConfig};

use crate::card::{ContactCard, save_card};
use crate::record::{Assignment, DetailRecord};

/// Number of columns in the detail table.
pub const COLUMN_COUNT: usize = 15;

/// Column names of the detail table, in output order.
///
/// Spreadsheet consumers depend on this exact order.
pub const PUBLISHED_HEADER: [&str; COLUMN_COUNT] = [
    "PLZ",
    "Land",
    "Einsatzbetrieb",
    "Einsatzbetrieb VCard",
    "Tätigkeiten",
    "Mindestdauer",
    "Arbeitszeitenmodell",
    "Wochenendarbeit Möglich",
    "Nachtarbeit Möglich",
    "Unterkunft",
    "Verpflegung",
    "Kurse",
    "Kontaktperson Name",
    "Kontaktperson VCard",
    "Schwerpunktprogramm",
];

/// One table row, always [`COLUMN_COUNT`] cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRow([String; COLUMN_COUNT]);

impl FlatRow {
    pub fn cells(&self) -> &[String] {
        &self.0
    }

    pub fn into_cells(self) -> Vec<String> {
        self.0.into()
    }
}

/// Transform one record into a row.
///
/// When `card_dir` is given the organisation card (if the organisation has a
/// name) and the contact-person card (if a person is named) are written there,
/// and their paths fill the card columns.
#[instrument(skip_all, fields(id = record.id()))]
pub fn to_row(
    record: &DetailRecord,
    config: &RowConfig,
    card_dir: Option<&Path>,
) -> Result<FlatRow> {
    let a = Assignment::from_record(record, config.language);
    let contact_name = a.contact.full_name();

    let (organisation_card, person_card) = match card_dir {
        Some(dir) => write_cards(&a, &contact_name, dir)?,
        None => (String::new(), String::new()),
    };

    let weekend_work = bool_cell(a.weekend_work_possible());
    let night_work = bool_cell(a.night_work_possible());
    let lodging = bool_cell(a.lodging.is_set());
    let meals = bool_cell(a.meals.is_set());
    let flagship_programme = bool_cell(a.flagship_programme.is_set());

    let Assignment {
        postal_code,
        country,
        organisation_name,
        activities,
        min_duration_weeks,
        work_model,
        courses,
        ..
    } = a;
    let country = country.unwrap_or_else(|| config.fallback_country.clone());

    Ok(FlatRow([
        postal_code,
        country,
        organisation_name,
        organisation_card,
        activities,
        min_duration_weeks,
        work_model,
        weekend_work,
        night_work,
        lodging,
        meals,
        courses,
        contact_name,
        person_card,
        flagship_programme,
    ]))
}

/// Write the cards of `record` below `dir` without building a row.
///
/// Returns the (organisation, person) card paths; empty when not written.
pub fn write_record_cards(
    record: &DetailRecord,
    config: &RowConfig,
    dir: &Path,
) -> Result<(String, String)> {
    let a = Assignment::from_record(record, config.language);
    let contact_name = a.contact.full_name();
    write_cards(&a, &contact_name, dir)
}

/// Write the cards of `a` below `dir`, returning (organisation, person) paths.
///
/// The organisation card is written first. Without an organisation number it
/// is saved under the organisation name and the person card beside it.
fn write_cards(a: &Assignment, contact_name: &str, dir: &Path) -> Result<(String, String)> {
    let organisation_id = Some(a.organisation_id.as_str()).filter(|id| !id.trim().is_empty());

    let organisation_path = match ContactCard::organisation(a) {
        Some(card) => {
            let stem = match organisation_id {
                Some(_) => None,
                None => Some(a.organisation_name.as_str()),
            };
            let path = save_card(&card.render(), dir, stem, organisation_id)?;
            path.display().to_string()
        }
        None => String::new(),
    };

    let person_path = match ContactCard::person(a) {
        Some(card) => {
            let path = save_card(&card.render(), dir, Some(contact_name), organisation_id)?;
            path.display().to_string()
        }
        None => String::new(),
    };

    debug!(
        organisation = %organisation_path,
        person = %person_path,
        "cards materialized"
    );

    Ok((organisation_path, person_path))
}

fn bool_cell(value: bool) -> String {
    let cell = if value { "TRUE" } else { "FALSE" };
    cell.to_string()
}
