//! Contact and organisation cards (vCard 4.0).
//!
//! Each assignment yields at most two cards: one for the organisation
//! (Einsatzbetrieb) and one for its contact person. The person card points at
//! the organisation card through a UID derived from the assignment's id, so
//! address books can link the two without duplicating organisation data.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use zivi_shared::{Result, ZiviError};

use crate::record::{Assignment, full_name};

/// File extension for card files.
pub const CARD_EXTENSION: &str = "vcf";

/// Relationship of the card subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    Individual,
    Organisation,
}

impl CardKind {
    /// Value of the `KIND` property.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Organisation => "org",
        }
    }
}

/// A structured contact record, rendered as `KEY:VALUE` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactCard {
    /// Own identifier (organisation cards only).
    pub uid: String,
    pub given_name: String,
    pub family_name: String,
    pub organisation: String,
    pub title: String,
    pub phone_1: String,
    pub phone_2: String,
    pub email: String,
    /// UID of the organisation card (person cards only).
    pub related: String,
}

impl ContactCard {
    /// Card for the contact person of `assignment`, if one is named.
    pub fn person(assignment: &Assignment) -> Option<Self> {
        let contact = &assignment.contact;
        if contact.full_name().is_empty() {
            return None;
        }
        Some(Self {
            uid: String::new(),
            given_name: contact.given_name.clone(),
            family_name: contact.family_name.clone(),
            organisation: assignment.organisation_name.clone(),
            title: contact.function.clone(),
            phone_1: contact.phone_1.clone(),
            phone_2: contact.phone_2.clone(),
            email: contact.email.clone(),
            related: assignment.id.map(organisation_uid).unwrap_or_default(),
        })
    }

    /// Card for the organisation of `assignment`, if it has a name.
    pub fn organisation(assignment: &Assignment) -> Option<Self> {
        if assignment.organisation_name.is_empty() {
            return None;
        }
        Some(Self {
            uid: assignment.id.map(organisation_uid).unwrap_or_default(),
            organisation: assignment.organisation_name.clone(),
            phone_1: assignment.organisation_phone.clone(),
            email: assignment.organisation_email.clone(),
            ..Self::default()
        })
    }

    pub fn kind(&self) -> CardKind {
        let is_person = !self.given_name.is_empty()
            || !self.family_name.is_empty()
            || !self.title.is_empty();
        if !is_person && !self.organisation.is_empty() {
            CardKind::Organisation
        } else {
            CardKind::Individual
        }
    }

    /// Formatted name: the person's name, or the organisation for org cards.
    pub fn formatted_name(&self) -> String {
        match self.kind() {
            CardKind::Organisation => self.organisation.clone(),
            CardKind::Individual => full_name(&self.given_name, &self.family_name),
        }
    }

    /// Render the card. Empty properties are left out.
    pub fn render(&self) -> String {
        let structured_name = if self.given_name.is_empty() && self.family_name.is_empty() {
            String::new()
        } else {
            format!("{};{};;;", self.family_name, self.given_name)
        };

        let properties: [(&str, String); 13] = [
            ("BEGIN", "VCARD".into()),
            ("VERSION", "4.0".into()),
            ("UID", self.uid.clone()),
            ("FN", self.formatted_name()),
            ("N", structured_name),
            ("ORG", self.organisation.clone()),
            ("KIND", self.kind().as_str().into()),
            ("TITLE", self.title.clone()),
            ("TEL;TYPE=WORK,X-1", self.phone_1.clone()),
            ("TEL;TYPE=WORK,X-2", self.phone_2.clone()),
            ("EMAIL", self.email.clone()),
            ("RELATED", self.related.clone()),
            ("END", "VCARD".into()),
        ];

        let mut out = String::new();
        for (key, value) in properties.iter().filter(|(_, v)| !v.is_empty()) {
            out.push_str(key);
            out.push(':');
            out.push_str(&escape(value));
            out.push('\n');
        }
        out
    }
}

/// Stable organisation identifier derived from an assignment id.
pub fn organisation_uid(assignment_id: u64) -> String {
    let name = format!("pflichtenheft:{assignment_id}");
    let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes());
    format!("urn:uuid:{uuid}")
}

/// Write `content` below `dir`.
///
/// - name and organisation id: `{dir}/{organisation_id}/{name}.vcf`
/// - name only: `{dir}/{name}.vcf`
/// - organisation id only: `{dir}/{organisation_id}.vcf`
///
/// Directories are created on demand.
pub fn save_card(
    content: &str,
    dir: &Path,
    display_name: Option<&str>,
    organisation_id: Option<&str>,
) -> Result<PathBuf> {
    let display_name = display_name.filter(|s| !s.trim().is_empty()).map(sanitize_file_name);
    let organisation_id = organisation_id
        .filter(|s| !s.trim().is_empty())
        .map(sanitize_file_name);

    let (parent, stem) = match (display_name, organisation_id) {
        (Some(name), Some(org)) => (dir.join(org), name),
        (Some(name), None) => (dir.to_path_buf(), name),
        (None, Some(org)) => (dir.to_path_buf(), org),
        (None, None) => return Err(ZiviError::MissingIdentifier),
    };

    std::fs::create_dir_all(&parent).map_err(|e| ZiviError::io(&parent, e))?;
    let path = parent.join(format!("{stem}.{CARD_EXTENSION}"));
    std::fs::write(&path, content).map_err(|e| ZiviError::io(&path, e))?;

    debug!(path = %path.display(), "card written");
    Ok(path)
}

/// Replace characters that cannot appear in a file name.
///
/// Names made only of dots would leave the card directory and become `_`.
fn sanitize_file_name(name: &str) -> String {
    static UNSAFE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[/\\:*?<>|\x00-\x1f]").expect("valid regex"));
    let name = UNSAFE_RE.replace_all(name.trim(), "_");
    if name.chars().all(|c| c == '.') {
        return "_".to_string();
    }
    name.into_owned()
}

/// Fold line breaks so a value stays on its property line.
fn escape(value: &str) -> String {
    value.replace("\r\n", "\\n").replace('\n', "\\n")
}
