use serde::Deserialize;

use crate::error::IdentityError;

/// The subject of an identity lifecycle event, normalized for local use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentitySubject {
    /// The provider's stable reference, when the event carries one.
    pub external_id: Option<String>,
    pub email: String,
    pub name: String,
    pub image_url: String,
}

/// A verified, parsed identity lifecycle event.
///
/// Unrecognized event types parse to `Ignored` — the provider sends more
/// lifecycle events than we consume, and acknowledging them keeps the
/// delivery queue clean.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityEvent {
    Created(IdentitySubject),
    Updated(IdentitySubject),
    Deleted { email: String },
    Ignored { kind: String },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: RawSubject,
}

#[derive(Default, Deserialize)]
struct RawSubject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

impl IdentityEvent {
    /// Parse a raw (already authenticity-verified) event body.
    /// Recognized events without an email are rejected: email is the only
    /// correlation key between the provider and local records.
    pub fn parse(body: &[u8]) -> Result<Self, IdentityError> {
        let raw: RawEvent = serde_json::from_slice(body)
            .map_err(|e| IdentityError::Validation(format!("undecodable event: {e}")))?;

        match raw.kind.as_str() {
            "user.created" => Ok(Self::Created(subject_of(raw.data)?)),
            "user.updated" => Ok(Self::Updated(subject_of(raw.data)?)),
            "user.deleted" => Ok(Self::Deleted {
                email: require_email(&raw.data)?,
            }),
            _ => Ok(Self::Ignored { kind: raw.kind }),
        }
    }
}

fn require_email(data: &RawSubject) -> Result<String, IdentityError> {
    match data.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => Ok(email.to_string()),
        _ => Err(IdentityError::Validation(
            "event payload is missing the email correlation key".into(),
        )),
    }
}

fn subject_of(data: RawSubject) -> Result<IdentitySubject, IdentityError> {
    let email = require_email(&data)?;
    let name = format!(
        "{} {}",
        data.first_name.as_deref().unwrap_or(""),
        data.last_name.as_deref().unwrap_or("")
    )
    .trim()
    .to_string();

    Ok(IdentitySubject {
        external_id: data.id,
        email,
        name,
        image_url: data.image_url.unwrap_or_default(),
    })
}
