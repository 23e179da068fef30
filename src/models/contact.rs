use garde::Validate;
use serde::{Deserialize, Serialize};

/// Values the provider uses when it could not discover a field.
const NOT_FOUND_SENTINELS: &[&str] = &["not found", "null", "none", "n/a"];

/// One contact as submitted by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ContactRecord {
    #[garde(length(max = 200))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[garde(length(max = 200))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[garde(length(max = 300))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    #[garde(length(max = 300))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_domain: Option<String>,

    #[garde(length(max = 500))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
}

/// Tag attached to every record sent to the provider so results can be
/// traced back to their list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomFields {
    pub uuid: String,
    pub list_name: String,
}

/// A record exactly as it goes over the wire to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundRecord {
    #[serde(flatten)]
    pub contact: ContactRecord,
    pub custom_fields: CustomFields,
}

/// A result row as returned by the provider.
///
/// Every field is optional; the provider echoes the input and fills in the
/// `contact_*` fields it managed to discover.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub company_domain: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub contact_email_address: Option<String>,
    #[serde(default)]
    pub contact_phone_number: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub enriched: Option<bool>,
    #[serde(default)]
    pub custom_fields: Option<CustomFields>,
}

impl ResultRow {
    /// The discovered email, if the provider actually found one.
    pub fn discovered_email(&self) -> Option<&str> {
        discovered(self.contact_email_address.as_deref())
            .or_else(|| discovered(self.email_address.as_deref()))
    }

    /// The discovered phone number, if the provider actually found one.
    pub fn discovered_phone(&self) -> Option<&str> {
        discovered(self.contact_phone_number.as_deref())
            .or_else(|| discovered(self.phone_number.as_deref()))
    }
}

/// Filter out empty values and the provider's "not found" sentinels.
pub fn discovered(value: Option<&str>) -> Option<&str> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    let lowered = value.to_ascii_lowercase();
    if NOT_FOUND_SENTINELS.contains(&lowered.as_str()) {
        return None;
    }
    Some(value)
}

/// One enriched contact persisted for a terminated job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRecord {
    pub job_id: String,
    pub owner_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub company_domain: Option<String>,
    pub linkedin_url: Option<String>,
    pub email_address: Option<String>,
    pub phone_number: Option<String>,
    pub source: Option<String>,
    pub enriched: bool,
}

impl ResultRecord {
    pub fn from_row(job_id: &str, owner_id: &str, row: &ResultRow) -> Self {
        let email_address = row.discovered_email().map(str::to_string);
        let phone_number = row.discovered_phone().map(str::to_string);
        let enriched = email_address.is_some() || phone_number.is_some();

        Self {
            job_id: job_id.to_string(),
            owner_id: owner_id.to_string(),
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
            company: row.company.clone(),
            company_domain: row.company_domain.clone(),
            linkedin_url: row.linkedin_url.clone(),
            email_address,
            phone_number,
            source: row.source.clone(),
            enriched,
        }
    }
}
