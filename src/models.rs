use serde::{Deserialize, Serialize};

/// A fetched email reduced to what the relay needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    /// Decoded body: plain text when available, otherwise HTML
    pub body: String,
}

/// What the extractor found in an email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractionResult {
    LoginLink { value: String },
    MobileLoginLink { value: String },
    Code { value: String },
    PaymentFailure { amount: String, card_last4: String },
    None,
}

impl ExtractionResult {
    pub fn login_link(value: impl Into<String>) -> Self {
        ExtractionResult::LoginLink { value: value.into() }
    }

    pub fn mobile_login_link(value: impl Into<String>) -> Self {
        ExtractionResult::MobileLoginLink { value: value.into() }
    }

    pub fn code(value: impl Into<String>) -> Self {
        ExtractionResult::Code { value: value.into() }
    }

    pub fn payment_failure(amount: impl Into<String>, card_last4: impl Into<String>) -> Self {
        ExtractionResult::PaymentFailure {
            amount: amount.into(),
            card_last4: card_last4.into(),
        }
    }
}

/// A header name/value pair from a MIME part
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PayloadHeader {
    pub name: String,
    pub value: String,
}

/// Body of a MIME part; `data` is already decoded from base64url
///
/// Deserialize-only: the data arrives base64url encoded and is kept as bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PayloadBody {
    #[serde(default, deserialize_with = "deserializers::deserialize_base64url")]
    pub data: Option<Vec<u8>>,
}

/// One node of a message's MIME tree, in the Gmail API JSON shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadPart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<PayloadHeader>,
    #[serde(default)]
    pub body: PayloadBody,
    #[serde(default)]
    pub parts: Vec<PayloadPart>,
}

impl From<google_gmail1::api::MessagePart> for PayloadPart {
    fn from(part: google_gmail1::api::MessagePart) -> Self {
        Self {
            mime_type: part.mime_type.unwrap_or_default(),
            headers: part
                .headers
                .unwrap_or_default()
                .into_iter()
                .filter_map(|h| match (h.name, h.value) {
                    (Some(name), Some(value)) => Some(PayloadHeader { name, value }),
                    _ => None,
                })
                .collect(),
            body: PayloadBody {
                data: part.body.and_then(|b| b.data),
            },
            parts: part
                .parts
                .unwrap_or_default()
                .into_iter()
                .map(PayloadPart::from)
                .collect(),
        }
    }
}

/// Custom deserializers for Gmail API types
pub mod deserializers {
    use serde::{de, Deserialize, Deserializer};

    /// Deserialize base64url encoded data (padded or unpadded)
    pub fn deserialize_base64url<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => {
                let decoded = crate::body::decode_base64url(&s).map_err(de::Error::custom)?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }
}
