use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A delivery medium a customer can opt into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Email,
    /// SMS. Kept as "phone" to match what customers pick in their preferences.
    Phone,
    Whatsapp,
}

impl std::fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeliveryChannel::Email => "email",
            DeliveryChannel::Phone => "phone",
            DeliveryChannel::Whatsapp => "whatsapp",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DeliveryChannel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(DeliveryChannel::Email),
            "phone" => Ok(DeliveryChannel::Phone),
            "whatsapp" => Ok(DeliveryChannel::Whatsapp),
            _ => Err(anyhow::anyhow!("Unknown delivery channel: {s}")),
        }
    }
}

/// DB row struct; preferred_delivery is a TEXT[] of channel names.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    /// Free-form digits as typed by the operator; normalised at send time.
    pub phone: Option<String>,
    pub preferred_delivery: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Preferred channels in the order the customer listed them.
    /// Unknown entries are ignored.
    pub fn channels(&self) -> Vec<DeliveryChannel> {
        self.preferred_delivery
            .iter()
            .filter_map(|c| match c.parse() {
                Ok(channel) => Some(channel),
                Err(_) => {
                    tracing::debug!("Customer {} has unknown delivery channel '{}'", self.id, c);
                    None
                }
            })
            .collect()
    }

    /// The raw address on file for a channel, if it is non-empty.
    pub fn address_for(&self, channel: DeliveryChannel) -> Option<&str> {
        let raw = match channel {
            DeliveryChannel::Email => self.email.as_deref(),
            DeliveryChannel::Phone | DeliveryChannel::Whatsapp => self.phone.as_deref(),
        };
        raw.map(str::trim).filter(|s| !s.is_empty())
    }
}
