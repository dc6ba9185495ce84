use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::customer::Customer;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A group with its members loaded, in membership order.
#[derive(Debug, Clone, Serialize)]
pub struct GroupWithMembers {
    pub id: Uuid,
    pub name: String,
    pub members: Vec<Customer>,
}
