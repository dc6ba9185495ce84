use std::collections::HashSet;

use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    customer::{Customer, DeliveryChannel},
    reminder::PopulatedReminder,
};

/// One notification to send: a customer reached through one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub customer_id: Uuid,
    pub customer_name: String,
    pub channel: DeliveryChannel,
    /// Raw address on file (email, or phone as typed). Phone numbers are
    /// normalised at dispatch time.
    pub address: String,
}

/// Expand a populated reminder into the ordered list of deliveries.
///
/// Direct recipients come first in input order, then group members (groups
/// in input order, members in group order). A customer reached more than
/// once for the same channel, directly or through several groups, is only
/// kept the first time.
pub fn resolve(populated: &PopulatedReminder) -> Vec<Delivery> {
    let mut seen = HashSet::new();
    let mut deliveries = Vec::new();

    for customer in &populated.recipients {
        expand(customer, &mut seen, &mut deliveries);
    }

    for group in &populated.groups {
        if group.members.is_empty() {
            info!(
                "Reminder {}: group '{}' has no members, skipping",
                populated.reminder.id, group.name
            );
            continue;
        }
        for member in &group.members {
            expand(member, &mut seen, &mut deliveries);
        }
    }

    deliveries
}

fn expand(
    customer: &Customer,
    seen: &mut HashSet<(Uuid, DeliveryChannel)>,
    out: &mut Vec<Delivery>,
) {
    for channel in customer.channels() {
        let Some(address) = customer.address_for(channel) else {
            debug!("Customer {} has no {} address on file, skipping", customer.id, channel);
            continue;
        };
        if !seen.insert((customer.id, channel)) {
            debug!("Customer {} already receives this reminder by {}", customer.id, channel);
            continue;
        }
        out.push(Delivery {
            customer_id: customer.id,
            customer_name: customer.name.clone(),
            channel,
            address: address.to_string(),
        });
    }
}
