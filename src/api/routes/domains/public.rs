//! Public types for the domains API
use serde::{Deserialize, Serialize};

use crate::mailtm::Domain;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainsResponse {
    pub domains: Vec<Domain>,
    pub total: u64,
}
