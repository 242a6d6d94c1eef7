//! Participant consent: decisions, responses and the on-disk store

mod response;
mod store;

pub use response::{ConsentDecision, ConsentResponse};
pub use store::{ConsentRecord, ConsentStore};
