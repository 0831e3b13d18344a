//! Thin services over the sync layer. Each one borrows the shared context;
//! none keeps state of its own.

mod assignment;
mod course;
mod follow;
mod me;
mod payment;

pub use assignment::AssignmentService;
pub use course::CourseService;
pub use follow::LiveFollow;
pub use me::MeService;
pub use payment::PaymentService;

use observable_store::Record;
use serde_json::Value;
use tracing::warn;

/// Keep the object members of a joined reply list as records.
pub(crate) fn to_records(values: Vec<Value>, kind: &'static str) -> Vec<Record> {
    values
        .into_iter()
        .filter_map(|value| match Record::try_from(value) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(kind, error = %err, "reply member dropped");
                None
            }
        })
        .collect()
}
