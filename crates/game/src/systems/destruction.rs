use crate::error::{CosmosError, report_determinism_violation};
use crate::step::{LogicStep, QueueDestruction};

/// Deletes everything queued this step, once each, in id order.
///
/// The same entity may be queued by several systems (a projectile that hits
/// on its last step). Duplicates and already-dead ids are skipped.
pub fn flush(step: &mut LogicStep<'_>) {
    let mut doomed: Vec<_> = step
        .messages
        .take::<QueueDestruction>()
        .into_iter()
        .map(|m| m.subject)
        .collect();
    doomed.sort();
    doomed.dedup();

    for id in doomed {
        match step.cosmos.delete_entity(id) {
            Ok(()) => step.artifacts.destroyed.push(id),
            Err(CosmosError::StaleReference(_)) => log::debug!("{id} already destroyed"),
            Err(error) => report_determinism_violation(&error),
        }
    }

    if let Err(error) = step.cosmos.verify_integrity() {
        report_determinism_violation(&error);
    }
}
