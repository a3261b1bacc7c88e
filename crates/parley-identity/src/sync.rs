use tracing::{debug, info, instrument};

use parley_store::UserRepo;

use crate::error::IdentityError;
use crate::event::IdentityEvent;

/// What applying an event did. Delivery is at-least-once, so `Created`
/// covers both "row inserted" and "row already there, refreshed".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Deleted,
    Ignored,
}

/// Reconciles provider lifecycle events into local user records.
/// Every operation is idempotent: replaying an event converges on the
/// same state instead of erroring.
pub struct IdentitySync {
    users: UserRepo,
}

impl IdentitySync {
    pub fn new(users: UserRepo) -> Self {
        Self { users }
    }

    #[instrument(skip(self, event))]
    pub fn apply(&self, event: &IdentityEvent) -> Result<SyncOutcome, IdentityError> {
        match event {
            IdentityEvent::Created(subject) => {
                self.users.upsert_by_email(
                    &subject.email,
                    &subject.name,
                    &subject.image_url,
                    subject.external_id.as_deref(),
                )?;
                info!(email = %subject.email, "identity created");
                Ok(SyncOutcome::Created)
            }
            IdentityEvent::Updated(subject) => {
                self.users.upsert_by_email(
                    &subject.email,
                    &subject.name,
                    &subject.image_url,
                    subject.external_id.as_deref(),
                )?;
                info!(email = %subject.email, "identity updated");
                Ok(SyncOutcome::Updated)
            }
            IdentityEvent::Deleted { email } => {
                let existed = self.users.delete_by_email(email)?;
                info!(email = %email, existed, "identity deleted");
                Ok(SyncOutcome::Deleted)
            }
            IdentityEvent::Ignored { kind } => {
                debug!(kind = %kind, "unhandled identity event type");
                Ok(SyncOutcome::Ignored)
            }
        }
    }
}
