use log::trace;

use crate::{
    db::traits::{OrderEngineError, UpdateOutcome},
    db_types::Versioned,
};

/// The read-modify-write primitive that every mutation of a shared record goes through.
///
/// Backends provide a plain read and a conditional write. The conditional write must apply the candidate only if the
/// stored version still equals `expected_version`, increment the version by one, and bump `updated_at`. If nothing
/// was written it returns `Ok(None)`.
#[allow(async_fn_in_trait)]
pub trait VersionedRecordStore<R: Versioned + Clone> {
    async fn fetch_record(&self, id: i64) -> Result<Option<R>, OrderEngineError>;

    async fn write_if_version(&self, candidate: &R, expected_version: i64) -> Result<Option<R>, OrderEngineError>;

    /// Loads the record, applies `mutator`, and writes the result back on condition that nobody else has written in
    /// the meantime.
    ///
    /// Errors returned by the mutator are business decisions and are passed straight through. A version mismatch,
    /// whether detected on load or on write, is reported as [`UpdateOutcome::Conflict`].
    async fn update<F>(&self, id: i64, expected_version: i64, mutator: F) -> Result<UpdateOutcome<R>, OrderEngineError>
    where F: FnOnce(&R) -> Result<R, OrderEngineError> {
        let current = self.fetch_record(id).await?.ok_or_else(|| OrderEngineError::not_found::<R>(id))?;
        if current.version() != expected_version {
            trace!(
                "🗃️ {} #{id} is at version {}, not {expected_version}. Conflict.",
                R::ENTITY,
                current.version()
            );
            return Ok(UpdateOutcome::Conflict);
        }
        let candidate = mutator(&current)?;
        let written = self.write_if_version(&candidate, expected_version).await?;
        Ok(UpdateOutcome::from_write(written))
    }
}
