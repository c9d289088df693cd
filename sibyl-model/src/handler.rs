use crate::error::ValidationErrors;
use crate::record::Record;

/// Optional per-kind behavior: lifecycle hooks, field validation and sibling
/// merging.
///
/// Every method has a no-op default, so most kinds register without one.
/// Implement it when a kind needs:
/// - Field-level rules (e.g. a non-empty name)
/// - Derived values computed before a save or after a load
/// - Domain-specific sibling reconciliation for [`MergeStrategy::Custom`]
///
/// [`MergeStrategy::Custom`]: crate::MergeStrategy::Custom
pub trait RecordHandler: Send + Sync {
    /// Runs before the first save of a new record, ahead of validation.
    fn before_create(&self, record: &mut Record) {
        let _ = record;
    }

    /// Runs before every save, ahead of validation.
    fn before_save(&self, record: &mut Record) {
        let _ = record;
    }

    fn after_create(&self, record: &mut Record) {
        let _ = record;
    }

    fn after_save(&self, record: &mut Record) {
        let _ = record;
    }

    fn before_delete(&self, record: &mut Record) {
        let _ = record;
    }

    fn after_delete(&self, record: &mut Record) {
        let _ = record;
    }

    /// Runs after a record is populated from the store.
    fn after_load(&self, record: &mut Record) {
        let _ = record;
    }

    /// Adds field-level messages to `errors`. Runs after the built-in key
    /// check; any message fails the save.
    fn validate(&self, record: &Record, errors: &mut ValidationErrors) {
        let _ = (record, errors);
    }

    /// Reduces decoded siblings to one record.
    ///
    /// Candidates arrive in store-returned order. The default takes the
    /// first. Return `Err(reason)` to fail the load.
    fn merge(&self, candidates: Vec<Record>) -> Result<Record, String> {
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| "no candidates".to_string())
    }
}

/// Handler used for kinds registered without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

impl RecordHandler for DefaultHandler {}
