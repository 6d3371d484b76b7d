/// Conflict-resolution errors. Fatal to the single offending operation only.
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error("cannot merge {incoming} into {existing} on key {key}")]
    IncompatibleMerge {
        key: String,
        existing: String,
        incoming: String,
    },
}
