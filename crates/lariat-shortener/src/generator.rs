pub mod random;

/// Trait for generating candidate short ids.
///
/// Implementations are pure generators that don't interact with storage:
/// uniqueness is settled by the store's collision handling, not here.
pub trait Generator: Send + Sync + 'static {
    /// Produces one candidate short id.
    fn generate(&self) -> String;
}
