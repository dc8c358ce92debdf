use nigori_core::types::EntityData;
use nigori_core::NigoriError;

/// Outgoing side of the bridge: stages the local Nigori for upload and
/// surfaces errors the bridge cannot return to a caller.
pub trait NigoriLocalChangeProcessor: Send {
    /// The bridge is constructed and can accept sync data.
    fn model_ready_to_sync(&mut self);

    /// Stage `entity` as the local Nigori.
    fn put(&mut self, entity: EntityData);

    fn report_error(&mut self, error: &NigoriError);
}
