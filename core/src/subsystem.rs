//! Component contract.
//!
//! RULE: Every component implements MarketSubsystem.
//! Components borrow the shared store and clock from the Marketplace; they hold
//! no state of their own between calls, so any number of instances may run
//! against one database.

use crate::{
    clock::Clock,
    error::MarketResult,
    event::{EventLogEntry, MarketEvent},
    store::MarketStore,
};

pub trait MarketSubsystem {
    /// Unique stable name, written to the event log.
    fn name(&self) -> &'static str;

    fn store(&self) -> &MarketStore;

    fn clock(&self) -> &dyn Clock;

    /// Append an audit event attributed to this component.
    /// Call inside the mutation's transaction.
    fn record(&self, entity_id: &str, event: &MarketEvent) -> MarketResult<()> {
        let entry = EventLogEntry {
            id: None,
            subsystem: self.name().to_string(),
            event_type: event.type_name().to_string(),
            entity_id: entity_id.to_string(),
            payload: serde_json::to_string(event)?,
            created_at: self.clock().now(),
        };
        self.store().append_event(&entry)
    }
}
