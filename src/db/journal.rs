//! Background task writing engine events to the database.

use super::pool::DatabasePool;
use super::schema::{OrderRecord, TradeRecord};
use crate::config::MarketKind;
use crate::matching::EngineEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Spawns a task journaling trades and order states of one engine.
///
/// Write failures are logged and skipped; trading never waits on the journal.
pub fn spawn_journal(
    db: DatabasePool,
    kind: MarketKind,
    mut events: broadcast::Receiver<EngineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(market = kind.as_str(), "Trade journal started");
        loop {
            match events.recv().await {
                Ok(EngineEvent::Trade(trade)) => {
                    if let Err(e) = db.insert_trade(&TradeRecord::from_trade(kind, &trade)).await {
                        error!("Failed to journal trade {}: {}", trade.id, e);
                    }
                }
                Ok(EngineEvent::OrderUpdated(order)) => {
                    if let Err(e) = db.upsert_order(&OrderRecord::from_order(kind, &order)).await {
                        error!("Failed to journal order {}: {}", order.id, e);
                    }
                }
                Ok(EngineEvent::BookChanged { .. }) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!(market = kind.as_str(), "Trade journal lagged {} events", n);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
