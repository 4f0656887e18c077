//! Order storage and the idempotent state transition.
//!
//! The order store is the only shared mutable resource in the handshake.
//! [`OrderStore::begin_processing`] is the compare-and-set at the heart of
//! the protocol's exactly-once guarantee: two concurrently delivered
//! callbacks for the same `txn_id` cannot both observe "not yet processing"
//! and both win.

use std::sync::Mutex;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::XpayError;

/// Order lifecycle status. `failed`, `canceled` and `refunded` are terminal
/// for this protocol; merchant-defined statuses pass through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Processing,
    Failed,
    Canceled,
    Refunded,
    Other(String),
}

impl OrderStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            "refunded" => Self::Refunded,
            _ => Self::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Refunded => "refunded",
            Self::Other(s) => s,
        }
    }

    /// Whether a `pay` callback must be rejected for an order in this state.
    /// The transition target is always `processing`, applied at most once.
    /// Case-insensitive, same as the SQLite backend's `lower(status)` guard:
    /// `Other("Refunded")` blocks even though `parse` never produces it.
    pub fn blocks_payment(&self) -> bool {
        match self {
            Self::Processing | Self::Failed | Self::Canceled | Self::Refunded => true,
            Self::Other(s) => ["processing", "failed", "canceled", "refunded"]
                .iter()
                .any(|terminal| s.eq_ignore_ascii_case(terminal)),
            Self::Pending => false,
        }
    }
}

/// Billing identity attached to an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingInfo {
    pub email: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
}

/// One purchasable line of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub short_description: Option<String>,
    /// Line total as a decimal string.
    pub total: String,
}

/// An order as seen by the handshake. The store is the system of record;
/// the protocol reads status and requests exactly one transition.
#[derive(Debug, Clone)]
pub struct Order {
    /// Equal to the protocol's `txn_id`. The idempotency key.
    pub txn_id: String,
    pub status: OrderStatus,
    /// Order total as a decimal string, e.g. `"19.99"`.
    pub total: String,
    /// ISO currency code.
    pub currency: String,
    pub billing: BillingInfo,
    pub line_items: Vec<LineItem>,
}

/// Outcome of the compare-and-set transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Status moved to `processing`; the callback's side effects apply once.
    Applied,
    /// Order was already in `processing` or a terminal state; no mutation.
    AlreadySettled(String),
}

/// Storage backend for orders.
///
/// Implementations must be thread-safe and must make `begin_processing`
/// atomic per order: the status read and the `processing` write happen under
/// a lock or transaction scoped to that single order.
pub trait OrderStore: Send + Sync {
    fn find_by_txn_id(&self, txn_id: &str) -> Result<Option<Order>, XpayError>;

    /// Atomically move the order to `processing` unless its current status
    /// already blocks payment. Returns [`Transition::AlreadySettled`] on a
    /// replayed or late callback, `OrderNotFound` for an unknown id.
    fn begin_processing(&self, txn_id: &str) -> Result<Transition, XpayError>;

    /// Insert or replace an order. Used by the surrounding platform to feed
    /// the store; the protocol itself never creates orders.
    fn upsert(&self, order: Order) -> Result<(), XpayError>;

    /// Cheap liveness probe for health checks.
    fn ping(&self) -> Result<(), XpayError>;
}

/// In-memory store backed by DashMap. For tests and embedded use; lost on
/// restart.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<String, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn find_by_txn_id(&self, txn_id: &str) -> Result<Option<Order>, XpayError> {
        Ok(self.orders.get(txn_id).map(|o| o.value().clone()))
    }

    fn begin_processing(&self, txn_id: &str) -> Result<Transition, XpayError> {
        // DashMap's get_mut holds the shard lock, making read-check-write
        // atomic within a single process.
        match self.orders.get_mut(txn_id) {
            Some(mut order) => {
                if order.status.blocks_payment() {
                    Ok(Transition::AlreadySettled(order.status.as_str().to_string()))
                } else {
                    order.status = OrderStatus::Processing;
                    Ok(Transition::Applied)
                }
            }
            None => Err(XpayError::OrderNotFound(txn_id.to_string())),
        }
    }

    fn upsert(&self, order: Order) -> Result<(), XpayError> {
        self.orders.insert(order.txn_id.clone(), order);
        Ok(())
    }

    fn ping(&self) -> Result<(), XpayError> {
        Ok(())
    }
}

/// Persistent store backed by SQLite. Survives restarts; the CAS is a single
/// guarded UPDATE, atomic at the database level and safe across processes.
pub struct SqliteOrderStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteOrderStore {
    /// Open (or create) the order database at the given path.
    pub fn open(path: &str) -> Result<Self, XpayError> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS orders (
                txn_id     TEXT PRIMARY KEY,
                status     TEXT NOT NULL,
                total      TEXT NOT NULL,
                currency   TEXT NOT NULL,
                email      TEXT NOT NULL DEFAULT '',
                phone      TEXT NOT NULL DEFAULT '',
                first_name TEXT NOT NULL DEFAULT '',
                last_name  TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS order_items (
                txn_id            TEXT NOT NULL,
                position          INTEGER NOT NULL,
                name              TEXT NOT NULL,
                short_description TEXT,
                total             TEXT NOT NULL,
                PRIMARY KEY (txn_id, position)
            );
            PRAGMA journal_mode=WAL;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        match self.conn.lock() {
            Ok(c) => c,
            Err(poisoned) => {
                tracing::error!("order store mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl OrderStore for SqliteOrderStore {
    fn find_by_txn_id(&self, txn_id: &str) -> Result<Option<Order>, XpayError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT status, total, currency, email, phone, first_name, last_name
             FROM orders WHERE txn_id = ?1",
        )?;
        let row = stmt
            .query_row([txn_id], |row| {
                Ok(Order {
                    txn_id: txn_id.to_string(),
                    status: OrderStatus::parse(&row.get::<_, String>(0)?),
                    total: row.get(1)?,
                    currency: row.get(2)?,
                    billing: BillingInfo {
                        email: row.get(3)?,
                        phone: row.get(4)?,
                        first_name: row.get(5)?,
                        last_name: row.get(6)?,
                    },
                    line_items: Vec::new(),
                })
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some(mut order) = row else {
            return Ok(None);
        };

        let mut items = conn.prepare(
            "SELECT name, short_description, total FROM order_items
             WHERE txn_id = ?1 ORDER BY position",
        )?;
        order.line_items = items
            .query_map([txn_id], |row| {
                Ok(LineItem {
                    name: row.get(0)?,
                    short_description: row.get(1)?,
                    total: row.get(2)?,
                })
            })?
            .collect::<Result<_, _>>()?;

        Ok(Some(order))
    }

    fn begin_processing(&self, txn_id: &str) -> Result<Transition, XpayError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE orders SET status = 'processing'
             WHERE txn_id = ?1
               AND lower(status) NOT IN ('processing', 'failed', 'canceled', 'refunded')",
            [txn_id],
        )?;
        if updated == 1 {
            return Ok(Transition::Applied);
        }

        // The UPDATE matched nothing: either the order is unknown or its
        // status blocks payment. One more read disambiguates.
        let status: Option<String> = conn
            .query_row("SELECT status FROM orders WHERE txn_id = ?1", [txn_id], |r| {
                r.get(0)
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        match status {
            Some(s) => Ok(Transition::AlreadySettled(s)),
            None => Err(XpayError::OrderNotFound(txn_id.to_string())),
        }
    }

    fn upsert(&self, order: Order) -> Result<(), XpayError> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO orders
             (txn_id, status, total, currency, email, phone, first_name, last_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                order.txn_id,
                order.status.as_str(),
                order.total,
                order.currency,
                order.billing.email,
                order.billing.phone,
                order.billing.first_name,
                order.billing.last_name,
            ],
        )?;
        conn.execute("DELETE FROM order_items WHERE txn_id = ?1", [&order.txn_id])?;
        for (position, item) in order.line_items.iter().enumerate() {
            conn.execute(
                "INSERT INTO order_items (txn_id, position, name, short_description, total)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    order.txn_id,
                    position as i64,
                    item.name,
                    item.short_description,
                    item.total,
                ],
            )?;
        }
        Ok(())
    }

    fn ping(&self) -> Result<(), XpayError> {
        let conn = self.lock();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(txn_id: &str, status: OrderStatus) -> Order {
        Order {
            txn_id: txn_id.to_string(),
            status,
            total: "19.99".to_string(),
            currency: "UAH".to_string(),
            billing: BillingInfo {
                email: "payer@example.com".to_string(),
                phone: "380671234567".to_string(),
                first_name: "Olena".to_string(),
                last_name: "Kovalenko".to_string(),
            },
            line_items: vec![LineItem {
                name: "Widget".to_string(),
                short_description: Some("A widget".to_string()),
                total: "19.99".to_string(),
            }],
        }
    }

    #[test]
    fn in_memory_cas_applies_once() {
        let store = InMemoryOrderStore::new();
        store.upsert(order("1001", OrderStatus::Pending)).unwrap();

        assert_eq!(store.begin_processing("1001").unwrap(), Transition::Applied);
        assert_eq!(
            store.begin_processing("1001").unwrap(),
            Transition::AlreadySettled("processing".to_string())
        );
        assert_eq!(
            store.find_by_txn_id("1001").unwrap().unwrap().status,
            OrderStatus::Processing
        );
    }

    #[test]
    fn in_memory_unknown_order() {
        let store = InMemoryOrderStore::new();
        assert!(matches!(
            store.begin_processing("missing"),
            Err(XpayError::OrderNotFound(_))
        ));
    }

    #[test]
    fn terminal_states_block_without_mutation() {
        for status in [OrderStatus::Failed, OrderStatus::Canceled, OrderStatus::Refunded] {
            let store = InMemoryOrderStore::new();
            store.upsert(order("2001", status.clone())).unwrap();

            assert_eq!(
                store.begin_processing("2001").unwrap(),
                Transition::AlreadySettled(status.as_str().to_string())
            );
            assert_eq!(store.find_by_txn_id("2001").unwrap().unwrap().status, status);
        }
    }

    #[test]
    fn in_memory_guard_is_case_insensitive() {
        let store = InMemoryOrderStore::new();
        store
            .upsert(order("2002", OrderStatus::Other("Refunded".to_string())))
            .unwrap();

        assert_eq!(
            store.begin_processing("2002").unwrap(),
            Transition::AlreadySettled("Refunded".to_string())
        );
        assert_eq!(
            store.find_by_txn_id("2002").unwrap().unwrap().status,
            OrderStatus::Other("Refunded".to_string())
        );
    }

    #[test]
    fn merchant_defined_status_allows_payment() {
        let store = InMemoryOrderStore::new();
        store
            .upsert(order("3001", OrderStatus::Other("on-hold".to_string())))
            .unwrap();
        assert_eq!(store.begin_processing("3001").unwrap(), Transition::Applied);
    }

    #[test]
    fn sqlite_cas_applies_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.db");
        let store = SqliteOrderStore::open(path.to_str().unwrap()).unwrap();
        store.upsert(order("1001", OrderStatus::Pending)).unwrap();

        assert_eq!(store.begin_processing("1001").unwrap(), Transition::Applied);
        assert_eq!(
            store.begin_processing("1001").unwrap(),
            Transition::AlreadySettled("processing".to_string())
        );
    }

    #[test]
    fn sqlite_status_guard_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.db");
        let store = SqliteOrderStore::open(path.to_str().unwrap()).unwrap();
        store
            .upsert(order("1002", OrderStatus::Other("Refunded".to_string())))
            .unwrap();

        assert_eq!(
            store.begin_processing("1002").unwrap(),
            Transition::AlreadySettled("Refunded".to_string())
        );
    }

    #[test]
    fn sqlite_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.db");

        {
            let store = SqliteOrderStore::open(path.to_str().unwrap()).unwrap();
            store.upsert(order("1003", OrderStatus::Pending)).unwrap();
            assert_eq!(store.begin_processing("1003").unwrap(), Transition::Applied);
        }

        {
            let store = SqliteOrderStore::open(path.to_str().unwrap()).unwrap();
            let found = store.find_by_txn_id("1003").unwrap().unwrap();
            assert_eq!(found.status, OrderStatus::Processing);
            assert_eq!(found.line_items.len(), 1);
        }
    }

    #[test]
    fn sqlite_round_trips_billing_and_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.db");
        let store = SqliteOrderStore::open(path.to_str().unwrap()).unwrap();
        store.upsert(order("1004", OrderStatus::Pending)).unwrap();

        let found = store.find_by_txn_id("1004").unwrap().unwrap();
        assert_eq!(found.billing.email, "payer@example.com");
        assert_eq!(found.currency, "UAH");
        assert_eq!(found.line_items[0].name, "Widget");
        assert!(store.find_by_txn_id("unknown").unwrap().is_none());
    }
}
