use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{
    Cart, CatalogItem, CatalogQuery, Feedback, LineItem, NewLineItem, OptionChoice,
    Order, OrderItem, Preferences,
};
use crate::{CommerceStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS catalog_items (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
    tags TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS catalog_options (
    item_id TEXT NOT NULL REFERENCES catalog_items(id) ON DELETE CASCADE,
    id TEXT NOT NULL,
    label TEXT NOT NULL,
    price_adjustment_cents INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (item_id, id)
);

CREATE TABLE IF NOT EXISTS carts (
    id TEXT PRIMARY KEY,
    owner_key TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('active', 'ordered', 'abandoned')),
    subtotal_cents INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_carts_one_active
    ON carts(owner_key) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS cart_items (
    id TEXT PRIMARY KEY,
    cart_id TEXT NOT NULL REFERENCES carts(id) ON DELETE CASCADE,
    item_id TEXT NOT NULL,
    name TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    unit_price_cents INTEGER NOT NULL,
    line_total_cents INTEGER NOT NULL,
    notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_cart_items_cart ON cart_items(cart_id);

CREATE TABLE IF NOT EXISTS cart_item_options (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cart_item_id TEXT NOT NULL REFERENCES cart_items(id) ON DELETE CASCADE,
    option_id TEXT NOT NULL,
    label TEXT NOT NULL,
    price_adjustment_cents INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    order_number TEXT NOT NULL UNIQUE,
    owner_key TEXT NOT NULL,
    cart_id TEXT NOT NULL UNIQUE REFERENCES carts(id),
    status TEXT NOT NULL,
    subtotal_cents INTEGER NOT NULL,
    delivery_fee_cents INTEGER NOT NULL,
    total_cents INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_owner ON orders(owner_key, created_at);

CREATE TABLE IF NOT EXISTS order_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    item_id TEXT NOT NULL,
    name TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    unit_price_cents INTEGER NOT NULL,
    line_total_cents INTEGER NOT NULL,
    notes TEXT
);

CREATE TABLE IF NOT EXISTS order_item_options (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_item_id INTEGER NOT NULL REFERENCES order_items(id) ON DELETE CASCADE,
    option_id TEXT NOT NULL,
    label TEXT NOT NULL,
    price_adjustment_cents INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS preferences (
    owner_key TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_key TEXT NOT NULL,
    sentiment TEXT NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL
);
";

/// SQLite-backed [`CommerceStore`].
///
/// Multi-row mutations run inside `IMMEDIATE` transactions so a failed
/// sub-write rolls the whole operation back. The partial unique index on
/// `carts(owner_key) WHERE status = 'active'` makes get-or-create atomic even
/// across processes sharing the same database file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path.as_ref())?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!(path = %db_path.as_ref().display(), journal_mode = %mode, "opened sqlite store");
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a synchronous database closure off the async executor.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Invalid(format!("bad timestamp '{}': {}", raw, e)))
}

type CatalogRow = (String, String, Option<String>, i64, String);

fn catalog_options(conn: &Connection, item_id: &str) -> Result<Vec<OptionChoice>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, label, price_adjustment_cents FROM catalog_options
         WHERE item_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![item_id], |row| {
        Ok(OptionChoice {
            id: row.get(0)?,
            label: row.get(1)?,
            price_adjustment_cents: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn build_catalog_item(conn: &Connection, row: CatalogRow) -> Result<CatalogItem, StoreError> {
    let (id, name, description, price_cents, tags) = row;
    let options = catalog_options(conn, &id)?;
    Ok(CatalogItem {
        tags: serde_json::from_str(&tags)?,
        options,
        id,
        name,
        description,
        price_cents,
    })
}

fn catalog_item(conn: &Connection, item_id: &str) -> Result<Option<CatalogItem>, StoreError> {
    let row: Option<CatalogRow> = conn
        .query_row(
            "SELECT id, name, description, price_cents, tags FROM catalog_items WHERE id = ?1",
            params![item_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;
    row.map(|row| build_catalog_item(conn, row)).transpose()
}

fn active_cart_id(conn: &Connection, owner_key: &str) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id FROM carts WHERE owner_key = ?1 AND status = 'active'",
            params![owner_key],
            |row| row.get(0),
        )
        .optional()?)
}

/// Insert-if-absent then read back. The partial unique index turns a
/// concurrent second insert into a no-op.
fn ensure_active_cart(conn: &Connection, owner_key: &str) -> Result<String, StoreError> {
    let now = timestamp(Utc::now());
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO carts (id, owner_key, status, subtotal_cents, created_at, updated_at)
         VALUES (?1, ?2, 'active', 0, ?3, ?3)",
        params![Uuid::new_v4().to_string(), owner_key, now],
    )?;
    if inserted == 1 {
        debug!(owner_key, "created active cart");
    }
    active_cart_id(conn, owner_key)?
        .ok_or_else(|| StoreError::NotFound(format!("active cart for '{}'", owner_key)))
}

fn line_options(conn: &Connection, line_item_id: &str) -> Result<Vec<OptionChoice>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT option_id, label, price_adjustment_cents FROM cart_item_options
         WHERE cart_item_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![line_item_id], |row| {
        Ok(OptionChoice {
            id: row.get(0)?,
            label: row.get(1)?,
            price_adjustment_cents: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn load_cart(conn: &Connection, cart_id: &str) -> Result<Cart, StoreError> {
    let (id, owner_key, status, updated_at): (String, String, String, String) = conn
        .query_row(
            "SELECT id, owner_key, status, updated_at FROM carts WHERE id = ?1",
            params![cart_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("cart '{}'", cart_id)))?;

    let mut stmt = conn.prepare(
        "SELECT id, item_id, name, quantity, unit_price_cents, notes FROM cart_items
         WHERE cart_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![cart_id], |row| {
        Ok(LineItem {
            id: row.get(0)?,
            item_id: row.get(1)?,
            name: row.get(2)?,
            quantity: row.get(3)?,
            unit_price_cents: row.get(4)?,
            options: Vec::new(),
            notes: row.get(5)?,
            line_total_cents: 0,
        })
    })?;
    let mut line_items = rows.collect::<Result<Vec<_>, _>>()?;
    for line in &mut line_items {
        line.options = line_options(conn, &line.id)?;
    }

    let mut cart = Cart {
        id,
        owner_key,
        status: status.parse()?,
        line_items,
        subtotal_cents: 0,
        delivery_fee_cents: 0,
        total_cents: 0,
        updated_at: parse_timestamp(&updated_at)?,
    };
    cart.recompute_totals();
    Ok(cart)
}

/// Persist the recomputed subtotal and bump `updated_at`.
fn touch_cart(conn: &Connection, cart_id: &str) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE carts SET
            subtotal_cents = (
                SELECT COALESCE(SUM(line_total_cents), 0) FROM cart_items WHERE cart_id = ?1
            ),
            updated_at = ?2
         WHERE id = ?1",
        params![cart_id, timestamp(Utc::now())],
    )?;
    Ok(())
}

/// Write one line item and its option rows. A failed option row is a
/// partial write; the caller's transaction rolls the line back with it.
fn insert_line(conn: &Connection, cart_id: &str, line: &LineItem) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO cart_items
            (id, cart_id, item_id, name, quantity, unit_price_cents, line_total_cents, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            line.id,
            cart_id,
            line.item_id,
            line.name,
            line.quantity,
            line.unit_price_cents,
            line.line_total_cents,
            line.notes
        ],
    )?;

    for option in &line.options {
        conn.execute(
            "INSERT INTO cart_item_options
                (cart_item_id, option_id, label, price_adjustment_cents)
             VALUES (?1, ?2, ?3, ?4)",
            params![line.id, option.id, option.label, option.price_adjustment_cents],
        )
        .map_err(|e| {
            warn!(line_id = %line.id, option = %option.id, error = %e, "option write failed");
            StoreError::PartialWrite(format!(
                "option '{}' on line item '{}': {}",
                option.id, line.id, e
            ))
        })?;
    }
    Ok(())
}

/// Write the order header, then every item and option row.
fn insert_order(conn: &Connection, order: &Order) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO orders
            (id, order_number, owner_key, cart_id, status,
             subtotal_cents, delivery_fee_cents, total_cents, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            order.id,
            order.order_number,
            order.owner_key,
            order.cart_id,
            order.status,
            order.subtotal_cents,
            order.delivery_fee_cents,
            order.total_cents,
            timestamp(order.created_at)
        ],
    )?;

    for (position, item) in order.items.iter().enumerate() {
        conn.execute(
            "INSERT INTO order_items
                (order_id, position, item_id, name, quantity,
                 unit_price_cents, line_total_cents, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                order.id,
                position as i64,
                item.item_id,
                item.name,
                item.quantity,
                item.unit_price_cents,
                item.line_total_cents,
                item.notes
            ],
        )
        .map_err(|e| StoreError::PartialWrite(format!("order item '{}': {}", item.item_id, e)))?;
        let order_item_id = conn.last_insert_rowid();

        for option in &item.options {
            conn.execute(
                "INSERT INTO order_item_options
                    (order_item_id, option_id, label, price_adjustment_cents)
                 VALUES (?1, ?2, ?3, ?4)",
                params![order_item_id, option.id, option.label, option.price_adjustment_cents],
            )
            .map_err(|e| {
                StoreError::PartialWrite(format!(
                    "option '{}' on order item '{}': {}",
                    option.id, item.item_id, e
                ))
            })?;
        }
    }
    Ok(())
}

fn order_items(conn: &Connection, order_id: &str) -> Result<Vec<OrderItem>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, item_id, name, quantity, unit_price_cents, line_total_cents, notes
         FROM order_items WHERE order_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![order_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            OrderItem {
                item_id: row.get(1)?,
                name: row.get(2)?,
                quantity: row.get(3)?,
                unit_price_cents: row.get(4)?,
                options: Vec::new(),
                line_total_cents: row.get(5)?,
                notes: row.get(6)?,
            },
        ))
    })?;
    let rows = rows.collect::<Result<Vec<_>, _>>()?;

    let mut option_stmt = conn.prepare(
        "SELECT option_id, label, price_adjustment_cents FROM order_item_options
         WHERE order_item_id = ?1 ORDER BY id",
    )?;
    let mut items = Vec::with_capacity(rows.len());
    for (row_id, mut item) in rows {
        let options = option_stmt.query_map(params![row_id], |row| {
            Ok(OptionChoice {
                id: row.get(0)?,
                label: row.get(1)?,
                price_adjustment_cents: row.get(2)?,
            })
        })?;
        item.options = options.collect::<Result<Vec<_>, _>>()?;
        items.push(item);
    }
    Ok(items)
}

#[async_trait]
impl CommerceStore for SqliteStore {
    async fn seed_catalog(&self, items: Vec<CatalogItem>) -> Result<(), StoreError> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            for item in &items {
                tx.execute(
                    "INSERT INTO catalog_items (id, name, description, price_cents, tags)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        description = excluded.description,
                        price_cents = excluded.price_cents,
                        tags = excluded.tags",
                    params![
                        item.id,
                        item.name,
                        item.description,
                        item.price_cents,
                        serde_json::to_string(&item.tags)?
                    ],
                )?;
                tx.execute(
                    "DELETE FROM catalog_options WHERE item_id = ?1",
                    params![item.id],
                )?;
                for option in &item.options {
                    tx.execute(
                        "INSERT INTO catalog_options (item_id, id, label, price_adjustment_cents)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![item.id, option.id, option.label, option.price_adjustment_cents],
                    )?;
                }
            }
            tx.commit()?;
            info!(count = items.len(), "seeded catalog");
            Ok(())
        })
        .await
    }

    async fn search_catalog(&self, query: &CatalogQuery) -> Result<Vec<CatalogItem>, StoreError> {
        let pattern = query
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| format!("%{}%", t));
        let max_price = query.max_price_cents;
        let limit = query.limit.max(1) as i64;

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, price_cents, tags FROM catalog_items
                 WHERE (?1 IS NULL OR name LIKE ?1 OR description LIKE ?1 OR tags LIKE ?1)
                   AND (?2 IS NULL OR price_cents <= ?2)
                 ORDER BY name
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![pattern, max_price, limit], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?;
            let rows: Vec<CatalogRow> = rows.collect::<Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|row| build_catalog_item(conn, row))
                .collect()
        })
        .await
    }

    async fn catalog_item(&self, item_id: &str) -> Result<Option<CatalogItem>, StoreError> {
        let item_id = item_id.to_string();
        self.blocking(move |conn| catalog_item(conn, &item_id)).await
    }

    async fn get_or_create_active_cart(&self, owner_key: &str) -> Result<Cart, StoreError> {
        let owner_key = owner_key.to_string();
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let cart_id = ensure_active_cart(&tx, &owner_key)?;
            tx.commit()?;
            load_cart(conn, &cart_id)
        })
        .await
    }

    async fn active_cart(&self, owner_key: &str) -> Result<Option<Cart>, StoreError> {
        let owner_key = owner_key.to_string();
        self.blocking(move |conn| {
            active_cart_id(conn, &owner_key)?
                .map(|id| load_cart(conn, &id))
                .transpose()
        })
        .await
    }

    async fn add_line_item(&self, owner_key: &str, item: NewLineItem) -> Result<Cart, StoreError> {
        let owner_key = owner_key.to_string();
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let catalog = catalog_item(&tx, &item.item_id)?
                .ok_or_else(|| StoreError::NotFound(format!("catalog item '{}'", item.item_id)))?;
            let line = LineItem::priced(&catalog, &item)?;
            let cart_id = ensure_active_cart(&tx, &owner_key)?;

            insert_line(&tx, &cart_id, &line)?;
            touch_cart(&tx, &cart_id)?;
            tx.commit()?;
            load_cart(conn, &cart_id)
        })
        .await
    }

    async fn remove_line_item(
        &self,
        owner_key: &str,
        line_item_id: &str,
    ) -> Result<Cart, StoreError> {
        let owner_key = owner_key.to_string();
        let line_item_id = line_item_id.to_string();
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let cart_id = active_cart_id(&tx, &owner_key)?
                .ok_or_else(|| StoreError::NotFound(format!("active cart for '{}'", owner_key)))?;

            tx.execute(
                "DELETE FROM cart_item_options WHERE cart_item_id IN
                    (SELECT id FROM cart_items WHERE id = ?1 AND cart_id = ?2)",
                params![line_item_id, cart_id],
            )?;
            let removed = tx.execute(
                "DELETE FROM cart_items WHERE id = ?1 AND cart_id = ?2",
                params![line_item_id, cart_id],
            )?;
            if removed == 0 {
                return Err(StoreError::NotFound(format!("line item '{}'", line_item_id)));
            }

            touch_cart(&tx, &cart_id)?;
            tx.commit()?;
            load_cart(conn, &cart_id)
        })
        .await
    }

    async fn abandon_active_cart(&self, owner_key: &str) -> Result<Option<Cart>, StoreError> {
        let owner_key = owner_key.to_string();
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(cart_id) = active_cart_id(&tx, &owner_key)? else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE carts SET status = 'abandoned', updated_at = ?2 WHERE id = ?1",
                params![cart_id, timestamp(Utc::now())],
            )?;
            tx.commit()?;
            load_cart(conn, &cart_id).map(Some)
        })
        .await
    }

    async fn submit_order(
        &self,
        owner_key: &str,
        cart_id: Option<&str>,
    ) -> Result<Order, StoreError> {
        let owner_key = owner_key.to_string();
        let requested = cart_id.map(str::to_string);
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let active = active_cart_id(&tx, &owner_key)?
                .ok_or_else(|| StoreError::NotFound(format!("active cart for '{}'", owner_key)))?;
            if let Some(requested) = &requested {
                if requested != &active {
                    return Err(StoreError::NotFound(format!(
                        "cart '{}' is not the active cart",
                        requested
                    )));
                }
            }

            let cart = load_cart(&tx, &active)?;
            if cart.is_empty() {
                return Err(StoreError::EmptyCart(cart.id));
            }

            let order = Order::from_cart(&cart);
            insert_order(&tx, &order)?;

            let closed = tx.execute(
                "UPDATE carts SET status = 'ordered', updated_at = ?2
                 WHERE id = ?1 AND status = 'active'",
                params![cart.id, timestamp(Utc::now())],
            )?;
            if closed != 1 {
                return Err(StoreError::PartialWrite(format!(
                    "cart '{}' could not be closed",
                    cart.id
                )));
            }

            tx.commit()?;
            info!(
                owner_key = %order.owner_key,
                order_number = %order.order_number,
                total_cents = order.total_cents,
                "order submitted"
            );
            Ok(order)
        })
        .await
    }

    async fn purchase_item(&self, owner_key: &str, item: NewLineItem) -> Result<Order, StoreError> {
        let owner_key = owner_key.to_string();
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let catalog = catalog_item(&tx, &item.item_id)?
                .ok_or_else(|| StoreError::NotFound(format!("catalog item '{}'", item.item_id)))?;
            let line = LineItem::priced(&catalog, &item)?;
            let (cart, order) = Order::direct(&owner_key, line);

            // The checkout cart is born `ordered`, so the one-active-cart index
            // never sees it.
            let now = timestamp(Utc::now());
            tx.execute(
                "INSERT INTO carts (id, owner_key, status, subtotal_cents, created_at, updated_at)
                 VALUES (?1, ?2, 'ordered', ?3, ?4, ?4)",
                params![cart.id, owner_key, cart.subtotal_cents, now],
            )?;
            for line in &cart.line_items {
                insert_line(&tx, &cart.id, line)?;
            }
            insert_order(&tx, &order)?;

            tx.commit()?;
            info!(
                owner_key = %order.owner_key,
                order_number = %order.order_number,
                total_cents = order.total_cents,
                "direct purchase recorded"
            );
            Ok(order)
        })
        .await
    }

    async fn recent_orders(&self, owner_key: &str, limit: usize) -> Result<Vec<Order>, StoreError> {
        let owner_key = owner_key.to_string();
        let limit = limit as i64;
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, order_number, owner_key, cart_id, status,
                        subtotal_cents, delivery_fee_cents, total_cents, created_at
                 FROM orders WHERE owner_key = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![owner_key, limit], |row| {
                Ok((
                    Order {
                        id: row.get(0)?,
                        order_number: row.get(1)?,
                        owner_key: row.get(2)?,
                        cart_id: row.get(3)?,
                        status: row.get(4)?,
                        items: Vec::new(),
                        subtotal_cents: row.get(5)?,
                        delivery_fee_cents: row.get(6)?,
                        total_cents: row.get(7)?,
                        created_at: Utc::now(),
                    },
                    row.get::<_, String>(8)?,
                ))
            })?;
            let rows = rows.collect::<Result<Vec<_>, _>>()?;

            let mut orders = Vec::with_capacity(rows.len());
            for (mut order, created_at) in rows {
                order.created_at = parse_timestamp(&created_at)?;
                order.items = order_items(conn, &order.id)?;
                orders.push(order);
            }
            Ok(orders)
        })
        .await
    }

    async fn preferences(&self, owner_key: &str) -> Result<Option<Preferences>, StoreError> {
        let owner_key = owner_key.to_string();
        self.blocking(move |conn| {
            let data: Option<String> = conn
                .query_row(
                    "SELECT data FROM preferences WHERE owner_key = ?1",
                    params![owner_key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
        })
        .await
    }

    async fn upsert_preferences(
        &self,
        owner_key: &str,
        preferences: Preferences,
    ) -> Result<Preferences, StoreError> {
        let owner_key = owner_key.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO preferences (owner_key, data, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(owner_key) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at",
                params![
                    owner_key,
                    serde_json::to_string(&preferences)?,
                    timestamp(Utc::now())
                ],
            )?;
            Ok(preferences)
        })
        .await
    }

    async fn record_feedback(&self, owner_key: &str, feedback: Feedback) -> Result<(), StoreError> {
        let owner_key = owner_key.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO feedback (owner_key, sentiment, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    owner_key,
                    feedback.sentiment.as_str(),
                    feedback.notes,
                    timestamp(Utc::now())
                ],
            )?;
            Ok(())
        })
        .await
    }
}
