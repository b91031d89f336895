//! Storage operations: bulk writes, the typed duplicate-key conflict, and
//! the remove-and-retry loop that drives a card batch to a clean commit.

use std::future::Future;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use sqlx::mysql::MySqlDatabaseError;
use sqlx::{MySql, QueryBuilder};
use tracing::{debug, instrument};

use crate::util::db::Db;

use super::records::{CardRow, ProductLineRow, SetRow};
use super::set_index::{SetIndex, SetRef};

/// MySQL error number for a uniqueness violation ("Duplicate entry ...").
const ER_DUP_ENTRY: u16 = 1062;

/// Storage failures the write pipeline needs to tell apart: duplicate-key
/// conflicts are resolved locally, everything else aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate card entry {0:?}")]
    Duplicate(DuplicateKey),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Component values of a violated card uniqueness constraint, recovered
/// from the engine's duplicate-entry message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateKey {
    pub number: String,
    pub name: String,
    pub rarity: String,
    pub set_id: u64,
}

impl DuplicateKey {
    /// Parse the quoted composite key out of a duplicate-entry message,
    /// e.g. `Duplicate entry '1234-56-CardName-Rare-7' for key ...`.
    ///
    /// The key holds four logical components but five hyphen segments: card
    /// numbers themselves contain exactly one hyphen, so the first two
    /// segments together form the number. Anything else is unparseable and
    /// the caller must treat it as a hard error.
    pub fn parse(message: &str) -> Option<Self> {
        let start = message.find('\'')? + 1;
        let end = start + message[start..].find('\'')?;
        let segments: Vec<&str> = message[start..end].split('-').collect();
        if segments.len() != 5 {
            return None;
        }
        let set_id = segments[4].parse().ok()?;
        Some(Self {
            number: format!("{}-{}", segments[0], segments[1]),
            name: segments[2].to_string(),
            rarity: segments[3].to_string(),
            set_id,
        })
    }

    pub fn matches(&self, row: &CardRow) -> bool {
        row.number == self.number
            && row.name == self.name
            && row.rarity == self.rarity
            && row.set_id == self.set_id
    }
}

/// Remove the first row matching `key`, swapping the last element into its
/// place. Returns false when no pending row matches.
pub fn remove_matching(rows: &mut Vec<CardRow>, key: &DuplicateKey) -> bool {
    match rows.iter().position(|row| key.matches(row)) {
        Some(pos) => {
            rows.swap_remove(pos);
            true
        }
        None => false,
    }
}

/// Outcome of one committed card batch. The engine assigns consecutive ids
/// to the rows of a single multi-row insert, so `first_id` plus the row's
/// position yields its generated id. This requires
/// `auto_increment_increment = 1` (the server default); under a
/// multi-primary replication offset the ids are not consecutive and image
/// files would be keyed to the wrong rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedBatch {
    pub first_id: u64,
    pub row_count: u64,
}

/// Drive a batch to a successful commit, swap-removing each row the store
/// reports as violating the card uniqueness constraint and retrying with
/// the reduced batch. Rows removed here are dropped for the run, never
/// re-attempted under a different key. A duplicate key that matches no
/// pending row is a hard error.
pub async fn drive_insert<F, Fut>(
    mut rows: Vec<CardRow>,
    mut attempt: F,
) -> Result<(CommittedBatch, Vec<CardRow>)>
where
    F: FnMut(Vec<CardRow>) -> Fut,
    Fut: Future<Output = (Vec<CardRow>, Result<CommittedBatch, StoreError>)>,
{
    loop {
        let (returned, result) = attempt(rows).await;
        rows = returned;
        match result {
            Ok(committed) => return Ok((committed, rows)),
            Err(StoreError::Duplicate(key)) => {
                if !remove_matching(&mut rows, &key) {
                    bail!("duplicate key {key:?} does not match any pending row");
                }
                debug!(?key, remaining = rows.len(), "removed conflicting row, retrying batch");
            }
            Err(StoreError::Other(e)) => return Err(e),
        }
    }
}

/// Storage facade shared by the coordinator and the write workers.
#[derive(Clone)]
pub struct Store {
    db: Db,
}

impl Store {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    #[instrument(skip(self, row))]
    pub async fn write_product_line(&self, row: &ProductLineRow) -> Result<u64> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO product_lines (name, url_name, set_count, card_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.name)
        .bind(&row.url_name)
        .bind(row.set_count)
        .bind(row.card_count)
        .bind(now)
        .bind(now)
        .execute(&self.db.pool)
        .await
        .context("failed to insert product line row")?;
        Ok(result.last_insert_id())
    }

    #[instrument(skip(self, rows))]
    pub async fn write_sets(&self, rows: &[SetRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let mut qb: QueryBuilder<'_, MySql> = QueryBuilder::new(
            "INSERT INTO set_infos (name, url_name, card_count, product_line_id, created_at, updated_at) ",
        );
        qb.push_values(rows, |mut b, row| {
            b.push_bind(&row.name)
                .push_bind(&row.url_name)
                .push_bind(row.card_count)
                .push_bind(row.product_line_id)
                .push_bind(now)
                .push_bind(now);
        });
        qb.build()
            .execute(&self.db.pool)
            .await
            .context("failed to insert set rows")?;
        Ok(())
    }

    /// Snapshot the persisted set rows of one product line. Must run only
    /// after the set write phase has completed; the index is never
    /// refreshed during a run.
    #[instrument(skip(self))]
    pub async fn build_set_index(&self, product_line_id: u64) -> Result<SetIndex> {
        let rows: Vec<(String, u64)> =
            sqlx::query_as("SELECT name, id FROM set_infos WHERE product_line_id = ?")
                .bind(product_line_id)
                .fetch_all(&self.db.pool)
                .await
                .context("failed to load set rows for index")?;
        Ok(SetIndex::from_rows(rows.into_iter().map(|(name, id)| {
            (
                name,
                SetRef {
                    set_id: id,
                    product_line_id,
                },
            )
        })))
    }

    /// Single bulk-insert attempt for a card batch. A uniqueness violation
    /// comes back as `StoreError::Duplicate` with the parsed key; any other
    /// failure (including an unparseable duplicate-entry message) is
    /// `StoreError::Other` and fatal to the run.
    pub async fn insert_cards(&self, rows: &[CardRow]) -> Result<CommittedBatch, StoreError> {
        if rows.is_empty() {
            return Ok(CommittedBatch {
                first_id: 0,
                row_count: 0,
            });
        }
        let now = Utc::now();
        let mut qb: QueryBuilder<'_, MySql> = QueryBuilder::new(
            "INSERT INTO card_infos (attack, attribute, card_type, card_type_b, defense, \
             description, link_arrows, level, monster_type, name, url_name, number, rarity, \
             market_price, set_id, product_line_id, product_id, created_at, updated_at) ",
        );
        qb.push_values(rows, |mut b, row| {
            b.push_bind(&row.attack)
                .push_bind(&row.attribute)
                .push_bind(&row.card_type)
                .push_bind(&row.card_type_b)
                .push_bind(&row.defense)
                .push_bind(&row.description)
                .push_bind(&row.link_arrows)
                .push_bind(&row.level)
                .push_bind(&row.monster_type)
                .push_bind(&row.name)
                .push_bind(&row.url_name)
                .push_bind(&row.number)
                .push_bind(&row.rarity)
                .push_bind(row.market_price)
                .push_bind(row.set_id)
                .push_bind(row.product_line_id)
                .push_bind(row.product_id)
                .push_bind(now)
                .push_bind(now);
        });

        match qb.build().execute(&self.db.pool).await {
            Ok(result) => Ok(CommittedBatch {
                first_id: result.last_insert_id(),
                row_count: result.rows_affected(),
            }),
            Err(sqlx::Error::Database(db_err)) if is_duplicate(db_err.as_ref()) => {
                match DuplicateKey::parse(db_err.message()) {
                    Some(key) => Err(StoreError::Duplicate(key)),
                    None => Err(StoreError::Other(anyhow!(
                        "unparseable duplicate-entry message: {}",
                        db_err.message()
                    ))),
                }
            }
            Err(e) => Err(StoreError::Other(
                anyhow::Error::new(e).context("card batch insert failed"),
            )),
        }
    }

    /// Commit a card batch, resolving duplicate-key conflicts by dropping
    /// the offending rows. Returns the commit info and the rows that were
    /// actually inserted, in insert order.
    pub async fn insert_cards_resolving_conflicts(
        &self,
        rows: Vec<CardRow>,
    ) -> Result<(CommittedBatch, Vec<CardRow>)> {
        drive_insert(rows, |batch| async move {
            let result = self.insert_cards(&batch).await;
            (batch, result)
        })
        .await
    }
}

fn is_duplicate(err: &(dyn sqlx::error::DatabaseError + 'static)) -> bool {
    err.try_downcast_ref::<MySqlDatabaseError>()
        .map(|e| e.number() == ER_DUP_ENTRY)
        .unwrap_or(false)
}
