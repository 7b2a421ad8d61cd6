use chrono::Local;
use sqlx::postgres::PgRow;
use sqlx::{Connection, PgPool, Postgres, Row, Transaction};

use crate::error::StoreError;
use crate::models::{GuestRecord, NewGuest, StayWindow, TableStats};
use crate::store::{GroupBy, GuestStore, RecordFilter};

const GUEST_COLUMNS: &str = "id, first_name, last_name, email, phone, checkin, checkout, \
     country, city, postal_code, consent, hostel, created_at, updated_at";

const OVERLAP: &str = "btrim(email) <> '' \
     AND NOT (COALESCE(checkout, DATE '9999-12-31') < $1 \
     OR COALESCE(checkin, DATE '0001-01-01') > $2)";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn map_insert_error(err: sqlx::Error, email: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UniqueViolation {
            email: email.to_string(),
        },
        _ => StoreError::Database(err),
    }
}

fn guest_from_row(row: &PgRow) -> GuestRecord {
    GuestRecord {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        checkin: row.get("checkin"),
        checkout: row.get("checkout"),
        country: row.get("country"),
        city: row.get("city"),
        postal_code: row.get("postal_code"),
        consent: row.get("consent"),
        hostel: row.get("hostel"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// `guest_contacts.guests` behind the [`GuestStore`] interface.
///
/// Inserts share one transaction that is opened lazily and flushed by
/// `commit`. Each insert runs inside its own savepoint so a rejected row does
/// not poison the rest of the batch.
pub struct PgGuestStore {
    pool: PgPool,
    pending: Option<Transaction<'static, Postgres>>,
}

impl PgGuestStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            pending: None,
        }
    }
}

impl GuestStore for PgGuestStore {
    async fn insert(&mut self, guest: &NewGuest) -> Result<i64, StoreError> {
        let tx = match self.pending.take() {
            Some(tx) => tx,
            None => self.pool.begin().await?,
        };
        let tx = self.pending.insert(tx);
        let mut savepoint = tx.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO guest_contacts.guests
            (first_name, last_name, email, phone, checkin, checkout,
             country, city, postal_code, consent, hostel, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(&guest.first_name)
        .bind(&guest.last_name)
        .bind(&guest.email)
        .bind(&guest.phone)
        .bind(guest.checkin)
        .bind(guest.checkout)
        .bind(&guest.country)
        .bind(&guest.city)
        .bind(&guest.postal_code)
        .bind(guest.consent)
        .bind(&guest.hostel)
        .fetch_one(&mut *savepoint)
        .await;

        match inserted {
            Ok(row) => {
                savepoint.commit().await?;
                Ok(row.get("id"))
            }
            Err(err) => {
                savepoint.rollback().await?;
                Err(map_insert_error(err, &guest.email))
            }
        }
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if let Some(tx) = self.pending.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn list(&mut self, filter: RecordFilter) -> Result<Vec<GuestRecord>, StoreError> {
        let condition = match filter {
            RecordFilter::All => "TRUE",
            RecordFilter::WithEmail => "btrim(email) <> ''",
        };
        let query =
            format!("SELECT {GUEST_COLUMNS} FROM guest_contacts.guests WHERE {condition} ORDER BY id");
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(guest_from_row).collect())
    }

    async fn list_recent(&mut self, limit: usize) -> Result<Vec<GuestRecord>, StoreError> {
        let query =
            format!("SELECT {GUEST_COLUMNS} FROM guest_contacts.guests ORDER BY id DESC LIMIT $1");
        let rows = sqlx::query(&query)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(guest_from_row).collect())
    }

    async fn delete_by_ids(&mut self, ids: &[i64]) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM guest_contacts.guests WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn copy_table(&mut self) -> Result<String, StoreError> {
        // The name is built from a timestamp only, never from input.
        let name = format!("guests_backup_{}", Local::now().format("%Y%m%d_%H%M%S"));
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "CREATE TABLE guest_contacts.{name} AS TABLE guest_contacts.guests"
        ))
        .execute(&mut *tx)
        .await?;
        let copied: i64 = sqlx::query(&format!("SELECT COUNT(*) AS n FROM guest_contacts.{name}"))
            .fetch_one(&mut *tx)
            .await?
            .get("n");
        let source: i64 = sqlx::query("SELECT COUNT(*) AS n FROM guest_contacts.guests")
            .fetch_one(&mut *tx)
            .await?
            .get("n");
        if copied != source {
            return Err(StoreError::Rejected(format!(
                "backup {name} holds {copied} of {source} records"
            )));
        }
        tx.commit().await?;
        tracing::info!(%name, copied, "table copied");
        Ok(format!("guest_contacts.{name}"))
    }

    async fn count_distinct(
        &mut self,
        window: StayWindow,
        group_by: Option<GroupBy>,
    ) -> Result<Vec<(Option<String>, i64)>, StoreError> {
        let query = match group_by {
            None => format!(
                "SELECT NULL::TEXT AS bucket, COUNT(DISTINCT lower(btrim(email))) AS n \
                 FROM guest_contacts.guests WHERE {OVERLAP}"
            ),
            Some(GroupBy::Hostel) => format!(
                "SELECT NULLIF(btrim(hostel), '') AS bucket, COUNT(DISTINCT lower(btrim(email))) AS n \
                 FROM guest_contacts.guests WHERE {OVERLAP} \
                 GROUP BY NULLIF(btrim(hostel), '')"
            ),
        };
        let rows = sqlx::query(&query)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<Option<String>, _>("bucket"), row.get::<i64, _>("n")))
            .collect())
    }

    async fn table_stats(&mut self) -> Result<TableStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE btrim(email) <> '') AS with_email,
                   COUNT(DISTINCT lower(btrim(email))) FILTER (WHERE btrim(email) <> '') AS unique_emails
            FROM guest_contacts.guests
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let records_with_email: i64 = row.get("with_email");
        let unique_emails: i64 = row.get("unique_emails");
        Ok(TableStats {
            total_records: row.get("total"),
            records_with_email,
            unique_emails,
            duplicates: records_with_email - unique_emails,
        })
    }
}
