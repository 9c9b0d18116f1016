use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use ridepool_core::repository::RuleRepository;
use ridepool_core::{CoreError, CoreResult, Rule};
use sqlx::PgPool;

const RULE_COLUMNS: &str = "id, owner_uid, origin_id, destination_id, weekdays, departure_time, price, seats, \
     vehicle_photo_url, start_date, end_date, active, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: String,
    owner_uid: String,
    origin_id: String,
    destination_id: String,
    weekdays: Vec<i16>,
    departure_time: NaiveTime,
    price: f64,
    seats: i32,
    vehicle_photo_url: Option<String>,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RuleRow> for Rule {
    fn from(row: RuleRow) -> Self {
        Rule {
            id: row.id,
            owner_uid: row.owner_uid,
            origin_id: row.origin_id,
            destination_id: row.destination_id,
            // the column CHECK keeps these in 0..=6
            weekdays: row
                .weekdays
                .into_iter()
                .filter_map(|d| u8::try_from(d).ok())
                .collect(),
            time: row.departure_time,
            price: row.price,
            seats: row.seats,
            vehicle_photo_url: row.vehicle_photo_url,
            start_date: row.start_date,
            end_date: row.end_date,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PgRuleRepository {
    pool: PgPool,
}

impl PgRuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleRepository for PgRuleRepository {
    async fn get_rule(&self, id: &str) -> CoreResult<Option<Rule>> {
        let row = sqlx::query_as::<_, RuleRow>(&format!("SELECT {} FROM rules WHERE id = $1", RULE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::storage)?;
        Ok(row.map(Rule::from))
    }

    async fn upsert_rule(&self, rule: &Rule) -> CoreResult<()> {
        let weekdays: Vec<i16> = rule.weekdays.iter().map(|d| i16::from(*d)).collect();
        sqlx::query(
            r#"
            INSERT INTO rules (id, owner_uid, origin_id, destination_id, weekdays, departure_time, price,
                               seats, vehicle_photo_url, start_date, end_date, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                origin_id = EXCLUDED.origin_id,
                destination_id = EXCLUDED.destination_id,
                weekdays = EXCLUDED.weekdays,
                departure_time = EXCLUDED.departure_time,
                price = EXCLUDED.price,
                seats = EXCLUDED.seats,
                vehicle_photo_url = EXCLUDED.vehicle_photo_url,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                active = EXCLUDED.active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.owner_uid)
        .bind(&rule.origin_id)
        .bind(&rule.destination_id)
        .bind(&weekdays)
        .bind(rule.time)
        .bind(rule.price)
        .bind(rule.seats)
        .bind(&rule.vehicle_photo_url)
        .bind(rule.start_date)
        .bind(rule.end_date)
        .bind(rule.active)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(CoreError::storage)?;
        Ok(())
    }

    async fn delete_rule(&self, id: &str) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_rules_for_owner(&self, owner_uid: &str) -> CoreResult<Vec<Rule>> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {} FROM rules WHERE owner_uid = $1 ORDER BY created_at DESC",
            RULE_COLUMNS
        ))
        .bind(owner_uid)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::storage)?;
        Ok(rows.into_iter().map(Rule::from).collect())
    }

    async fn list_active_rules(&self) -> CoreResult<Vec<Rule>> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {} FROM rules WHERE active ORDER BY id",
            RULE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::storage)?;
        Ok(rows.into_iter().map(Rule::from).collect())
    }
}
