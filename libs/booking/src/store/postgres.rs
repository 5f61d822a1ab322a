//! PostgreSQL record store
//!
//! Admission-checked inserts and promotion run inside one transaction that
//! first locks the department row and then the requesting user's row with
//! `SELECT ... FOR UPDATE`. Promotion locks the request row before both.
//! Concurrent writers for the same user or department therefore count and
//! insert one at a time, always acquiring locks in the same order.

use async_trait::async_trait;
use chrono::Utc;
use common::error::{DatabaseError, DatabaseResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Admitted, Promotion, RecordStore};
use crate::admission::{AdmissionCheck, AdmissionCounts, CountScope};
use crate::models::{
    BookingRequest, BookingRequestFilter, BookingStatus, Department, DepartmentCount,
    DepartmentMembership, Meeting, MeetingFilter, MeetingUpdate, NewBookingRequest, NewMeeting,
    NewUser, RequestTransition, TimeWindow, User,
};

const USER_COLUMNS: &str =
    "id, external_id, username, first_name, last_name, is_staff, is_active, created_at, updated_at";

const DEPARTMENT_COLUMNS: &str = "id, name, description, daily_limit, is_active, created_at";

const REQUEST_COLUMNS: &str = "id, department_id, requested_by, title, description, \
     preferred_start_time, duration_minutes, status, rejection_reason, processed_by, \
     processed_at, created_at, updated_at";

const MEETING_COLUMNS: &str = "id, external_meeting_id, title, description, department_id, \
     created_by, start_time, duration_minutes, join_url, passcode, status, is_active, \
     created_at, updated_at";

/// Run the embedded schema migrations
pub async fn migrate(pool: &PgPool) -> DatabaseResult<()> {
    info!("Running booking schema migrations");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        external_id: row.get("external_id"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        is_staff: row.get("is_staff"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn department_from_row(row: &PgRow) -> Department {
    Department {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        daily_limit: row.get("daily_limit"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    }
}

fn request_from_row(row: &PgRow) -> DatabaseResult<BookingRequest> {
    let status: String = row.get("status");
    Ok(BookingRequest {
        id: row.get("id"),
        department_id: row.get("department_id"),
        requested_by: row.get("requested_by"),
        title: row.get("title"),
        description: row.get("description"),
        preferred_start_time: row.get("preferred_start_time"),
        duration_minutes: row.get("duration_minutes"),
        status: status
            .parse()
            .map_err(|e: crate::models::UnknownStatus| DatabaseError::Decode(e.to_string()))?,
        rejection_reason: row.get("rejection_reason"),
        processed_by: row.get("processed_by"),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn meeting_from_row(row: &PgRow) -> DatabaseResult<Meeting> {
    let status: String = row.get("status");
    Ok(Meeting {
        id: row.get("id"),
        external_meeting_id: row.get("external_meeting_id"),
        title: row.get("title"),
        description: row.get("description"),
        department_id: row.get("department_id"),
        created_by: row.get("created_by"),
        start_time: row.get("start_time"),
        duration_minutes: row.get("duration_minutes"),
        join_url: row.get("join_url"),
        passcode: row.get("passcode"),
        status: status
            .parse()
            .map_err(|e: crate::models::UnknownStatus| DatabaseError::Decode(e.to_string()))?,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Record store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Lock the department row, then the user row
    async fn lock_for_admission(
        tx: &mut Transaction<'_, Postgres>,
        check: &AdmissionCheck,
    ) -> DatabaseResult<()> {
        sqlx::query("SELECT id FROM departments WHERE id = $1 FOR UPDATE")
            .bind(check.department_id)
            .fetch_optional(&mut **tx)
            .await?;
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(check.user_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(())
    }

    async fn counts_in(
        tx: &mut Transaction<'_, Postgres>,
        check: &AdmissionCheck,
    ) -> DatabaseResult<AdmissionCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM meetings
                  WHERE created_by = $1 AND is_active
                    AND start_time >= $3 AND start_time < $4) AS user_meetings,
                (SELECT COUNT(*) FROM meetings
                  WHERE department_id = $2 AND is_active
                    AND start_time >= $3 AND start_time < $4) AS department_meetings,
                (SELECT COUNT(*) FROM booking_requests
                  WHERE requested_by = $1 AND status = 'pending'
                    AND preferred_start_time >= $3 AND preferred_start_time < $4) AS user_pending,
                (SELECT COUNT(*) FROM booking_requests
                  WHERE department_id = $2 AND status = 'pending'
                    AND preferred_start_time >= $3 AND preferred_start_time < $4) AS department_pending
            "#,
        )
        .bind(check.user_id)
        .bind(check.department_id)
        .bind(check.window.start)
        .bind(check.window.end)
        .fetch_one(&mut **tx)
        .await?;

        let mut counts = AdmissionCounts {
            user: row.get("user_meetings"),
            department: row.get("department_meetings"),
        };
        if check.include_pending {
            counts.user += row.get::<i64, _>("user_pending");
            counts.department += row.get::<i64, _>("department_pending");
        }
        Ok(counts)
    }

    async fn insert_meeting_in(
        tx: &mut Transaction<'_, Postgres>,
        new_meeting: &NewMeeting,
    ) -> DatabaseResult<Meeting> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO meetings (id, title, description, department_id, created_by,
                                  start_time, duration_minutes, status, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'scheduled', TRUE)
            RETURNING {MEETING_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new_meeting.title)
        .bind(&new_meeting.description)
        .bind(new_meeting.department_id)
        .bind(new_meeting.created_by)
        .bind(new_meeting.start_time)
        .bind(new_meeting.duration_minutes)
        .fetch_one(&mut **tx)
        .await?;

        meeting_from_row(&row)
    }
}

fn push_window(builder: &mut QueryBuilder<'_, Postgres>, column: &str, window: &TimeWindow) {
    builder
        .push(format!(" AND {column} >= "))
        .push_bind(window.start)
        .push(format!(" AND {column} < "))
        .push_bind(window.end);
}

fn push_request_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &BookingRequestFilter) {
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(department_id) = filter.department_id {
        builder.push(" AND department_id = ").push_bind(department_id);
    }
    if let Some(requested_by) = filter.requested_by {
        builder.push(" AND requested_by = ").push_bind(requested_by);
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_user(&self, external_id: i64) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn get_user(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn create_user(&self, new_user: &NewUser) -> DatabaseResult<User> {
        // No-op update so RETURNING yields the existing row on conflict
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, external_id, username, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (external_id) DO UPDATE SET external_id = EXCLUDED.external_id
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new_user.external_id)
        .bind(&new_user.username)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .fetch_one(&self.pool)
        .await?;

        let user = user_from_row(&row);
        debug!("Resolved user {} for external id {}", user.id, user.external_id);
        Ok(user)
    }

    async fn list_active_departments(&self) -> DatabaseResult<Vec<Department>> {
        let rows = sqlx::query(&format!(
            "SELECT {DEPARTMENT_COLUMNS} FROM departments WHERE is_active ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(department_from_row).collect())
    }

    async fn list_departments(&self) -> DatabaseResult<Vec<Department>> {
        let rows = sqlx::query(&format!(
            "SELECT {DEPARTMENT_COLUMNS} FROM departments ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(department_from_row).collect())
    }

    async fn get_department(&self, id: i64) -> DatabaseResult<Option<Department>> {
        let row = sqlx::query(&format!(
            "SELECT {DEPARTMENT_COLUMNS} FROM departments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(department_from_row))
    }

    async fn list_user_departments(&self, user_id: Uuid) -> DatabaseResult<Vec<Department>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.name, d.description, d.daily_limit, d.is_active, d.created_at
            FROM departments d
            JOIN department_admins da ON da.department_id = d.id
            WHERE da.user_id = $1 AND da.is_active AND d.is_active
            ORDER BY d.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(department_from_row).collect())
    }

    async fn list_department_members(
        &self,
        department_id: i64,
    ) -> DatabaseResult<Vec<DepartmentMembership>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, department_id, is_active, created_at
            FROM department_admins
            WHERE department_id = $1 AND is_active
            ORDER BY created_at
            "#,
        )
        .bind(department_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DepartmentMembership {
                user_id: row.get("user_id"),
                department_id: row.get("department_id"),
                is_active: row.get("is_active"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn count_active_meetings(
        &self,
        scope: CountScope,
        window: Option<&TimeWindow>,
    ) -> DatabaseResult<i64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM meetings WHERE is_active");
        match scope {
            CountScope::All => {}
            CountScope::User(user_id) => {
                builder.push(" AND created_by = ").push_bind(user_id);
            }
            CountScope::Department(department_id) => {
                builder.push(" AND department_id = ").push_bind(department_id);
            }
        }
        if let Some(window) = window {
            push_window(&mut builder, "start_time", window);
        }

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_booking_requests(&self, filter: &BookingRequestFilter) -> DatabaseResult<i64> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM booking_requests WHERE TRUE");
        push_request_filter(&mut builder, filter);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn admission_counts(&self, check: &AdmissionCheck) -> DatabaseResult<AdmissionCounts> {
        let mut tx = self.pool.begin().await?;
        let counts = Self::counts_in(&mut tx, check).await?;
        tx.commit().await?;
        Ok(counts)
    }

    async fn create_booking_request(
        &self,
        new_request: &NewBookingRequest,
        admission: &AdmissionCheck,
    ) -> DatabaseResult<Admitted<BookingRequest>> {
        let mut tx = self.pool.begin().await?;
        Self::lock_for_admission(&mut tx, admission).await?;

        if let Err(denied) = admission.evaluate(Self::counts_in(&mut tx, admission).await?) {
            tx.rollback().await?;
            return Ok(Err(denied));
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO booking_requests (id, department_id, requested_by, title, description,
                                          preferred_start_time, duration_minutes, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new_request.department_id)
        .bind(new_request.requested_by)
        .bind(&new_request.title)
        .bind(&new_request.description)
        .bind(new_request.preferred_start_time)
        .bind(new_request.duration_minutes)
        .fetch_one(&mut *tx)
        .await?;

        let request = request_from_row(&row)?;
        tx.commit().await?;
        Ok(Ok(request))
    }

    async fn get_booking_request(&self, id: Uuid) -> DatabaseResult<Option<BookingRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM booking_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn update_booking_request(
        &self,
        id: Uuid,
        expected: BookingStatus,
        transition: &RequestTransition,
    ) -> DatabaseResult<Option<BookingRequest>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE booking_requests
            SET status = $3, rejection_reason = $4, processed_by = $5,
                processed_at = $6, updated_at = $6
            WHERE id = $1 AND status = $2
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(transition.status.as_str())
        .bind(&transition.rejection_reason)
        .bind(transition.processed_by)
        .bind(transition.processed_at)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn promote_booking_request(
        &self,
        id: Uuid,
        transition: &RequestTransition,
        admission: &AdmissionCheck,
    ) -> DatabaseResult<Promotion> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM booking_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(Promotion::NotFound);
        };
        let request = request_from_row(&row)?;
        if request.status != BookingStatus::Pending {
            tx.rollback().await?;
            return Ok(Promotion::AlreadyProcessed(request.status));
        }

        Self::lock_for_admission(&mut tx, admission).await?;
        if let Err(denied) = admission.evaluate(Self::counts_in(&mut tx, admission).await?) {
            tx.rollback().await?;
            return Ok(Promotion::Denied(denied));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE booking_requests
            SET status = $2, rejection_reason = $3, processed_by = $4,
                processed_at = $5, updated_at = $5
            WHERE id = $1
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(transition.status.as_str())
        .bind(&transition.rejection_reason)
        .bind(transition.processed_by)
        .bind(transition.processed_at)
        .fetch_one(&mut *tx)
        .await?;
        let request = request_from_row(&row)?;

        let meeting = Self::insert_meeting_in(
            &mut tx,
            &NewMeeting {
                title: request.title.clone(),
                description: request.description.clone(),
                department_id: request.department_id,
                created_by: request.requested_by,
                start_time: request.preferred_start_time,
                duration_minutes: request.duration_minutes,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(Promotion::Promoted { request, meeting })
    }

    async fn list_booking_requests(
        &self,
        filter: &BookingRequestFilter,
    ) -> DatabaseResult<Vec<BookingRequest>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {REQUEST_COLUMNS} FROM booking_requests WHERE TRUE"
        ));
        push_request_filter(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit.max(0));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn create_meeting(
        &self,
        new_meeting: &NewMeeting,
        admission: &AdmissionCheck,
    ) -> DatabaseResult<Admitted<Meeting>> {
        let mut tx = self.pool.begin().await?;
        Self::lock_for_admission(&mut tx, admission).await?;

        if let Err(denied) = admission.evaluate(Self::counts_in(&mut tx, admission).await?) {
            tx.rollback().await?;
            return Ok(Err(denied));
        }

        let meeting = Self::insert_meeting_in(&mut tx, new_meeting).await?;
        tx.commit().await?;
        Ok(Ok(meeting))
    }

    async fn get_meeting(&self, id: Uuid) -> DatabaseResult<Option<Meeting>> {
        let row = sqlx::query(&format!(
            "SELECT {MEETING_COLUMNS} FROM meetings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(meeting_from_row).transpose()
    }

    async fn update_meeting(
        &self,
        id: Uuid,
        update: &MeetingUpdate,
    ) -> DatabaseResult<Option<Meeting>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE meetings
            SET status = COALESCE($2, status),
                is_active = COALESCE($3, is_active),
                external_meeting_id = COALESCE($4, external_meeting_id),
                join_url = COALESCE($5, join_url),
                passcode = COALESCE($6, passcode),
                updated_at = $7
            WHERE id = $1
            RETURNING {MEETING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.is_active)
        .bind(&update.external_meeting_id)
        .bind(&update.join_url)
        .bind(&update.passcode)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(meeting_from_row).transpose()
    }

    async fn list_meetings(&self, filter: &MeetingFilter) -> DatabaseResult<Vec<Meeting>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {MEETING_COLUMNS} FROM meetings WHERE TRUE"
        ));
        if !filter.include_inactive {
            builder.push(" AND is_active");
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(department_id) = filter.department_id {
            builder.push(" AND department_id = ").push_bind(department_id);
        }
        if let Some(created_by) = filter.created_by {
            builder.push(" AND created_by = ").push_bind(created_by);
        }
        if let Some(window) = &filter.starts_within {
            push_window(&mut builder, "start_time", window);
        }
        builder.push(if filter.ascending {
            " ORDER BY start_time ASC"
        } else {
            " ORDER BY start_time DESC"
        });
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit.max(0));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(meeting_from_row).collect()
    }

    async fn meeting_counts_by_department(&self) -> DatabaseResult<Vec<DepartmentCount>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id AS department_id, d.name AS department_name, COUNT(m.id) AS count
            FROM departments d
            JOIN meetings m ON m.department_id = d.id AND m.is_active
            GROUP BY d.id, d.name
            ORDER BY count DESC, d.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DepartmentCount {
                department_id: row.get("department_id"),
                department_name: row.get("department_name"),
                count: row.get("count"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::database::{DatabaseConfig, init_pool};

    #[test]
    fn test_schema_requires_positive_daily_limit() {
        let schema = include_str!("../../migrations/0001_init.sql");
        assert!(schema.contains("daily_limit INTEGER NOT NULL DEFAULT 5 CHECK (daily_limit > 0)"));
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_zero_daily_limit_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let pool = init_pool(&DatabaseConfig::from_env()?).await?;
        migrate(&pool).await?;

        let name = format!("zero-limit-{}", Uuid::new_v4());
        let inserted = sqlx::query("INSERT INTO departments (name, daily_limit) VALUES ($1, 0)")
            .bind(&name)
            .execute(&pool)
            .await;
        assert!(inserted.is_err());

        let row = sqlx::query("INSERT INTO departments (name) VALUES ($1) RETURNING *")
            .bind(&name)
            .fetch_one(&pool)
            .await?;
        let department = department_from_row(&row);
        assert_eq!(department.name, name);
        assert_eq!(department.daily_limit, 5);
        assert!(department.is_active);

        sqlx::query("DELETE FROM departments WHERE name = $1")
            .bind(&name)
            .execute(&pool)
            .await?;
        Ok(())
    }
}
