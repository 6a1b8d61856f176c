use chrono::{DateTime, Utc};
use shoutout_storage::{
    AccountSlot, AccountSlotId, ApplyAwardParams, AwardWrite, CreateAccountSlotParams,
    CreateOrganizationParams, CreatePayerParams, CreateSubmissionParams,
    CreateWorkflowTaskParams, MarkFailedParams, MarkVerifiedParams, Organization,
    OrganizationId, Payer, PayerId, Platform, RecordRescanParams, SetSubscriptionParams,
    SocialSubmission, Store, StoreError, SubmissionId, SubmissionStatus, TaskStatus,
    WorkflowTask, WorkflowTaskId,
};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteExecutor, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const SUBMISSION_COLUMNS: &str = "id, organization_id, platform, post_url, url_normalized, \
     status, failure_reason, contains_keyword, post_text, likes, comments, shares, \
     days_awarded, scan_count, last_scanned_at, next_scan_at, rescan_workflow_id, \
     submitted_at, verified_at";

const ORGANIZATION_COLUMNS: &str = "id, name, subscription_tier, subscription_expires_at, \
     purchased_slots, payer_id, billing_subscription_id, earned_premium_expires_at, \
     created_at, updated_at";

const TASK_COLUMNS: &str = "id, submission_id, step, delay_ms, next_wake_at, status, \
     lease_expires_at, attempts, created_at, updated_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    /// Open (and migrate) a database, e.g. `sqlite://shoutout.db?mode=rwc`.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(backend)?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Distinguish a missing row from a failed precondition after a guarded update.
    async fn missing_or_conflict(&self, table: &str, id: &Uuid) -> StoreError {
        missing_or_conflict_on(&self.pool, table, id).await
    }
}

async fn missing_or_conflict_on<'e, E: SqliteExecutor<'e>>(
    executor: E,
    table: &str,
    id: &Uuid,
) -> StoreError {
    let query = format!("SELECT 1 FROM {table} WHERE id = ?");
    match sqlx::query(&query)
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
    {
        Ok(Some(_)) => StoreError::Conflict,
        Ok(None) => StoreError::NotFound,
        Err(e) => backend(e),
    }
}

/// Body of `apply_award`, run inside the caller's IMMEDIATE transaction.
async fn apply_award_on(
    conn: &mut SqliteConnection,
    params: &ApplyAwardParams,
) -> Result<(), StoreError> {
    let (used,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(days_awarded), 0) FROM social_submissions
          WHERE organization_id = ? AND status = 'VERIFIED' AND verified_at >= ?",
    )
    .bind(params.organization_id.0.to_string())
    .bind(millis(params.month_start))
    .fetch_one(&mut *conn)
    .await
    .map_err(backend)?;
    if used != params.expected_monthly_used {
        return Err(StoreError::Conflict);
    }

    let write = match &params.write {
        AwardWrite::Verified(p) => mark_verified_query(&params.submission_id, p),
        AwardWrite::Rescan(p) => record_rescan_query(&params.submission_id, p),
    };
    let result = write.execute(&mut *conn).await.map_err(backend)?;
    if result.rows_affected() == 0 {
        return Err(
            missing_or_conflict_on(&mut *conn, "social_submissions", &params.submission_id.0)
                .await,
        );
    }

    if let Some(update) = &params.earned_premium {
        let result = sqlx::query(
            "UPDATE organizations SET earned_premium_expires_at = ?, updated_at = ?
              WHERE id = ? AND earned_premium_expires_at IS ?",
        )
        .bind(millis(update.expires_at))
        .bind(millis(Utc::now()))
        .bind(params.organization_id.0.to_string())
        .bind(opt_millis(update.previous))
        .execute(&mut *conn)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(
                missing_or_conflict_on(&mut *conn, "organizations", &params.organization_id.0)
                    .await,
            );
        }
    }
    Ok(())
}

// ───────────────────────────── Row mapping ─────────────────────────────

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn unique_or_backend(e: sqlx::Error) -> StoreError {
    let s = e.to_string();
    if s.contains("UNIQUE") {
        StoreError::AlreadyExists
    } else {
        StoreError::Backend(s)
    }
}

fn millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn opt_millis(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(millis)
}

fn mark_verified_query<'q>(
    submission_id: &SubmissionId,
    params: &'q MarkVerifiedParams,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    sqlx::query(
        "UPDATE social_submissions
            SET status = 'VERIFIED', failure_reason = NULL, contains_keyword = ?,
                post_text = ?, likes = ?, comments = ?, shares = ?, days_awarded = ?,
                scan_count = 1, last_scanned_at = ?, verified_at = ?, next_scan_at = ?
          WHERE id = ? AND status = 'VERIFYING'",
    )
    .bind(params.metrics.contains_keyword)
    .bind(&params.metrics.post_text)
    .bind(params.metrics.likes)
    .bind(params.metrics.comments)
    .bind(params.metrics.shares)
    .bind(params.days_awarded)
    .bind(millis(params.verified_at))
    .bind(millis(params.verified_at))
    .bind(opt_millis(params.next_scan_at))
    .bind(submission_id.0.to_string())
}

fn record_rescan_query<'q>(
    submission_id: &SubmissionId,
    params: &'q RecordRescanParams,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    sqlx::query(
        "UPDATE social_submissions
            SET contains_keyword = ?, post_text = ?, likes = ?, comments = ?, shares = ?,
                days_awarded = ?, scan_count = ?, last_scanned_at = ?, next_scan_at = ?
          WHERE id = ? AND status = 'VERIFIED' AND scan_count < ?",
    )
    .bind(params.metrics.contains_keyword)
    .bind(&params.metrics.post_text)
    .bind(params.metrics.likes)
    .bind(params.metrics.comments)
    .bind(params.metrics.shares)
    .bind(params.days_awarded)
    .bind(params.scan_number)
    .bind(millis(params.scanned_at))
    .bind(opt_millis(params.next_scan_at))
    .bind(submission_id.0.to_string())
    .bind(params.scan_number)
}

fn ts(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {ms}")))
}

fn opt_ts(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    ms.map(ts).transpose()
}

fn uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(|e| StoreError::Backend(e.to_string()))
}

fn parse_enum<T: FromStr>(s: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    s.parse::<T>()
        .map_err(|e| StoreError::Backend(e.to_string()))
}

fn payer_from_row(row: &SqliteRow) -> Result<Payer, StoreError> {
    Ok(Payer {
        id: PayerId(uuid(row.try_get("id").map_err(backend)?)?),
        email: row.try_get("email").map_err(backend)?,
        billing_customer_id: row.try_get("billing_customer_id").map_err(backend)?,
        created_at: ts(row.try_get("created_at").map_err(backend)?)?,
    })
}

fn organization_from_row(row: &SqliteRow) -> Result<Organization, StoreError> {
    let payer_id: Option<String> = row.try_get("payer_id").map_err(backend)?;
    Ok(Organization {
        id: OrganizationId(uuid(row.try_get("id").map_err(backend)?)?),
        name: row.try_get("name").map_err(backend)?,
        subscription_tier: parse_enum(row.try_get("subscription_tier").map_err(backend)?)?,
        subscription_expires_at: opt_ts(
            row.try_get("subscription_expires_at").map_err(backend)?,
        )?,
        purchased_slots: row.try_get("purchased_slots").map_err(backend)?,
        payer_id: payer_id.as_deref().map(uuid).transpose()?.map(PayerId),
        billing_subscription_id: row.try_get("billing_subscription_id").map_err(backend)?,
        earned_premium_expires_at: opt_ts(
            row.try_get("earned_premium_expires_at").map_err(backend)?,
        )?,
        created_at: ts(row.try_get("created_at").map_err(backend)?)?,
        updated_at: ts(row.try_get("updated_at").map_err(backend)?)?,
    })
}

fn slot_from_row(row: &SqliteRow) -> Result<AccountSlot, StoreError> {
    Ok(AccountSlot {
        id: AccountSlotId(uuid(row.try_get("id").map_err(backend)?)?),
        organization_id: OrganizationId(uuid(row.try_get("organization_id").map_err(backend)?)?),
        name: row.try_get("name").map_err(backend)?,
        status: parse_enum(row.try_get("status").map_err(backend)?)?,
        created_at: ts(row.try_get("created_at").map_err(backend)?)?,
        updated_at: ts(row.try_get("updated_at").map_err(backend)?)?,
    })
}

fn submission_from_row(row: &SqliteRow) -> Result<SocialSubmission, StoreError> {
    let failure_reason: Option<String> = row.try_get("failure_reason").map_err(backend)?;
    let workflow_id: Option<String> = row.try_get("rescan_workflow_id").map_err(backend)?;
    Ok(SocialSubmission {
        id: SubmissionId(uuid(row.try_get("id").map_err(backend)?)?),
        organization_id: OrganizationId(uuid(row.try_get("organization_id").map_err(backend)?)?),
        platform: parse_enum(row.try_get("platform").map_err(backend)?)?,
        post_url: row.try_get("post_url").map_err(backend)?,
        url_normalized: row.try_get("url_normalized").map_err(backend)?,
        status: parse_enum(row.try_get("status").map_err(backend)?)?,
        failure_reason: failure_reason.as_deref().map(parse_enum).transpose()?,
        contains_keyword: row.try_get("contains_keyword").map_err(backend)?,
        post_text: row.try_get("post_text").map_err(backend)?,
        likes: row.try_get("likes").map_err(backend)?,
        comments: row.try_get("comments").map_err(backend)?,
        shares: row.try_get("shares").map_err(backend)?,
        days_awarded: row.try_get("days_awarded").map_err(backend)?,
        scan_count: row.try_get("scan_count").map_err(backend)?,
        last_scanned_at: opt_ts(row.try_get("last_scanned_at").map_err(backend)?)?,
        next_scan_at: opt_ts(row.try_get("next_scan_at").map_err(backend)?)?,
        rescan_workflow_id: workflow_id.as_deref().map(uuid).transpose()?.map(WorkflowTaskId),
        submitted_at: ts(row.try_get("submitted_at").map_err(backend)?)?,
        verified_at: opt_ts(row.try_get("verified_at").map_err(backend)?)?,
    })
}

fn task_from_row(row: &SqliteRow) -> Result<WorkflowTask, StoreError> {
    Ok(WorkflowTask {
        id: WorkflowTaskId(uuid(row.try_get("id").map_err(backend)?)?),
        submission_id: SubmissionId(uuid(row.try_get("submission_id").map_err(backend)?)?),
        step: row.try_get("step").map_err(backend)?,
        delay_ms: row.try_get("delay_ms").map_err(backend)?,
        next_wake_at: ts(row.try_get("next_wake_at").map_err(backend)?)?,
        status: parse_enum(row.try_get("status").map_err(backend)?)?,
        lease_expires_at: opt_ts(row.try_get("lease_expires_at").map_err(backend)?)?,
        attempts: row.try_get("attempts").map_err(backend)?,
        created_at: ts(row.try_get("created_at").map_err(backend)?)?,
        updated_at: ts(row.try_get("updated_at").map_err(backend)?)?,
    })
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Payers ─────────────────────────────

    async fn create_payer(&self, params: &CreatePayerParams) -> Result<Payer, StoreError> {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO payers(id, email, billing_customer_id, created_at) VALUES(?,?,?,?)")
            .bind(id.to_string())
            .bind(&params.email)
            .bind(&params.billing_customer_id)
            .bind(millis(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(unique_or_backend)?;
        self.get_payer(&PayerId(id)).await
    }

    async fn get_payer(&self, payer_id: &PayerId) -> Result<Payer, StoreError> {
        let row = sqlx::query("SELECT id, email, billing_customer_id, created_at FROM payers WHERE id = ?")
            .bind(payer_id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            None => Err(StoreError::NotFound),
            Some(row) => payer_from_row(&row),
        }
    }

    // ───────────────────────────── Organizations ─────────────────────────────

    async fn create_organization(
        &self,
        params: &CreateOrganizationParams,
    ) -> Result<Organization, StoreError> {
        let id = Uuid::now_v7();
        let now = millis(Utc::now());
        sqlx::query(
            "INSERT INTO organizations(id, name, subscription_tier, purchased_slots, payer_id, created_at, updated_at)
             VALUES(?, ?, 'FREE', 0, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&params.name)
        .bind(params.payer_id.as_ref().map(|p| p.0.to_string()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(unique_or_backend)?;
        self.get_organization(&OrganizationId(id)).await
    }

    async fn get_organization(&self, org_id: &OrganizationId) -> Result<Organization, StoreError> {
        let query = format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(org_id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            None => Err(StoreError::NotFound),
            Some(row) => organization_from_row(&row),
        }
    }

    async fn set_organization_subscription(
        &self,
        org_id: &OrganizationId,
        params: &SetSubscriptionParams,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE organizations
                SET subscription_tier = ?, subscription_expires_at = ?, purchased_slots = ?,
                    payer_id = ?, billing_subscription_id = ?, updated_at = ?
              WHERE id = ?",
        )
        .bind(params.tier.as_str())
        .bind(opt_millis(params.expires_at))
        .bind(params.purchased_slots)
        .bind(params.payer_id.as_ref().map(|p| p.0.to_string()))
        .bind(&params.billing_subscription_id)
        .bind(millis(Utc::now()))
        .bind(org_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn clear_organization_billing(
        &self,
        org_id: &OrganizationId,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE organizations SET payer_id = NULL, billing_subscription_id = NULL, updated_at = ?
              WHERE id = ?",
        )
        .bind(millis(Utc::now()))
        .bind(org_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_purchased_slots(
        &self,
        org_id: &OrganizationId,
        purchased_slots: i32,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE organizations SET purchased_slots = ?, updated_at = ? WHERE id = ?")
                .bind(purchased_slots)
                .bind(millis(Utc::now()))
                .bind(org_id.0.to_string())
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_earned_premium_expires_at(
        &self,
        org_id: &OrganizationId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE organizations SET earned_premium_expires_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(millis(expires_at))
        .bind(millis(Utc::now()))
        .bind(org_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ───────────────────────────── Account Slots ─────────────────────────────

    async fn create_account_slot(
        &self,
        params: &CreateAccountSlotParams,
    ) -> Result<AccountSlot, StoreError> {
        let id = Uuid::now_v7();
        let now = millis(Utc::now());
        sqlx::query(
            "INSERT INTO account_slots(id, organization_id, name, status, created_at, updated_at)
             VALUES(?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(params.organization_id.0.to_string())
        .bind(&params.name)
        .bind(params.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(unique_or_backend)?;

        let row = sqlx::query(
            "SELECT id, organization_id, name, status, created_at, updated_at
               FROM account_slots WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        slot_from_row(&row)
    }

    async fn list_account_slots(
        &self,
        org_id: &OrganizationId,
    ) -> Result<Vec<AccountSlot>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, organization_id, name, status, created_at, updated_at
               FROM account_slots WHERE organization_id = ?
              ORDER BY created_at, id",
        )
        .bind(org_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(slot_from_row).collect()
    }

    async fn count_active_account_slots(
        &self,
        org_id: &OrganizationId,
    ) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM account_slots WHERE organization_id = ? AND status != 'DISABLED'",
        )
        .bind(org_id.0.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(count)
    }

    async fn disable_account_slots(&self, slot_ids: &[AccountSlotId]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = millis(Utc::now());
        let mut changed = 0;
        for slot_id in slot_ids {
            let result = sqlx::query(
                "UPDATE account_slots SET status = 'DISABLED', updated_at = ?
                  WHERE id = ? AND status != 'DISABLED'",
            )
            .bind(now)
            .bind(slot_id.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
            changed += result.rows_affected();
        }
        tx.commit().await.map_err(backend)?;
        Ok(changed)
    }

    // ───────────────────────────── Submissions ─────────────────────────────

    async fn create_submission(
        &self,
        params: &CreateSubmissionParams,
    ) -> Result<SocialSubmission, StoreError> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO social_submissions(id, organization_id, platform, post_url, url_normalized, status, submitted_at)
             VALUES(?, ?, ?, ?, ?, 'VERIFYING', ?)",
        )
        .bind(id.to_string())
        .bind(params.organization_id.0.to_string())
        .bind(params.platform.as_str())
        .bind(&params.post_url)
        .bind(&params.url_normalized)
        .bind(millis(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(unique_or_backend)?;
        self.get_submission(&SubmissionId(id)).await
    }

    async fn get_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SocialSubmission, StoreError> {
        let query = format!("SELECT {SUBMISSION_COLUMNS} FROM social_submissions WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(submission_id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            None => Err(StoreError::NotFound),
            Some(row) => submission_from_row(&row),
        }
    }

    async fn get_submission_by_url(
        &self,
        url_normalized: &str,
    ) -> Result<SocialSubmission, StoreError> {
        let query =
            format!("SELECT {SUBMISSION_COLUMNS} FROM social_submissions WHERE url_normalized = ?");
        let row = sqlx::query(&query)
            .bind(url_normalized)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            None => Err(StoreError::NotFound),
            Some(row) => submission_from_row(&row),
        }
    }

    async fn list_submissions(
        &self,
        org_id: &OrganizationId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SocialSubmission>, StoreError> {
        let query = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM social_submissions
              WHERE organization_id = ?
              ORDER BY submitted_at DESC, id DESC
              LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&query)
            .bind(org_id.0.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(submission_from_row).collect()
    }

    async fn list_verified_captions(
        &self,
        org_id: &OrganizationId,
        platform: Platform,
        since: DateTime<Utc>,
        exclude: &SubmissionId,
    ) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT post_text FROM social_submissions
              WHERE organization_id = ? AND platform = ? AND status = 'VERIFIED'
                AND verified_at >= ? AND id != ? AND post_text IS NOT NULL",
        )
        .bind(org_id.0.to_string())
        .bind(platform.as_str())
        .bind(millis(since))
        .bind(exclude.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(|(text,)| text).collect())
    }

    async fn sum_days_awarded_since(
        &self,
        org_id: &OrganizationId,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let (sum,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(days_awarded), 0) FROM social_submissions
              WHERE organization_id = ? AND status = 'VERIFIED' AND verified_at >= ?",
        )
        .bind(org_id.0.to_string())
        .bind(millis(since))
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(sum)
    }

    async fn reset_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SocialSubmission, StoreError> {
        let result = sqlx::query(
            "UPDATE social_submissions
                SET status = 'VERIFYING', failure_reason = NULL, contains_keyword = 0,
                    post_text = NULL, likes = 0, comments = 0, shares = 0, days_awarded = 0,
                    scan_count = 0, last_scanned_at = NULL, next_scan_at = NULL,
                    rescan_workflow_id = NULL, verified_at = NULL, submitted_at = ?
              WHERE id = ? AND status = 'FAILED'",
        )
        .bind(millis(Utc::now()))
        .bind(submission_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(self
                .missing_or_conflict("social_submissions", &submission_id.0)
                .await);
        }
        self.get_submission(submission_id).await
    }

    async fn mark_submission_verified(
        &self,
        submission_id: &SubmissionId,
        params: &MarkVerifiedParams,
    ) -> Result<(), StoreError> {
        let result = mark_verified_query(submission_id, params)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(self
                .missing_or_conflict("social_submissions", &submission_id.0)
                .await);
        }
        Ok(())
    }

    async fn mark_submission_failed(
        &self,
        submission_id: &SubmissionId,
        params: &MarkFailedParams,
    ) -> Result<(), StoreError> {
        let metrics = params.metrics.as_ref();
        let result = sqlx::query(
            "UPDATE social_submissions
                SET status = 'FAILED', failure_reason = ?,
                    contains_keyword = COALESCE(?, contains_keyword),
                    post_text = COALESCE(?, post_text),
                    likes = COALESCE(?, likes),
                    comments = COALESCE(?, comments),
                    shares = COALESCE(?, shares),
                    days_awarded = 0, last_scanned_at = ?, next_scan_at = NULL
              WHERE id = ? AND status = 'VERIFYING'",
        )
        .bind(params.reason.as_str())
        .bind(metrics.map(|m| m.contains_keyword))
        .bind(metrics.map(|m| m.post_text.clone()))
        .bind(metrics.map(|m| m.likes))
        .bind(metrics.map(|m| m.comments))
        .bind(metrics.map(|m| m.shares))
        .bind(millis(params.scanned_at))
        .bind(submission_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(self
                .missing_or_conflict("social_submissions", &submission_id.0)
                .await);
        }
        Ok(())
    }

    async fn record_rescan(
        &self,
        submission_id: &SubmissionId,
        params: &RecordRescanParams,
    ) -> Result<bool, StoreError> {
        let result = record_rescan_query(submission_id, params)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() == 1)
    }

    async fn apply_award(&self, params: &ApplyAwardParams) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        // Take the write lock up front so other processes queue on BEGIN instead of
        // failing to upgrade a read lock.
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(backend)?;

        let applied = apply_award_on(&mut *conn, params).await;
        let end = if applied.is_ok() { "COMMIT" } else { "ROLLBACK" };
        if let Err(e) = sqlx::query(end).execute(&mut *conn).await {
            // Never hand a connection with an open transaction back to the pool.
            drop(conn.detach());
            return Err(backend(e));
        }
        applied
    }

    async fn set_next_scan_at(
        &self,
        submission_id: &SubmissionId,
        next_scan_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE social_submissions SET next_scan_at = ? WHERE id = ? AND status = 'VERIFIED'",
        )
        .bind(opt_millis(next_scan_at))
        .bind(submission_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(self
                .missing_or_conflict("social_submissions", &submission_id.0)
                .await);
        }
        Ok(())
    }

    async fn set_rescan_workflow_id(
        &self,
        submission_id: &SubmissionId,
        workflow_id: Option<WorkflowTaskId>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE social_submissions SET rescan_workflow_id = ? WHERE id = ?")
            .bind(workflow_id.map(|w| w.0.to_string()))
            .bind(submission_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn revoke_submission(&self, submission_id: &SubmissionId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE social_submissions SET status = ?, next_scan_at = NULL
              WHERE id = ? AND status = ?",
        )
        .bind(SubmissionStatus::Revoked.as_str())
        .bind(submission_id.0.to_string())
        .bind(SubmissionStatus::Verified.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(self
                .missing_or_conflict("social_submissions", &submission_id.0)
                .await);
        }
        Ok(())
    }

    async fn delete_submission(&self, submission_id: &SubmissionId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("DELETE FROM workflow_tasks WHERE submission_id = ?")
            .bind(submission_id.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        let result = sqlx::query("DELETE FROM social_submissions WHERE id = ?")
            .bind(submission_id.0.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    // ───────────────────────────── Workflow Tasks ─────────────────────────────

    async fn create_workflow_task(
        &self,
        params: &CreateWorkflowTaskParams,
    ) -> Result<WorkflowTask, StoreError> {
        let id = Uuid::now_v7();
        let now = millis(Utc::now());
        sqlx::query(
            "INSERT INTO workflow_tasks(id, submission_id, step, delay_ms, next_wake_at, status, attempts, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, 'PENDING', 0, ?, ?)",
        )
        .bind(id.to_string())
        .bind(params.submission_id.0.to_string())
        .bind(params.step)
        .bind(params.delay_ms)
        .bind(millis(params.next_wake_at))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(unique_or_backend)?;
        self.get_workflow_task(&WorkflowTaskId(id)).await
    }

    async fn get_workflow_task(
        &self,
        task_id: &WorkflowTaskId,
    ) -> Result<WorkflowTask, StoreError> {
        let query = format!("SELECT {TASK_COLUMNS} FROM workflow_tasks WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(task_id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            None => Err(StoreError::NotFound),
            Some(row) => task_from_row(&row),
        }
    }

    async fn find_open_workflow_task(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<WorkflowTask>, StoreError> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM workflow_tasks
              WHERE submission_id = ? AND status != 'COMPLETED'
              ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(submission_id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn claim_workflow_task(
        &self,
        task_id: &WorkflowTaskId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<WorkflowTask>, StoreError> {
        let result = sqlx::query(
            "UPDATE workflow_tasks
                SET status = 'RUNNING', lease_expires_at = ?, attempts = attempts + 1, updated_at = ?
              WHERE id = ?
                AND (status = 'PENDING' OR (status = 'RUNNING' AND lease_expires_at <= ?))",
        )
        .bind(millis(lease_until))
        .bind(millis(now))
        .bind(task_id.0.to_string())
        .bind(millis(now))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_workflow_task(task_id).await.map(Some)
    }

    async fn claim_due_workflow_tasks(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WorkflowTask>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let query = format!(
            "SELECT {TASK_COLUMNS} FROM workflow_tasks
              WHERE (status = 'PENDING' AND next_wake_at <= ?)
                 OR (status = 'RUNNING' AND lease_expires_at <= ?)
              ORDER BY next_wake_at, id
              LIMIT ?"
        );
        let rows = sqlx::query(&query)
            .bind(millis(now))
            .bind(millis(now))
            .bind(limit)
            .fetch_all(&mut *tx)
            .await
            .map_err(backend)?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut task = task_from_row(row)?;
            let result = sqlx::query(
                "UPDATE workflow_tasks
                    SET status = 'RUNNING', lease_expires_at = ?, attempts = attempts + 1, updated_at = ?
                  WHERE id = ?
                    AND (status = 'PENDING' OR (status = 'RUNNING' AND lease_expires_at <= ?))",
            )
            .bind(millis(lease_until))
            .bind(millis(now))
            .bind(task.id.0.to_string())
            .bind(millis(now))
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
            if result.rows_affected() == 1 {
                task.status = TaskStatus::Running;
                task.lease_expires_at = Some(lease_until);
                task.attempts += 1;
                task.updated_at = now;
                claimed.push(task);
            }
        }

        tx.commit().await.map_err(backend)?;
        Ok(claimed)
    }

    async fn reschedule_workflow_task(
        &self,
        task_id: &WorkflowTaskId,
        step: i32,
        next_wake_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE workflow_tasks
                SET status = 'PENDING', step = ?, next_wake_at = ?, lease_expires_at = NULL, updated_at = ?
              WHERE id = ? AND status != 'COMPLETED'",
        )
        .bind(step)
        .bind(millis(next_wake_at))
        .bind(millis(Utc::now()))
        .bind(task_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(self.missing_or_conflict("workflow_tasks", &task_id.0).await);
        }
        Ok(())
    }

    async fn complete_workflow_task(&self, task_id: &WorkflowTaskId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE workflow_tasks SET status = 'COMPLETED', lease_expires_at = NULL, updated_at = ?
              WHERE id = ?",
        )
        .bind(millis(Utc::now()))
        .bind(task_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
