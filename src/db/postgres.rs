use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::{
    db::store::ReminderStore,
    models::{
        customer::Customer,
        group::GroupWithMembers,
        reminder::{
            CreateReminderRequest, FileMeta, PopulatedReminder, Reminder, ReminderQuery,
            UpdateReminderRequest, DEFAULT_KIND, DEFAULT_RECURRENCE,
        },
    },
};

/// Explicit column list for reminders, including the ordered reference
/// arrays. All queries must alias the reminders table as `r`.
const REMINDER_COLS: &str = "r.id, r.title, r.type AS kind, r.notes, r.date, r.recurrence,
     r.image, r.video,
     ARRAY(SELECT rr.customer_id FROM reminder_recipients rr
           WHERE rr.reminder_id = r.id ORDER BY rr.position) AS recipients,
     ARRAY(SELECT rg.group_id FROM reminder_groups rg
           WHERE rg.reminder_id = r.id ORDER BY rg.position) AS groups,
     r.created_at, r.updated_at";

const CUSTOMER_COLS: &str = "c.id, c.name, c.email, c.phone, c.preferred_delivery, c.created_at";

#[derive(FromRow)]
struct ReminderRow {
    id: Uuid,
    title: String,
    kind: String,
    notes: Option<String>,
    date: DateTime<Utc>,
    recurrence: String,
    image: Option<Json<FileMeta>>,
    video: Option<Json<FileMeta>>,
    recipients: Vec<Uuid>,
    groups: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReminderRow> for Reminder {
    fn from(row: ReminderRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            kind: row.kind,
            notes: row.notes,
            date: row.date,
            recurrence: row.recurrence,
            recipients: row.recipients,
            groups: row.groups,
            image: row.image.map(|j| j.0),
            video: row.video.map(|j| j.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MemberRow {
    group_id: Uuid,
    #[sqlx(flatten)]
    customer: Customer,
}

pub struct PgReminderStore {
    pool: PgPool,
}

impl PgReminderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn customers_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Customer>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLS} FROM customers c WHERE c.id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id: HashMap<Uuid, Customer> = rows.into_iter().map(|c| (c.id, c)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn groups_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<GroupWithMembers>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let groups: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, name FROM groups WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;

        let members = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT gm.group_id, {CUSTOMER_COLS}
             FROM group_members gm
             JOIN customers c ON c.id = gm.customer_id
             WHERE gm.group_id = ANY($1)
             ORDER BY gm.group_id, gm.position"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut members_by_group: HashMap<Uuid, Vec<Customer>> = HashMap::new();
        for row in members {
            members_by_group
                .entry(row.group_id)
                .or_default()
                .push(row.customer);
        }

        let mut by_id: HashMap<Uuid, GroupWithMembers> = groups
            .into_iter()
            .map(|(id, name)| {
                let members = members_by_group.remove(&id).unwrap_or_default();
                (id, GroupWithMembers { id, name, members })
            })
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

/// Replace the ordered customer references of a reminder.
async fn set_recipients(
    tx: &mut Transaction<'_, Postgres>,
    reminder_id: Uuid,
    customer_ids: &[Uuid],
) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM reminder_recipients WHERE reminder_id = $1")
        .bind(reminder_id)
        .execute(&mut **tx)
        .await?;
    if !customer_ids.is_empty() {
        sqlx::query(
            "INSERT INTO reminder_recipients (reminder_id, customer_id, position)
             SELECT $1, t.customer_id, (t.ord - 1)::INT
             FROM UNNEST($2::UUID[]) WITH ORDINALITY AS t(customer_id, ord)
             ON CONFLICT DO NOTHING",
        )
        .bind(reminder_id)
        .bind(customer_ids)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Replace the ordered group references of a reminder.
async fn set_groups(
    tx: &mut Transaction<'_, Postgres>,
    reminder_id: Uuid,
    group_ids: &[Uuid],
) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM reminder_groups WHERE reminder_id = $1")
        .bind(reminder_id)
        .execute(&mut **tx)
        .await?;
    if !group_ids.is_empty() {
        sqlx::query(
            "INSERT INTO reminder_groups (reminder_id, group_id, position)
             SELECT $1, t.group_id, (t.ord - 1)::INT
             FROM UNNEST($2::UUID[]) WITH ORDINALITY AS t(group_id, ord)
             ON CONFLICT DO NOTHING",
        )
        .bind(reminder_id)
        .bind(group_ids)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl ReminderStore for PgReminderStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Reminder>> {
        let row = sqlx::query_as::<_, ReminderRow>(&format!(
            "SELECT {REMINDER_COLS} FROM reminders r WHERE r.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Reminder::from))
    }

    async fn find_populated(&self, id: Uuid) -> anyhow::Result<Option<PopulatedReminder>> {
        let Some(reminder) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let recipients = self.customers_by_ids(&reminder.recipients).await?;
        let groups = self.groups_by_ids(&reminder.groups).await?;
        Ok(Some(PopulatedReminder {
            reminder,
            recipients,
            groups,
        }))
    }

    async fn find(&self, query: &ReminderQuery) -> anyhow::Result<Vec<Reminder>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {REMINDER_COLS} FROM reminders r WHERE TRUE"
        ));
        if let Some(after) = query.due_after {
            qb.push(" AND r.date > ").push_bind(after);
        }
        if let Some(before) = query.due_before {
            qb.push(" AND r.date <= ").push_bind(before);
        }
        if let Some(customer_id) = query.recipient {
            qb.push(
                " AND EXISTS (SELECT 1 FROM reminder_recipients rr
                   WHERE rr.reminder_id = r.id AND rr.customer_id = ",
            )
            .push_bind(customer_id)
            .push(")");
        }
        if let Some(group_id) = query.group {
            qb.push(
                " AND EXISTS (SELECT 1 FROM reminder_groups rg
                   WHERE rg.reminder_id = r.id AND rg.group_id = ",
            )
            .push_bind(group_id)
            .push(")");
        }
        qb.push(" ORDER BY r.date DESC");

        let rows = qb
            .build_query_as::<ReminderRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Reminder::from).collect())
    }

    async fn insert(&self, req: &CreateReminderRequest) -> anyhow::Result<Reminder> {
        let mut tx = self.pool.begin().await?;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO reminders (title, type, notes, date, recurrence, image, video)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(&req.title)
        .bind(req.kind.as_deref().unwrap_or(DEFAULT_KIND))
        .bind(&req.notes)
        .bind(req.date)
        .bind(req.recurrence.as_deref().unwrap_or(DEFAULT_RECURRENCE))
        .bind(req.image.clone().map(Json))
        .bind(req.video.clone().map(Json))
        .fetch_one(&mut *tx)
        .await?;

        set_recipients(&mut tx, id, &req.recipients).await?;
        set_groups(&mut tx, id, &req.groups).await?;
        tx.commit().await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Reminder {id} vanished after insert"))
    }

    async fn update(
        &self,
        id: Uuid,
        req: &UpdateReminderRequest,
    ) -> anyhow::Result<Option<Reminder>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE reminders
             SET title = COALESCE($1, title),
                 type = COALESCE($2, type),
                 notes = COALESCE($3, notes),
                 date = COALESCE($4, date),
                 recurrence = COALESCE($5, recurrence),
                 image = COALESCE($6, image),
                 video = COALESCE($7, video),
                 updated_at = NOW()
             WHERE id = $8",
        )
        .bind(&req.title)
        .bind(&req.kind)
        .bind(&req.notes)
        .bind(req.date)
        .bind(&req.recurrence)
        .bind(req.image.clone().map(Json))
        .bind(req.video.clone().map(Json))
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Ok(None);
        }
        if let Some(recipients) = &req.recipients {
            set_recipients(&mut tx, id, recipients).await?;
        }
        if let Some(groups) = &req.groups {
            set_groups(&mut tx, id, groups).await?;
        }
        tx.commit().await?;

        self.find_by_id(id).await
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let deleted = sqlx::query("DELETE FROM reminders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }
}
