//! Project storage
//!
//! Projects belong to at most one user, the person in charge. Deleting that
//! user leaves the project unowned. Two implementations share the
//! [`ProjectStore`] trait, mirroring the user store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;

use crate::{Result, RosterError};

pub const PAGE_DEFAULT: i64 = 1;
pub const PER_PAGE_DEFAULT: i64 = 20;
pub const PER_PAGE_MAX: i64 = 100;
pub const PROJECT_NAME_MAX_LEN: usize = 255;

const NAME_TAKEN: &str = "Project with this name already exists";
pub const OWNER_MISSING: &str = "Person in charge does not exist";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    New,
    InProgress,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::New => "new",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(ProjectStatus::New),
            "in_progress" => Ok(ProjectStatus::InProgress),
            "completed" => Ok(ProjectStatus::Completed),
            other => Err(RosterError::ValidationError(format!(
                "unknown project status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    pub id: i64,
    pub name: String,
    pub status: ProjectStatus,
    pub description: Option<String>,
    pub person_in_charge: Option<i64>,
    pub create_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub complete_time: Option<DateTime<Utc>>,
}

impl ProjectRecord {
    /// Whether `user_id` may change or delete this project
    ///
    /// Unowned projects are open to every authenticated user.
    pub fn is_managed_by(&self, user_id: i64) -> bool {
        self.person_in_charge.map_or(true, |owner| owner == user_id)
    }
}

/// Data required to create a project
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub status: ProjectStatus,
    pub description: Option<String>,
    pub person_in_charge: Option<i64>,
}

/// Partial update; `None` leaves a field unchanged. The name and creation
/// time are fixed once a project exists.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub status: Option<ProjectStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub complete_time: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub person_in_charge: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectOrder {
    #[default]
    CreateTime,
    StartTime,
    CompleteTime,
}

impl ProjectOrder {
    fn column(&self) -> &'static str {
        match self {
            ProjectOrder::CreateTime => "create_time",
            ProjectOrder::StartTime => "start_time",
            ProjectOrder::CompleteTime => "complete_time",
        }
    }

    fn key(&self, project: &ProjectRecord) -> Option<DateTime<Utc>> {
        match self {
            ProjectOrder::CreateTime => Some(project.create_time),
            ProjectOrder::StartTime => project.start_time,
            ProjectOrder::CompleteTime => project.complete_time,
        }
    }
}

/// Listing filter and page selection
#[derive(Debug, Clone)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub person_id: Option<i64>,
    pub order_by: ProjectOrder,
    pub desc: bool,
    pub page: i64,
    pub per_page: i64,
}

impl Default for ProjectFilter {
    fn default() -> Self {
        Self {
            status: None,
            person_id: None,
            order_by: ProjectOrder::default(),
            desc: true,
            page: PAGE_DEFAULT,
            per_page: PER_PAGE_DEFAULT,
        }
    }
}

impl ProjectFilter {
    fn per_page(&self) -> i64 {
        self.per_page.clamp(1, PER_PAGE_MAX)
    }

    fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.per_page())
    }

    fn matches(&self, project: &ProjectRecord) -> bool {
        self.status.map_or(true, |s| project.status == s)
            && self
                .person_id
                .map_or(true, |id| project.person_in_charge == Some(id))
    }

    fn into_page(self, items: Vec<ProjectRecord>, total_count: i64) -> ProjectPage {
        let offset = self.offset();
        ProjectPage {
            has_prev: self.page > 1,
            has_next: offset + (items.len() as i64) < total_count,
            page: self.page.max(1),
            per_page: self.per_page(),
            total_count,
            items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectPage {
    pub items: Vec<ProjectRecord>,
    pub page: i64,
    pub per_page: i64,
    pub total_count: i64,
    pub has_prev: bool,
    pub has_next: bool,
}

/// Storage capability for projects
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<ProjectRecord>>;

    /// One page of projects matching `filter`; rows without the ordering
    /// timestamp come last
    async fn list(&self, filter: ProjectFilter) -> Result<ProjectPage>;

    /// Create a project, failing with [`RosterError::Integrity`] on a
    /// duplicate name
    async fn insert(&self, project: NewProject) -> Result<ProjectRecord>;

    /// Create several projects atomically
    async fn insert_many(&self, projects: Vec<NewProject>) -> Result<Vec<ProjectRecord>>;

    /// Apply a patch; `Ok(None)` when the project does not exist
    async fn update(&self, id: i64, patch: ProjectPatch) -> Result<Option<ProjectRecord>>;

    async fn delete(&self, id: i64) -> Result<Option<ProjectRecord>>;

    /// Unassign every project held by `user_id`, returning how many changed
    async fn clear_owner(&self, user_id: i64) -> Result<u64>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryProjects {
    last_id: i64,
    projects: BTreeMap<i64, ProjectRecord>,
}

impl MemoryProjects {
    fn name_taken(&self, name: &str) -> bool {
        self.projects.values().any(|p| p.name == name)
    }

    fn insert(&mut self, project: NewProject) -> ProjectRecord {
        self.last_id += 1;
        let record = ProjectRecord {
            id: self.last_id,
            name: project.name,
            status: project.status,
            description: project.description,
            person_in_charge: project.person_in_charge,
            create_time: Utc::now(),
            start_time: None,
            complete_time: None,
        };
        self.projects.insert(record.id, record.clone());
        record
    }
}

/// In-memory project store
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    inner: RwLock<MemoryProjects>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare_keys(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>, desc: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if desc => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<ProjectRecord>> {
        Ok(self.inner.read().await.projects.get(&id).cloned())
    }

    async fn list(&self, filter: ProjectFilter) -> Result<ProjectPage> {
        let inner = self.inner.read().await;
        let mut matching: Vec<&ProjectRecord> =
            inner.projects.values().filter(|p| filter.matches(p)).collect();
        matching.sort_by(|a, b| {
            compare_keys(filter.order_by.key(a), filter.order_by.key(b), filter.desc)
                .then(a.id.cmp(&b.id))
        });

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(filter.per_page()).unwrap_or_default())
            .cloned()
            .collect();
        Ok(filter.into_page(items, total))
    }

    async fn insert(&self, project: NewProject) -> Result<ProjectRecord> {
        let mut inner = self.inner.write().await;
        if inner.name_taken(&project.name) {
            return Err(RosterError::Integrity(NAME_TAKEN.to_string()));
        }
        Ok(inner.insert(project))
    }

    async fn insert_many(&self, projects: Vec<NewProject>) -> Result<Vec<ProjectRecord>> {
        let mut inner = self.inner.write().await;
        for (i, project) in projects.iter().enumerate() {
            let in_batch = projects[..i].iter().any(|p| p.name == project.name);
            if in_batch || inner.name_taken(&project.name) {
                return Err(RosterError::Integrity(NAME_TAKEN.to_string()));
            }
        }
        Ok(projects.into_iter().map(|p| inner.insert(p)).collect())
    }

    async fn update(&self, id: i64, patch: ProjectPatch) -> Result<Option<ProjectRecord>> {
        let mut inner = self.inner.write().await;
        let Some(existing) = inner.projects.get(&id).cloned() else {
            return Ok(None);
        };

        let updated = ProjectRecord {
            status: patch.status.unwrap_or(existing.status),
            start_time: patch.start_time.or(existing.start_time),
            complete_time: patch.complete_time.or(existing.complete_time),
            description: patch.description.or(existing.description),
            person_in_charge: patch.person_in_charge.or(existing.person_in_charge),
            ..existing
        };
        inner.projects.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, id: i64) -> Result<Option<ProjectRecord>> {
        Ok(self.inner.write().await.projects.remove(&id))
    }

    async fn clear_owner(&self, user_id: i64) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let mut cleared = 0;
        for project in inner.projects.values_mut() {
            if project.person_in_charge == Some(user_id) {
                project.person_in_charge = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

// ============================================================================
// PostgreSQL store
// ============================================================================

const PROJECT_COLUMNS: &str =
    "id, name, status, description, person_in_charge, create_time, start_time, complete_time";

/// DDL for the projects table; the users table must exist first
pub const PROJECTS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(255) UNIQUE NOT NULL,
    status TEXT NOT NULL DEFAULT 'new'
        CHECK (status IN ('new', 'in_progress', 'completed')),
    description TEXT,
    person_in_charge BIGINT REFERENCES users(id) ON DELETE SET NULL,
    create_time TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    start_time TIMESTAMPTZ,
    complete_time TIMESTAMPTZ
)
"#;

#[derive(FromRow)]
struct ProjectRow {
    id: i64,
    name: String,
    status: String,
    description: Option<String>,
    person_in_charge: Option<i64>,
    create_time: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    complete_time: Option<DateTime<Utc>>,
}

impl TryFrom<ProjectRow> for ProjectRecord {
    type Error = RosterError;

    fn try_from(row: ProjectRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            status: row.status.parse()?,
            description: row.description,
            person_in_charge: row.person_in_charge,
            create_time: row.create_time,
            start_time: row.start_time,
            complete_time: row.complete_time,
        })
    }
}

fn into_records(rows: Vec<ProjectRow>) -> Result<Vec<ProjectRecord>> {
    rows.into_iter().map(ProjectRecord::try_from).collect()
}

/// PostgreSQL project store
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the projects table when it does not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(PROJECTS_TABLE_DDL)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                RosterError::DatabaseError(format!("Failed to create projects table: {e}"))
            })?;
        Ok(())
    }
}

fn map_write_error(err: sqlx::Error, action: &str) -> RosterError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RosterError::Integrity(NAME_TAKEN.to_string());
        }
        if db.is_foreign_key_violation() {
            return RosterError::Integrity(OWNER_MISSING.to_string());
        }
    }
    RosterError::DatabaseError(format!("Failed to {action}: {err}"))
}

const INSERT_PROJECT: &str = r#"
    INSERT INTO projects (name, status, description, person_in_charge)
    VALUES ($1, $2, $3, $4)
"#;

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<ProjectRecord>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to fetch project: {e}")))?;
        row.map(ProjectRecord::try_from).transpose()
    }

    async fn list(&self, filter: ProjectFilter) -> Result<ProjectPage> {
        const WHERE: &str = "WHERE ($1::text IS NULL OR status = $1) \
                             AND ($2::bigint IS NULL OR person_in_charge = $2)";
        let status = filter.status.map(|s| s.as_str());
        let direction = if filter.desc { "DESC" } else { "ASC" };

        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects {WHERE} \
             ORDER BY {} {direction} NULLS LAST, id ASC LIMIT $3 OFFSET $4",
            filter.order_by.column()
        ))
        .bind(status)
        .bind(filter.person_id)
        .bind(filter.per_page())
        .bind(filter.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to list projects: {e}")))?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM projects {WHERE}"))
            .bind(status)
            .bind(filter.person_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Failed to count projects: {e}")))?;

        Ok(filter.into_page(into_records(rows)?, total))
    }

    async fn insert(&self, project: NewProject) -> Result<ProjectRecord> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "{INSERT_PROJECT} RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(&project.name)
        .bind(project.status.as_str())
        .bind(&project.description)
        .bind(project.person_in_charge)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "create project"))?;
        row.try_into()
    }

    async fn insert_many(&self, projects: Vec<NewProject>) -> Result<Vec<ProjectRecord>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Failed to begin transaction: {e}")))?;

        let mut rows = Vec::with_capacity(projects.len());
        for project in &projects {
            let row = sqlx::query_as::<_, ProjectRow>(&format!(
                "{INSERT_PROJECT} RETURNING {PROJECT_COLUMNS}"
            ))
            .bind(&project.name)
            .bind(project.status.as_str())
            .bind(&project.description)
            .bind(project.person_in_charge)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_write_error(e, "create project"))?;
            rows.push(row);
        }

        tx.commit()
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Failed to commit projects: {e}")))?;

        into_records(rows)
    }

    async fn update(&self, id: i64, patch: ProjectPatch) -> Result<Option<ProjectRecord>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            r#"
            UPDATE projects SET
                status = COALESCE($2, status),
                start_time = COALESCE($3, start_time),
                complete_time = COALESCE($4, complete_time),
                description = COALESCE($5, description),
                person_in_charge = COALESCE($6, person_in_charge)
            WHERE id = $1
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.start_time)
        .bind(patch.complete_time)
        .bind(&patch.description)
        .bind(patch.person_in_charge)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "update project"))?;
        row.map(ProjectRecord::try_from).transpose()
    }

    async fn delete(&self, id: i64) -> Result<Option<ProjectRecord>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "DELETE FROM projects WHERE id = $1 RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to delete project: {e}")))?;
        row.map(ProjectRecord::try_from).transpose()
    }

    async fn clear_owner(&self, user_id: i64) -> Result<u64> {
        let result =
            sqlx::query("UPDATE projects SET person_in_charge = NULL WHERE person_in_charge = $1")
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    RosterError::DatabaseError(format!("Failed to unassign projects: {e}"))
                })?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_project(name: &str, owner: Option<i64>) -> NewProject {
        NewProject {
            name: name.to_string(),
            status: ProjectStatus::New,
            description: None,
            person_in_charge: owner,
        }
    }

    async fn seeded(count: usize) -> MemoryProjectStore {
        let store = MemoryProjectStore::new();
        for i in 0..count {
            store
                .insert(new_project(&format!("project-{i}"), Some(1)))
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn test_status_text_form() {
        for status in [
            ProjectStatus::New,
            ProjectStatus::InProgress,
            ProjectStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<ProjectStatus>().unwrap(), status);
        }
        assert!("archived".parse::<ProjectStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&ProjectStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_is_integrity_error() {
        let store = MemoryProjectStore::new();
        store.insert(new_project("apollo", None)).await.unwrap();

        let err = store.insert(new_project("apollo", None)).await.unwrap_err();
        assert!(matches!(err, RosterError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_insert_many_is_atomic() {
        let store = MemoryProjectStore::new();
        let err = store
            .insert_many(vec![
                new_project("a", None),
                new_project("b", None),
                new_project("a", None),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::Integrity(_)));

        let page = store.list(ProjectFilter::default()).await.unwrap();
        assert_eq!(page.total_count, 0);
    }

    #[tokio::test]
    async fn test_pagination_flags() {
        let store = seeded(5).await;
        let filter = ProjectFilter {
            per_page: 2,
            page: 2,
            ..ProjectFilter::default()
        };

        let page = store.list(filter.clone()).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_count, 5);
        assert!(page.has_prev);
        assert!(page.has_next);

        let last = store.list(ProjectFilter { page: 3, ..filter }).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_next);
    }

    #[tokio::test]
    async fn test_per_page_is_clamped() {
        let store = seeded(3).await;
        let page = store
            .list(ProjectFilter {
                per_page: PER_PAGE_MAX + 100,
                ..ProjectFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.per_page, PER_PAGE_MAX);
        assert_eq!(page.items.len(), 3);
    }

    #[tokio::test]
    async fn test_filter_and_order() {
        let store = MemoryProjectStore::new();
        let base = Utc::now();
        for (name, owner, offset) in [("early", 1, 1), ("late", 1, 5), ("other", 2, 3)] {
            let created = store.insert(new_project(name, Some(owner))).await.unwrap();
            store
                .update(
                    created.id,
                    ProjectPatch {
                        start_time: Some(base + Duration::days(offset)),
                        status: Some(ProjectStatus::InProgress),
                        ..ProjectPatch::default()
                    },
                )
                .await
                .unwrap();
        }
        store.insert(new_project("unstarted", Some(1))).await.unwrap();

        let page = store
            .list(ProjectFilter {
                person_id: Some(1),
                order_by: ProjectOrder::StartTime,
                ..ProjectFilter::default()
            })
            .await
            .unwrap();
        let names: Vec<&str> = page.items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["late", "early", "unstarted"]);

        let ascending = store
            .list(ProjectFilter {
                status: Some(ProjectStatus::InProgress),
                order_by: ProjectOrder::StartTime,
                desc: false,
                ..ProjectFilter::default()
            })
            .await
            .unwrap();
        let names: Vec<&str> = ascending.items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["early", "other", "late"]);
    }

    #[tokio::test]
    async fn test_update_keeps_unset_fields() {
        let store = MemoryProjectStore::new();
        let created = store
            .insert(NewProject {
                description: Some("first".to_string()),
                ..new_project("apollo", Some(3))
            })
            .await
            .unwrap();

        let updated = store
            .update(
                created.id,
                ProjectPatch {
                    status: Some(ProjectStatus::Completed),
                    ..ProjectPatch::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, ProjectStatus::Completed);
        assert_eq!(updated.description.as_deref(), Some("first"));
        assert_eq!(updated.person_in_charge, Some(3));
        assert_eq!(updated.create_time, created.create_time);

        assert!(store.update(99, ProjectPatch::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_owner_leaves_projects_unowned() {
        let store = MemoryProjectStore::new();
        let mine = store.insert(new_project("mine", Some(7))).await.unwrap();
        let theirs = store.insert(new_project("theirs", Some(8))).await.unwrap();

        assert_eq!(store.clear_owner(7).await.unwrap(), 1);
        let mine = store.find_by_id(mine.id).await.unwrap().unwrap();
        assert_eq!(mine.person_in_charge, None);
        assert!(mine.is_managed_by(8));

        let theirs = store.find_by_id(theirs.id).await.unwrap().unwrap();
        assert!(!theirs.is_managed_by(7));
    }
}
