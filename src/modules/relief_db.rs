use rusqlite::{params, types::Type, Connection, OptionalExtension, Row, ToSql};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::{AppError, AppResult};
use crate::privacy::models::{
    ContactInfo, HelpRequest, NewHelpRequest, RequestStatus, ResponseStatus, Urgency,
    VolunteerResponse,
};
use crate::privacy::resolver::ViewerResponseSet;

const REQUEST_COLUMNS: &str = "r.id, r.owner_id, r.name, r.address, r.phone, r.email, \
     r.help_type, r.urgency, r.description, r.status, r.volunteer_count, r.created_at";

const RESPONSE_COLUMNS: &str = "v.id, v.request_id, v.volunteer_id, v.status, v.created_at";

/// Optional listing filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub urgency: Option<Urgency>,
}

/// SQLite-backed store for help requests and volunteer responses.
///
/// Only the private contact tier is persisted; the public tier is rebuilt
/// from it every time a row is read.
#[derive(Clone)]
pub struct ReliefDb {
    conn: Arc<Mutex<Connection>>,
}

impl ReliefDb {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // Set busy timeout to 5000ms to avoid "database is locked" errors
        conn.pragma_update(None, "busy_timeout", 5000)?;

        // Synchronous NORMAL is faster and safe enough for WAL
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> AppResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Every write runs in a transaction, so a poisoned guard still holds a consistent db.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` on the blocking pool so SQLite work stays off the async workers.
    pub async fn run_blocking<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ReliefDb) -> AppResult<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub fn init_schema(&self) -> AppResult<()> {
        let conn = self.lock();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS help_requests (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                address TEXT NOT NULL,
                phone TEXT NOT NULL,
                email TEXT NOT NULL,
                help_type TEXT NOT NULL,
                urgency TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                volunteer_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS volunteer_responses (
                id TEXT PRIMARY KEY,
                request_id TEXT NOT NULL REFERENCES help_requests (id),
                volunteer_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (request_id, volunteer_id)
            );

            CREATE INDEX IF NOT EXISTS idx_requests_owner ON help_requests (owner_id);
            CREATE INDEX IF NOT EXISTS idx_responses_volunteer ON volunteer_responses (volunteer_id);",
        )?;

        Ok(())
    }

    pub fn create_request(
        &self,
        owner_id: &str,
        draft: NewHelpRequest,
        created_at: i64,
    ) -> AppResult<HelpRequest> {
        let request = HelpRequest::new(
            uuid::Uuid::new_v4().to_string(),
            owner_id.to_string(),
            draft,
            created_at,
        );
        let contact = request.private_data();

        let conn = self.lock();
        conn.execute(
            "INSERT INTO help_requests (id, owner_id, name, address, phone, email, help_type, urgency, description, status, volunteer_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                request.id,
                request.owner_id,
                contact.name,
                contact.address,
                contact.phone,
                contact.email,
                request.help_type,
                request.urgency.as_str(),
                request.description,
                request.status.as_str(),
                request.volunteer_count,
                request.created_at,
            ],
        )?;

        Ok(request)
    }

    pub fn get_request(&self, id: &str) -> AppResult<HelpRequest> {
        let conn = self.lock();
        find_request(&conn, id)?.ok_or_else(|| not_found_request(id))
    }

    pub fn list_requests(&self, filter: RequestFilter) -> AppResult<Vec<HelpRequest>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<&'static str> = Vec::new();
        if let Some(status) = filter.status {
            clauses.push("r.status = ?");
            values.push(status.as_str());
        }
        if let Some(urgency) = filter.urgency {
            clauses.push("r.urgency = ?");
            values.push(urgency.as_str());
        }

        let mut sql = format!("SELECT {} FROM help_requests r", REQUEST_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn ToSql> = values.iter().map(|s| s as &dyn ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), row_to_request)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    pub fn list_requests_by_owner(&self, owner_id: &str) -> AppResult<Vec<HelpRequest>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM help_requests r WHERE r.owner_id = ?1",
            REQUEST_COLUMNS
        ))?;
        let rows = stmt.query_map([owner_id], row_to_request)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    /// Owner-only, forward-only status change.
    pub fn update_request_status(
        &self,
        id: &str,
        actor_id: &str,
        next: RequestStatus,
    ) -> AppResult<HelpRequest> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let mut request = find_request(&tx, id)?.ok_or_else(|| not_found_request(id))?;
        if request.owner_id != actor_id {
            return Err(AppError::Forbidden(
                "only the requester can change the status of a request".to_string(),
            ));
        }
        if !request.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "cannot move a request from {} to {}",
                request.status, next
            )));
        }

        tx.execute(
            "UPDATE help_requests SET status = ?1 WHERE id = ?2",
            params![next.as_str(), id],
        )?;
        tx.commit()?;

        request.status = next;
        Ok(request)
    }

    /// Request IDs the viewer holds a response for, in any status.
    pub fn volunteered_request_ids(&self, volunteer_id: &str) -> AppResult<ViewerResponseSet> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT request_id FROM volunteer_responses WHERE volunteer_id = ?1")?;
        let rows = stmt.query_map([volunteer_id], |row| row.get::<_, String>(0))?;

        let mut set = ViewerResponseSet::new();
        for row in rows {
            set.insert(row?);
        }
        Ok(set)
    }

    /// Record a volunteer commitment and bump the request's volunteer count.
    ///
    /// The duplicate check, insert and increment share one transaction under
    /// the connection lock; the unique index catches anything that slips past.
    pub fn commit_volunteer(
        &self,
        request_id: &str,
        volunteer_id: &str,
        created_at: i64,
    ) -> AppResult<VolunteerResponse> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let request = find_request(&tx, request_id)?.ok_or_else(|| not_found_request(request_id))?;
        if request.owner_id == volunteer_id {
            return Err(AppError::Forbidden(
                "you cannot volunteer for your own request".to_string(),
            ));
        }
        if request.status == RequestStatus::Closed {
            return Err(AppError::Conflict("this request is closed".to_string()));
        }

        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM volunteer_responses WHERE request_id = ?1 AND volunteer_id = ?2",
            params![request_id, volunteer_id],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(already_volunteered());
        }

        let response = VolunteerResponse {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            volunteer_id: volunteer_id.to_string(),
            status: ResponseStatus::Accepted,
            created_at,
        };

        tx.execute(
            "INSERT INTO volunteer_responses (id, request_id, volunteer_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                response.id,
                response.request_id,
                response.volunteer_id,
                response.status.as_str(),
                response.created_at,
            ],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => already_volunteered(),
            _ => AppError::Storage(e),
        })?;

        tx.execute(
            "UPDATE help_requests SET volunteer_count = volunteer_count + 1 WHERE id = ?1",
            [request_id],
        )?;
        tx.commit()?;

        Ok(response)
    }

    pub fn get_response(&self, id: &str) -> AppResult<VolunteerResponse> {
        let conn = self.lock();
        find_response(&conn, id)?
            .ok_or_else(|| AppError::NotFound(format!("volunteer response {} not found", id)))
    }

    /// A volunteer's responses joined with their requests, newest first.
    pub fn list_commitments(
        &self,
        volunteer_id: &str,
    ) -> AppResult<Vec<(VolunteerResponse, HelpRequest)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {} FROM volunteer_responses v
             JOIN help_requests r ON r.id = v.request_id
             WHERE v.volunteer_id = ?1
             ORDER BY v.created_at DESC",
            RESPONSE_COLUMNS, REQUEST_COLUMNS
        ))?;
        let rows = stmt.query_map([volunteer_id], |row| {
            let response = row_to_response(row)?;
            let request = request_from_row(row, 5)?;
            Ok((response, request))
        })?;

        let mut commitments = Vec::new();
        for row in rows {
            commitments.push(row?);
        }
        Ok(commitments)
    }

    /// Volunteer-only status change along the response lifecycle. The volunteer
    /// count is never decremented.
    pub fn update_response_status(
        &self,
        id: &str,
        actor_id: &str,
        next: ResponseStatus,
    ) -> AppResult<VolunteerResponse> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let mut response = find_response(&tx, id)?
            .ok_or_else(|| AppError::NotFound(format!("volunteer response {} not found", id)))?;
        if response.volunteer_id != actor_id {
            return Err(AppError::Forbidden(
                "only the volunteer can change the status of a response".to_string(),
            ));
        }
        if !response.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "cannot move a response from {} to {}",
                response.status, next
            )));
        }

        tx.execute(
            "UPDATE volunteer_responses SET status = ?1 WHERE id = ?2",
            params![next.as_str(), id],
        )?;
        tx.commit()?;

        response.status = next;
        Ok(response)
    }
}

fn not_found_request(id: &str) -> AppError {
    AppError::NotFound(format!("help request {} not found", id))
}

fn already_volunteered() -> AppError {
    AppError::Conflict("you have already volunteered for this request".to_string())
}

fn find_request(conn: &Connection, id: &str) -> rusqlite::Result<Option<HelpRequest>> {
    conn.query_row(
        &format!("SELECT {} FROM help_requests r WHERE r.id = ?1", REQUEST_COLUMNS),
        [id],
        row_to_request,
    )
    .optional()
}

fn find_response(conn: &Connection, id: &str) -> rusqlite::Result<Option<VolunteerResponse>> {
    conn.query_row(
        &format!("SELECT {} FROM volunteer_responses v WHERE v.id = ?1", RESPONSE_COLUMNS),
        [id],
        row_to_response,
    )
    .optional()
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<HelpRequest> {
    request_from_row(row, 0)
}

/// Columns laid out as in `REQUEST_COLUMNS`, starting at `offset`.
fn request_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<HelpRequest> {
    let draft = NewHelpRequest {
        contact: ContactInfo {
            name: row.get(offset + 2)?,
            address: row.get(offset + 3)?,
            phone: row.get(offset + 4)?,
            email: row.get(offset + 5)?,
        },
        help_type: row.get(offset + 6)?,
        urgency: parse_column(row, offset + 7)?,
        description: row.get(offset + 8)?,
    };

    let mut request = HelpRequest::new(row.get(offset)?, row.get(offset + 1)?, draft, row.get(offset + 11)?);
    request.status = parse_column(row, offset + 9)?;
    request.volunteer_count = row.get(offset + 10)?;
    Ok(request)
}

fn row_to_response(row: &Row<'_>) -> rusqlite::Result<VolunteerResponse> {
    Ok(VolunteerResponse {
        id: row.get(0)?,
        request_id: row.get(1)?,
        volunteer_id: row.get(2)?,
        status: parse_column(row, 3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(phone: &str, urgency: Urgency) -> NewHelpRequest {
        NewHelpRequest {
            contact: ContactInfo {
                name: "Jane Doe".to_string(),
                address: "42 Harbor Road, Springfield".to_string(),
                phone: phone.to_string(),
                email: "jane@example.org".to_string(),
            },
            help_type: "medical".to_string(),
            urgency,
            description: "Insulin needed".to_string(),
        }
    }

    #[test]
    fn create_and_fetch_rebuilds_public_tier() {
        let db = ReliefDb::open_in_memory().unwrap();
        let created = db.create_request("owner", draft("5551234567", Urgency::High), 100).unwrap();

        let fetched = db.get_request(&created.id).unwrap();
        assert_eq!(fetched.owner_id, "owner");
        assert_eq!(fetched.private_data().phone, "5551234567");
        assert_eq!(fetched.public_data().phone, "555-***-**67");
        assert_eq!(fetched.urgency, Urgency::High);
        assert_eq!(fetched.status, RequestStatus::Open);
        assert_eq!(fetched.created_at, 100);
    }

    #[test]
    fn missing_request_is_not_found() {
        let db = ReliefDb::open_in_memory().unwrap();
        assert!(matches!(db.get_request("nope"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn list_filters_by_status_and_urgency() {
        let db = ReliefDb::open_in_memory().unwrap();
        let a = db.create_request("o", draft("5551234567", Urgency::Low), 1).unwrap();
        db.create_request("o", draft("5551234567", Urgency::Critical), 2).unwrap();
        db.update_request_status(&a.id, "o", RequestStatus::Closed).unwrap();

        assert_eq!(db.list_requests(RequestFilter::default()).unwrap().len(), 2);

        let open = db
            .list_requests(RequestFilter {
                status: Some(RequestStatus::Open),
                urgency: None,
            })
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].urgency, Urgency::Critical);

        let closed_low = db
            .list_requests(RequestFilter {
                status: Some(RequestStatus::Closed),
                urgency: Some(Urgency::Low),
            })
            .unwrap();
        assert_eq!(closed_low.len(), 1);
        assert_eq!(closed_low[0].id, a.id);
    }

    #[test]
    fn commit_increments_count_and_rejects_duplicates() {
        let db = ReliefDb::open_in_memory().unwrap();
        let r = db.create_request("owner", draft("5551234567", Urgency::High), 1).unwrap();

        let response = db.commit_volunteer(&r.id, "helper", 2).unwrap();
        assert_eq!(response.status, ResponseStatus::Accepted);
        assert_eq!(db.get_request(&r.id).unwrap().volunteer_count, 1);

        assert!(matches!(
            db.commit_volunteer(&r.id, "helper", 3),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(db.get_request(&r.id).unwrap().volunteer_count, 1);

        db.commit_volunteer(&r.id, "helper-2", 4).unwrap();
        assert_eq!(db.get_request(&r.id).unwrap().volunteer_count, 2);
    }

    #[test]
    fn owner_cannot_volunteer_and_closed_requests_refuse() {
        let db = ReliefDb::open_in_memory().unwrap();
        let r = db.create_request("owner", draft("5551234567", Urgency::High), 1).unwrap();

        assert!(matches!(
            db.commit_volunteer(&r.id, "owner", 2),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            db.commit_volunteer("missing", "helper", 2),
            Err(AppError::NotFound(_))
        ));

        db.update_request_status(&r.id, "owner", RequestStatus::Closed).unwrap();
        assert!(matches!(
            db.commit_volunteer(&r.id, "helper", 3),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn concurrent_commits_serialize() {
        let db = ReliefDb::open_in_memory().unwrap();
        let r = db.create_request("owner", draft("5551234567", Urgency::High), 1).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                let id = r.id.clone();
                std::thread::spawn(move || db.commit_volunteer(&id, "helper", i).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(db.get_request(&r.id).unwrap().volunteer_count, 1);
    }

    #[test]
    fn status_changes_are_owner_only_and_forward_only() {
        let db = ReliefDb::open_in_memory().unwrap();
        let r = db.create_request("owner", draft("5551234567", Urgency::High), 1).unwrap();

        assert!(matches!(
            db.update_request_status(&r.id, "stranger", RequestStatus::InProgress),
            Err(AppError::Forbidden(_))
        ));

        let updated = db
            .update_request_status(&r.id, "owner", RequestStatus::InProgress)
            .unwrap();
        assert_eq!(updated.status, RequestStatus::InProgress);

        assert!(matches!(
            db.update_request_status(&r.id, "owner", RequestStatus::Open),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn commitments_and_response_lifecycle() {
        let db = ReliefDb::open_in_memory().unwrap();
        let r1 = db.create_request("owner", draft("5551234567", Urgency::High), 1).unwrap();
        let r2 = db.create_request("owner", draft("5559876543", Urgency::Low), 2).unwrap();

        let v1 = db.commit_volunteer(&r1.id, "helper", 10).unwrap();
        db.commit_volunteer(&r2.id, "helper", 20).unwrap();

        let ids = db.volunteered_request_ids("helper").unwrap();
        assert!(ids.contains(&r1.id) && ids.contains(&r2.id));
        assert!(db.volunteered_request_ids("nobody").unwrap().is_empty());

        let commitments = db.list_commitments("helper").unwrap();
        assert_eq!(commitments.len(), 2);
        assert_eq!(commitments[0].1.id, r2.id);
        assert_eq!(commitments[0].1.private_data().phone, "5559876543");

        assert!(matches!(
            db.update_response_status(&v1.id, "owner", ResponseStatus::Completed),
            Err(AppError::Forbidden(_))
        ));
        let cancelled = db
            .update_response_status(&v1.id, "helper", ResponseStatus::Cancelled)
            .unwrap();
        assert_eq!(cancelled.status, ResponseStatus::Cancelled);
        assert_eq!(db.get_response(&v1.id).unwrap().status, ResponseStatus::Cancelled);
        assert!(matches!(
            db.update_response_status(&v1.id, "helper", ResponseStatus::Accepted),
            Err(AppError::Conflict(_))
        ));

        // Cancelling never gives the slot back.
        assert_eq!(db.get_request(&r1.id).unwrap().volunteer_count, 1);
        assert!(db.volunteered_request_ids("helper").unwrap().contains(&r1.id));
    }

    #[test]
    fn open_creates_file_backed_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("relief.db");
        let db = ReliefDb::open(&path).unwrap();
        db.create_request("o", draft("5551234567", Urgency::Medium), 1).unwrap();
        drop(db);

        let reopened = ReliefDb::open(&path).unwrap();
        assert_eq!(reopened.list_requests_by_owner("o").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_blocking_uses_shared_connection() {
        let db = ReliefDb::open_in_memory().unwrap();
        db.create_request("o", draft("5551234567", Urgency::High), 1).unwrap();

        let listed = db
            .run_blocking(|db| db.list_requests(RequestFilter::default()))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        let missing = db.run_blocking(|db| db.get_request("nope")).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn run_blocking_panic_becomes_task_error() {
        let db = ReliefDb::open_in_memory().unwrap();
        let result: AppResult<()> = db.run_blocking(|_| panic!("worker died")).await;
        assert!(matches!(result, Err(AppError::Task(_))));

        // The connection is still usable afterwards.
        assert!(db.list_requests_by_owner("o").unwrap().is_empty());
    }
}
