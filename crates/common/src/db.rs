//! SQLite database for managed service records

use crate::lifecycle::ServiceState;
use crate::types::{ManagedService, NewService, ServiceId};
use crate::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const SERVICE_COLUMNS: &str = "id, name, service_name, domain_name, description, repo_url, port, \
     initialized, systemd_applied, nginx_applied, enabled, created_at, updated_at, applied_at";

/// Database wrapper for state persistence
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path.as_ref())?;

        // WAL lets the CLI read while the web server writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        info!("Opened database at {:?}", path.as_ref());
        Ok(db)
    }

    /// Open an existing database without creating, migrating or writing it
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        debug!("Opened database at {:?} read-only", path.as_ref());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS managed_services (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                service_name TEXT NOT NULL UNIQUE,
                domain_name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                repo_url TEXT NOT NULL,
                port INTEGER NOT NULL UNIQUE CHECK (port BETWEEN 1024 AND 65535),
                initialized INTEGER NOT NULL DEFAULT 0,
                systemd_applied INTEGER NOT NULL DEFAULT 0,
                nginx_applied INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                applied_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_managed_services_port ON managed_services(port);
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Insert a new service in its initial state
    pub fn insert_service(&self, new: &NewService) -> Result<ManagedService> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            "INSERT INTO managed_services
                (name, service_name, domain_name, description, repo_url, port, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.name,
                new.service_name,
                new.domain_name,
                new.description,
                new.repo_url,
                new.port,
                now,
                now,
            ],
        )
        .map_err(|e| constraint_error(e, |field| new_field_value(new, field)))?;

        let id = conn.last_insert_rowid();
        debug!("Inserted service {} with id {}", new.name, id);

        Ok(ManagedService {
            id,
            name: new.name.clone(),
            service_name: new.service_name.clone(),
            domain_name: new.domain_name.clone(),
            description: new.description.clone(),
            repo_url: new.repo_url.clone(),
            port: new.port,
            state: ServiceState::default(),
            created_at: now,
            updated_at: now,
            applied_at: None,
        })
    }

    /// Get a service by ID
    pub fn get_service(&self, id: ServiceId) -> Result<Option<ManagedService>> {
        let conn = self.conn.lock();
        let service = conn
            .query_row(
                &format!("SELECT {} FROM managed_services WHERE id = ?1", SERVICE_COLUMNS),
                params![id],
                service_from_row,
            )
            .optional()?;
        Ok(service)
    }

    /// Get a service by ID, failing with NotFound when absent
    pub fn require_service(&self, id: ServiceId) -> Result<ManagedService> {
        self.get_service(id)?.ok_or_else(|| Error::not_found(id))
    }

    /// List all services ordered by port
    pub fn list_services(&self) -> Result<Vec<ManagedService>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM managed_services ORDER BY port ASC",
            SERVICE_COLUMNS
        ))?;

        let rows = stmt.query_map([], service_from_row)?;
        let mut services = Vec::new();
        for row in rows {
            services.push(row?);
        }
        Ok(services)
    }

    /// Write every descriptive field and the lifecycle state of a service
    pub fn update_service(&self, service: &ManagedService) -> Result<i64> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();

        let rows = conn
            .execute(
                "UPDATE managed_services SET
                    name = ?1, service_name = ?2, domain_name = ?3, description = ?4,
                    repo_url = ?5, port = ?6, initialized = ?7, systemd_applied = ?8,
                    nginx_applied = ?9, enabled = ?10, applied_at = ?11, updated_at = ?12
                 WHERE id = ?13",
                params![
                    service.name,
                    service.service_name,
                    service.domain_name,
                    service.description,
                    service.repo_url,
                    service.port,
                    service.state.is_initialized(),
                    service.state.is_systemd_applied(),
                    service.state.is_nginx_applied(),
                    service.state.is_enabled(),
                    service.applied_at,
                    now,
                    service.id,
                ],
            )
            .map_err(|e| constraint_error(e, |field| service_field_value(service, field)))?;

        if rows == 0 {
            return Err(Error::not_found(service.id));
        }

        debug!("Updated service {} ({})", service.name, service.id);
        Ok(now)
    }

    /// Persist only the lifecycle state and `applied_at`
    pub fn write_state(&self, service: &ManagedService) -> Result<i64> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();

        let rows = conn.execute(
            "UPDATE managed_services SET
                initialized = ?1, systemd_applied = ?2, nginx_applied = ?3, enabled = ?4,
                applied_at = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                service.state.is_initialized(),
                service.state.is_systemd_applied(),
                service.state.is_nginx_applied(),
                service.state.is_enabled(),
                service.applied_at,
                now,
                service.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::not_found(service.id));
        }

        debug!("Wrote state {} for service {}", service.state, service.id);
        Ok(now)
    }

    /// Insert a copy of an existing record, keeping its id, state and timestamps
    pub fn import_service(&self, service: &ManagedService) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO managed_services
                (id, name, service_name, domain_name, description, repo_url, port,
                 initialized, systemd_applied, nginx_applied, enabled,
                 created_at, updated_at, applied_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                service.id,
                service.name,
                service.service_name,
                service.domain_name,
                service.description,
                service.repo_url,
                service.port,
                service.state.is_initialized(),
                service.state.is_systemd_applied(),
                service.state.is_nginx_applied(),
                service.state.is_enabled(),
                service.created_at,
                service.updated_at,
                service.applied_at,
            ],
        )
        .map_err(|e| constraint_error(e, |field| service_field_value(service, field)))?;
        Ok(())
    }

    /// Delete a service
    pub fn delete_service(&self, id: ServiceId) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM managed_services WHERE id = ?1", params![id])?;

        if rows > 0 {
            debug!("Deleted service with id {}", id);
        }

        Ok(rows > 0)
    }
}

fn service_from_row(row: &Row<'_>) -> rusqlite::Result<ManagedService> {
    Ok(ManagedService {
        id: row.get(0)?,
        name: row.get(1)?,
        service_name: row.get(2)?,
        domain_name: row.get(3)?,
        description: row.get(4)?,
        repo_url: row.get(5)?,
        port: row.get(6)?,
        state: ServiceState::from_flags(row.get(7)?, row.get(8)?, row.get(9)?, row.get(10)?),
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        applied_at: row.get(13)?,
    })
}

/// Turn a UNIQUE violation into AlreadyExists naming the offending field.
fn constraint_error(err: rusqlite::Error, value_of: impl Fn(&str) -> String) -> Error {
    if let rusqlite::Error::SqliteFailure(ref failure, Some(ref message)) = err {
        if failure.code == ErrorCode::ConstraintViolation {
            if let Some(field) = message
                .strip_prefix("UNIQUE constraint failed: managed_services.")
            {
                return Error::AlreadyExists {
                    field: field.to_string(),
                    value: value_of(field),
                };
            }
            if message.starts_with("CHECK constraint failed") {
                return Error::validation("port", "must be between 1024 and 65535");
            }
        }
    }
    Error::Database(err)
}

fn new_field_value(new: &NewService, field: &str) -> String {
    match field {
        "name" => new.name.clone(),
        "service_name" => new.service_name.clone(),
        "domain_name" => new.domain_name.clone(),
        "port" => new.port.to_string(),
        _ => String::new(),
    }
}

fn service_field_value(service: &ManagedService, field: &str) -> String {
    match field {
        "name" => service.name.clone(),
        "service_name" => service.service_name.clone(),
        "domain_name" => service.domain_name.clone(),
        "port" => service.port.to_string(),
        _ => String::new(),
    }
}
