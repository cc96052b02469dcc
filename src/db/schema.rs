//! Database schema and migrations for Registrar.
//!
//! Migrations are applied in order when the database is opened. The
//! `schema_version` table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: registration requests
    r#"
CREATE TABLE registration_requests (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    username            TEXT NOT NULL,
    email               TEXT NOT NULL,
    first_name          TEXT NOT NULL,
    last_name           TEXT NOT NULL,
    reason              TEXT NOT NULL DEFAULT '',
    status              TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'approved', 'rejected')),
    ip_address          TEXT,
    user_agent          TEXT,
    created_at          TEXT NOT NULL DEFAULT (datetime('now')),
    reviewed_at         TEXT,
    reviewed_by         TEXT,
    rejection_reason    TEXT
);

-- At most one open request per username / email
CREATE UNIQUE INDEX idx_requests_pending_username
    ON registration_requests(username) WHERE status = 'pending';
CREATE UNIQUE INDEX idx_requests_pending_email
    ON registration_requests(email) WHERE status = 'pending';

CREATE INDEX idx_requests_status ON registration_requests(status, created_at);
CREATE INDEX idx_requests_username ON registration_requests(username);

CREATE TRIGGER registration_requests_no_delete
BEFORE DELETE ON registration_requests
BEGIN
    SELECT RAISE(ABORT, 'registration requests are never deleted');
END;
"#,
    // v2: append-only audit log
    r#"
CREATE TABLE audit_log (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id          INTEGER NOT NULL REFERENCES registration_requests(id),
    action              TEXT NOT NULL,
    username            TEXT NOT NULL,
    email               TEXT NOT NULL,
    first_name          TEXT NOT NULL,
    last_name           TEXT NOT NULL,
    reason              TEXT NOT NULL DEFAULT '',
    ip_address          TEXT,
    user_agent          TEXT,
    request_created_at  TEXT NOT NULL,
    performed_by        TEXT NOT NULL,
    rejection_reason    TEXT,
    details             TEXT,
    timestamp           TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_audit_log_request_id ON audit_log(request_id);
CREATE INDEX idx_audit_log_username ON audit_log(username);

CREATE TRIGGER audit_log_no_update
BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit log is append-only');
END;

CREATE TRIGGER audit_log_no_delete
BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit log is append-only');
END;
"#,
];
