//! Embedded schema migration for the scheduling engine tables.

use diesel_async::{AsyncPgConnection, SimpleAsyncConnection};

/// SQL migration creating every table the engine reads or writes.
///
/// Idempotent; safe to run on every start.
pub const MIGRATION_SQL: &str = r#"
-- ================================================================
-- Catalog
-- ================================================================

CREATE TABLE IF NOT EXISTS topics (
    id                          UUID PRIMARY KEY,
    name                        VARCHAR(255) NOT NULL UNIQUE,
    product_id                  UUID,
    component_types             TEXT[] NOT NULL DEFAULT '{}',
    optional_component_types    TEXT[] NOT NULL DEFAULT '{}',
    export_control              BOOLEAN NOT NULL DEFAULT FALSE,
    next_topic_id               UUID REFERENCES topics(id) ON DELETE SET NULL,
    state                       VARCHAR(16) NOT NULL DEFAULT 'active',
    created_at                  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at                  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

ALTER TABLE topics ADD COLUMN IF NOT EXISTS next_topic_id UUID
    REFERENCES topics(id) ON DELETE SET NULL;

CREATE TABLE IF NOT EXISTS topics_teams (
    topic_id    UUID NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    team_id     UUID NOT NULL,
    PRIMARY KEY (topic_id, team_id)
);

CREATE TABLE IF NOT EXISTS components (
    id              UUID PRIMARY KEY,
    topic_id        UUID NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    type            VARCHAR(255) NOT NULL,
    name            VARCHAR(255) NOT NULL,
    export_control  BOOLEAN NOT NULL DEFAULT FALSE,
    team_id         UUID,
    state           VARCHAR(16) NOT NULL DEFAULT 'active',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_components_latest
    ON components (topic_id, type, created_at DESC)
    WHERE state = 'active';

-- ================================================================
-- Workers and run configurations
-- ================================================================

CREATE TABLE IF NOT EXISTS remotecis (
    id          UUID PRIMARY KEY,
    name        VARCHAR(255) NOT NULL,
    team_id     UUID NOT NULL,
    state       VARCHAR(16) NOT NULL DEFAULT 'active',
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS rconfigurations (
    id              UUID PRIMARY KEY,
    topic_id        UUID NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    name            VARCHAR(255) NOT NULL,
    component_types TEXT[],
    state           VARCHAR(16) NOT NULL DEFAULT 'active',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS remotecis_rconfigurations (
    remoteci_id         UUID NOT NULL REFERENCES remotecis(id) ON DELETE CASCADE,
    rconfiguration_id   UUID NOT NULL REFERENCES rconfigurations(id) ON DELETE CASCADE,
    PRIMARY KEY (remoteci_id, rconfiguration_id)
);

-- ================================================================
-- Jobs
-- ================================================================

CREATE TABLE IF NOT EXISTS jobs (
    id                  UUID PRIMARY KEY,
    remoteci_id         UUID NOT NULL REFERENCES remotecis(id) ON DELETE CASCADE,
    team_id             UUID NOT NULL,
    topic_id            UUID NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    product_id          UUID,
    rconfiguration_id   UUID REFERENCES rconfigurations(id) ON DELETE SET NULL,
    previous_job_id     UUID REFERENCES jobs(id) ON DELETE SET NULL,
    status              VARCHAR(16) NOT NULL DEFAULT 'new',
    comment             TEXT,
    duration            INTEGER NOT NULL DEFAULT 0,
    etag                UUID NOT NULL,
    state               VARCHAR(16) NOT NULL DEFAULT 'active',
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_jobs_last_used
    ON jobs (topic_id, remoteci_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_jobs_stale
    ON jobs (remoteci_id, status, created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs (state);

CREATE TABLE IF NOT EXISTS jobs_components (
    job_id          UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    component_id    UUID NOT NULL REFERENCES components(id) ON DELETE CASCADE,
    position        INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (job_id, component_id)
);

CREATE TABLE IF NOT EXISTS jobstates (
    id          UUID PRIMARY KEY,
    job_id      UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    team_id     UUID NOT NULL,
    status      VARCHAR(16) NOT NULL,
    comment     TEXT,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_jobstates_job ON jobstates (job_id, created_at);

CREATE TABLE IF NOT EXISTS jobs_events (
    id          BIGINT PRIMARY KEY,
    job_id      UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    topic_id    UUID NOT NULL,
    status      VARCHAR(16) NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS sequences (
    name    VARCHAR(64) PRIMARY KEY,
    value   BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS counters (
    name        VARCHAR(64) PRIMARY KEY,
    sequence    BIGINT NOT NULL DEFAULT 0,
    etag        UUID NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    id          UUID PRIMARY KEY,
    job_id      UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    name        VARCHAR(512) NOT NULL,
    mime        VARCHAR(255),
    size        BIGINT,
    state       VARCHAR(16) NOT NULL DEFAULT 'active',
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_files_job ON files (job_id);
"#;

pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("DCI migration failed: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::MIGRATION_SQL;

    #[test]
    fn every_mapped_table_is_created() {
        for table in [
            "topics",
            "topics_teams",
            "components",
            "remotecis",
            "rconfigurations",
            "remotecis_rconfigurations",
            "jobs",
            "jobs_components",
            "jobstates",
            "jobs_events",
            "sequences",
            "counters",
            "files",
        ] {
            let ddl = format!("CREATE TABLE IF NOT EXISTS {table} (");
            assert!(MIGRATION_SQL.contains(&ddl), "missing table {table}");
        }
    }

    #[test]
    fn existing_topics_gain_the_upgrade_link() {
        assert!(MIGRATION_SQL.contains("ADD COLUMN IF NOT EXISTS next_topic_id"));
    }
}
