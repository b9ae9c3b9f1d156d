/// 表结构，重复执行是安全的
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT    NOT NULL,
    is_valid    INTEGER NOT NULL DEFAULT 1,
    period      TEXT    NOT NULL,
    format      TEXT    NOT NULL,
    retries     INTEGER NOT NULL DEFAULT 0,
    parents     TEXT    NOT NULL DEFAULT '[]',
    dependency  TEXT    NOT NULL,
    is_remove   INTEGER NOT NULL DEFAULT 0,
    create_time TEXT    NOT NULL,
    update_time TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id     INTEGER NOT NULL,
    machine_id  INTEGER,
    status      TEXT    NOT NULL,
    hour        INTEGER NOT NULL,
    minute      INTEGER NOT NULL,
    run_count   INTEGER NOT NULL DEFAULT 0,
    is_remove   INTEGER NOT NULL DEFAULT 0,
    create_time TEXT    NOT NULL,
    update_time TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_task_id ON jobs(task_id);
CREATE UNIQUE INDEX IF NOT EXISTS uk_jobs_task_day_hour
    ON jobs(task_id, date(create_time), hour) WHERE is_remove = 0;

CREATE TABLE IF NOT EXISTS machines (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    ip          TEXT    NOT NULL,
    mac         TEXT    NOT NULL DEFAULT '',
    hostname    TEXT    NOT NULL DEFAULT '',
    cpu_load    INTEGER NOT NULL DEFAULT 0,
    mem_load    INTEGER NOT NULL DEFAULT 0,
    disk_usage  INTEGER NOT NULL DEFAULT 0,
    is_remove   INTEGER NOT NULL DEFAULT 0,
    create_time TEXT    NOT NULL,
    update_time TEXT    NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS uk_machines_ip ON machines(ip) WHERE is_remove = 0;

CREATE TABLE IF NOT EXISTS instances (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id      INTEGER NOT NULL,
    status      TEXT    NOT NULL,
    log         TEXT    NOT NULL DEFAULT '',
    is_remove   INTEGER NOT NULL DEFAULT 0,
    create_time TEXT    NOT NULL,
    update_time TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_instances_job_id ON instances(job_id);
"#;
