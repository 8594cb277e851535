pub const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    seed_url TEXT NOT NULL,
    scope_host TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    report_json TEXT
);

CREATE TABLE IF NOT EXISTS results (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    result_type TEXT NOT NULL,
    script TEXT NOT NULL,
    severity INTEGER NOT NULL DEFAULT 0,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_run ON results(run_id);
CREATE INDEX IF NOT EXISTS idx_results_type ON results(result_type);
";
