pub const SCHEMA: &str = r#"
-- Videos table: the library catalog filled by the scanner
CREATE TABLE IF NOT EXISTS videos (
    id TEXT PRIMARY KEY,            -- Stable id derived from the path
    path TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    directory TEXT NOT NULL,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    modified_at TEXT,
    scanned_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,

    -- Probed stream metadata
    duration REAL NOT NULL DEFAULT 0,
    width INTEGER NOT NULL DEFAULT 0,
    height INTEGER NOT NULL DEFAULT 0,
    created_at TEXT,                -- RFC 3339, from container tags or set by the user

    -- User actions
    is_favorite INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_videos_directory ON videos(directory);

-- Analysis cache: facts derived per video, written additively
CREATE TABLE IF NOT EXISTS asset_facts (
    id TEXT PRIMARY KEY,
    duration REAL NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    file_size INTEGER NOT NULL DEFAULT 0,
    feature_descriptor BLOB,        -- Representative frame descriptor
    estimated_year INTEGER,
    year_source TEXT,               -- 'metadata' or 'heuristic'
    heuristic_year INTEGER,
    last_analyzed TEXT NOT NULL,
    version INTEGER NOT NULL
);

-- Latest detection snapshot, replaced wholesale by every completed scan
CREATE TABLE IF NOT EXISTS result_snapshot (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    scan_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS duplicate_groups (
    id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,      -- Discovery order within the scan
    similarity_type TEXT NOT NULL,  -- 'exactDuplicate', 'nearDuplicate', 'visuallySimilar'
    score REAL NOT NULL DEFAULT 0,
    member_ids TEXT NOT NULL,       -- JSON array of video ids
    scan_date TEXT NOT NULL
);
"#;
