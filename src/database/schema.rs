pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS assets (
        id INTEGER PRIMARY KEY,
        product_id INTEGER,
        original_name TEXT NOT NULL,
        stored_name TEXT UNIQUE NOT NULL,
        path TEXT NOT NULL,
        thumbnail_path TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        byte_size INTEGER NOT NULL,
        category TEXT NOT NULL DEFAULT 'general',
        owner_id INTEGER,
        is_primary INTEGER NOT NULL DEFAULT 0 CHECK (is_primary IN (0, 1)),
        sort_order INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS assets_one_primary_per_product
        ON assets(product_id)
        WHERE is_primary = 1 AND product_id IS NOT NULL;

    CREATE INDEX IF NOT EXISTS assets_product_order
        ON assets(product_id, sort_order, id);

    CREATE TABLE IF NOT EXISTS activity_log (
        id INTEGER PRIMARY KEY,
        actor_id INTEGER,
        actor_name TEXT,
        action TEXT NOT NULL,
        table_name TEXT NOT NULL,
        record_id INTEGER,
        old_values TEXT,
        new_values TEXT,
        created_at TEXT NOT NULL
    );
";

pub const ASSETS: &str = "assets";
pub const ACTIVITY_LOG: &str = "activity_log";

/// Column list shared by every query that maps a row into an `Asset`.
pub const ASSET_COLUMNS: &str = "id, product_id, original_name, stored_name, path, thumbnail_path, \
     mime_type, byte_size, category, owner_id, is_primary, sort_order, created_at";
