use redb::TableDefinition;

/// Pool entries: id -> PoolEntry (msgpack)
pub const POOL: TableDefinition<u64, &[u8]> = TableDefinition::new("pool");

/// Active allocations: id -> Allocation (msgpack)
pub const ALLOCATIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("allocations");

/// Unique index: caller identity -> allocated id (one allocation per caller)
pub const CALLER_ALLOCATIONS: TableDefinition<&str, u64> =
    TableDefinition::new("caller_allocations");

/// Expiration index: "{expires_ms:020}:{id}" -> id, ordered by expiry
pub const ALLOCATION_EXPIRY: TableDefinition<&str, u64> =
    TableDefinition::new("allocation_expiry");

/// Admin credentials: key -> plaintext value
pub const CREDENTIALS: TableDefinition<&str, &str> = TableDefinition::new("credentials");

/// Admin sessions: token -> AdminSession (msgpack)
pub const ADMIN_SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("admin_sessions");

/// Quotes: sequential id -> Quote (msgpack)
pub const QUOTES: TableDefinition<u64, &[u8]> = TableDefinition::new("quotes");

/// Unique index: quote text -> quote id
pub const QUOTE_TEXTS: TableDefinition<&str, u64> = TableDefinition::new("quote_texts");

/// System settings in milliseconds: key -> value
pub const SETTINGS: TableDefinition<&str, u64> = TableDefinition::new("settings");
