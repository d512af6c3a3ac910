/// Application name, used for state and config directory names.
pub const APP_NAME: &str = "modbuild";

/// Name of the package database file inside the state directory.
pub const PACKAGEDB_FILENAME: &str = "packagedb.json";

/// Name of the lock guarding the package database.
pub const PACKAGEDB_LOCK_FILENAME: &str = "packagedb.lock";

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "MODBUILD_STATE_DIR";

/// Environment variable overriding the configuration file path.
pub const CONFIG_FILE_ENV: &str = "MODBUILD_CONFIG";

/// Suffix appended to a staging root kept for post-mortem inspection.
pub const BROKEN_SUFFIX: &str = "-broken";
