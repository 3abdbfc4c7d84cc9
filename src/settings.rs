//! Loading of the run [Settings] and of the list of databases to back up.
//!
//! Both files are read exactly once at the start of a run. Every error
//! returned from this module is fatal for the run: no database is touched
//! before the settings and the database list are loaded successfully.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Keys which have to be present in the settings file, in the order they are checked.
pub const REQUIRED_SETTINGS: [&str; 7] = [
    "pg_dump_path",
    "backup_folder",
    "max_backups",
    "host",
    "port",
    "username",
    "ftp_enabled",
];

/// Lines of the database list starting with this marker are ignored.
pub const COMMENT_MARKER: char = '#';

const DEFAULT_FTP_PORT: u16 = 21;

#[derive(Debug, Display, Error)]
/// Errors on loading the settings or the database list.
pub enum SettingsError {
    /// The settings file doesn't exist.
    #[display("Settings file not found: {}. Please create the settings file.", _0.display())]
    ConfigNotFound(#[error(ignore)] PathBuf),
    /// The settings file isn't valid JSON or a value has an unexpected type.
    #[display("Error decoding JSON from settings file: {_0}")]
    ConfigMalformed(serde_json::Error),
    /// A required setting is missing.
    #[display("Missing required setting: {_0}")]
    ConfigIncomplete(#[error(ignore)] String),
    /// The database list doesn't exist.
    #[display("Database list not found: {}", _0.display())]
    DatabaseListNotFound(#[error(ignore)] PathBuf),
    /// Reading one of the files failed for another reason.
    #[display("Reading {} failed: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Settings of a backup run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the `pg_dump` executable.
    pub pg_dump_path: PathBuf,
    /// Local folder the backups are written to.
    pub backup_folder: PathBuf,
    /// Number of backups kept per database.
    pub max_backups: usize,
    /// Host of the database server.
    pub host: String,
    /// Port of the database server.
    pub port: u16,
    /// User `pg_dump` connects as.
    ///
    /// The password is expected to be provided by `~/.pgpass` or `PGPASSWORD`.
    pub username: String,
    /// Notification settings, present if notifications are enabled.
    pub notification: Option<NotificationSettings>,
    /// FTP upload settings, present if the upload is enabled.
    pub ftp: Option<FtpSettings>,
}

/// Settings of the external notification script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub script_path: PathBuf,
    /// Prepended to every message, e.g. to tell environments apart.
    pub prefix: String,
}

/// Connection and destination of the FTP upload.
#[derive(Clone, PartialEq, Eq)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Remote folder the backups are stored in.
    pub target_folder: String,
}

impl fmt::Debug for FtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("target_folder", &self.target_folder)
            .finish()
    }
}

/// Settings file as it is stored on disk.
#[derive(Deserialize)]
struct SettingsFile {
    pg_dump_path: PathBuf,
    backup_folder: PathBuf,
    max_backups: usize,
    host: String,
    #[serde(deserialize_with = "deserialize_port")]
    port: u16,
    username: String,
    ftp_enabled: bool,
    telegram_notifications_enabled: Option<bool>,
    telegram_script_path: Option<PathBuf>,
    prefix: Option<String>,
    ftp_host: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_port")]
    ftp_port: Option<u16>,
    ftp_user: Option<String>,
    ftp_password: Option<String>,
    ftp_target_folder: Option<String>,
}

// Ports are accepted as JSON numbers as well as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Port {
    Number(u16),
    Text(String),
}

impl Port {
    fn into_port<E: serde::de::Error>(self) -> Result<u16, E> {
        match self {
            Port::Number(port) => Ok(port),
            Port::Text(port) => port
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid port: {port:?}"))),
        }
    }
}

fn deserialize_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    Port::deserialize(deserializer)?.into_port()
}

fn deserialize_optional_port<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u16>, D::Error> {
    Option::<Port>::deserialize(deserializer)?
        .map(Port::into_port)
        .transpose()
}

fn require<T>(value: Option<T>, key: &str) -> Result<T, SettingsError> {
    value.ok_or_else(|| SettingsError::ConfigIncomplete(key.to_string()))
}

impl Settings {
    /// Parses and validates settings from JSON.
    pub fn from_json_slice(json: &[u8]) -> Result<Self, SettingsError> {
        let value: Value = serde_json::from_slice(json).map_err(SettingsError::ConfigMalformed)?;

        // a non-object is reported by serde below
        if let Some(object) = value.as_object() {
            let missing = REQUIRED_SETTINGS
                .iter()
                .find(|key| object.get(**key).is_none_or(Value::is_null));
            if let Some(missing) = missing {
                return Err(SettingsError::ConfigIncomplete(missing.to_string()));
            }
        }

        let file: SettingsFile =
            serde_json::from_value(value).map_err(SettingsError::ConfigMalformed)?;
        Self::try_from(file)
    }
}

impl TryFrom<SettingsFile> for Settings {
    type Error = SettingsError;

    fn try_from(file: SettingsFile) -> Result<Self, Self::Error> {
        let notification = if file.telegram_notifications_enabled.unwrap_or(false) {
            Some(NotificationSettings {
                script_path: require(file.telegram_script_path, "telegram_script_path")?,
                prefix: file.prefix.unwrap_or_default(),
            })
        } else {
            None
        };

        let ftp = if file.ftp_enabled {
            Some(FtpSettings {
                host: require(file.ftp_host, "ftp_host")?,
                port: file.ftp_port.unwrap_or(DEFAULT_FTP_PORT),
                user: require(file.ftp_user, "ftp_user")?,
                password: require(file.ftp_password, "ftp_password")?,
                target_folder: require(file.ftp_target_folder, "ftp_target_folder")?,
            })
        } else {
            None
        };

        Ok(Self {
            pg_dump_path: file.pg_dump_path,
            backup_folder: file.backup_folder,
            max_backups: file.max_backups,
            host: file.host,
            port: file.port,
            username: file.username,
            notification,
            ftp,
        })
    }
}

/// Loads the [Settings] from the JSON file at `path`.
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SettingsError::ConfigNotFound(path.to_path_buf()))
        }
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    log::debug!(target: "settings", "Loaded settings from {}", path.display());

    Settings::from_json_slice(&content)
}

/// Loads the database names from the list at `path`.
pub fn load_databases(path: &Path) -> Result<Vec<String>, SettingsError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SettingsError::DatabaseListNotFound(path.to_path_buf()))
        }
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let databases = parse_databases(&content);
    log::debug!(target: "settings", "Loaded {} database(s) from {}", databases.len(), path.display());
    Ok(databases)
}

/// Returns one database name per line, skipping blank lines and comments.
///
/// Order and duplicates are kept as given.
pub fn parse_databases(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn full_settings() -> Value {
        json!({
            "pg_dump_path": "/usr/bin/pg_dump",
            "backup_folder": "/var/backups/postgres",
            "max_backups": 7,
            "host": "localhost",
            "port": "5432",
            "username": "postgres",
            "ftp_enabled": false
        })
    }

    fn parse(value: &Value) -> Result<Settings, SettingsError> {
        Settings::from_json_slice(value.to_string().as_bytes())
    }

    #[test]
    fn minimal_settings_load() {
        let settings = parse(&full_settings()).unwrap();

        assert_eq!(settings.pg_dump_path, PathBuf::from("/usr/bin/pg_dump"));
        assert_eq!(settings.max_backups, 7);
        assert_eq!(settings.port, 5432);
        assert!(settings.notification.is_none());
        assert!(settings.ftp.is_none());
    }

    #[test]
    fn every_missing_required_key_is_named() {
        for key in REQUIRED_SETTINGS {
            let mut value = full_settings();
            value.as_object_mut().unwrap().remove(key);

            match parse(&value) {
                Err(SettingsError::ConfigIncomplete(missing)) => assert_eq!(missing, key),
                other => panic!("expected {key} to be reported missing, got {other:?}"),
            }
        }
    }

    #[test]
    fn missing_username_is_reported() {
        let mut value = full_settings();
        value.as_object_mut().unwrap().remove("username");

        let err = parse(&value).unwrap_err();
        assert!(err.to_string().contains("username"), "{err}");
    }

    #[test]
    fn first_missing_key_wins() {
        let value = json!({ "pg_dump_path": "/usr/bin/pg_dump", "port": 5432 });

        match parse(&value) {
            Err(SettingsError::ConfigIncomplete(missing)) => assert_eq!(missing, "backup_folder"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn null_counts_as_missing() {
        let mut value = full_settings();
        value["host"] = Value::Null;

        assert!(matches!(parse(&value), Err(SettingsError::ConfigIncomplete(key)) if key == "host"));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = Settings::from_json_slice(b"{ \"pg_dump_path\": ").unwrap_err();
        assert!(matches!(err, SettingsError::ConfigMalformed(_)));
    }

    #[test]
    fn non_object_is_malformed() {
        let err = Settings::from_json_slice(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, SettingsError::ConfigMalformed(_)));
    }

    #[test]
    fn wrong_types_are_malformed() {
        let mut value = full_settings();
        value["max_backups"] = json!(-1);
        assert!(matches!(parse(&value), Err(SettingsError::ConfigMalformed(_))));

        let mut value = full_settings();
        value["port"] = json!("postgres");
        assert!(matches!(parse(&value), Err(SettingsError::ConfigMalformed(_))));
    }

    #[test]
    fn numeric_port_is_accepted() {
        let mut value = full_settings();
        value["port"] = json!(6543);

        assert_eq!(parse(&value).unwrap().port, 6543);
    }

    #[test]
    fn enabled_ftp_requires_its_settings() {
        let mut value = full_settings();
        value["ftp_enabled"] = json!(true);
        value["ftp_host"] = json!("ftp.example.org");
        value["ftp_user"] = json!("backup");
        value["ftp_password"] = json!("secret");

        match parse(&value) {
            Err(SettingsError::ConfigIncomplete(missing)) => {
                assert_eq!(missing, "ftp_target_folder")
            }
            other => panic!("unexpected result {other:?}"),
        }

        value["ftp_target_folder"] = json!("/backups");
        let ftp = parse(&value).unwrap().ftp.unwrap();
        assert_eq!(ftp.port, DEFAULT_FTP_PORT);
        assert_eq!(ftp.target_folder, "/backups");
    }

    #[test]
    fn ftp_password_is_not_printed() {
        let ftp = FtpSettings {
            host: "ftp.example.org".into(),
            port: 21,
            user: "backup".into(),
            password: "hunter2".into(),
            target_folder: "/".into(),
        };

        assert!(!format!("{ftp:?}").contains("hunter2"));
    }

    #[test]
    fn enabled_notifications_require_script() {
        let mut value = full_settings();
        value["telegram_notifications_enabled"] = json!(true);
        assert!(
            matches!(parse(&value), Err(SettingsError::ConfigIncomplete(key)) if key == "telegram_script_path")
        );

        value["telegram_script_path"] = json!("/opt/notify.sh");
        value["prefix"] = json!("[prod]");
        let notification = parse(&value).unwrap().notification.unwrap();
        assert_eq!(notification.script_path, PathBuf::from("/opt/notify.sh"));
        assert_eq!(notification.prefix, "[prod]");
    }

    #[test]
    fn missing_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        assert!(matches!(load_settings(&path), Err(SettingsError::ConfigNotFound(p)) if p == path));
    }

    #[test]
    fn settings_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, full_settings().to_string()).unwrap();

        assert_eq!(load_settings(&path).unwrap().username, "postgres");
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let databases = parse_databases("# comment\n\ndb_a\ndb_b\n");
        assert_eq!(databases, ["db_a", "db_b"]);
    }

    #[test]
    fn database_order_and_duplicates_are_kept() {
        let databases = parse_databases("  orders \n\t\ncustomers\n   # inventory\norders\n");
        assert_eq!(databases, ["orders", "customers", "orders"]);
    }

    #[test]
    fn missing_database_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("databases.txt");

        assert!(matches!(
            load_databases(&path),
            Err(SettingsError::DatabaseListNotFound(p)) if p == path
        ));

        fs::write(&path, "db_a\n#db_b\ndb_c").unwrap();
        assert_eq!(load_databases(&path).unwrap(), ["db_a", "db_c"]);
    }
}
