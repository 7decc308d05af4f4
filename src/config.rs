use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_DATA_DIR: &str = "storage";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MAX_TEXT_CHARS: usize = 500;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Size limits enforced by the post store.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_caption_chars: usize,
    pub max_comment_chars: usize,
    pub max_upload_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_caption_chars: DEFAULT_MAX_TEXT_CHARS,
            max_comment_chars: DEFAULT_MAX_TEXT_CHARS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub limits: Limits,
    pub session_ttl_hours: i64,
    pub bcrypt_cost: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            limits: Limits::default(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Config {
    /// Reads `MAATA_*` variables, falling back to defaults for anything
    /// unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            data_dir: lookup("MAATA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            bind_addr: lookup("MAATA_BIND_ADDR").unwrap_or(defaults.bind_addr),
            limits: Limits {
                max_caption_chars: parsed(&lookup, "MAATA_MAX_CAPTION_CHARS")
                    .unwrap_or(defaults.limits.max_caption_chars),
                max_comment_chars: parsed(&lookup, "MAATA_MAX_COMMENT_CHARS")
                    .unwrap_or(defaults.limits.max_comment_chars),
                max_upload_bytes: parsed(&lookup, "MAATA_MAX_UPLOAD_BYTES")
                    .unwrap_or(defaults.limits.max_upload_bytes),
            },
            session_ttl_hours: parsed(&lookup, "MAATA_SESSION_TTL_HOURS")
                .unwrap_or(defaults.session_ttl_hours),
            bcrypt_cost: parsed(&lookup, "MAATA_BCRYPT_COST").unwrap_or(defaults.bcrypt_cost),
        }
    }

    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join("users.csv")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
