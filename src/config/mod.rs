//! Layered configuration.
//!
//! Tiers, lowest priority first, merged field-by-field:
//! 1. **Defaults** - built into [`Config`]
//! 2. **Project** - `$CWD/taskhub/config.yaml`
//! 3. **User** - `~/.taskhub/config.yaml`
//! 4. **Environment** - see below
//!
//! ## Environment Variables
//! - `TASKHUB_CONFIG_PATH` - Explicit config file (replaces project and user tiers)
//! - `TASKHUB_DB_PATH` - Database path
//! - `TASKHUB_HOST` / `TASKHUB_PORT` - Listen address
//! - `TASKHUB_PUBLIC_URL` - External base URL for OAuth redirects
//! - `TASKHUB_SESSION_SECRET` - Session signing secret
//! - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` - Google OAuth credentials
//! - `TASKHUB_USER_DIR` - User config dir (default: `~/.taskhub`)
//! - `TASKHUB_PROJECT_DIR` - Project config dir (default: `./taskhub`)

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
