use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Credentials assembled during a provisioning run.
///
/// Built once the disposable mailbox exists and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub mailbox_id: String,
    pub mailbox_password: String,
}

impl Identity {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Browser engines the provisioning run can be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserEngine {
    pub const ALL: [BrowserEngine; 3] = [
        BrowserEngine::Chromium,
        BrowserEngine::Firefox,
        BrowserEngine::Webkit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        }
    }
}

impl fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BrowserEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|engine| engine.name() == wanted)
            .ok_or_else(|| format!("unknown browser engine '{}'", s))
    }
}
