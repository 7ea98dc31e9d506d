//! Configuration data model

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

/// Default time keys are held down before release.
pub const DEFAULT_SETTLE_MS: u64 = 10;

/// Default listen address, reachable from other devices on the LAN.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:5000";

/// Root configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    /// Profiles in declaration order
    pub profiles: Vec<Profile>,
}

impl Config {
    /// Find a profile by name
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// The profile to serve when none is requested explicitly.
    ///
    /// This is `global.profile` if set, otherwise the first declared profile.
    pub fn default_profile(&self) -> Option<&Profile> {
        match &self.global.profile {
            Some(name) => self.profile(name),
            None => self.profiles.first(),
        }
    }
}

/// Global settings
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
    pub listen: String,
    /// Shared secret checked on every API call; empty disables the check
    pub token: String,
    pub backend: BackendKind,
    /// How long a full combo is held before its keys are released
    pub settle: Duration,
    /// Serialize combo press/release sections across concurrent callers
    pub serialize_combos: bool,
    /// Active profile name
    pub profile: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            listen: DEFAULT_LISTEN.to_string(),
            token: String::new(),
            backend: BackendKind::default(),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            serialize_combos: false,
            profile: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Which key-injection backend the daemon drives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Virtual keyboard through /dev/uinput
    #[default]
    Uinput,
    /// Log key events without injecting them
    Log,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uinput" => Ok(Self::Uinput),
            "log" | "dry-run" => Ok(Self::Log),
            _ => Err(format!("Unknown backend: {} (expected \"uinput\" or \"log\")", s)),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uinput => f.write_str("uinput"),
            Self::Log => f.write_str("log"),
        }
    }
}

/// A named set of buttons and macros, typically one aircraft or module
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub name: String,
    /// Buttons in declaration order (the order they are shown on the deck)
    pub buttons: Vec<ButtonDefinition>,
    pub macros: HashMap<String, Macro>,
}

impl Profile {
    /// Look up a button by id
    pub fn button(&self, id: &str) -> Option<&ButtonDefinition> {
        self.buttons.iter().find(|b| b.id == id)
    }

    /// Every combo string referenced by this profile, with a description of
    /// where it appears.
    pub fn combos(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        for button in &self.buttons {
            if let ButtonAction::Combo(combo) = &button.action {
                out.push((format!("button '{}'", button.id), combo.as_str()));
            }
        }
        let mut names: Vec<&String> = self.macros.keys().collect();
        names.sort();
        for name in names {
            for (i, step) in self.macros[name].steps.iter().enumerate() {
                out.push((format!("macro '{}' step {}", name, i + 1), step.combo.as_str()));
            }
        }
        out
    }
}

/// A single tappable button on the deck
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonDefinition {
    pub id: String,
    pub label: String,
    #[serde(flatten)]
    pub action: ButtonAction,
}

/// What a button triggers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    /// A single key combination, e.g. "lctrl+home"
    Combo(String),
    /// The name of a macro in the same profile
    Macro(String),
}

/// A named, timed sequence of combos
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    pub steps: Vec<MacroStep>,
}

/// One combo and the pause that follows its release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroStep {
    pub combo: String,
    pub delay: Duration,
}

impl MacroStep {
    pub fn new(combo: impl Into<String>, delay: Duration) -> Self {
        Self {
            combo: combo.into(),
            delay,
        }
    }
}
