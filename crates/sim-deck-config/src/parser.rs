//! KDL catalog parser

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::model::*;

/// Convert a span from kdl's miette version into ours
fn node_span(node: &kdl::KdlNode) -> miette::SourceSpan {
    let span = node.name().span();
    miette::SourceSpan::from((span.offset(), span.len()))
}

/// First positional argument of a node, if it is a string
fn first_arg(node: &kdl::KdlNode) -> Option<&str> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
}

/// Named property of a node, e.g. `label="Gear"`
fn property<'a>(node: &'a kdl::KdlNode, key: &str) -> Option<&'a kdl::KdlValue> {
    node.entries()
        .iter()
        .rev()
        .find(|e| e.name().map(|n| n.value()) == Some(key))
        .map(|e| e.value())
}

/// Value of a node's first positional argument, any type
fn first_value(node: &kdl::KdlNode) -> Option<&kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl uses an older miette version, so rebuild the span from offset/len
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            "profile" => {
                let profile = parse_profile(node, content)?;
                if config.profile(&profile.name).is_some() {
                    return Err(ConfigError::Invalid {
                        message: format!("Profile '{}' is defined more than once", profile.name),
                    });
                }
                config.profiles.push(profile);
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    if let Some(active) = &config.global.profile {
        if config.profile(active).is_none() {
            return Err(ConfigError::Invalid {
                message: format!("Active profile '{}' is not defined", active),
            });
        }
    }

    Ok(config)
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "log-level" => {
                    if let Some(val) = first_arg(child) {
                        global.log_level = val
                            .parse()
                            .map_err(|e| ConfigError::Invalid { message: e })?;
                    }
                }
                "listen" => {
                    if let Some(val) = first_arg(child) {
                        global.listen = val.to_string();
                    }
                }
                "token" => {
                    if let Some(val) = first_arg(child) {
                        global.token = val.to_string();
                    }
                }
                "backend" => {
                    if let Some(val) = first_arg(child) {
                        global.backend = val
                            .parse()
                            .map_err(|e| ConfigError::Invalid { message: e })?;
                    }
                }
                "settle-ms" => {
                    let ms = first_value(child).and_then(|v| v.as_i64()).ok_or_else(|| {
                        ConfigError::Invalid {
                            message: "settle-ms expects an integer".to_string(),
                        }
                    })?;
                    global.settle = millis(ms, "settle-ms")?;
                }
                "serialize-combos" => {
                    global.serialize_combos = first_value(child)
                        .and_then(|v| v.as_bool())
                        .ok_or_else(|| ConfigError::Invalid {
                            message: "serialize-combos expects true or false".to_string(),
                        })?;
                }
                "profile" => {
                    global.profile = first_arg(child).map(|s| s.to_string());
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn millis(ms: i64, what: &str) -> Result<Duration, ConfigError> {
    u64::try_from(ms)
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::Invalid {
            message: format!("{} must not be negative (got {})", what, ms),
        })
}

fn parse_profile(node: &kdl::KdlNode, source: &str) -> Result<Profile, ConfigError> {
    let name = first_arg(node).ok_or_else(|| ConfigError::MissingField {
        field: "profile name (e.g., `profile \"A-10C\" { ... }`)".to_string(),
    })?;

    let mut profile = Profile {
        name: name.to_string(),
        buttons: Vec::new(),
        macros: HashMap::new(),
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "button" => {
                    let button = parse_button(child, &profile.name, source)?;
                    if profile.button(&button.id).is_some() {
                        return Err(ConfigError::Invalid {
                            message: format!(
                                "Button '{}' is defined more than once in profile '{}'",
                                button.id, profile.name
                            ),
                        });
                    }
                    profile.buttons.push(button);
                }
                "macro" => {
                    let macro_def = parse_macro(child, &profile.name)?;
                    if profile.macros.contains_key(&macro_def.name) {
                        return Err(ConfigError::Invalid {
                            message: format!(
                                "Macro '{}' is defined more than once in profile '{}'",
                                macro_def.name, profile.name
                            ),
                        });
                    }
                    profile.macros.insert(macro_def.name.clone(), macro_def);
                }
                name => {
                    tracing::warn!("Unknown profile option: {}", name);
                }
            }
        }
    }

    // Macro references are checked once every macro in the profile is known,
    // so a button may appear before the macro it names.
    for button in &profile.buttons {
        if let ButtonAction::Macro(macro_name) = &button.action {
            if !profile.macros.contains_key(macro_name) {
                return Err(ConfigError::UnknownMacroRef {
                    profile: profile.name.clone(),
                    id: button.id.clone(),
                    macro_name: macro_name.clone(),
                });
            }
        }
    }

    Ok(profile)
}

fn parse_button(
    node: &kdl::KdlNode,
    profile: &str,
    source: &str,
) -> Result<ButtonDefinition, ConfigError> {
    let id = first_arg(node).ok_or_else(|| ConfigError::MissingField {
        field: format!("button id in profile '{}'", profile),
    })?;

    let invalid = |problem: &str| ConfigError::InvalidButton {
        profile: profile.to_string(),
        id: id.to_string(),
        problem: problem.to_string(),
        src: source.to_string(),
        span: node_span(node),
    };

    let combo = property(node, "combo").and_then(|v| v.as_string());
    let macro_name = property(node, "macro").and_then(|v| v.as_string());

    let action = match (combo, macro_name) {
        (Some(_), Some(_)) => return Err(invalid("has both a combo and a macro")),
        (None, None) => return Err(invalid("has neither a combo nor a macro")),
        (Some(combo), None) => {
            check_combo_shape(combo).map_err(|e| invalid(&e))?;
            ButtonAction::Combo(combo.to_string())
        }
        (None, Some(name)) => ButtonAction::Macro(name.to_string()),
    };

    let label = property(node, "label")
        .and_then(|v| v.as_string())
        .unwrap_or(id)
        .to_string();

    Ok(ButtonDefinition {
        id: id.to_string(),
        label,
        action,
    })
}

fn parse_macro(node: &kdl::KdlNode, profile: &str) -> Result<Macro, ConfigError> {
    let name = first_arg(node).ok_or_else(|| ConfigError::MissingField {
        field: format!("macro name in profile '{}'", profile),
    })?;

    let mut steps = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() != "step" {
                tracing::warn!("Unknown macro option: {}", child.name().value());
                continue;
            }
            // 1-based, counting `step` nodes only
            let number = steps.len() + 1;

            let combo = first_arg(child).ok_or_else(|| ConfigError::MissingField {
                field: format!("combo for step {} of macro '{}'", number, name),
            })?;
            check_combo_shape(combo).map_err(|e| ConfigError::Invalid {
                message: format!("Step {} of macro '{}': {}", number, name, e),
            })?;

            steps.push(MacroStep::new(combo, parse_step_delay(child, name, number)?));
        }
    }

    if steps.is_empty() {
        return Err(ConfigError::EmptyMacro {
            profile: profile.to_string(),
            name: name.to_string(),
        });
    }

    Ok(Macro {
        name: name.to_string(),
        steps,
    })
}

/// Step delay from `delay-ms=<int>` or `delay=<seconds>`; zero when absent
fn parse_step_delay(node: &kdl::KdlNode, macro_name: &str, number: usize) -> Result<Duration, ConfigError> {
    let what = format!("delay of step {} in macro '{}'", number, macro_name);

    if let Some(value) = property(node, "delay-ms") {
        let ms = value.as_i64().ok_or_else(|| ConfigError::Invalid {
            message: format!("{} expects an integer number of milliseconds", what),
        })?;
        return millis(ms, &what);
    }

    if let Some(value) = property(node, "delay") {
        let secs = value
            .as_f64()
            .or_else(|| value.as_i64().map(|v| v as f64))
            .ok_or_else(|| ConfigError::Invalid {
                message: format!("{} expects a number of seconds", what),
            })?;
        return Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::Invalid {
            message: format!("{} must be a non-negative number of seconds (got {})", what, secs),
        });
    }

    Ok(Duration::ZERO)
}

/// Structural check of a combo string: non-empty, no empty tokens.
///
/// Whether each token names a real key is decided by the daemon's resolver.
fn check_combo_shape(combo: &str) -> Result<(), String> {
    if combo.trim().is_empty() {
        return Err("combo is empty".to_string());
    }
    if combo.split('+').any(|token| token.trim().is_empty()) {
        return Err(format!(
            "combo '{}' has an empty key (write a literal plus as 'plus')",
            combo
        ));
    }
    Ok(())
}
