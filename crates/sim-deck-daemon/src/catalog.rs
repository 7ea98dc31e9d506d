//! Button and macro lookup for the gateway

use sim_deck_config::{ButtonDefinition, Macro, Profile};

use crate::keys::{resolve_combo, ResolveError};

/// Read-only view of the catalog the gateway resolves requests against.
pub trait CatalogLookup: Send + Sync {
    /// Name shown in logs and the health endpoint
    fn name(&self) -> &str;

    /// All buttons, in display order
    fn buttons(&self) -> &[ButtonDefinition];

    fn button(&self, id: &str) -> Option<&ButtonDefinition>;

    fn find_macro(&self, name: &str) -> Option<&Macro>;
}

impl CatalogLookup for Profile {
    fn name(&self) -> &str {
        &self.name
    }

    fn buttons(&self) -> &[ButtonDefinition] {
        &self.buttons
    }

    fn button(&self, id: &str) -> Option<&ButtonDefinition> {
        Profile::button(self, id)
    }

    fn find_macro(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }
}

/// A combo in the catalog that does not resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboProblem {
    /// Where the combo appears, e.g. "macro 'cold_start' step 2"
    pub location: String,
    pub combo: String,
    pub error: ResolveError,
}

impl std::fmt::Display for ComboProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: combo '{}': {}", self.location, self.combo, self.error)
    }
}

/// Resolve every combo a profile references.
///
/// Returns one entry per combo that fails; an empty list means every button
/// and macro step can be executed (backend permitting).
pub fn check_profile(profile: &Profile) -> Vec<ComboProblem> {
    profile
        .combos()
        .into_iter()
        .filter_map(|(location, combo)| {
            resolve_combo(combo).err().map(|error| ComboProblem {
                location,
                combo: combo.to_string(),
                error,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_deck_config::parse_config_str;

    #[test]
    fn test_profile_lookup() {
        let config = parse_config_str(
            r#"
            profile "demo" {
                button "gear" label="Gear" combo="w"
                button "start" macro="cold_start"
                macro "cold_start" {
                    step "rctrl+home" delay-ms=200
                }
            }
            "#,
        )
        .unwrap();
        let profile = config.profile("demo").unwrap();
        let catalog: &dyn CatalogLookup = profile;

        assert_eq!(catalog.name(), "demo");
        assert_eq!(catalog.buttons().len(), 2);
        assert_eq!(catalog.button("gear").unwrap().label, "Gear");
        assert!(catalog.button("missing").is_none());
        assert_eq!(catalog.find_macro("cold_start").unwrap().steps.len(), 1);
        assert!(catalog.find_macro("missing").is_none());
    }

    #[test]
    fn test_check_profile_reports_unresolvable_combos() {
        let config = parse_config_str(
            r#"
            profile "demo" {
                button "ok" combo="lctrl+home"
                button "bad" combo="lctrl+hoem"
                macro "m" {
                    step "f"
                    step "notakey"
                }
            }
            "#,
        )
        .unwrap();

        let problems = check_profile(config.profile("demo").unwrap());

        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].location, "button 'bad'");
        assert_eq!(problems[0].combo, "lctrl+hoem");
        assert!(matches!(
            problems[0].error,
            ResolveError::Token { position: 1, .. }
        ));
        assert_eq!(problems[1].location, "macro 'm' step 2");
        assert!(problems[1].to_string().contains("notakey"));
    }

    #[test]
    fn test_check_profile_clean() {
        let config = parse_config_str(
            r#"
            profile "demo" {
                button "comm" combo="\""
                button "view" combo="F1"
            }
            "#,
        )
        .unwrap();

        assert!(check_profile(config.profile("demo").unwrap()).is_empty());
    }

    #[test]
    fn test_example_config_resolves() {
        let config = parse_config_str(include_str!("../../../config.example.kdl")).unwrap();

        assert_eq!(config.default_profile().unwrap().name, "a10c");
        for profile in &config.profiles {
            let problems = check_profile(profile);
            assert!(problems.is_empty(), "{}: {:?}", profile.name, problems);
        }
    }
}
