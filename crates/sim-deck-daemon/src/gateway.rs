//! Invocation gateway
//!
//! The single entry point the transport calls. A request names a button id,
//! a combo or a macro; the gateway resolves ids through the catalog, runs
//! combos on the caller's task and starts macros on their own task.
//!
//! ```text
//! {id}    --catalog--> combo | macro
//! {combo} --> ComboExecutor::execute (awaited)      -> ComboExecuted
//! {macro} --> MacroRunner::spawn   (not awaited)    -> MacroStarted
//! {}      --> Malformed
//! ```
//!
//! The gateway keeps no history; every call stands alone.

use std::sync::Arc;

use serde::Deserialize;
use sim_deck_config::ButtonAction;
use thiserror::Error;

use crate::catalog::CatalogLookup;
use crate::combo::{ComboError, ComboExecutor};
use crate::macro_runner::MacroRunner;

/// What the caller asked for. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InvocationRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub combo: Option<String>,
    #[serde(default, rename = "macro")]
    pub macro_name: Option<String>,
}

impl InvocationRequest {
    pub fn button(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn combo(combo: impl Into<String>) -> Self {
        Self {
            combo: Some(combo.into()),
            ..Self::default()
        }
    }

    pub fn macro_name(name: impl Into<String>) -> Self {
        Self {
            macro_name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Successful outcome of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// The combo was pressed and released before returning
    ComboExecuted(String),
    /// The macro was started; it may still be running
    MacroStarted(String),
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("unknown button '{0}'")]
    UnknownButton(String),

    #[error("unknown macro '{0}'")]
    UnknownMacro(String),

    #[error("no combo or macro")]
    Malformed,

    #[error(transparent)]
    Execution(#[from] ComboError),
}

pub struct InvocationGateway {
    catalog: Arc<dyn CatalogLookup>,
    combos: ComboExecutor,
    macros: MacroRunner,
}

impl InvocationGateway {
    pub fn new(catalog: Arc<dyn CatalogLookup>, combos: ComboExecutor, macros: MacroRunner) -> Self {
        Self {
            catalog,
            combos,
            macros,
        }
    }

    pub fn catalog(&self) -> &dyn CatalogLookup {
        self.catalog.as_ref()
    }

    pub fn backend_name(&self) -> &'static str {
        self.combos.backend_name()
    }

    /// Number of macros still running
    pub fn running_macros(&self) -> usize {
        self.macros.active()
    }

    pub async fn invoke(&self, request: InvocationRequest) -> Result<Invocation, InvokeError> {
        let mut combo = non_empty(request.combo);
        let mut macro_name = non_empty(request.macro_name);

        if let Some(id) = non_empty(request.id) {
            let button = self
                .catalog
                .button(&id)
                .ok_or_else(|| InvokeError::UnknownButton(id.clone()))?;
            tracing::debug!("Button '{}' ({}) pressed", button.id, button.label);

            // The button's definition replaces whatever else was sent
            (combo, macro_name) = match &button.action {
                ButtonAction::Combo(c) => (Some(c.clone()), None),
                ButtonAction::Macro(m) => (None, Some(m.clone())),
            };
        }

        if let Some(combo) = combo {
            self.combos.execute(&combo).await.map_err(|e| {
                tracing::warn!("Combo '{}' failed: {}", combo, e);
                InvokeError::Execution(e)
            })?;
            return Ok(Invocation::ComboExecuted(combo));
        }

        if let Some(name) = macro_name {
            let macro_def = self
                .catalog
                .find_macro(&name)
                .ok_or_else(|| InvokeError::UnknownMacro(name.clone()))?;
            tracing::info!("Starting macro '{}' ({} step(s))", name, macro_def.steps.len());
            // Detached: the handle is dropped and the caller does not wait
            drop(self.macros.spawn(macro_def.clone()));
            return Ok(Invocation::MacroStarted(name));
        }

        Err(InvokeError::Malformed)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RecordingClock;
    use crate::injector::{KeyEvent, RecordingInjector};
    use crate::keys::{KeyId, ResolveError};
    use crate::macro_runner::Shutdown;
    use sim_deck_config::parse_config_str;
    use std::time::Duration;

    const CATALOG: &str = r#"
        profile "demo" {
            button "gear" label="Gear Toggle" combo="w"
            button "start" label="Cold Start" macro="cold_start"
            macro "cold_start" {
                step "a" delay-ms=200
                step "b"
            }
            macro "lights" {
                step "l"
            }
        }
    "#;

    fn gateway(injector: &Arc<RecordingInjector>) -> (InvocationGateway, Shutdown) {
        let config = parse_config_str(CATALOG).unwrap();
        let profile = config.profile("demo").unwrap().clone();
        let clock = Arc::new(RecordingClock::new());
        let shutdown = Shutdown::new();
        let combos = ComboExecutor::new(injector.clone(), clock.clone(), Duration::ZERO);
        let macros = MacroRunner::new(combos.clone(), clock, shutdown.subscribe());
        (
            InvocationGateway::new(Arc::new(profile), combos, macros),
            shutdown,
        )
    }

    fn tap(c: char) -> Vec<KeyEvent> {
        vec![KeyEvent::Press(KeyId::Char(c)), KeyEvent::Release(KeyId::Char(c))]
    }

    #[tokio::test]
    async fn test_combo_request_executes_synchronously() {
        let injector = Arc::new(RecordingInjector::new());
        let (gateway, _shutdown) = gateway(&injector);

        let outcome = gateway.invoke(InvocationRequest::combo("q")).await.unwrap();

        assert_eq!(outcome, Invocation::ComboExecuted("q".to_string()));
        assert_eq!(injector.events(), tap('q'));
    }

    #[tokio::test]
    async fn test_button_with_combo() {
        let injector = Arc::new(RecordingInjector::new());
        let (gateway, _shutdown) = gateway(&injector);

        let outcome = gateway.invoke(InvocationRequest::button("gear")).await.unwrap();

        assert_eq!(outcome, Invocation::ComboExecuted("w".to_string()));
        assert_eq!(injector.events(), tap('w'));
    }

    #[tokio::test]
    async fn test_button_definition_overrides_request_fields() {
        let injector = Arc::new(RecordingInjector::new());
        let (gateway, _shutdown) = gateway(&injector);

        let request = InvocationRequest {
            id: Some("gear".to_string()),
            combo: Some("z".to_string()),
            macro_name: Some("lights".to_string()),
        };
        let outcome = gateway.invoke(request).await.unwrap();

        assert_eq!(outcome, Invocation::ComboExecuted("w".to_string()));
    }

    #[tokio::test]
    async fn test_macro_starts_before_any_step_runs() {
        let injector = Arc::new(RecordingInjector::new());
        let (gateway, _shutdown) = gateway(&injector);

        let outcome = gateway.invoke(InvocationRequest::button("start")).await.unwrap();

        assert_eq!(outcome, Invocation::MacroStarted("cold_start".to_string()));
        // The response came back before the spawned task was ever polled
        assert!(injector.events().is_empty());
        assert_eq!(gateway.running_macros(), 1);

        while gateway.running_macros() > 0 {
            tokio::task::yield_now().await;
        }
        let mut expected = tap('a');
        expected.extend(tap('b'));
        assert_eq!(injector.events(), expected);
    }

    #[tokio::test]
    async fn test_macro_by_name() {
        let injector = Arc::new(RecordingInjector::new());
        let (gateway, _shutdown) = gateway(&injector);

        let outcome = gateway
            .invoke(InvocationRequest::macro_name("lights"))
            .await
            .unwrap();

        assert_eq!(outcome, Invocation::MacroStarted("lights".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_button() {
        let injector = Arc::new(RecordingInjector::new());
        let (gateway, _shutdown) = gateway(&injector);

        let err = gateway
            .invoke(InvocationRequest::button("does-not-exist"))
            .await
            .unwrap_err();

        assert!(matches!(err, InvokeError::UnknownButton(id) if id == "does-not-exist"));
        assert!(injector.events().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_macro() {
        let injector = Arc::new(RecordingInjector::new());
        let (gateway, _shutdown) = gateway(&injector);

        let err = gateway
            .invoke(InvocationRequest::macro_name("nope"))
            .await
            .unwrap_err();

        assert!(matches!(err, InvokeError::UnknownMacro(name) if name == "nope"));
        assert_eq!(gateway.running_macros(), 0);
    }

    #[tokio::test]
    async fn test_empty_request_is_malformed() {
        let injector = Arc::new(RecordingInjector::new());
        let (gateway, _shutdown) = gateway(&injector);

        let err = gateway.invoke(InvocationRequest::default()).await.unwrap_err();
        assert!(matches!(err, InvokeError::Malformed));

        // Blank strings are treated as missing
        let request = InvocationRequest {
            id: Some(String::new()),
            combo: Some("  ".to_string()),
            macro_name: Some(String::new()),
        };
        let err = gateway.invoke(request).await.unwrap_err();
        assert!(matches!(err, InvokeError::Malformed));
    }

    #[tokio::test]
    async fn test_unresolvable_combo_is_execution_error() {
        let injector = Arc::new(RecordingInjector::new());
        let (gateway, _shutdown) = gateway(&injector);

        let err = gateway
            .invoke(InvocationRequest::combo("ctrl+notakey"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            InvokeError::Execution(ComboError::Resolve(ResolveError::Token { position: 1, .. }))
        ));
        assert!(injector.events().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_execution_error() {
        let injector = Arc::new(RecordingInjector::new().fail_press(KeyId::Char('w')));
        let (gateway, _shutdown) = gateway(&injector);

        let err = gateway
            .invoke(InvocationRequest::button("gear"))
            .await
            .unwrap_err();

        assert!(matches!(err, InvokeError::Execution(ComboError::Press { .. })));
    }

    #[test]
    fn test_request_deserialization() {
        let request: InvocationRequest = serde_json::from_str(r#"{"id":"gear"}"#).unwrap();
        assert_eq!(request, InvocationRequest::button("gear"));

        let request: InvocationRequest =
            serde_json::from_str(r#"{"macro":"cold_start"}"#).unwrap();
        assert_eq!(request, InvocationRequest::macro_name("cold_start"));

        let request: InvocationRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, InvocationRequest::default());
    }
}
