//! Executable actions
//!
//! Every compiled action implements [`CardAction`]. The concrete kinds are
//! small: the runtime-native ones (sleep, log, callback) do their work
//! directly, the rest forward to [`ActionEffects`](crate::ActionEffects).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::effects::ActionApi;
use crate::error::{ActionError, ActionResult};
use crate::spec::{DurationSpec, InternalCallback};

/// An executable action
#[async_trait]
pub trait CardAction: Send + Sync + fmt::Debug {
    /// The action kind, e.g. `sleep` or `navigate`
    fn kind(&self) -> &str;

    async fn execute(&self, api: &ActionApi) -> ActionResult<()>;
}

/// Waits for a duration; returns early when the action set is stopped
#[derive(Debug, Clone, PartialEq)]
pub struct SleepAction {
    pub duration: Duration,
}

impl SleepAction {
    pub fn from_config(config: &Value) -> ActionResult<Self> {
        #[derive(Deserialize)]
        struct SleepConfig {
            duration: DurationSpec,
        }

        let parsed = SleepConfig::deserialize(config)
            .map_err(|e| ActionError::InvalidConfig(format!("sleep: {e}")))?;
        let duration = parsed.duration.to_duration().ok_or_else(|| {
            ActionError::InvalidConfig(format!("sleep: invalid duration {:?}", parsed.duration))
        })?;
        Ok(Self { duration })
    }
}

#[async_trait]
impl CardAction for SleepAction {
    fn kind(&self) -> &str {
        "sleep"
    }

    async fn execute(&self, api: &ActionApi) -> ActionResult<()> {
        debug!("Sleeping for {:?}", self.duration);
        tokio::select! {
            _ = tokio::time::sleep(self.duration) => {}
            _ = api.stop.cancelled() => {
                debug!("Sleep interrupted by stop");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

/// Writes a message to the log
#[derive(Debug, Clone, PartialEq)]
pub struct LogAction {
    pub message: String,
    pub level: LogLevel,
}

impl LogAction {
    pub fn from_config(config: &Value) -> ActionResult<Self> {
        #[derive(Deserialize)]
        struct LogConfig {
            #[serde(default)]
            message: String,
            #[serde(default)]
            level: LogLevel,
        }

        let parsed = LogConfig::deserialize(config)
            .map_err(|e| ActionError::InvalidConfig(format!("log: {e}")))?;
        Ok(Self {
            message: parsed.message,
            level: parsed.level,
        })
    }
}

#[async_trait]
impl CardAction for LogAction {
    fn kind(&self) -> &str {
        "log"
    }

    async fn execute(&self, api: &ActionApi) -> ActionResult<()> {
        let card_id = api.context.card_id.as_deref().unwrap_or_default();
        let message = &self.message;
        match self.level {
            LogLevel::Trace => trace!(card_id, "{message}"),
            LogLevel::Debug => debug!(card_id, "{message}"),
            LogLevel::Info => info!(card_id, "{message}"),
            LogLevel::Warn => warn!(card_id, "{message}"),
            LogLevel::Error => error!(card_id, "{message}"),
        }
        Ok(())
    }
}

/// Runs an internal callback with the batch context
pub struct CallbackAction {
    pub callback: InternalCallback,
}

impl fmt::Debug for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackAction").finish_non_exhaustive()
    }
}

#[async_trait]
impl CardAction for CallbackAction {
    fn kind(&self) -> &str {
        "callback"
    }

    async fn execute(&self, api: &ActionApi) -> ActionResult<()> {
        (self.callback)((*api.context).clone()).await
    }
}

/// A host action, performed by the effects collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct HostAction {
    pub kind: String,
    pub config: Value,
}

#[async_trait]
impl CardAction for HostAction {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn execute(&self, api: &ActionApi) -> ActionResult<()> {
        api.effects
            .perform_host_action(&self.kind, &self.config, &api.context)
            .await
    }
}

/// A card action, performed by the effects collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct EffectAction {
    pub kind: String,
    pub config: Value,
}

#[async_trait]
impl CardAction for EffectAction {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn execute(&self, api: &ActionApi) -> ActionResult<()> {
        api.effects
            .perform_card_action(&self.kind, &self.config, &api.context)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::NoopEffects;
    use crate::spec::ActionContext;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn make_api() -> ActionApi {
        ActionApi {
            effects: Arc::new(NoopEffects),
            context: Arc::new(ActionContext::default()),
            stop: CancellationToken::new(),
        }
    }

    #[test]
    fn test_sleep_from_config() {
        let sleep = SleepAction::from_config(&json!({"duration": {"seconds": 2}})).unwrap();
        assert_eq!(sleep.duration, Duration::from_secs(2));

        assert!(SleepAction::from_config(&json!({})).is_err());
        assert!(SleepAction::from_config(&json!({"duration": "later"})).is_err());
    }

    #[test]
    fn test_log_from_config() {
        let log = LogAction::from_config(&json!({"message": "hi", "level": "warning"})).unwrap();
        assert_eq!(log.level, LogLevel::Warn);
        assert_eq!(LogAction::from_config(&json!({})).unwrap().level, LogLevel::Info);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_waits_full_duration() {
        let api = make_api();
        let sleep = SleepAction {
            duration: Duration::from_secs(5),
        };

        let start = tokio::time::Instant::now();
        sleep.execute(&api).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_stop() {
        let api = make_api();
        let stop = api.stop.clone();
        let sleep = SleepAction {
            duration: Duration::from_secs(60),
        };

        let start = tokio::time::Instant::now();
        let (result, _) = tokio::join!(sleep.execute(&api), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stop.cancel();
        });

        assert!(result.is_ok());
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_callback_receives_context() {
        let mut api = make_api();
        api.context = Arc::new(ActionContext {
            card_id: Some("main".into()),
            aux_config: Some(json!({"x": 1})),
        });
        let seen = Arc::new(std::sync::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let callback: InternalCallback = Arc::new(
            move |ctx: ActionContext| -> futures::future::BoxFuture<'static, ActionResult<()>> {
                *sink.lock().unwrap() = Some(ctx);
                Box::pin(async { Ok::<(), ActionError>(()) })
            },
        );
        let action = CallbackAction { callback };

        action.execute(&api).await.unwrap();
        let ctx = seen.lock().unwrap().clone().unwrap();
        assert_eq!(ctx.card_id.as_deref(), Some("main"));
        assert_eq!(ctx.aux_config, Some(json!({"x": 1})));
    }
}
