use crate::config::ControlConfig;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
}

impl ControlAction {
    pub const ALL: [ControlAction; 3] = [Self::Start, Self::Stop, Self::Restart];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }

    pub fn success_message(self) -> &'static str {
        match self {
            Self::Start => "Server started successfully",
            Self::Stop => "Server stopped successfully",
            Self::Restart => "Server restarted successfully",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{action} failed: {reason}")]
    Failed {
        action: ControlAction,
        reason: String,
    },
}

/// Lifecycle operations on the managed server. Implementations must be
/// cancel-safe: dropping the returned future abandons the action.
#[async_trait]
pub trait ServerController: Send + Sync {
    async fn perform(&self, action: ControlAction) -> Result<(), ControlError>;
}

/// Stands in for real lifecycle work by sleeping for a per-action delay.
#[derive(Debug, Clone)]
pub struct SimulatedController {
    start_delay: Duration,
    stop_delay: Duration,
    restart_delay: Duration,
}

impl SimulatedController {
    pub fn new(start_delay: Duration, stop_delay: Duration, restart_delay: Duration) -> Self {
        Self {
            start_delay,
            stop_delay,
            restart_delay,
        }
    }

    pub fn from_config(cfg: &ControlConfig) -> Self {
        Self::new(cfg.start_delay, cfg.stop_delay, cfg.restart_delay)
    }

    pub fn delay_for(&self, action: ControlAction) -> Duration {
        match action {
            ControlAction::Start => self.start_delay,
            ControlAction::Stop => self.stop_delay,
            ControlAction::Restart => self.restart_delay,
        }
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::from_config(&ControlConfig::default())
    }
}

#[async_trait]
impl ServerController for SimulatedController {
    async fn perform(&self, action: ControlAction) -> Result<(), ControlError> {
        let delay = self.delay_for(action);
        info!(%action, delay_ms = delay.as_millis() as u64, "simulating server action");
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn assert_elapsed(started: Instant, expected: Duration) {
        let elapsed = started.elapsed();
        assert!(elapsed >= expected, "{elapsed:?} < {expected:?}");
        assert!(elapsed < expected + Duration::from_millis(100));
    }

    #[test]
    fn messages_are_action_specific() {
        assert_eq!(
            ControlAction::Start.success_message(),
            "Server started successfully"
        );
        assert_eq!(
            ControlAction::Stop.success_message(),
            "Server stopped successfully"
        );
        assert_eq!(
            ControlAction::Restart.success_message(),
            "Server restarted successfully"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn default_delays_match_action() {
        let controller = SimulatedController::default();

        let started = Instant::now();
        controller.perform(ControlAction::Start).await.unwrap();
        assert_elapsed(started, Duration::from_secs(1));

        let started = Instant::now();
        controller.perform(ControlAction::Stop).await.unwrap();
        assert_elapsed(started, Duration::from_secs(1));

        let started = Instant::now();
        controller.perform(ControlAction::Restart).await.unwrap();
        assert_elapsed(started, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_future_cancels_the_action() {
        let controller = SimulatedController::default();
        let result = tokio::time::timeout(
            Duration::from_millis(500),
            controller.perform(ControlAction::Restart),
        )
        .await;
        assert!(result.is_err());
    }
}
