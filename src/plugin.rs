//! Bevy integration
//!
//! [`SemLogPlugin`] creates the [`SemLogSession`] resource at startup, drives
//! it from `Time` every frame and finishes it when the app exits. Game
//! systems feed signals through `ResMut<SemLogSession>`.

use bevy::log::{error, info};
use bevy::prelude::*;

use crate::config::SemLogConfig;
use crate::session::SemLogSession;

/// Config the session is created from at startup
#[derive(Resource, Debug, Clone, Default)]
pub struct SemLogSettings(pub SemLogConfig);

/// System sets for ordering game systems around the logger
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SemLogSystems {
    /// Clock advance, delayed actions, furniture polling, world state
    Tick,
    /// Teardown on app exit
    Finish,
}

#[derive(Default)]
pub struct SemLogPlugin {
    pub config: SemLogConfig,
}

impl SemLogPlugin {
    pub fn new(config: SemLogConfig) -> Self {
        Self { config }
    }
}

impl Plugin for SemLogPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(SemLogSettings(self.config.clone()))
            .add_systems(Startup, semlog_setup)
            .add_systems(Update, semlog_tick.in_set(SemLogSystems::Tick))
            .add_systems(Last, semlog_finish_on_exit.in_set(SemLogSystems::Finish));
    }
}

/// Create the session and apply its start mode
pub fn semlog_setup(mut commands: Commands, settings: Res<SemLogSettings>) {
    match SemLogSession::new(settings.0.clone()) {
        Ok(mut session) => {
            session.begin_play();
            commands.insert_resource(session);
        }
        Err(e) => error!("Semantic logging disabled: {}", e),
    }
}

/// Advance the session by the frame delta
pub fn semlog_tick(time: Res<Time>, session: Option<ResMut<SemLogSession>>) {
    let Some(mut session) = session else {
        return;
    };
    let outcome = session.tick(time.delta_secs_f64());
    if outcome.started {
        info!("Semantic logging started for episode {}", session.episode_id());
    }
}

/// Finish the episode once an `AppExit` is seen
pub fn semlog_finish_on_exit(
    mut exits: MessageReader<AppExit>,
    session: Option<ResMut<SemLogSession>>,
) {
    if exits.read().next().is_none() {
        return;
    }
    if let Some(mut session) = session
        && let Some(report) = session.finish()
        && let Some(path) = report.owl_path
    {
        info!("Episode written to {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StartMode;
    use crate::events::ParticipantId;
    use crate::session::SessionState;
    use std::time::Duration;

    fn app(config: SemLogConfig) -> App {
        let mut app = App::new();
        app.insert_resource(Time::<()>::default());
        app.add_plugins(SemLogPlugin::new(config));
        app
    }

    fn config() -> SemLogConfig {
        let mut config = SemLogConfig::default();
        config.session.episode_id = "plugin_ep".to_string();
        config.session.log_directory = None;
        config
    }

    fn step(app: &mut App, secs: f64) {
        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_secs_f64(secs));
        app.update();
    }

    #[test]
    fn test_plugin_creates_and_ticks_session() {
        let mut config = config();
        config.session.start = StartMode::AfterDelay { delay: 1.0 };
        let mut app = app(config);
        app.update();
        assert_eq!(
            app.world().resource::<SemLogSession>().state(),
            SessionState::Pending
        );

        step(&mut app, 0.5);
        step(&mut app, 0.6);
        let session = app.world().resource::<SemLogSession>();
        assert!(session.is_running());
        assert!((session.now().secs() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_plugin_finishes_on_exit() {
        let mut app = app(config());
        app.update();
        {
            let mut session = app.world_mut().resource_mut::<SemLogSession>();
            session.grasp_begin(&ParticipantId::from("Hand"), &ParticipantId::from("Cup"));
            session.contact_begin(&ParticipantId::from("Cup"), &ParticipantId::from("Table"));
        }
        step(&mut app, 2.0);

        app.world_mut().write_message(AppExit::Success);
        step(&mut app, 0.0);
        let session = app.world().resource::<SemLogSession>();
        assert_eq!(session.state(), SessionState::Finished);
        assert_eq!(session.ledger().finished().len(), 1);
        assert_eq!(session.ledger().finished()[0].end().map(|t| t.secs()), Some(2.0));
    }

    #[test]
    fn test_invalid_config_leaves_app_running() {
        let mut config = config();
        config.furniture.poll_interval = -1.0;
        let mut app = app(config);
        app.update();
        step(&mut app, 0.1);
        assert!(app.world().get_resource::<SemLogSession>().is_none());
    }
}
