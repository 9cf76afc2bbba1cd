use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy::state::app::StatesPlugin;
use hover_racers::RaceConfig;
use hover_racers::game_logic::{RacePlugin, RaceState, load_track_file};
use std::time::Duration;

const CONFIG_PATH: &str = "assets/race.json";

/// Frame limit of the headless run.
#[derive(Resource)]
struct FrameLimit {
    max_frames: u64,
    frames: u64,
}

fn main() -> anyhow::Result<()> {
    // Logging is not up yet, so fallbacks go to stderr.
    let config = RaceConfig::load(CONFIG_PATH).unwrap_or_else(|err| {
        eprintln!("using default race config: {err:#}");
        RaceConfig::default()
    });
    let track = load_track_file(&config.track_file)?;
    let tick = Duration::from_secs_f64(1.0 / config.tick_hz.max(1.0));

    App::new()
        .add_plugins((
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(tick)),
            StatesPlugin,
            LogPlugin {
                filter: config.log_filter.clone(),
                ..default()
            },
        ))
        .insert_resource(FrameLimit {
            max_frames: config.max_frames,
            frames: 0,
        })
        .add_plugins(RacePlugin { config, track })
        .add_systems(Last, exit_when_done)
        .run();

    Ok(())
}

fn exit_when_done(
    mut limit: ResMut<FrameLimit>,
    state: Res<State<RaceState>>,
    mut exit: EventWriter<AppExit>,
) {
    limit.frames += 1;
    if *state.get() == RaceState::Finished {
        exit.write(AppExit::Success);
    } else if limit.max_frames > 0 && limit.frames >= limit.max_frames {
        info!("stopping after {} frames", limit.frames);
        exit.write(AppExit::Success);
    }
}
