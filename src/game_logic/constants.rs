// Simulation timing
pub const DEFAULT_TICK_HZ: f64 = 60.0;

// Speed constants
pub const DEFAULT_MAX_SPEED: f32 = 200.0;
pub const LIMIT_MAX_SPEED: f32 = 300.0;
pub const MAX_SPEED_BONUS_DRAFTING: f32 = 4.0;
pub const MAX_SPEED_BONUS_PASSING: f32 = 20.0;
pub const HOVER_GRAVITY: f32 = 11.0;

// AI navigation
pub const MIN_STUCK_DISTANCE: f32 = 30.0;
pub const MIN_STUCK_TIME: f32 = 3.0;
pub const STUCK_RELEASE_TIME: f32 = 1.0;
pub const STUCK_MAX_SPEED: f32 = 30.0;
pub const MIN_WAYPOINT_DISTANCE: f32 = 30.0;
pub const HEADING_SLERP_RATE: f32 = 5.0;
pub const TURN_CHECK_MIN_SPEED_RATIO: f32 = 0.2;
pub const SLOW_DOWN_MIN_SPEED_RATIO: f32 = 0.3;
pub const RECOVERY_LOOKBACK: usize = 5;

// Waypoint progress windows
pub const MAX_FORWARD_GAP: i64 = 5;
pub const MAX_BACKWARD_GAP: i64 = 3;

// Car sensor
pub const SENSOR_RADIUS: f32 = 200.0;
pub const SAFE_FOLLOW_DIST: f32 = 80.0;
pub const TRIGGER_SPEED_PASSING: f32 = 0.90;
pub const TRIGGER_TIME_PASSING: f32 = 2.5;
pub const PASS_MERGE_TIME: f32 = 0.5;
pub const PASS_GO_TIME: f32 = 1.0;
pub const BASE_BOOST: f32 = 200.0;
pub const BASE_NON_BOOST: f32 = 25.0;

// Gun play
pub const GUN_SHOT_DIST: f32 = 160.0;
pub const MIN_TARGET_TO_FIRE_TIME: f32 = 1.0;
pub const GUN_RELOAD_TIME: f32 = 5.0;
pub const MAX_EXPLOSION_TIME: f32 = 1.2;
pub const HIT_ROLL_MAX: u8 = 5;

// Car condition timers
pub const DEFAULT_LIFE_AMOUNT: i32 = 3;
pub const INVINC_SECONDS: f32 = 10.0;
pub const MAX_IS_SHOT_TIME: f32 = 2.0;
pub const MAX_GAINED_LIFE_TIME: f32 = 2.0;
pub const MAX_SMOKE_TIME: f32 = 10.0;
pub const MAX_IS_LAP_COMPLETE_TIME: f32 = 6.0;

// Track surface
pub const ROAD_EXIT_DELAY: f32 = 5.0;
pub const DEFAULT_TRIGGER_RADIUS: f32 = 40.0;
pub const DEFAULT_ROAD_HALF_WIDTH: f32 = 60.0;

// Power-ups
pub const MAX_AMMO: u32 = 6;
pub const AMMO_INC: u32 = 3;
pub const PICKUP_DISTANCE: f32 = 24.0;
pub const MARKER_REFRESH_MIN: f32 = 60.0;
pub const MARKER_REFRESH_MAX: f32 = 90.0;
pub const BOOST_DURATION: f32 = 2.0;

// Collisions
pub const CAR_RADIUS: f32 = 8.0;
pub const BOUNCE_STRENGTH: f32 = 1.5;

// Lap time log
pub const MAX_LAP_TIME_ENTRIES: usize = 32;
