//! Destination tables and the load plan for each data set.

use crate::builders::{
    BallPositionBuilder, FrameBuilder, GameEventBuilder, MatchMetadataBuilder, PassBuilder,
    PlayerPositionBuilder, PossessionEventBuilder, RosterBuilder, RosterPlayerBuilder, RowBuilder,
    ShotBuilder, Side, TimelineBuilder,
};
use crate::row::{DedupScope, TableSpec};

pub const TRACKING_FRAMES: &str = "tracking_frames";
pub const PLAYER_POSITIONS: &str = "tracking_player_positions";
pub const PLAYER_POSITIONS_SMOOTHED: &str = "tracking_player_positions_smoothed";
pub const BALL_POSITIONS: &str = "tracking_ball_positions";
pub const BALL_POSITIONS_SMOOTHED: &str = "tracking_ball_positions_smoothed";
pub const EVENT_TIMELINE: &str = "event_timeline";
pub const GAME_EVENTS: &str = "game_events";
pub const POSSESSION_EVENTS: &str = "possession_events";
pub const PASSES: &str = "passes";
pub const SHOTS: &str = "shots";
pub const MATCH_METADATA: &str = "match_metadata";
pub const MATCH_ROSTERS: &str = "match_rosters";
pub const ROSTER_PLAYERS: &str = "roster_players";

const FRAME_KEY: &[&str] = &["game_id", "frame_num"];
const PLAYER_KEY: &[&str] = &["game_id", "frame_num", "side", "jersey_num"];
const BALL_KEY: &[&str] = &["game_id", "frame_num", "ball_idx"];
const GAME_EVENT_KEY: &[&str] = &["match_id", "game_event_id"];
const POSSESSION_KEY: &[&str] = &["match_id", "possession_event_id"];
const METADATA_KEY: &[&str] = &["match_id"];
const ROSTER_KEY: &[&str] = &["match_id", "team_id", "player_id"];
const ROSTER_PLAYER_KEY: &[&str] = &["id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    /// Raw frames, players and balls, plus smoothed variants unless disabled.
    Tracking { smoothed: bool },
    SmoothTracking,
    SmoothBalls,
    Events,
    Metadata,
    Rosters,
}

/// Flush thresholds by expected row volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub frames: usize,
    pub players: usize,
    pub balls: usize,
    pub entity_rows: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            frames: 400,
            players: 8000,
            balls: 2000,
            entity_rows: 500,
        }
    }
}

impl Thresholds {
    fn clamped(self) -> Self {
        Self {
            frames: self.frames.max(1),
            players: self.players.max(1),
            balls: self.balls.max(1),
            entity_rows: self.entity_rows.max(1),
        }
    }
}

/// Tables, builders and downsampling for one data set.
pub struct LoadPlan {
    pub dataset: Dataset,
    pub tables: Vec<TableSpec>,
    pub builders: Vec<Box<dyn RowBuilder>>,
    pub downsample: bool,
}

impl LoadPlan {
    pub fn for_dataset(dataset: Dataset, thresholds: Thresholds) -> Self {
        let t = thresholds.clamped();
        let frames = || {
            TableSpec::new(TRACKING_FRAMES, FRAME_KEY)
                .partitioned_by("game_id")
                .threshold(t.frames)
        };
        let players = |name: &'static str| {
            TableSpec::new(name, PLAYER_KEY)
                .partitioned_by("game_id")
                .threshold(t.players)
        };
        let balls = |name: &'static str| {
            TableSpec::new(name, BALL_KEY)
                .partitioned_by("game_id")
                .threshold(t.balls)
        };
        let entity = |name: &'static str, key: &'static [&'static str]| {
            TableSpec::new(name, key)
                .partitioned_by("match_id")
                .threshold(t.entity_rows)
                .scope(DedupScope::Unit)
        };

        let mut tables = Vec::new();
        let mut builders: Vec<Box<dyn RowBuilder>> = Vec::new();
        let mut downsample = false;
        match dataset {
            Dataset::Tracking { smoothed } => {
                downsample = true;
                tables.extend([frames(), players(PLAYER_POSITIONS), balls(BALL_POSITIONS)]);
                builders.push(Box::new(FrameBuilder));
                builders.push(Box::new(PlayerPositionBuilder::new(Side::Home, false)));
                builders.push(Box::new(PlayerPositionBuilder::new(Side::Away, false)));
                builders.push(Box::new(BallPositionBuilder::new(false)));
                if smoothed {
                    tables.push(players(PLAYER_POSITIONS_SMOOTHED));
                    tables.push(balls(BALL_POSITIONS_SMOOTHED));
                    builders.push(Box::new(PlayerPositionBuilder::new(Side::Home, true)));
                    builders.push(Box::new(PlayerPositionBuilder::new(Side::Away, true)));
                    builders.push(Box::new(BallPositionBuilder::new(true)));
                }
            }
            Dataset::SmoothTracking => {
                downsample = true;
                tables.extend([frames(), players(PLAYER_POSITIONS_SMOOTHED)]);
                builders.push(Box::new(FrameBuilder));
                builders.push(Box::new(PlayerPositionBuilder::new(Side::Home, true)));
                builders.push(Box::new(PlayerPositionBuilder::new(Side::Away, true)));
            }
            Dataset::SmoothBalls => {
                downsample = true;
                tables.extend([frames(), balls(BALL_POSITIONS_SMOOTHED)]);
                builders.push(Box::new(FrameBuilder));
                builders.push(Box::new(BallPositionBuilder::new(true)));
            }
            Dataset::Events => {
                tables.extend([
                    entity(EVENT_TIMELINE, GAME_EVENT_KEY),
                    entity(GAME_EVENTS, GAME_EVENT_KEY),
                    entity(POSSESSION_EVENTS, POSSESSION_KEY),
                    entity(PASSES, POSSESSION_KEY),
                    entity(SHOTS, POSSESSION_KEY),
                ]);
                builders.push(Box::new(TimelineBuilder));
                builders.push(Box::new(GameEventBuilder));
                builders.push(Box::new(PossessionEventBuilder));
                builders.push(Box::new(PassBuilder));
                builders.push(Box::new(ShotBuilder));
            }
            Dataset::Metadata => {
                tables.push(entity(MATCH_METADATA, METADATA_KEY));
                builders.push(Box::new(MatchMetadataBuilder));
            }
            Dataset::Rosters => {
                // Players are global, not per match, so they cannot be verified by partition.
                tables.push(
                    TableSpec::new(ROSTER_PLAYERS, ROSTER_PLAYER_KEY)
                        .threshold(t.entity_rows)
                        .scope(DedupScope::Unit),
                );
                tables.push(entity(MATCH_ROSTERS, ROSTER_KEY));
                builders.push(Box::new(RosterPlayerBuilder));
                builders.push(Box::new(RosterBuilder));
            }
        }

        Self {
            dataset,
            tables,
            builders,
            downsample,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }
}
