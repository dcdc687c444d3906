use serde_json::Value;

use super::{RowBuilder, indexed_objects, objects};
use crate::coerce::{field_f64, field_i64, int_or_null, num_or_null, scalar_or_null};
use crate::row::Row;
use crate::tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

/// `frameNum` is what identifies a tracking record; without it nothing is built.
fn frame_num(record: &Value) -> Option<i64> {
    field_i64(record, "frameNum")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameBuilder;

impl RowBuilder for FrameBuilder {
    fn table(&self) -> &'static str {
        tables::TRACKING_FRAMES
    }

    fn build(&self, record: &Value, game_id: i64) -> Vec<Row> {
        let Some(frame_num) = frame_num(record) else {
            return Vec::new();
        };
        let row = Row::new()
            .with("game_id", game_id)
            .with("frame_num", frame_num)
            .with("video_time_ms", num_or_null(field_f64(record, "videoTimeMs")))
            .with("period", int_or_null(field_i64(record, "period")))
            .with("period_elapsed_time", num_or_null(field_f64(record, "periodElapsedTime")))
            .with(
                "period_game_clock_time",
                num_or_null(field_f64(record, "periodGameClockTime")),
            )
            .with("generated_time", scalar_or_null(record.get("generatedTime")))
            .with("smoothed_time", scalar_or_null(record.get("smoothedTime")))
            .with("version", scalar_or_null(record.get("version")))
            .with("game_event_id", int_or_null(field_i64(record, "game_event_id")))
            .with(
                "possession_event_id",
                int_or_null(field_i64(record, "possession_event_id")),
            );
        vec![row]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlayerPositionBuilder {
    pub side: Side,
    pub smoothed: bool,
}

impl PlayerPositionBuilder {
    pub fn new(side: Side, smoothed: bool) -> Self {
        Self { side, smoothed }
    }

    fn source_key(&self) -> String {
        let suffix = if self.smoothed { "PlayersSmoothed" } else { "Players" };
        format!("{}{suffix}", self.side.as_str())
    }
}

impl RowBuilder for PlayerPositionBuilder {
    fn table(&self) -> &'static str {
        if self.smoothed {
            tables::PLAYER_POSITIONS_SMOOTHED
        } else {
            tables::PLAYER_POSITIONS
        }
    }

    fn build(&self, record: &Value, game_id: i64) -> Vec<Row> {
        let Some(frame_num) = frame_num(record) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for player in objects(record.get(&self.source_key())) {
            // Jersey number is part of the key; an unidentifiable player is dropped.
            let Some(jersey_num) = field_i64(player, "jerseyNum") else {
                continue;
            };
            out.push(
                Row::new()
                    .with("game_id", game_id)
                    .with("frame_num", frame_num)
                    .with("side", self.side.as_str())
                    .with("jersey_num", jersey_num)
                    .with("confidence", scalar_or_null(player.get("confidence")))
                    .with("visibility", scalar_or_null(player.get("visibility")))
                    .with("x", num_or_null(field_f64(player, "x")))
                    .with("y", num_or_null(field_f64(player, "y")))
                    .with("speed", num_or_null(field_f64(player, "speed"))),
            );
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BallPositionBuilder {
    pub smoothed: bool,
}

impl BallPositionBuilder {
    pub fn new(smoothed: bool) -> Self {
        Self { smoothed }
    }
}

impl RowBuilder for BallPositionBuilder {
    fn table(&self) -> &'static str {
        if self.smoothed {
            tables::BALL_POSITIONS_SMOOTHED
        } else {
            tables::BALL_POSITIONS
        }
    }

    fn build(&self, record: &Value, game_id: i64) -> Vec<Row> {
        let Some(frame_num) = frame_num(record) else {
            return Vec::new();
        };
        let key = if self.smoothed { "ballsSmoothed" } else { "balls" };
        let mut out = Vec::new();
        for (ball_idx, ball) in indexed_objects(record.get(key)) {
            let x = field_f64(ball, "x");
            let y = field_f64(ball, "y");
            // Smoothed feeds emit `{}` placeholders for frames without a fix.
            if self.smoothed && (x.is_none() || y.is_none()) {
                continue;
            }
            out.push(
                Row::new()
                    .with("game_id", game_id)
                    .with("frame_num", frame_num)
                    .with("ball_idx", ball_idx as i64)
                    .with("visibility", scalar_or_null(ball.get("visibility")))
                    .with("x", num_or_null(x))
                    .with("y", num_or_null(y))
                    .with("z", num_or_null(field_f64(ball, "z"))),
            );
        }
        out
    }
}
