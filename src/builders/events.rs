use serde_json::Value;

use super::{RowBuilder, section};
use crate::coerce::{field_f64, field_i64, int_or_null, num_or_null, scalar_or_null};
use crate::row::Row;
use crate::tables;

const PASS_TYPES: &[&str] = &["PA", "CR"];
const SHOT_TYPES: &[&str] = &["SH"];

fn game_event_id(event: &Value) -> Option<i64> {
    field_i64(event, "gameEventId")
}

fn possession_event_id(event: &Value) -> Option<i64> {
    field_i64(event, "possessionEventId")
}

fn possession_type(event: &Value) -> Option<&str> {
    section(event, "possessionEvents")
        .get("possessionEventType")
        .and_then(Value::as_str)
}

/// Row skeleton for tables keyed by (match_id, possession_event_id), built only
/// when the event carries a possession id and, if given, one of `types`.
fn possession_row<'a>(
    event: &'a Value,
    match_id: i64,
    types: Option<&[&str]>,
) -> Option<(Row, &'a Value)> {
    let id = possession_event_id(event)?;
    if let Some(types) = types {
        let kind = possession_type(event)?;
        if !types.iter().any(|t| *t == kind) {
            return None;
        }
    }
    let row = Row::new()
        .with("match_id", match_id)
        .with("possession_event_id", id);
    Some((row, section(event, "possessionEvents")))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineBuilder;

impl RowBuilder for TimelineBuilder {
    fn table(&self) -> &'static str {
        tables::EVENT_TIMELINE
    }

    fn build(&self, event: &Value, match_id: i64) -> Vec<Row> {
        let Some(id) = game_event_id(event) else {
            return Vec::new();
        };
        vec![
            Row::new()
                .with("match_id", match_id)
                .with("game_event_id", id)
                .with("possession_event_id", int_or_null(possession_event_id(event)))
                .with("start_time", num_or_null(field_f64(event, "startTime")))
                .with("end_time", num_or_null(field_f64(event, "endTime")))
                .with("duration", num_or_null(field_f64(event, "duration")))
                .with("event_time", num_or_null(field_f64(event, "eventTime")))
                .with("sequence", int_or_null(field_i64(event, "sequence"))),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GameEventBuilder;

impl RowBuilder for GameEventBuilder {
    fn table(&self) -> &'static str {
        tables::GAME_EVENTS
    }

    fn build(&self, event: &Value, match_id: i64) -> Vec<Row> {
        let Some(id) = game_event_id(event) else {
            return Vec::new();
        };
        let ge = section(event, "gameEvents");
        vec![
            Row::new()
                .with("match_id", match_id)
                .with("game_event_id", id)
                .with("game_event_type", scalar_or_null(ge.get("gameEventType")))
                .with("period", int_or_null(field_i64(ge, "period")))
                .with("team_id", int_or_null(field_i64(ge, "teamId")))
                .with("team_name", scalar_or_null(ge.get("teamName")))
                .with("player_id", int_or_null(field_i64(ge, "playerId")))
                .with("player_name", scalar_or_null(ge.get("playerName")))
                .with("start_game_clock", int_or_null(field_i64(ge, "startGameClock")))
                .with(
                    "start_formatted_game_clock",
                    scalar_or_null(ge.get("startFormattedGameClock")),
                )
                .with("initial_non_event", scalar_or_null(ge.get("initialNonEvent")))
                .with("video_missing", scalar_or_null(ge.get("videoMissing"))),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PossessionEventBuilder;

impl RowBuilder for PossessionEventBuilder {
    fn table(&self) -> &'static str {
        tables::POSSESSION_EVENTS
    }

    fn build(&self, event: &Value, match_id: i64) -> Vec<Row> {
        let Some((mut row, pe)) = possession_row(event, match_id, None) else {
            return Vec::new();
        };
        row.set("possession_event_type", scalar_or_null(pe.get("possessionEventType")));
        row.set("non_event", scalar_or_null(pe.get("nonEvent")));
        row.set("game_clock", num_or_null(field_f64(pe, "gameClock")));
        row.set("formatted_game_clock", scalar_or_null(pe.get("formattedGameClock")));
        row.set("ball_height_type", scalar_or_null(pe.get("ballHeightType")));
        row.set("body_type", scalar_or_null(pe.get("bodyType")));
        row.set("high_point_type", scalar_or_null(pe.get("highPointType")));
        vec![row]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassBuilder;

impl RowBuilder for PassBuilder {
    fn table(&self) -> &'static str {
        tables::PASSES
    }

    fn build(&self, event: &Value, match_id: i64) -> Vec<Row> {
        let Some((mut row, pe)) = possession_row(event, match_id, Some(PASS_TYPES)) else {
            return Vec::new();
        };
        for (column, id_field, name_field) in [
            ("passer", "passerPlayerId", "passerPlayerName"),
            ("receiver", "receiverPlayerId", "receiverPlayerName"),
            ("target", "targetPlayerId", "targetPlayerName"),
        ] {
            row.set(&format!("{column}_player_id"), int_or_null(field_i64(pe, id_field)));
            row.set(&format!("{column}_player_name"), scalar_or_null(pe.get(name_field)));
        }
        row.set("pass_type", scalar_or_null(pe.get("passType")));
        row.set("pass_outcome_type", scalar_or_null(pe.get("passOutcomeType")));
        vec![row]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShotBuilder;

impl RowBuilder for ShotBuilder {
    fn table(&self) -> &'static str {
        tables::SHOTS
    }

    fn build(&self, event: &Value, match_id: i64) -> Vec<Row> {
        let Some((mut row, pe)) = possession_row(event, match_id, Some(SHOT_TYPES)) else {
            return Vec::new();
        };
        row.set("shooter_player_id", int_or_null(field_i64(pe, "shooterPlayerId")));
        row.set("shooter_player_name", scalar_or_null(pe.get("shooterPlayerName")));
        row.set("shot_type", scalar_or_null(pe.get("shotType")));
        row.set("shot_nature_type", scalar_or_null(pe.get("shotNatureType")));
        row.set(
            "shot_initial_height_type",
            scalar_or_null(pe.get("shotInitialHeightType")),
        );
        row.set("shot_outcome_type", scalar_or_null(pe.get("shotOutcomeType")));
        row.set("ball_moving", scalar_or_null(pe.get("ballMoving")));
        vec![row]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(kind: &str) -> Value {
        json!({
            "gameEventId": 11,
            "possessionEventId": "22",
            "startTime": "1.5",
            "gameEvents": {"gameEventType": "OTB", "teamId": 100},
            "possessionEvents": {
                "possessionEventType": kind,
                "passerPlayerId": 7,
                "shooterPlayerId": 9,
            },
        })
    }

    #[test]
    fn pass_and_shot_route_by_possession_type() {
        assert_eq!(PassBuilder.build(&event("PA"), 1).len(), 1);
        assert_eq!(PassBuilder.build(&event("CR"), 1).len(), 1);
        assert!(PassBuilder.build(&event("SH"), 1).is_empty());
        let shots = ShotBuilder.build(&event("SH"), 1);
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].get("shooter_player_id"), Some(&json!(9)));
    }

    #[test]
    fn possession_rows_need_possession_id() {
        let mut e = event("PA");
        e["possessionEventId"] = Value::Null;
        assert!(PossessionEventBuilder.build(&e, 1).is_empty());
        assert!(PassBuilder.build(&e, 1).is_empty());
        let timeline = TimelineBuilder.build(&e, 1);
        assert_eq!(timeline[0].get("possession_event_id"), Some(&Value::Null));
        assert_eq!(timeline[0].get("start_time"), Some(&json!(1.5)));
    }

    #[test]
    fn missing_game_event_id_skips_record() {
        let e = json!({"gameEvents": {"teamId": 1}});
        assert!(TimelineBuilder.build(&e, 1).is_empty());
        assert!(GameEventBuilder.build(&e, 1).is_empty());
    }
}
