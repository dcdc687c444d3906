use serde_json::Value;

use super::{RowBuilder, section};
use crate::coerce::{field_bool, field_i64, field_string, int_or_null, scalar_or_null, str_or_null};
use crate::row::Row;
use crate::tables;

/// One row per metadata file. The full record is kept in `raw` so fields not
/// promoted to columns are not lost.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchMetadataBuilder;

impl RowBuilder for MatchMetadataBuilder {
    fn table(&self) -> &'static str {
        tables::MATCH_METADATA
    }

    fn build(&self, record: &Value, partition_id: i64) -> Vec<Row> {
        if !record.is_object() {
            return Vec::new();
        }
        let match_id = field_i64(record, "id").unwrap_or(partition_id);
        let comp = section(record, "competition");
        let home = section(record, "homeTeam");
        let away = section(record, "awayTeam");
        let stadium = section(record, "stadium");
        vec![
            Row::new()
                .with("match_id", match_id)
                .with("competition_id", str_or_null(field_string(comp, "id")))
                .with("competition_name", scalar_or_null(comp.get("name")))
                .with("match_date", scalar_or_null(record.get("date")))
                .with("season", str_or_null(field_string(record, "season")))
                .with("week", scalar_or_null(record.get("week")))
                .with("home_team_id", str_or_null(field_string(home, "id")))
                .with("home_team_name", scalar_or_null(home.get("name")))
                .with("home_team_short", scalar_or_null(home.get("shortName")))
                .with("away_team_id", str_or_null(field_string(away, "id")))
                .with("away_team_name", scalar_or_null(away.get("name")))
                .with("away_team_short", scalar_or_null(away.get("shortName")))
                .with("stadium_id", str_or_null(field_string(stadium, "id")))
                .with("stadium_name", scalar_or_null(stadium.get("name")))
                .with("fps", scalar_or_null(record.get("fps")))
                .with("video_url", scalar_or_null(record.get("videoUrl")))
                .with("raw", record.clone()),
        ]
    }
}

fn player_id(entry: &Value) -> Option<i64> {
    field_i64(section(entry, "player"), "id")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RosterBuilder;

impl RowBuilder for RosterBuilder {
    fn table(&self) -> &'static str {
        tables::MATCH_ROSTERS
    }

    fn build(&self, entry: &Value, match_id: i64) -> Vec<Row> {
        let team_id = field_i64(section(entry, "team"), "id");
        let (Some(player_id), Some(team_id)) = (player_id(entry), team_id) else {
            return Vec::new();
        };
        vec![
            Row::new()
                .with("match_id", match_id)
                .with("team_id", team_id)
                .with("player_id", player_id)
                .with("position_group_type", scalar_or_null(entry.get("positionGroupType")))
                .with("shirt_number", int_or_null(field_i64(entry, "shirtNumber")))
                .with("started", field_bool(entry, "started").unwrap_or(false)),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RosterPlayerBuilder;

impl RowBuilder for RosterPlayerBuilder {
    fn table(&self) -> &'static str {
        tables::ROSTER_PLAYERS
    }

    fn build(&self, entry: &Value, _match_id: i64) -> Vec<Row> {
        let Some(id) = player_id(entry) else {
            return Vec::new();
        };
        let nickname = scalar_or_null(section(entry, "player").get("nickname"));
        vec![Row::new().with("id", id).with("nickname", nickname)]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn metadata_keeps_raw_and_stringifies_ids() {
        let record = json!({
            "id": 3812,
            "competition": {"id": 56, "name": "World Cup"},
            "homeTeam": {"id": 364, "name": "Argentina", "shortName": "ARG"},
            "season": 2022,
        });
        let rows = MatchMetadataBuilder.build(&record, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("match_id"), Some(&json!(3812)));
        assert_eq!(rows[0].get("competition_id"), Some(&json!("56")));
        assert_eq!(rows[0].get("season"), Some(&json!("2022")));
        assert_eq!(rows[0].get("away_team_id"), Some(&Value::Null));
        assert_eq!(rows[0].get("raw"), Some(&record));
    }

    #[test]
    fn roster_shirt_number_is_defensive() {
        let entry = json!({
            "player": {"id": "77", "nickname": "Leo"},
            "team": {"id": 364},
            "shirtNumber": "nan",
            "started": true,
        });
        let rows = RosterBuilder.build(&entry, 3812);
        assert_eq!(rows[0].get("player_id"), Some(&json!(77)));
        assert_eq!(rows[0].get("shirt_number"), Some(&Value::Null));
        assert_eq!(rows[0].get("started"), Some(&json!(true)));

        let players = RosterPlayerBuilder.build(&entry, 3812);
        assert_eq!(players[0].get("nickname"), Some(&json!("Leo")));
    }

    #[test]
    fn roster_without_team_is_skipped() {
        let entry = json!({"player": {"id": 1}});
        assert!(RosterBuilder.build(&entry, 3812).is_empty());
        assert_eq!(RosterPlayerBuilder.build(&entry, 3812).len(), 1);
    }
}
