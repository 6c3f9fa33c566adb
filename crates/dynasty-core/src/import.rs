// Player CSV import.
//
// Expected header: id,name,position,age,status,market_value,proj_now,proj_future
// Blank numeric cells become `None`. Rows that cannot be valued at all
// (unknown position, empty id, negative or non-finite numbers) are skipped
// with a warning instead of failing the whole file.

use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::warn;

use crate::model::{PlayerRecord, PlayerStatus, Position};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Raw row
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawPlayerRow {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(alias = "pos")]
    position: String,
    #[serde(default)]
    age: Option<u32>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "market")]
    market_value: Option<f64>,
    #[serde(default)]
    proj_now: Option<f64>,
    #[serde(default)]
    proj_future: Option<f64>,
}

fn valid_amount(value: Option<f64>) -> bool {
    value.map_or(true, |v| v.is_finite() && v >= 0.0)
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

/// Parse player rows from any reader. Later rows win on duplicate ids.
pub fn load_players_from_reader<R: Read>(rdr: R) -> Result<Vec<PlayerRecord>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut players: Vec<PlayerRecord> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for result in reader.deserialize::<RawPlayerRow>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed player row: {}", e);
                continue;
            }
        };

        let id = raw.id.trim().to_string();
        if id.is_empty() {
            warn!("skipping player '{}': empty id", raw.name);
            continue;
        }
        let Some(position) = Position::from_str_pos(&raw.position) else {
            warn!("skipping player '{}': unknown position '{}'", id, raw.position);
            continue;
        };
        if ![raw.market_value, raw.proj_now, raw.proj_future]
            .iter()
            .all(|v| valid_amount(*v))
        {
            warn!("skipping player '{}': negative or non-finite value", id);
            continue;
        }

        let record = PlayerRecord {
            name: if raw.name.is_empty() { id.clone() } else { raw.name },
            id: id.clone(),
            position,
            age: raw.age,
            status: raw
                .status
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(PlayerStatus::from_str_status)
                .unwrap_or_default(),
            market_value: raw.market_value,
            proj_now: raw.proj_now,
            proj_future: raw.proj_future,
        };

        match seen.get(&id) {
            Some(&idx) => {
                warn!("duplicate player id '{}', using latest row", id);
                players[idx] = record;
            }
            None => {
                seen.insert(id, players.len());
                players.push(record);
            }
        }
    }
    Ok(players)
}

/// Load player records from a CSV file.
pub fn load_players(path: &Path) -> Result<Vec<PlayerRecord>, ImportError> {
    let file = std::fs::File::open(path).map_err(|e| ImportError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let players = load_players_from_reader(file).map_err(|e| ImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    if players.is_empty() {
        return Err(ImportError::Validation(format!(
            "{} contains no usable player rows",
            path.display()
        )));
    }
    Ok(players)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "id,name,position,age,status,market_value,proj_now,proj_future";

    #[test]
    fn full_row_parsed() {
        let csv_data = format!("{HEADER}\nrb1,Bijan Robinson,RB,22,Active,8200,310.5,1400");
        let players = load_players_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(players.len(), 1);
        let p = &players[0];
        assert_eq!(p.id, "rb1");
        assert_eq!(p.name, "Bijan Robinson");
        assert_eq!(p.position, Position::RunningBack);
        assert_eq!(p.age, Some(22));
        assert_eq!(p.status, PlayerStatus::Active);
        assert_eq!(p.market_value, Some(8200.0));
        assert!((p.proj_now.unwrap() - 310.5).abs() < f64::EPSILON);
        assert!(p.is_trainable());
    }

    #[test]
    fn blank_cells_become_none() {
        let csv_data = format!("{HEADER}\nwr9,Rookie,WR,,,,120,");
        let players = load_players_from_reader(csv_data.as_bytes()).unwrap();
        let p = &players[0];
        assert_eq!(p.age, None);
        assert_eq!(p.status, PlayerStatus::Active);
        assert_eq!(p.market_value, None);
        assert_eq!(p.proj_now, Some(120.0));
        assert_eq!(p.proj_future, None);
        assert!(!p.is_trainable());
    }

    #[test]
    fn unknown_position_skipped() {
        let csv_data = format!(
            "{HEADER}\nk1,Kicker,K,30,Active,100,90,50\nte1,Tight End,te,27,Active,3000,150,600"
        );
        let players = load_players_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].position, Position::TightEnd);
    }

    #[test]
    fn malformed_and_negative_rows_skipped() {
        let csv_data = format!(
            "{HEADER}\n\
             qb1,Good,QB,25,Active,5000,300,1200\n\
             qb2,Bad Age,QB,old,Active,5000,300,1200\n\
             qb3,Negative,QB,25,Active,-5,300,1200\n\
             ,No Id,QB,25,Active,5000,300,1200"
        );
        let players = load_players_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].id, "qb1");
    }

    #[test]
    fn duplicate_ids_keep_latest() {
        let csv_data = format!(
            "{HEADER}\nwr1,First,WR,24,Active,4000,200,900\nwr1,Second,WR,25,Out,4100,210,950"
        );
        let players = load_players_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].name, "Second");
        assert_eq!(players[0].status, PlayerStatus::Out);
    }

    #[test]
    fn unrecognized_status_is_unknown() {
        let csv_data = format!("{HEADER}\nrb2,Holdout,RB,26,Holdout,3000,200,800");
        let players = load_players_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(players[0].status, PlayerStatus::Unknown);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_players(Path::new("/nonexistent/players.csv")).unwrap_err();
        assert!(matches!(err, ImportError::Io { .. }));
    }

    #[test]
    fn header_only_file_is_rejected() {
        let dir = std::env::temp_dir().join(format!("dynasty-import-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("empty.csv");
        std::fs::write(&path, HEADER).unwrap();
        let err = load_players(&path).unwrap_err();
        assert!(matches!(err, ImportError::Validation(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
