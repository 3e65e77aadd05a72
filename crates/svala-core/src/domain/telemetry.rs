//! Telemetry tables: the immutable per-run kinematic log of every vehicle.
//!
//! A [`TelemetryTable`] is produced once per scenario run by the simulation
//! engine and is read-only afterwards. Vehicle index 0 is always the ego
//! vehicle. Construction validates the table, so every table that exists is
//! well-formed and the check engine can score it without further guards.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{Result, SvalaError};

/// Number of metadata rows the simulator writes before the header line.
pub const DEFAULT_SKIP_ROWS: usize = 6;

const COL_TIME: &str = "TimeStamp";
const COL_INDEX: &str = "Index";
const COL_NAME: &str = "Entity_Name";
const COL_SPEED: &str = "Current_Speed";
const COL_LANE: &str = "lane_id";
const COL_S: &str = "Distance_Travelled_Along_Road_Segment";
const COL_T: &str = "Lateral_Distance_Lane";
const COL_COLLISION: &str = "collision_ids";
const COL_POS_X: &str = "World_Position_X";
const COL_POS_Y: &str = "World_Position_Y";
const COL_POS_Z: &str = "World_Position_Z";
const COL_HEADING: &str = "Heading";

const REQUIRED_VEHICLE_COLUMNS: [&str; 6] =
    [COL_NAME, COL_SPEED, COL_LANE, COL_S, COL_T, COL_COLLISION];

/// Alternative spellings emitted by some simulator versions.
const COLUMN_ALIASES: [(&str, &str); 2] = [
    ("Lateral_Distance_Lanem", COL_T),
    ("World_Heading", COL_HEADING),
];

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// World position of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Kinematic state of one vehicle at one time sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Entity name as reported by the simulator.
    pub name: String,

    pub position: Option<Position>,

    /// Scalar speed in m/s.
    pub speed: f64,

    pub lane_id: i64,

    /// Longitudinal position along the lane (`s`).
    pub s: f64,

    /// Lateral offset from the lane center (`t`).
    pub t: f64,

    pub heading: Option<f64>,

    /// Object index of the colliding peer while a collision is active.
    pub collision: Option<usize>,
}

impl VehicleState {
    /// Create a state with no position, heading or collision marker.
    pub fn new(name: impl Into<String>, speed: f64, lane_id: i64, s: f64, t: f64) -> Self {
        Self {
            name: name.into(),
            position: None,
            speed,
            lane_id,
            s,
            t,
            heading: None,
            collision: None,
        }
    }

    /// Mark this state as colliding with the vehicle at `peer`.
    pub fn with_collision(mut self, peer: usize) -> Self {
        self.collision = Some(peer);
        self
    }
}

/// One time-indexed row of the telemetry table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Simulator frame index.
    pub frame: u64,

    /// Simulation time in seconds.
    pub time: f64,

    /// Per-vehicle state; index 0 is ego.
    pub vehicles: Vec<VehicleState>,
}

impl Sample {
    pub fn ego(&self) -> &VehicleState {
        &self.vehicles[0]
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Immutable, validated telemetry of a single scenario run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryTable {
    samples: Vec<Sample>,
}

impl TelemetryTable {
    /// Validate and wrap a sequence of samples.
    ///
    /// Fails with [`SvalaError::MalformedTelemetry`] when there are no
    /// samples, a sample carries no vehicles, vehicle counts differ between
    /// samples, or a numeric field is not finite.
    pub fn new(samples: Vec<Sample>) -> Result<Self> {
        let first = samples
            .first()
            .ok_or_else(|| SvalaError::MalformedTelemetry("telemetry has no samples".into()))?;
        let vehicle_count = first.vehicles.len();
        if vehicle_count == 0 {
            return Err(SvalaError::MalformedTelemetry(
                "telemetry has no vehicles".into(),
            ));
        }

        for (row, sample) in samples.iter().enumerate() {
            if sample.vehicles.len() != vehicle_count {
                return Err(SvalaError::MalformedTelemetry(format!(
                    "sample {} has {} vehicles, expected {}",
                    row,
                    sample.vehicles.len(),
                    vehicle_count
                )));
            }
            if !sample.time.is_finite() {
                return Err(SvalaError::MalformedTelemetry(format!(
                    "sample {} has a non-finite timestamp",
                    row
                )));
            }
            for (idx, vehicle) in sample.vehicles.iter().enumerate() {
                if !(vehicle.speed.is_finite() && vehicle.s.is_finite() && vehicle.t.is_finite()) {
                    return Err(SvalaError::MalformedTelemetry(format!(
                        "sample {} vehicle {} has non-finite kinematics",
                        row, idx
                    )));
                }
            }
        }

        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of time samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a constructed table; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of tracked vehicles, ego included.
    pub fn vehicle_count(&self) -> usize {
        self.samples[0].vehicles.len()
    }

    /// Entity name of the vehicle at `index`, taken from the first sample.
    pub fn vehicle_name(&self, index: usize) -> Option<&str> {
        self.samples[0].vehicles.get(index).map(|v| v.name.as_str())
    }

    /// Parse a simulator CSV log from disk.
    pub fn from_csv_path(path: &Path, skip_rows: usize) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_csv_str(&text, skip_rows)
    }

    /// Parse a simulator CSV log.
    ///
    /// `skip_rows` leading metadata lines are discarded, the next line is the
    /// header. Cells are trimmed and bracketed units are stripped from column
    /// names; vehicle-scoped columns carry a `#<n>` prefix where `#1` is ego.
    pub fn from_csv_str(text: &str, skip_rows: usize) -> Result<Self> {
        let mut lines = text.lines().skip(skip_rows);
        let header_line = lines
            .next()
            .ok_or_else(|| SvalaError::MalformedTelemetry("missing header row".into()))?;
        let layout = ColumnLayout::from_header(header_line)?;

        let mut samples = Vec::new();
        for (offset, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split(',').map(str::trim).collect();
            samples.push(layout.parse_row(&cells, skip_rows + 2 + offset)?);
        }

        Self::new(samples)
    }
}

// ---------------------------------------------------------------------------
// CSV layout
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct VehicleColumns {
    name: usize,
    speed: usize,
    lane: usize,
    s: usize,
    t: usize,
    collision: usize,
    position: Option<(usize, usize, usize)>,
    heading: Option<usize>,
}

#[derive(Debug)]
struct ColumnLayout {
    time: usize,
    index: usize,
    vehicles: Vec<VehicleColumns>,
}

fn normalize_column(raw: &str, unit_re: &Regex) -> String {
    let name = unit_re.replace(raw.trim(), "").trim().to_string();
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(name)
}

impl ColumnLayout {
    fn from_header(header: &str) -> Result<Self> {
        let unit_re = Regex::new(r"\s*\[[^\]]*\]\s*$").map_err(regex_err)?;
        let vehicle_re = Regex::new(r"^#(\d+)\s+(.+)$").map_err(regex_err)?;

        let mut shared: HashMap<String, usize> = HashMap::new();
        let mut scoped: BTreeMap<usize, HashMap<String, usize>> = BTreeMap::new();

        for (col, raw) in header.split(',').enumerate() {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match vehicle_re.captures(raw) {
                Some(caps) => {
                    let number: usize = caps[1].parse().map_err(|_| {
                        SvalaError::MalformedTelemetry(format!("bad vehicle prefix in '{}'", raw))
                    })?;
                    scoped
                        .entry(number)
                        .or_default()
                        .insert(normalize_column(&caps[2], &unit_re), col);
                }
                None => {
                    shared.insert(normalize_column(raw, &unit_re), col);
                }
            }
        }

        let time = require(&shared, COL_TIME, "")?;
        let index = require(&shared, COL_INDEX, "")?;

        if scoped.is_empty() {
            return Err(SvalaError::MalformedTelemetry(
                "no vehicle-scoped columns found".into(),
            ));
        }

        let mut vehicles = Vec::with_capacity(scoped.len());
        for (expected, (number, columns)) in (1..).zip(scoped.iter()) {
            if *number != expected {
                return Err(SvalaError::MalformedTelemetry(format!(
                    "vehicle columns must be numbered contiguously from #1, found #{}",
                    number
                )));
            }
            let prefix = format!("#{} ", number);
            for required in REQUIRED_VEHICLE_COLUMNS {
                require(columns, required, &prefix)?;
            }
            let position = match (
                columns.get(COL_POS_X),
                columns.get(COL_POS_Y),
                columns.get(COL_POS_Z),
            ) {
                (Some(x), Some(y), Some(z)) => Some((*x, *y, *z)),
                _ => None,
            };
            vehicles.push(VehicleColumns {
                name: columns[COL_NAME],
                speed: columns[COL_SPEED],
                lane: columns[COL_LANE],
                s: columns[COL_S],
                t: columns[COL_T],
                collision: columns[COL_COLLISION],
                position,
                heading: columns.get(COL_HEADING).copied(),
            });
        }

        Ok(Self {
            time,
            index,
            vehicles,
        })
    }

    fn parse_row(&self, cells: &[&str], line_no: usize) -> Result<Sample> {
        let cell = |col: usize| -> Result<&str> {
            cells.get(col).copied().ok_or_else(|| {
                SvalaError::MalformedTelemetry(format!(
                    "line {} has {} cells, column {} is missing",
                    line_no,
                    cells.len(),
                    col
                ))
            })
        };
        let number = |col: usize| -> Result<f64> {
            let raw = cell(col)?;
            raw.parse::<f64>().map_err(|_| {
                SvalaError::MalformedTelemetry(format!(
                    "line {} column {}: invalid number '{}'",
                    line_no, col, raw
                ))
            })
        };
        let integer = |col: usize| -> Result<i64> {
            let value = number(col)?;
            if value.fract() != 0.0 {
                return Err(SvalaError::MalformedTelemetry(format!(
                    "line {} column {}: expected an integer, got {}",
                    line_no, col, value
                )));
            }
            Ok(value as i64)
        };

        let frame = integer(self.index)?;
        if frame < 0 {
            return Err(SvalaError::MalformedTelemetry(format!(
                "line {}: negative frame index {}",
                line_no, frame
            )));
        }

        let mut vehicles = Vec::with_capacity(self.vehicles.len());
        for columns in &self.vehicles {
            let collision_raw = cell(columns.collision)?;
            let collision = match collision_raw.split_whitespace().next() {
                None => None,
                Some(token) => Some(token.parse::<usize>().map_err(|_| {
                    SvalaError::MalformedTelemetry(format!(
                        "line {}: invalid collision marker '{}'",
                        line_no, collision_raw
                    ))
                })?),
            };
            let position = match columns.position {
                Some((x, y, z)) => Some(Position {
                    x: number(x)?,
                    y: number(y)?,
                    z: number(z)?,
                }),
                None => None,
            };
            let heading = match columns.heading {
                Some(col) => Some(number(col)?),
                None => None,
            };

            vehicles.push(VehicleState {
                name: cell(columns.name)?.to_string(),
                position,
                speed: number(columns.speed)?,
                lane_id: integer(columns.lane)?,
                s: number(columns.s)?,
                t: number(columns.t)?,
                heading,
                collision,
            });
        }

        Ok(Sample {
            frame: frame as u64,
            time: number(self.time)?,
            vehicles,
        })
    }
}

fn require(columns: &HashMap<String, usize>, name: &str, prefix: &str) -> Result<usize> {
    columns.get(name).copied().ok_or_else(|| {
        SvalaError::MalformedTelemetry(format!("missing required column '{}{}'", prefix, name))
    })
}

fn regex_err(e: regex::Error) -> SvalaError {
    SvalaError::MalformedTelemetry(format!("column pattern error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Index [-], TimeStamp [s], #1 Entity_Name [-], #1 Current_Speed [m/s], #1 lane_id [-], #1 Distance_Travelled_Along_Road_Segment [m], #1 Lateral_Distance_Lanem [m], #1 collision_ids [-], #2 Entity_Name [-], #2 Current_Speed [m/s], #2 lane_id [-], #2 Distance_Travelled_Along_Road_Segment [m], #2 Lateral_Distance_Lanem [m], #2 collision_ids [-],";

    fn log(rows: &[&str]) -> String {
        let mut text = String::new();
        for i in 0..DEFAULT_SKIP_ROWS {
            text.push_str(&format!("meta line {}\n", i));
        }
        text.push_str(HEADER);
        text.push('\n');
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_parse_two_vehicle_log() {
        let text = log(&[
            "0, 0.0, Ego , 20.0, -3, 10.0, 0.1, , Target, 15.0, -3, 40.0, 0.0, ,",
            "1, 0.1, Ego , 20.5, -3, 12.0, 0.2, 1 , Target, 15.0, -3, 41.5, 0.0, 0,",
        ]);
        let table = TelemetryTable::from_csv_str(&text, DEFAULT_SKIP_ROWS).expect("parse");

        assert_eq!(table.len(), 2);
        assert_eq!(table.vehicle_count(), 2);
        assert_eq!(table.vehicle_name(0), Some("Ego"));
        assert_eq!(table.vehicle_name(1), Some("Target"));

        let second = &table.samples()[1];
        assert_eq!(second.frame, 1);
        assert_eq!(second.ego().speed, 20.5);
        assert_eq!(second.ego().lane_id, -3);
        assert_eq!(second.ego().t, 0.2);
        assert_eq!(second.ego().collision, Some(1));
        assert_eq!(table.samples()[0].ego().collision, None);
    }

    #[test]
    fn test_missing_required_column_is_malformed() {
        let text = "Index [-], TimeStamp [s], #1 Entity_Name [-], #1 Current_Speed [m/s]\n0, 0.0, Ego, 1.0\n";
        let err = TelemetryTable::from_csv_str(text, 0).expect_err("should fail");
        assert!(matches!(err, SvalaError::MalformedTelemetry(_)));
        assert!(err.to_string().contains("lane_id"));
    }

    #[test]
    fn test_missing_timestamp_is_malformed() {
        let text = "Index, #1 Entity_Name, #1 Current_Speed, #1 lane_id, #1 Distance_Travelled_Along_Road_Segment, #1 Lateral_Distance_Lane, #1 collision_ids\n";
        let err = TelemetryTable::from_csv_str(text, 0).expect_err("should fail");
        assert!(err.to_string().contains("TimeStamp"));
    }

    #[test]
    fn test_header_only_is_malformed() {
        let err = TelemetryTable::from_csv_str(&log(&[]), DEFAULT_SKIP_ROWS)
            .expect_err("empty table must fail");
        assert!(err.to_string().contains("no samples"));
    }

    #[test]
    fn test_non_numeric_speed_is_malformed() {
        let text = log(&["0, 0.0, Ego, fast, -3, 10.0, 0.1, , Target, 15.0, -3, 40.0, 0.0, ,"]);
        let err = TelemetryTable::from_csv_str(&text, DEFAULT_SKIP_ROWS).expect_err("bad number");
        assert!(err.to_string().contains("invalid number 'fast'"));
    }

    #[test]
    fn test_ragged_row_is_malformed() {
        let text = log(&["0, 0.0, Ego, 20.0, -3"]);
        let err = TelemetryTable::from_csv_str(&text, DEFAULT_SKIP_ROWS).expect_err("ragged");
        assert!(matches!(err, SvalaError::MalformedTelemetry(_)));
    }

    #[test]
    fn test_non_contiguous_vehicle_numbers_rejected() {
        let text = "Index, TimeStamp, #2 Entity_Name, #2 Current_Speed, #2 lane_id, #2 Distance_Travelled_Along_Road_Segment, #2 Lateral_Distance_Lane, #2 collision_ids\n0, 0.0, Ego, 1.0, -3, 0.0, 0.0,\n";
        let err = TelemetryTable::from_csv_str(text, 0).expect_err("must start at #1");
        assert!(err.to_string().contains("#2"));
    }

    #[test]
    fn test_optional_position_and_heading() {
        let text = "Index, TimeStamp, #1 Entity_Name, #1 World_Position_X [m], #1 World_Position_Y [m], #1 World_Position_Z [m], #1 World_Heading [rad], #1 Current_Speed, #1 lane_id, #1 Distance_Travelled_Along_Road_Segment, #1 Lateral_Distance_Lane, #1 collision_ids\n3, 0.3, Ego, 1.0, 2.0, 0.0, 1.57, 10.0, -2, 5.0, 0.0,\n";
        let table = TelemetryTable::from_csv_str(text, 0).expect("parse");
        let ego = table.samples()[0].ego();
        assert_eq!(
            ego.position,
            Some(Position {
                x: 1.0,
                y: 2.0,
                z: 0.0
            })
        );
        assert_eq!(ego.heading, Some(1.57));
        assert_eq!(table.samples()[0].frame, 3);
    }

    #[test]
    fn test_new_rejects_inconsistent_vehicle_counts() {
        let samples = vec![
            Sample {
                frame: 0,
                time: 0.0,
                vehicles: vec![VehicleState::new("Ego", 1.0, -3, 0.0, 0.0)],
            },
            Sample {
                frame: 1,
                time: 0.1,
                vehicles: vec![],
            },
        ];
        assert!(TelemetryTable::new(samples).is_err());
    }
}
