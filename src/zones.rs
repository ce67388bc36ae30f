//! Static zones table loader (`zone_id,x,y` CSV), grounded on the
//! reference `load_zones` convention.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::EngineError;
use crate::types::ZoneLocation;

pub fn load_zones(path: &Path) -> Result<HashMap<u32, ZoneLocation>, EngineError> {
    let contents = fs::read_to_string(path).map_err(EngineError::Io)?;
    let mut zones = HashMap::new();

    let mut lines = contents.lines();
    let header = lines.next().ok_or_else(|| {
        EngineError::ZonesError("zones file is empty, missing header".to_string())
    })?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let zone_idx = columns
        .iter()
        .position(|c| *c == "zone_id")
        .ok_or_else(|| EngineError::ZonesError("missing zone_id column".to_string()))?;
    let x_idx = columns
        .iter()
        .position(|c| *c == "x")
        .ok_or_else(|| EngineError::ZonesError("missing x column".to_string()))?;
    let y_idx = columns
        .iter()
        .position(|c| *c == "y")
        .ok_or_else(|| EngineError::ZonesError("missing y column".to_string()))?;

    for (line_no, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let parse = |idx: usize, what: &str| -> Result<i64, EngineError> {
            fields
                .get(idx)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .ok_or_else(|| {
                    EngineError::ZonesError(format!(
                        "row {}: invalid {} value",
                        line_no + 2,
                        what
                    ))
                })
        };
        let zone_id = parse(zone_idx, "zone_id")? as u32;
        let x = parse(x_idx, "x")?;
        let y = parse(y_idx, "y")?;
        zones.insert(zone_id, ZoneLocation { zone_id, x, y });
    }

    Ok(zones)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_zone_rows_keyed_by_zone_id() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("neuralzone_test_zones_{}.csv", std::process::id()));
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "zone_id,x,y").unwrap();
        writeln!(f, "1,0,0").unwrap();
        writeln!(f, "2,10,5").unwrap();
        drop(f);

        let zones = load_zones(&path).unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[&2].x, 10);
        assert_eq!(zones[&2].y, 5);

        fs::remove_file(&path).ok();
    }
}
