use serde::Serialize;

/// Placeholder the controller writes for a failed environmental read.
const INVALID: &str = "nan";

// ---------------------------------------------------------------------------
// Telemetry record
// ---------------------------------------------------------------------------

/// One `soil_pct,temp_c,humidity_pct,water_ok` record from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Record {
    pub soil_pct: u8,
    pub temp_c: Option<f32>,
    pub humidity_pct: Option<f32>,
    pub water_ok: bool,
}

/// Parse a telemetry payload.  Fields are positional; exactly four are
/// required.  `nan` marks a missing environmental value.
pub(crate) fn parse_record(payload: &[u8]) -> Result<Record, String> {
    let text = String::from_utf8_lossy(payload);
    let fields: Vec<&str> = text.trim().split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(format!(
            "expected 4 telemetry fields, got {} in '{}'",
            fields.len(),
            text.trim()
        ));
    }

    let soil_pct = fields[0]
        .parse::<u8>()
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| format!("bad soil percentage '{}'", fields[0]))?;
    let temp_c = parse_optional(fields[1], "temperature")?;
    let humidity_pct = parse_optional(fields[2], "humidity")?;
    let water_ok = match fields[3] {
        "1" => true,
        "0" => false,
        other => return Err(format!("bad water flag '{other}' (use 0/1)")),
    };

    Ok(Record {
        soil_pct,
        temp_c,
        humidity_pct,
        water_ok,
    })
}

fn parse_optional(field: &str, what: &str) -> Result<Option<f32>, String> {
    if field.eq_ignore_ascii_case(INVALID) {
        return Ok(None);
    }
    match field.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(format!("bad {what} '{field}'")),
    }
}

// ---------------------------------------------------------------------------
// Threshold command
// ---------------------------------------------------------------------------

/// Validate a requested threshold and build the command payload.  The
/// controller applies the same (0, 100) rule and silently drops anything
/// else, so rejecting here is the only feedback a caller gets.
pub(crate) fn threshold_payload(value: i64) -> Result<String, String> {
    if value > 0 && value < 100 {
        Ok(value.to_string())
    } else {
        Err(format!("threshold {value} outside (0, 100)"))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
