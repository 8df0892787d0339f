use rand::Rng;
use serde_json::{json, Map, Value};

pub const POSITION_TYPE: &str = "positionData";

/// Schema the simulator registers for its readings.
pub fn position_structure() -> Value {
    json!({"x": "float", "y": "float", "z": "float", "position": "float"})
}

/// The fixed reading sent by the demo command.
pub fn sample_position() -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("x".to_string(), json!(1.23));
    data.insert("y".to_string(), json!(4.56));
    data.insert("z".to_string(), json!(7.89));
    data.insert("position".to_string(), json!(4.34));
    data
}

pub fn random_position(rng: &mut impl Rng) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("x".to_string(), json!(rng.gen_range(-5.0..5.0)));
    // Head height, with occasional crouch/stand outliers.
    let y = if rng.gen_bool(0.05) {
        rng.gen_range(0.2..2.5)
    } else {
        rng.gen_range(1.4..1.9)
    };
    data.insert("y".to_string(), json!(y));
    data.insert("z".to_string(), json!(rng.gen_range(-5.0..5.0)));
    data.insert("position".to_string(), json!(rng.gen_range(0.0..360.0)));
    data
}
