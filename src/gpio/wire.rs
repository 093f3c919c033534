//! GPIO socket wire format (spec.md §6): "messages are text JSON, one per
//! frame. Initial snapshot: a JSON array of `{pin, value}`. Update: a JSON
//! object `{pin, value}`."

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PinState {
    pub pin: u32,
    pub value: u8,
}

/// A line can decode to either shape; `serde`'s untagged enum picks whichever
/// matches the JSON's top-level type (array vs object).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GpioMessage {
    Snapshot(Vec<PinState>),
    Update(PinState),
}

pub fn parse_line(line: &str) -> Result<GpioMessage, serde_json::Error> {
    serde_json::from_str(line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_snapshot_array() {
        let msg = parse_line(r#"[{"pin": 3, "value": 1}, {"pin": 4, "value": 0}]"#).unwrap();
        match msg {
            GpioMessage::Snapshot(states) => {
                assert_eq!(states.len(), 2);
                assert_eq!(states[0].pin, 3);
                assert_eq!(states[1].value, 0);
            }
            GpioMessage::Update(_) => panic!("expected snapshot"),
        }
    }

    #[test]
    fn parses_single_update_object() {
        let msg = parse_line(r#"{"pin": 3, "value": 0}"#).unwrap();
        match msg {
            GpioMessage::Update(state) => {
                assert_eq!(state.pin, 3);
                assert_eq!(state.value, 0);
            }
            GpioMessage::Snapshot(_) => panic!("expected update"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_line("not json").is_err());
    }
}
