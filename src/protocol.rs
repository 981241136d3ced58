use serde_json::{Map, Value};

use crate::engine::Action;
use crate::types::{Direction, PlayerId, Position};

#[derive(Debug, PartialEq)]
pub enum ClientMessage {
    Hello {
        name: String,
        /// Secret from an earlier `welcome`, for reconnects.
        reconnect_token: Option<String>,
    },
    Start {
        rows: Option<i64>,
        cols: Option<i64>,
        treasures: Option<i64>,
        minutes: Option<i64>,
    },
    Leave,
    Action(Action),
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let name = object.get("name")?.as_str()?.to_string();
            let reconnect_token = match object.get("reconnectToken") {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            Some(ClientMessage::Hello {
                name,
                reconnect_token,
            })
        }
        "start" => Some(ClientMessage::Start {
            rows: parse_optional_i64(object.get("rows"))?,
            cols: parse_optional_i64(object.get("cols"))?,
            treasures: parse_optional_i64(object.get("treasures"))?,
            minutes: parse_optional_i64(object.get("minutes"))?,
        }),
        "leave" => Some(ClientMessage::Leave),
        "rotate" => Some(ClientMessage::Action(Action::RotateSpare)),
        "push" => {
            let (index, direction) = parse_line(object)?;
            Some(ClientMessage::Action(Action::Push { index, direction }))
        }
        "use_push_fixed" => {
            let (index, direction) = parse_line(object)?;
            Some(ClientMessage::Action(Action::UsePushFixed { index, direction }))
        }
        "use_push_twice" => {
            let (index, direction) = parse_line(object)?;
            Some(ClientMessage::Action(Action::UsePushTwice { index, direction }))
        }
        "move" => Some(ClientMessage::Action(Action::Move {
            target: parse_cell(object)?,
        })),
        "use_beam" => Some(ClientMessage::Action(Action::UseBeam {
            target: parse_cell(object)?,
        })),
        "use_swap" => {
            let other = PlayerId::new(object.get("target")?.as_str()?);
            Some(ClientMessage::Action(Action::UseSwap { other }))
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ClientMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_line(object: &Map<String, Value>) -> Option<(usize, Direction)> {
    let index = parse_index(object.get("index"))?;
    let direction = Direction::parse(object.get("direction")?.as_str()?)?;
    Some((index, direction))
}

fn parse_cell(object: &Map<String, Value>) -> Option<Position> {
    Some(Position::new(
        parse_index(object.get("row"))?,
        parse_index(object.get("col"))?,
    ))
}

/// Required non-negative integer.
fn parse_index(value: Option<&Value>) -> Option<usize> {
    let number = parse_optional_i64(value)??;
    usize::try_from(number).ok()
}

fn parse_optional_i64(value: Option<&Value>) -> Option<Option<i64>> {
    const MAX_SAFE_INTEGER_F64: f64 = 9_007_199_254_740_991.0;

    let Some(value) = value else {
        return Some(None);
    };
    if let Some(number) = value.as_i64() {
        return Some(Some(number));
    }
    if let Some(number) = value.as_u64() {
        return i64::try_from(number).ok().map(Some);
    }
    if let Some(number) = value.as_f64() {
        if number.is_finite() {
            let floored = number.floor();
            if floored.abs() > MAX_SAFE_INTEGER_F64 {
                return None;
            }
            return Some(Some(floored as i64));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hello_with_and_without_token() {
        assert_eq!(
            parse_client_message(r#"{"type":"hello","name":"A"}"#),
            Some(ClientMessage::Hello {
                name: "A".to_string(),
                reconnect_token: None
            })
        );
        assert_eq!(
            parse_client_message(r#"{"type":"hello","name":"A","reconnectToken":"k3Yx"}"#),
            Some(ClientMessage::Hello {
                name: "A".to_string(),
                reconnect_token: Some("k3Yx".to_string())
            })
        );
        assert!(
            parse_client_message(r#"{"type":"hello","name":"A","reconnectToken":4}"#).is_none()
        );
    }

    #[test]
    fn parse_push_family() {
        assert_eq!(
            parse_client_message(r#"{"type":"push","index":1,"direction":"down"}"#),
            Some(ClientMessage::Action(Action::Push {
                index: 1,
                direction: Direction::Down
            }))
        );
        assert_eq!(
            parse_client_message(r#"{"type":"use_push_fixed","index":2,"direction":"left"}"#),
            Some(ClientMessage::Action(Action::UsePushFixed {
                index: 2,
                direction: Direction::Left
            }))
        );
        assert!(parse_client_message(r#"{"type":"push","index":1,"direction":"north"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"push","index":-1,"direction":"up"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"push","direction":"up"}"#).is_none());
    }

    #[test]
    fn parse_move_and_bonus_targets() {
        assert_eq!(
            parse_client_message(r#"{"type":"move","row":3,"col":4}"#),
            Some(ClientMessage::Action(Action::Move {
                target: Position::new(3, 4)
            }))
        );
        assert_eq!(
            parse_client_message(r#"{"type":"use_beam","row":0,"col":6}"#),
            Some(ClientMessage::Action(Action::UseBeam {
                target: Position::new(0, 6)
            }))
        );
        assert_eq!(
            parse_client_message(r#"{"type":"use_swap","target":"player_2"}"#),
            Some(ClientMessage::Action(Action::UseSwap {
                other: PlayerId::new("player_2")
            }))
        );
        assert_eq!(
            parse_client_message(r#"{"type":"rotate"}"#),
            Some(ClientMessage::Action(Action::RotateSpare))
        );
    }

    #[test]
    fn parse_start_floors_and_rejects_overflow() {
        assert_eq!(
            parse_client_message(r#"{"type":"start","rows":9.7,"minutes":-1.2}"#),
            Some(ClientMessage::Start {
                rows: Some(9),
                cols: None,
                treasures: None,
                minutes: Some(-2)
            })
        );
        assert!(parse_client_message(r#"{"type":"start","rows":1e100}"#).is_none());
        assert!(
            parse_client_message(r#"{"type":"start","treasures":18446744073709551615}"#).is_none()
        );
    }

    #[test]
    fn parse_ping_requires_finite_number() {
        assert_eq!(
            parse_client_message(r#"{"type":"ping","t":12.5}"#),
            Some(ClientMessage::Ping { t: 12.5 })
        );
        assert!(parse_client_message(r#"{"type":"ping","t":"soon"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"teleport"}"#).is_none());
    }
}
