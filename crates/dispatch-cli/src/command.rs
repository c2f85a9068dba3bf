//! Interactive command parsing.

use std::str::FromStr;

use crate::error::{CliError, Result};
use crate::scenario::{CourierRecord, OrderRecord};

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `add-courier <json>`
    AddCourier(CourierRecord),
    /// `add-order <json>`
    AddOrder(OrderRecord),
    /// `remove <id>`; the id is either bare or `courier:<id>` / `order:<id>`.
    Remove(String),
    /// `list`
    List,
    /// `export`
    Export,
    /// `quit` or `exit`
    Quit,
}

impl FromStr for Command {
    type Err = CliError;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (name, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(name, rest)| (name, rest.trim()));

        match name {
            "add-courier" => {
                if rest.is_empty() {
                    return Err(CliError::MissingArgument {
                        command: "add-courier",
                        expected: "a courier JSON record",
                    });
                }
                Ok(Self::AddCourier(serde_json::from_str(rest)?))
            }
            "add-order" => {
                if rest.is_empty() {
                    return Err(CliError::MissingArgument {
                        command: "add-order",
                        expected: "an order JSON record",
                    });
                }
                Ok(Self::AddOrder(serde_json::from_str(rest)?))
            }
            "remove" => {
                if rest.is_empty() {
                    return Err(CliError::MissingArgument {
                        command: "remove",
                        expected: "an entity id",
                    });
                }
                Ok(Self::Remove(rest.to_string()))
            }
            "list" => Ok(Self::List),
            "export" => Ok(Self::Export),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(CliError::UnknownCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("list", Command::List ; "list")]
    #[test_case("  export  ", Command::Export ; "export with padding")]
    #[test_case("quit", Command::Quit ; "quit")]
    #[test_case("exit", Command::Quit ; "exit alias")]
    #[test_case("remove order:12", Command::Remove("order:12".into()) ; "remove qualified")]
    #[test_case("remove 7", Command::Remove("7".into()) ; "remove bare")]
    fn parses_simple_commands(line: &str, expected: Command) {
        assert_eq!(line.parse::<Command>().expect("parse"), expected);
    }

    #[test]
    fn parses_add_courier_record() {
        let command: Command = r#"add-courier {"id":"9","cargo_types":"food"}"#
            .parse()
            .expect("parse");
        let Command::AddCourier(record) = command else {
            unreachable!("expected add-courier, got {command:?}");
        };
        assert_eq!(record.id, "9");
        assert_eq!(record.cargo_types, "food");
    }

    #[test]
    fn parses_add_order_record() {
        let command: Command = r#"add-order {"id":"o","price":5,"pickup_x":0,"pickup_y":0,"dropoff_x":3,"dropoff_y":4}"#
            .parse()
            .expect("parse");
        assert!(matches!(command, Command::AddOrder(ref r) if r.id == "o"));
    }

    #[test_case("remove" ; "remove")]
    #[test_case("add-order   " ; "add order")]
    #[test_case("add-courier" ; "add courier")]
    fn missing_argument_is_reported(line: &str) {
        assert!(matches!(
            line.parse::<Command>(),
            Err(CliError::MissingArgument { .. })
        ));
    }

    #[test]
    fn bad_json_is_reported() {
        assert!(matches!(
            "add-courier {id:".parse::<Command>(),
            Err(CliError::Json(_))
        ));
    }

    #[test]
    fn unknown_command_is_reported() {
        let err = "teleport 5".parse::<Command>().expect_err("unknown");
        assert_eq!(err.to_string(), "unknown command: teleport");
    }
}
