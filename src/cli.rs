//! Command-line interface and REPL
//!
//! The REPL plays the host side of the link: raw frames typed with `rx` are
//! fed to the device as if they came from the controller, and whatever the
//! device queues in response is printed.

use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;

use crate::device::VirtualDevice;
use crate::midi::{self, FrameHeader};
use crate::parameter::{ParameterValue, ValueKind};
use crate::protocol::{Handshake, HandshakeFlags};

pub const PROMPT: &str = "kemper> ";

/// One REPL command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Feed raw bytes to the device
    Receive(Vec<u8>),
    /// Send a beacon frame on behalf of the host
    Connect { set: u8, lease: u8, flags: u8 },
    Tap,
    Morph,
    Bpm(f64),
    Tuner(bool),
    Monitor(bool),
    Get(String),
    Set { name: String, value: String },
    List,
    Stats,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let command = match head.to_ascii_lowercase().as_str() {
            "rx" => {
                let joined: String = rest.concat();
                let bytes = hex::decode(&joined).with_context(|| format!("Invalid hex: {}", joined))?;
                if bytes.is_empty() {
                    bail!("rx needs at least one byte");
                }
                Command::Receive(bytes)
            }
            "connect" => Command::Connect {
                set: parse_byte(rest.first().copied().unwrap_or("1"))?,
                lease: parse_byte(rest.get(1).copied().unwrap_or("5"))?,
                flags: parse_byte(rest.get(2).copied().unwrap_or("0x01"))?,
            },
            "tap" => Command::Tap,
            "morph" => Command::Morph,
            "bpm" => {
                let bpm = rest.first().ok_or_else(|| anyhow!("Usage: bpm <value>"))?;
                Command::Bpm(bpm.parse().with_context(|| format!("Invalid bpm: {}", bpm))?)
            }
            "tuner" => Command::Tuner(parse_switch(rest.first().copied(), "tuner")?),
            "monitor" => Command::Monitor(parse_switch(rest.first().copied(), "monitor")?),
            "get" => Command::Get(
                rest.first()
                    .ok_or_else(|| anyhow!("Usage: get <name>"))?
                    .to_string(),
            ),
            "set" => {
                if rest.len() < 2 {
                    bail!("Usage: set <name> <value>");
                }
                Command::Set {
                    name: rest[0].to_string(),
                    value: rest[1..].join(" "),
                }
            }
            "list" | "ls" => Command::List,
            "stats" => Command::Stats,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => bail!("Unknown command: {} (try 'help')", other),
        };
        Ok(Some(command))
    }
}

fn parse_byte(text: &str) -> Result<u8> {
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse(),
    }
    .with_context(|| format!("Invalid byte: {}", text))?;
    if value > 0x7F {
        bail!("{} is not a 7-bit value", text);
    }
    Ok(value)
}

fn parse_switch(word: Option<&str>, command: &str) -> Result<bool> {
    match word {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => bail!("Usage: {} on|off", command),
    }
}

/// Beacon frame bytes for a `connect` command
pub fn beacon_frame(header: &FrameHeader, set: u8, lease: u8, flags: u8) -> Vec<u8> {
    Handshake {
        parameter_set: set,
        flags: HandshakeFlags::from_byte(flags),
        lease_units: lease,
    }
    .to_message()
    .encode(header)
}

/// Run a command against the device and return the text to print
///
/// `Quit` and `Monitor` are handled by the caller.
pub fn execute(device: &mut VirtualDevice, command: &Command) -> Result<String> {
    match command {
        Command::Receive(bytes) => {
            let consumed = device.receive(bytes);
            Ok(if consumed {
                format!("{} {}", "consumed".green(), midi::format_hex(bytes))
            } else {
                format!("{} {}", "ignored".yellow(), midi::format_hex(bytes))
            })
        }
        Command::Connect { set, lease, flags } => {
            let frame = beacon_frame(&device.header(), *set, *lease, *flags);
            device.receive(&frame);
            Ok(format!(
                "beacon set {} lease {} flags {:02X}: {:?}",
                set,
                lease,
                flags,
                device.protocol().state()
            ))
        }
        Command::Tap => {
            device.tap();
            Ok(format_bpm(device.tempo().bpm()))
        }
        Command::Morph => {
            device.trigger_morph();
            Ok(match device.morph().target() {
                Some(target) => format!("morph fading to {}", target),
                None => "morph button ignored".yellow().to_string(),
            })
        }
        Command::Bpm(bpm) => {
            device.tempo_mut().set_bpm(*bpm);
            Ok(format_bpm(device.tempo().bpm()))
        }
        Command::Tuner(running) => {
            device.tuner_mut().set_running(*running);
            Ok(format!("tuner {}", if *running { "on" } else { "off" }))
        }
        Command::Get(name) => {
            let handle = device
                .store()
                .find_by_name(name)
                .ok_or_else(|| anyhow!("No parameter named {}", name))?;
            let entry = device.store().entry(handle);
            Ok(format!("{} ({}) = {}", entry.display_name(), entry.id(), entry.value()))
        }
        Command::Set { name, value } => {
            let handle = device
                .store()
                .find_by_name(name)
                .ok_or_else(|| anyhow!("No parameter named {}", name))?;
            let value = match device.store().entry(handle).kind() {
                ValueKind::Numeric => ParameterValue::Number(
                    value
                        .parse()
                        .with_context(|| format!("{} expects a number", name))?,
                ),
                ValueKind::Text => ParameterValue::Text(value.clone()),
            };
            let previous = device.store().value(handle).clone();
            device.set_value(handle, value);
            if let Err(e) = device.send(handle) {
                device.set_value(handle, previous);
                return Err(e.into());
            }
            Ok(format!("{} = {}", name, device.store().value(handle)))
        }
        Command::List => {
            let lines: Vec<String> = device
                .store()
                .iter()
                .map(|(_, entry)| {
                    format!(
                        "  {:12} {:20} {}",
                        entry.id().to_string().dimmed(),
                        entry.display_name(),
                        entry.value().to_string().bright_white()
                    )
                })
                .collect();
            Ok(lines.join("\n"))
        }
        Command::Stats => {
            let stats = device.stats();
            let mut text = format!(
                "received {}  parsed {}  unparsed {}  malformed {}  sent {}\nsession {:?}, set {}, keep-alive {}",
                stats.received(),
                stats.parsed().to_string().green(),
                stats.unparsed().to_string().yellow(),
                stats.malformed().to_string().red(),
                device.sent_count(),
                device.protocol().state(),
                device.protocol().current_parameter_set(),
                device.protocol().keep_alive_counter()
            );
            if let Some(last) = stats.last_unparsed() {
                text.push_str(&format!("\nlast unparsed: {}", midi::format_hex(last)));
            }
            Ok(text)
        }
        Command::Help => Ok(HELP.to_string()),
        Command::Monitor(_) | Command::Quit => Ok(String::new()),
    }
}

fn format_bpm(bpm: Option<u32>) -> String {
    match bpm {
        Some(bpm) => format!("tempo {} bpm", bpm),
        None => "no tempo".to_string(),
    }
}

const HELP: &str = "\
  rx <hex>                      feed a frame, e.g. rx F0 00 20 33 02 7F 41 00 04 01 F7
  connect [set] [lease] [flags] send a beacon (defaults: 1 5 0x01)
  tap                           tap tempo
  morph                         press the morph button
  bpm <n>                       set the tempo (0 clears)
  tuner on|off                  start or stop tuner telemetry
  monitor on|off                print unsolicited frames
  get <name> / set <name> <v>   read or write a parameter
  list                          list parameters
  stats                         traffic counters
  quit";

/// Read lines until EOF or Ctrl+C, forwarding them to the tick loop
///
/// Blocking; run it on its own thread.
pub fn read_lines(tx: mpsc::Sender<String>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    rl.add_history_entry(line.as_str())?;
                }
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::DeviceConfig;

    fn device() -> VirtualDevice {
        VirtualDevice::with_clock(DeviceConfig::default(), ManualClock::new(0)).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("   ").unwrap(), None);
        assert_eq!(
            Command::parse("rx B0 1E 01").unwrap(),
            Some(Command::Receive(vec![0xB0, 0x1E, 0x01]))
        );
        assert_eq!(
            Command::parse("connect 2 10 0x21").unwrap(),
            Some(Command::Connect {
                set: 2,
                lease: 10,
                flags: 0x21
            })
        );
        assert_eq!(
            Command::parse("connect").unwrap(),
            Some(Command::Connect {
                set: 1,
                lease: 5,
                flags: 0x01
            })
        );
        assert_eq!(
            Command::parse("set rig_name Crunch Lead").unwrap(),
            Some(Command::Set {
                name: "rig_name".to_string(),
                value: "Crunch Lead".to_string()
            })
        );
        assert_eq!(Command::parse("TUNER on").unwrap(), Some(Command::Tuner(true)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("rx F0 0").is_err());
        assert!(Command::parse("connect 200").is_err());
        assert!(Command::parse("tuner maybe").is_err());
        assert!(Command::parse("bogus").is_err());
    }

    #[test]
    fn test_connect_opens_session_and_pushes_set() {
        let mut device = device();
        let command = Command::parse("connect 1 5 1").unwrap().unwrap();

        execute(&mut device, &command).unwrap();
        assert!(device.protocol().is_connected());
        assert_eq!(device.outbound_len(), 3);
    }

    #[test]
    fn test_set_sends_new_value() {
        let mut device = device();
        execute(
            &mut device,
            &Command::Set {
                name: "rig_volume".to_string(),
                value: "100".to_string(),
            },
        )
        .unwrap();

        assert_eq!(
            device.pop_outbound().unwrap(),
            vec![0xF0, 0x00, 0x20, 0x33, 0x02, 0x7F, 0x01, 0x00, 0x04, 0x01, 0x00, 0x64, 0xF7]
        );
    }

    #[test]
    fn test_set_out_of_range_keeps_old_value() {
        let mut device = device();
        let command = Command::Set {
            name: "rig_volume".to_string(),
            value: "20000".to_string(),
        };

        assert!(execute(&mut device, &command).is_err());
        let handle = device.store().find_by_name("rig_volume").unwrap();
        assert_eq!(device.store().value(handle), &ParameterValue::Number(8192));
        assert_eq!(device.outbound_len(), 0);
    }

    #[test]
    fn test_get_unknown_name() {
        let mut device = device();
        assert!(execute(&mut device, &Command::Get("nope".to_string())).is_err());
    }
}
