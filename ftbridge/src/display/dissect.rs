//! SSD1306 I2C traffic dissection.
//!
//! Turns the payloads of I2C writes to a panel back into commands and data
//! runs. Command parameters may arrive in their own transactions (the
//! driver sends one byte per write), so the dissector carries a partial
//! command across payloads until its parameter count is satisfied.

use std::collections::VecDeque;
use std::fmt;

use super::command::{self, CONTROL_COMMAND, CONTROL_DATA};

// Co bit: one control byte per data byte follows.
const CONTINUATION: u8 = 0x80;

/// One decoded unit of panel traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    Command { opcode: u8, params: Vec<u8> },
    Data(Vec<u8>),
    /// Bytes that do not form a valid command or data run.
    Malformed(Vec<u8>),
}

/// Argument packed into the opcode itself.
fn embedded_argument(opcode: u8) -> Option<u8> {
    match opcode {
        0x00..=0x1F => Some(opcode & 0x0F),
        0x40..=0x7F => Some(opcode & 0x3F),
        0xB0..=0xB7 => Some(opcode & 0x07),
        _ => None,
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transfer::Command { opcode, params } => {
                write!(f, "{}", command::name(*opcode))?;
                if let Some(arg) = embedded_argument(*opcode) {
                    write!(f, " {}", arg)?;
                }
                for param in params {
                    write!(f, " 0x{:02X}", param)?;
                }
                Ok(())
            }
            Transfer::Data(data) => write!(f, "DATA {} bytes", data.len()),
            Transfer::Malformed(bytes) => write!(f, "MALFORMED {}", hex::encode(bytes)),
        }
    }
}

#[derive(Debug)]
struct Partial {
    opcode: u8,
    params: Vec<u8>,
    needed: usize,
}

/// Stateful decoder for a stream of write payloads.
#[derive(Debug, Default)]
pub struct Dissector {
    partial: Option<Partial>,
    transfers: VecDeque<Transfer>,
}

impl Dissector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one I2C write payload, control byte included.
    pub fn feed(&mut self, payload: &[u8]) {
        let Some((&control, body)) = payload.split_first() else {
            // Zero-length writes only test for an ACK.
            return;
        };

        match control {
            CONTROL_COMMAND => body.iter().for_each(|&b| self.command_byte(b)),
            CONTROL_DATA => {
                self.abandon_partial();
                if !body.is_empty() {
                    self.transfers.push_back(Transfer::Data(body.to_vec()));
                }
            }
            c if c & CONTINUATION != 0 => self.continuation(payload),
            _ => {
                self.abandon_partial();
                self.transfers.push_back(Transfer::Malformed(payload.to_vec()));
            }
        }
    }

    // Pairs of (control, byte); the last control byte may drop Co and carry
    // a trailing stream.
    fn continuation(&mut self, payload: &[u8]) {
        let mut rest = payload;
        while let Some((&control, tail)) = rest.split_first() {
            if control & CONTINUATION == 0 {
                self.feed(rest);
                return;
            }
            let Some((&byte, tail)) = tail.split_first() else {
                self.abandon_partial();
                self.transfers.push_back(Transfer::Malformed(vec![control]));
                return;
            };
            match control & !CONTINUATION {
                CONTROL_COMMAND => self.command_byte(byte),
                CONTROL_DATA => {
                    self.abandon_partial();
                    self.transfers.push_back(Transfer::Data(vec![byte]));
                }
                _ => {
                    self.abandon_partial();
                    self.transfers.push_back(Transfer::Malformed(vec![control, byte]));
                }
            }
            rest = tail;
        }
    }

    fn command_byte(&mut self, byte: u8) {
        match self.partial.as_mut() {
            Some(partial) => {
                partial.params.push(byte);
                if partial.params.len() == partial.needed {
                    self.complete_partial();
                }
            }
            None => {
                let needed = command::parameter_count(byte);
                if needed == 0 {
                    self.transfers.push_back(Transfer::Command {
                        opcode: byte,
                        params: Vec::new(),
                    });
                } else {
                    self.partial = Some(Partial {
                        opcode: byte,
                        params: Vec::with_capacity(needed),
                        needed,
                    });
                }
            }
        }
    }

    fn complete_partial(&mut self) {
        if let Some(Partial { opcode, params, .. }) = self.partial.take() {
            self.transfers.push_back(Transfer::Command { opcode, params });
        }
    }

    // A command cut short by something other than its parameters.
    fn abandon_partial(&mut self) {
        if let Some(Partial { opcode, mut params, .. }) = self.partial.take() {
            params.insert(0, opcode);
            self.transfers.push_back(Transfer::Malformed(params));
        }
    }

    /// Take the transfers decoded so far.
    pub fn drain(&mut self) -> impl Iterator<Item = Transfer> + '_ {
        self.transfers.drain(..)
    }

    /// End of stream: any unfinished command becomes malformed.
    pub fn finish(mut self) -> Vec<Transfer> {
        self.abandon_partial();
        self.transfers.into_iter().collect()
    }
}

/// Dissect a complete sequence of write payloads.
pub fn dissect<I>(writes: I) -> Vec<Transfer>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut dissector = Dissector::new();
    for write in writes {
        dissector.feed(write.as_ref());
    }
    dissector.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(opcode: u8, params: &[u8]) -> Transfer {
        Transfer::Command {
            opcode,
            params: params.to_vec(),
        }
    }

    #[test]
    fn test_parameters_join_across_writes() {
        let transfers = dissect([[0x00, 0x81], [0x00, 0xFF], [0x00, 0xAF]]);
        assert_eq!(transfers, vec![cmd(0x81, &[0xFF]), cmd(0xAF, &[])]);
    }

    #[test]
    fn test_init_sequence_decodes() {
        let writes = command::INIT_SEQUENCE.iter().map(|&b| vec![0x00, b]);
        let transfers = dissect(writes);
        assert_eq!(transfers.len(), 16);
        assert!(!transfers.iter().any(|t| matches!(t, Transfer::Malformed(_))));
        assert_eq!(transfers[2].to_string(), "SET_START_LINE 0");
        assert_eq!(transfers[3].to_string(), "SET_CONTRAST 0xFF");
    }

    #[test]
    fn test_page_flush() {
        let mut page = vec![0x40];
        page.extend([0u8; 128]);
        let transfers = dissect([vec![0x00, 0xB3], vec![0x00, 0x00], vec![0x00, 0x10], page]);

        let text: Vec<String> = transfers.iter().map(ToString::to_string).collect();
        assert_eq!(
            text,
            ["SET_PAGE_START 3", "SET_LOW_COLUMN 0", "SET_HIGH_COLUMN 0", "DATA 128 bytes"]
        );
    }

    #[test]
    fn test_data_interrupting_command_is_malformed() {
        let transfers = dissect([vec![0x00, 0x21, 0x00], vec![0x40, 0xAA]]);
        assert_eq!(
            transfers,
            vec![Transfer::Malformed(vec![0x21, 0x00]), Transfer::Data(vec![0xAA])]
        );
    }

    #[test]
    fn test_unfinished_command_at_end() {
        assert_eq!(dissect([[0x00, 0x8D]]), vec![Transfer::Malformed(vec![0x8D])]);
    }

    #[test]
    fn test_empty_writes_and_unknown_control_bytes() {
        let transfers = dissect([vec![], vec![0x12, 0x34]]);
        assert_eq!(transfers, vec![Transfer::Malformed(vec![0x12, 0x34])]);
        assert_eq!(transfers[0].to_string(), "MALFORMED 1234");
    }

    #[test]
    fn test_continuation_pairs() {
        let transfers = dissect([[0x80, 0x81, 0x80, 0x7F, 0xC0, 0x55]]);
        assert_eq!(
            transfers,
            vec![cmd(0x81, &[0x7F]), Transfer::Data(vec![0x55])]
        );
    }

    #[test]
    fn test_drain_is_incremental() {
        let mut dissector = Dissector::new();
        dissector.feed(&[0x00, 0xAE]);
        assert_eq!(dissector.drain().collect::<Vec<_>>(), vec![cmd(0xAE, &[])]);
        dissector.feed(&[0x00, 0x20]);
        assert_eq!(dissector.drain().count(), 0);
        dissector.feed(&[0x00, 0x00]);
        assert_eq!(dissector.finish(), vec![cmd(0x20, &[0x00])]);
    }
}
