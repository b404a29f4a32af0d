//! Host report channel.
//!
//! Every report is made of little-endian 32 bit words. It starts with five
//! `u32` words: command code, write block, then three command-specific
//! arguments. Output reports append interleaved `(output, target)` `i32`
//! activation pairs.

use std::io;

type Word = u32;
const WORD_SIZE: usize = size_of::<Word>();
const HEADER_SIZE: usize = 5 * WORD_SIZE;

/// The command code of a host report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Normal,
    Final,
    Info,
}

impl HostCommand {
    pub fn code(self) -> u32 {
        match self {
            HostCommand::Normal => 0,
            HostCommand::Final => 1,
            HostCommand::Info => 2,
        }
    }

    fn from_code(code: u32) -> io::Result<Self> {
        match code {
            0 => Ok(HostCommand::Normal),
            1 => Ok(HostCommand::Final),
            2 => Ok(HostCommand::Info),
            code => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Received an invalid host command {code}"),
            )),
        }
    }
}

/// The outputs of every local output unit at the end of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputReport {
    pub command: HostCommand,
    pub write_blk: u32,
    pub epoch: u32,
    /// Event index, `-1` for the initial outputs of an example.
    pub event: i32,
    pub example: u32,
    pub tick: u32,
    /// Raw `(output, target)` activations, one pair per unit.
    pub pairs: Vec<[i32; 2]>,
}

impl OutputReport {
    /// Packs the event and example indices the way the host expects them.
    pub fn packed_position(&self) -> u32 {
        ((self.event as u32) << 16) | (self.example & 0xffff)
    }
}

/// Sent once at stage start so the host can size its monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoReport {
    pub write_blk: u32,
    pub num_outputs: u32,
    pub num_write_blks: u32,
    pub total_ticks: u32,
}

/// A message for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostReport {
    Outputs(OutputReport),
    Info(InfoReport),
}

impl HostReport {
    pub fn command(&self) -> HostCommand {
        match self {
            HostReport::Outputs(report) => report.command,
            HostReport::Info(_) => HostCommand::Info,
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    /// Writes the header into `buf` and returns the zero-copy payload, if any.
    ///
    /// The pairs are borrowed as they are on little-endian hosts; other hosts
    /// append them to `buf` byte-swapped and return no payload.
    ///
    /// # Arguments
    /// * `buf` - The buffer to append the header words to.
    ///
    /// # Returns
    /// The payload bytes that must follow `buf` on the wire.
    pub fn serialize<'a>(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        let (words, pairs): ([u32; 5], Option<&[[i32; 2]]>) = match self {
            HostReport::Outputs(report) => (
                [
                    report.command.code(),
                    report.write_blk,
                    report.epoch,
                    report.packed_position(),
                    report.tick,
                ],
                Some(report.pairs.as_slice()),
            ),
            HostReport::Info(info) => (
                [
                    HostCommand::Info.code(),
                    info.write_blk,
                    info.num_outputs,
                    info.num_write_blks,
                    info.total_ticks,
                ],
                None,
            ),
        };

        for word in words {
            buf.extend_from_slice(&word.to_le_bytes());
        }

        let pairs = pairs?;
        if cfg!(target_endian = "little") {
            return Some(bytemuck::cast_slice(pairs));
        }

        for value in pairs.iter().flatten() {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        None
    }

    /// Decodes a report from its wire bytes.
    ///
    /// # Arguments
    /// * `buf` - The header immediately followed by the payload.
    ///
    /// # Returns
    /// The decoded report or an `io::Error` of kind `InvalidData`.
    pub fn deserialize(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (header, rest) = buf.split_at(HEADER_SIZE);
        let mut words = header
            .chunks_exact(WORD_SIZE)
            .map(|chunk| Word::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));

        let mut next = || words.next().unwrap_or_default();
        let (command, write_blk, arg1, arg2, arg3) = (next(), next(), next(), next(), next());

        match HostCommand::from_code(command)? {
            HostCommand::Info => Ok(HostReport::Info(InfoReport {
                write_blk,
                num_outputs: arg1,
                num_write_blks: arg2,
                total_ticks: arg3,
            })),
            command => {
                if rest.len() % (2 * WORD_SIZE) != 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Output payload of {} bytes is not made of pairs", rest.len()),
                    ));
                }

                let pairs = rest
                    .chunks_exact(2 * WORD_SIZE)
                    .map(|pair| {
                        let [output, target]: [[u8; 4]; 2] = bytemuck::pod_read_unaligned(pair);
                        [i32::from_le_bytes(output), i32::from_le_bytes(target)]
                    })
                    .collect();

                Ok(HostReport::Outputs(OutputReport {
                    command,
                    write_blk,
                    epoch: arg1,
                    event: (arg2 >> 16) as u16 as i16 as i32,
                    example: arg2 & 0xffff,
                    tick: arg3,
                    pairs,
                }))
            }
        }
    }
}
