// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Destinations for processed frames.

use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    net::TcpStream,
    path::PathBuf,
    str::FromStr,
};

use log::debug;

use super::SinkError;

/// Something that takes serialised frames.
pub trait Sink: Send {
    /// A human-readable description, used in log messages.
    fn name(&self) -> &str;

    /// Write one whole serialised frame.
    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError>;
}

/// Append frames to a binary file.
pub struct FileSink {
    name: String,
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn create(path: PathBuf) -> Result<FileSink, SinkError> {
        let name = format!("file:{}", path.display());
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| SinkError::Open {
                name: name.clone(),
                err,
            })?;
        debug!("Opened {name}");
        Ok(FileSink {
            name,
            writer: BufWriter::new(file),
        })
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.writer
            .write_all(bytes)
            .and_then(|()| self.writer.flush())
            .map_err(|err| SinkError::Write {
                name: self.name.clone(),
                err,
            })
    }
}

/// Stream frames to a TCP listener.
pub struct TcpSink {
    name: String,
    stream: TcpStream,
}

impl TcpSink {
    pub fn connect(addr: &str) -> Result<TcpSink, SinkError> {
        let name = format!("tcp:{addr}");
        let stream = TcpStream::connect(addr).map_err(|err| SinkError::Open {
            name: name.clone(),
            err,
        })?;
        debug!("Connected to {name}");
        Ok(TcpSink { name, stream })
    }
}

impl Sink for TcpSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.stream
            .write_all(bytes)
            .map_err(|err| SinkError::Write {
                name: self.name.clone(),
                err,
            })
    }
}

/// Where processed frames go, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSpec {
    File(PathBuf),
    Tcp(String),
}

impl OutputSpec {
    pub fn open(&self) -> Result<Box<dyn Sink>, SinkError> {
        Ok(match self {
            OutputSpec::File(path) => Box::new(FileSink::create(path.clone())?),
            OutputSpec::Tcp(addr) => Box::new(TcpSink::connect(addr)?),
        })
    }
}

impl FromStr for OutputSpec {
    type Err = SinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, dest) = s
            .split_once(':')
            .ok_or_else(|| SinkError::InvalidSpec(s.to_string()))?;
        if dest.is_empty() {
            return Err(SinkError::EmptyDestination(s.to_string()));
        }
        match kind {
            "file" => Ok(OutputSpec::File(PathBuf::from(dest))),
            // A TCP destination needs a port.
            "tcp" if dest.rsplit_once(':').map_or(false, |(_, p)| p.parse::<u16>().is_ok()) => {
                Ok(OutputSpec::Tcp(dest.to_string()))
            }
            _ => Err(SinkError::InvalidSpec(s.to_string())),
        }
    }
}

impl fmt::Display for OutputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSpec::File(path) => write!(f, "file:{}", path.display()),
            OutputSpec::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}
