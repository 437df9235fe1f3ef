// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Arguments for `rtcal serve`.


use std::{path::PathBuf, str::FromStr, sync::Arc};

use clap::Parser;
use itertools::Itertools;
use log::{debug, info, trace};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vec1::Vec1;

use super::common::ARG_FILE_HELP;
use crate::{
    antenna::{AntennaPositions, AntennaPositionsError},
    constants::{
        DEFAULT_ANT_SIGMA, DEFAULT_BUFFER_DEPTH, DEFAULT_NUM_THREADS, DEFAULT_PORT,
        DEFAULT_VIS_SIGMA, NUM_ANTENNAS_PER_STATION, NUM_CHANNELS, NUM_STATIONS, NUM_SUBBANDS,
    },
    frame::{ArrayLayout, HeaderError},
    pipeline::{OutputSpec, SinkError},
    server::ServeParams,
    stages::flag::ChannelRange,
    RtcalError,
};

lazy_static::lazy_static! {
    static ref CHANNEL_RANGE_REGEX: Regex =
        Regex::new(r"^(\d+)-(\d+)$").expect("the channel range regex is valid");

    static ref ANT_SIGMA_HELP: String =
        format!("Antennas whose mean visibility amplitude is further than this many standard deviations from the median are flagged. Default: {DEFAULT_ANT_SIGMA}");

    static ref VIS_SIGMA_HELP: String =
        format!("Channels whose mean visibility amplitude is further than this many standard deviations from the median are flagged. Default: {DEFAULT_VIS_SIGMA}");

    static ref SUBBAND_HELP: String =
        format!("The subband the correlator is sending (0 to {}). Default: 0", NUM_SUBBANDS - 1);

    static ref CHANNELS_HELP: String =
        format!("The channels to process, as comma-separated inclusive ranges, e.g. '0-10,20-62'. Ranges must be sorted and must not overlap. Default: all channels (0-{} for the standard layout)", NUM_CHANNELS - 1);

    static ref BUFFER_DEPTH_HELP: String =
        format!("The number of frames per polarisation that can be queued for processing. Default: {DEFAULT_BUFFER_DEPTH}");

    static ref NUM_THREADS_HELP: String =
        format!("The number of pipeline worker threads. Default: {DEFAULT_NUM_THREADS}");

    static ref PORT_HELP: String =
        format!("The TCP port to listen on for correlator connections. Default: {DEFAULT_PORT}");

    static ref STATIONS_HELP: String =
        format!("The number of stations. Default: {NUM_STATIONS}");

    static ref ANTENNAS_PER_STATION_HELP: String =
        format!("The number of antennas (dual-polarised dipoles) per station. Default: {NUM_ANTENNAS_PER_STATION}");

    static ref NUM_CHANNELS_HELP: String =
        format!("The number of channels the correlator delivers per subband. Default: {NUM_CHANNELS}");
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct ServeArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    /// Path to the antenna positions file: one "x y z" ITRF position
    /// [metres] per line, in correlator order.
    #[clap(short, long, parse(from_os_str), help_heading = "INPUT")]
    pub(super) antennas: Option<PathBuf>,

    #[clap(long, help = SUBBAND_HELP.as_str(), help_heading = "INPUT")]
    pub(super) subband: Option<i32>,

    #[clap(short, long, help = PORT_HELP.as_str(), help_heading = "INPUT")]
    pub(super) port: Option<u32>,

    /// Where to write processed frames: 'file:<path>' to append to a file or
    /// 'tcp:<host>:<port>' to stream to a listener. May be given more than
    /// once.
    #[clap(short, long, multiple_values(true), help_heading = "OUTPUT")]
    pub(super) outputs: Option<Vec<String>>,

    #[clap(long, help = CHANNELS_HELP.as_str(), help_heading = "FLAGGING")]
    pub(super) channels: Option<String>,

    #[clap(long, help = ANT_SIGMA_HELP.as_str(), help_heading = "FLAGGING")]
    pub(super) ant_sigma: Option<f32>,

    #[clap(long, help = VIS_SIGMA_HELP.as_str(), help_heading = "FLAGGING")]
    pub(super) vis_sigma: Option<f32>,

    #[clap(long, help = BUFFER_DEPTH_HELP.as_str(), help_heading = "PROCESSING")]
    pub(super) buffer_depth: Option<usize>,

    #[clap(short = 't', long, help = NUM_THREADS_HELP.as_str(), help_heading = "PROCESSING")]
    pub(super) num_threads: Option<usize>,

    #[clap(long, help = STATIONS_HELP.as_str(), help_heading = "ARRAY LAYOUT")]
    pub(super) stations: Option<usize>,

    #[clap(long, help = ANTENNAS_PER_STATION_HELP.as_str(), help_heading = "ARRAY LAYOUT")]
    pub(super) antennas_per_station: Option<usize>,

    #[clap(long = "num-channels", help = NUM_CHANNELS_HELP.as_str(), help_heading = "ARRAY LAYOUT")]
    pub(super) num_channels: Option<usize>,
}

impl ServeArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified into
    /// a single struct. Where applicable, it will prefer CLI parameters over
    /// those in the file.
    ///
    /// This function should only ever merge arguments, and not try to make
    /// sense of them.
    pub(super) fn merge(self) -> Result<ServeArgs, RtcalError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            // Read in the file arguments. Ensure all of the file args are
            // accounted for by pattern matching.
            let ServeArgs {
                args_file: _,
                antennas,
                subband,
                port,
                outputs,
                channels,
                ant_sigma,
                vis_sigma,
                buffer_depth,
                num_threads,
                stations,
                antennas_per_station,
                num_channels,
            } = unpack_arg_file!(arg_file);

            // Merge all the arguments, preferring the CLI args when available.
            Ok(ServeArgs {
                args_file: None,
                antennas: cli_args.antennas.or(antennas),
                subband: cli_args.subband.or(subband),
                port: cli_args.port.or(port),
                outputs: cli_args.outputs.or(outputs),
                channels: cli_args.channels.or(channels),
                ant_sigma: cli_args.ant_sigma.or(ant_sigma),
                vis_sigma: cli_args.vis_sigma.or(vis_sigma),
                buffer_depth: cli_args.buffer_depth.or(buffer_depth),
                num_threads: cli_args.num_threads.or(num_threads),
                stations: cli_args.stations.or(stations),
                antennas_per_station: cli_args.antennas_per_station.or(antennas_per_station),
                num_channels: cli_args.num_channels.or(num_channels),
            })
        } else {
            Ok(cli_args)
        }
    }

    /// Validate the arguments and turn them into the parameters of a server.
    pub(super) fn parse(self) -> Result<ServeParams, ServeArgsError> {
        debug!("{:#?}", self);

        let Self {
            args_file: _,
            antennas,
            subband,
            port,
            outputs,
            channels,
            ant_sigma,
            vis_sigma,
            buffer_depth,
            num_threads,
            stations,
            antennas_per_station,
            num_channels,
        } = self;

        let layout = ArrayLayout {
            num_stations: stations.unwrap_or(NUM_STATIONS),
            antennas_per_station: antennas_per_station.unwrap_or(NUM_ANTENNAS_PER_STATION),
            num_channels: num_channels.unwrap_or(NUM_CHANNELS),
        };
        layout.validate()?;

        let ant_sigma = ant_sigma.unwrap_or(DEFAULT_ANT_SIGMA);
        if ant_sigma.is_nan() || ant_sigma <= 0.0 {
            return Err(ServeArgsError::AntSigma(ant_sigma));
        }
        let vis_sigma = vis_sigma.unwrap_or(DEFAULT_VIS_SIGMA);
        if vis_sigma.is_nan() || vis_sigma <= 0.0 {
            return Err(ServeArgsError::VisSigma(vis_sigma));
        }

        let subband = subband.unwrap_or(0);
        if !(0..NUM_SUBBANDS as i32).contains(&subband) {
            return Err(ServeArgsError::Subband(subband));
        }

        let num_threads = num_threads.unwrap_or(DEFAULT_NUM_THREADS);
        if num_threads == 0 {
            return Err(ServeArgsError::NumThreads);
        }
        let buffer_depth = buffer_depth.unwrap_or(DEFAULT_BUFFER_DEPTH);
        if buffer_depth == 0 {
            return Err(ServeArgsError::BufferDepth);
        }

        let port = port.unwrap_or(u32::from(DEFAULT_PORT));
        let port = match u16::try_from(port) {
            Ok(p) if p > 0 => p,
            _ => return Err(ServeArgsError::Port(port)),
        };

        let channels = match channels {
            Some(s) => parse_channel_ranges(&s, layout.num_channels)?,
            None => Vec1::new(ChannelRange {
                start: 0,
                end: layout.num_channels - 1,
            }),
        };

        let outputs = match outputs {
            Some(o) if !o.is_empty() => o
                .iter()
                .map(|s| OutputSpec::from_str(s))
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(ServeArgsError::NoOutputs),
        };

        let antennas = antennas.ok_or(ServeArgsError::NoAntennaFile)?;
        let positions = AntennaPositions::read(&antennas, layout.num_antennas())?;

        info!(
            "Array: {} stations of {} antennas, {} channels per subband",
            layout.num_stations, layout.antennas_per_station, layout.num_channels
        );
        info!("Antenna positions: {}", antennas.display());
        info!("Subband {subband}, channels {}", channels.iter().join(","));
        info!("Flagging: antenna sigma {ant_sigma}, visibility sigma {vis_sigma}");
        info!("Outputs: {}", outputs.iter().join(", "));

        Ok(ServeParams {
            layout,
            subband,
            channels,
            ant_sigma,
            vis_sigma,
            positions: Arc::new(positions),
            buffer_depth,
            num_threads,
            port,
            outputs,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), RtcalError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        params.run()?;
        Ok(())
    }
}

/// Parse comma-separated inclusive channel ranges ("0-10,20-62"). The ranges
/// must be sorted, must not overlap and must lie below `num_channels`.
pub(super) fn parse_channel_ranges(
    s: &str,
    num_channels: usize,
) -> Result<Vec1<ChannelRange>, ServeArgsError> {
    let mut ranges: Vec<ChannelRange> = vec![];
    for part in s.split(',') {
        let part = part.trim();
        let caps = CHANNEL_RANGE_REGEX
            .captures(part)
            .ok_or_else(|| ServeArgsError::ChannelSyntax(part.to_string()))?;
        let parse = |i: usize| {
            caps[i]
                .parse::<usize>()
                .map_err(|_| ServeArgsError::ChannelSyntax(part.to_string()))
        };
        let range = ChannelRange {
            start: parse(1)?,
            end: parse(2)?,
        };

        if range.start > range.end {
            return Err(ServeArgsError::ChannelRangeBackwards(range));
        }
        if range.end >= num_channels {
            return Err(ServeArgsError::ChannelOutOfRange {
                range,
                num_channels,
            });
        }
        if let Some(&previous) = ranges.last() {
            if range.start <= previous.end {
                return Err(ServeArgsError::ChannelsOverlap {
                    previous,
                    next: range,
                });
            }
        }
        ranges.push(range);
    }

    // `split` always yields at least one part, and every part either became a
    // range or returned an error.
    Ok(Vec1::try_from_vec(ranges).expect("at least one channel range was parsed"))
}

#[derive(Error, Debug)]
pub(super) enum ServeArgsError {
    #[error("The antenna sigma must be positive; got {0}")]
    AntSigma(f32),

    #[error("The visibility sigma must be positive; got {0}")]
    VisSigma(f32),

    #[error("The subband must be between 0 and 511; got {0}")]
    Subband(i32),

    #[error("At least one pipeline worker thread is needed")]
    NumThreads,

    #[error("The buffer depth must be at least 1")]
    BufferDepth,

    #[error("The port must be between 1 and 65535; got {0}")]
    Port(u32),

    #[error("No antenna positions file was specified")]
    NoAntennaFile,

    #[error("No outputs were specified")]
    NoOutputs,

    #[error("Couldn't parse '{0}' as a channel range; expected e.g. '0-62'")]
    ChannelSyntax(String),

    #[error("Channel range {0} ends before it starts")]
    ChannelRangeBackwards(ChannelRange),

    #[error("Channel ranges must be sorted and must not overlap; {next} follows {previous}")]
    ChannelsOverlap {
        previous: ChannelRange,
        next: ChannelRange,
    },

    #[error("Channel range {range} is outside the {num_channels} delivered channels")]
    ChannelOutOfRange {
        range: ChannelRange,
        num_channels: usize,
    },

    #[error(transparent)]
    AntennaPositions(#[from] AntennaPositionsError),

    #[error(transparent)]
    Layout(#[from] HeaderError),

    #[error(transparent)]
    Output(#[from] SinkError),
}
