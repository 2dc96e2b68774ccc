// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fleetmon",
    version,
    about = "Parallel rollout and verification for a fleet metrics-collection stack",
    long_about = "fleetmon drives the hosts of a monitoring fleet over SSH: it broadcasts\ncommands, distributes files with rsync, waits for remote conditions to hold,\nand confirms that configuration changes are producing live data in the\ndownstream time-series store."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'H',
        long,
        value_delimiter = ',',
        help = "Comma-separated hosts in [login@]hostname[:port] format"
    )]
    pub hosts: Option<Vec<String>>,

    #[arg(short = 'c', long, help = "Fleet name from the configuration file")]
    pub fleet: Option<String>,

    #[arg(
        long,
        default_value = "~/.config/fleetmon/config.yaml",
        help = "Configuration file path\nFallback order: this flag, ./fleetmon.yaml, ~/.config/fleetmon/config.yaml"
    )]
    pub config: PathBuf,

    #[arg(short = 'l', long, help = "Login name for SSH connections [default: root]")]
    pub login: Option<String>,

    #[arg(short = 'i', long, help = "SSH identity file")]
    pub identity: Option<PathBuf>,

    #[arg(short = 'p', long, help = "Maximum parallel operations [default: 10]")]
    pub parallel: Option<usize>,

    #[arg(long, help = "Command timeout in seconds (0 for unlimited)")]
    pub timeout: Option<u64>,

    #[arg(
        long,
        help = "Run commands addressed to the local machine directly instead of through ssh"
    )]
    pub direct_local: bool,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Execute a command on all fleet hosts",
        long_about = "Runs the command on every target host with bounded parallelism.\nPer-host output is printed after completion; exit code is 1 if any host failed."
    )]
    Exec {
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    #[command(about = "Test connectivity to all fleet hosts")]
    Ping,

    #[command(
        about = "Distribute a file or directory to all fleet hosts",
        long_about = "Copies the source to every host with rsync over the fleet's ssh settings.\nDirectories are synchronized recursively."
    )]
    Push {
        source: String,
        destination: String,

        #[arg(long, help = "Delete extraneous files on the receiving side")]
        delete: bool,

        #[arg(long, help = "Preserve symlinks instead of following them")]
        links: bool,
    },

    #[command(
        about = "Collect a file or directory from all fleet hosts",
        long_about = "Pulls the remote source from every host into <destination>/<hostname>/\nso results from different hosts never collide."
    )]
    Fetch {
        source: String,
        destination: String,

        #[arg(long, help = "Preserve symlinks instead of following them")]
        links: bool,
    },

    #[command(
        about = "Wait until a command's result matches a condition on all hosts",
        long_about = "Repeatedly runs the command on every host until the expected exit status\n(and optional stdout substring) is observed, or the wait times out.\nUseful after restarting collectors: `fleetmon -c prod wait --expect-stdout active -- systemctl is-active collector`"
    )]
    Wait {
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,

        #[arg(long, default_value = "0", help = "Exit status that satisfies the wait")]
        expect_status: i32,

        #[arg(long, help = "Substring that must appear in stdout")]
        expect_stdout: Option<String>,

        #[arg(
            long,
            default_value = "90",
            help = "Seconds to keep retrying (0 waits forever)"
        )]
        wait_timeout: u64,

        #[arg(long, default_value = "1", help = "Seconds between retries")]
        interval: u64,
    },

    #[command(
        about = "Confirm a measurement is receiving fresh data",
        long_about = "Polls the time-series store for the newest point of the measurement and\nsucceeds once a strictly newer timestamp appears — evidence that the\ncollectors are writing, not just that stale data exists."
    )]
    Verify {
        measurement: String,

        #[arg(help = "Tag filters as key=value pairs")]
        tags: Vec<String>,

        #[arg(
            long,
            default_value = "90",
            help = "Seconds to keep polling (0 waits forever)"
        )]
        wait_timeout: u64,

        #[arg(long, default_value = "5", help = "Seconds between polls")]
        interval: u64,

        #[arg(long, help = "Time-series store query URL (overrides configuration)")]
        query_url: Option<String>,

        #[arg(long, help = "Time-series database name (overrides configuration)")]
        database: Option<String>,
    },

    #[command(about = "List fleets from the configuration")]
    List,
}
