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

use anyhow::Result;
use clap::Parser;
use std::time::Duration;

use fleetmon::{
    channel::TimeoutPolicy,
    cli::{Cli, Commands},
    commands::{
        exec::execute_command,
        list::list_fleets,
        ping::ping_hosts,
        transfer::{fetch_files, push_files},
        verify::{verify_measurement, VerifyParams},
        wait::wait_fleet,
    },
    config::{expand_tilde, Config},
    fanout::Fleet,
    host::HostSpec,
    poller::{CommandExpect, PollOptions},
    utils::init_logging,
};

const DEFAULT_PARALLEL: usize = 10;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_with_priority(&cli.config).await?;

    // Commands that need no target hosts.
    match &cli.command {
        Commands::List => {
            list_fleets(&config);
            return Ok(());
        }
        Commands::Verify {
            measurement,
            tags,
            wait_timeout,
            interval,
            query_url,
            database,
        } => {
            let code = verify_measurement(
                &config,
                VerifyParams {
                    measurement: measurement.clone(),
                    tags: tags.clone(),
                    wait_timeout: *wait_timeout,
                    interval: *interval,
                    query_url: query_url.clone(),
                    database: database.clone(),
                },
            )
            .await?;
            std::process::exit(code);
        }
        _ => {}
    }

    let fleet = build_fleet(&cli, &config)?;

    let code = match &cli.command {
        Commands::Exec { command } => {
            execute_command(&fleet, &command.join(" "), cli.verbose > 0).await?
        }
        Commands::Ping => ping_hosts(&fleet).await?,
        Commands::Push {
            source,
            destination,
            delete,
            links,
        } => push_files(&fleet, source, destination, *delete, *links).await?,
        Commands::Fetch {
            source,
            destination,
            links,
        } => fetch_files(&fleet, source, destination, *links).await?,
        Commands::Wait {
            command,
            expect_status,
            expect_stdout,
            wait_timeout,
            interval,
        } => {
            let mut expect = CommandExpect::default().exit_status(*expect_status);
            if let Some(needle) = expect_stdout {
                expect = expect.stdout_contains(needle.clone());
            }
            let poll = PollOptions {
                timeout: match *wait_timeout {
                    0 => None,
                    secs => Some(Duration::from_secs(secs)),
                },
                interval: Duration::from_secs(*interval),
            };
            wait_fleet(&fleet, &command.join(" "), expect, poll).await?
        }
        Commands::List | Commands::Verify { .. } => unreachable!("handled above"),
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn build_fleet(cli: &Cli, config: &Config) -> Result<Fleet> {
    let fleet_name = cli.fleet.as_deref();

    let mut hosts: Vec<HostSpec> = if let Some(specs) = &cli.hosts {
        let login = cli.login.clone().or_else(|| config.get_login(fleet_name));
        let mut hosts = Vec::with_capacity(specs.len());
        for spec in specs {
            hosts.push(HostSpec::parse(spec, login.as_deref())?);
        }
        hosts
    } else if let Some(name) = fleet_name {
        let mut hosts = config.resolve_hosts(name)?;
        if let Some(login) = &cli.login {
            for host in &mut hosts {
                host.login = login.clone();
            }
        }
        hosts
    } else {
        anyhow::bail!("no target hosts: pass -H or select a fleet with -c");
    };

    if let Some(identity) = &cli.identity {
        let identity = expand_tilde(identity);
        for host in &mut hosts {
            host.identity_file = Some(identity.clone());
        }
    } else if cli.hosts.is_some() {
        if let Some(identity) = config.get_identity(fleet_name) {
            for host in &mut hosts {
                host.identity_file = Some(identity.clone());
            }
        }
    }

    let timeout = match cli.timeout.or_else(|| config.get_timeout(fleet_name)) {
        Some(0) => TimeoutPolicy::Unlimited,
        Some(secs) => TimeoutPolicy::After(Duration::from_secs(secs)),
        None => TimeoutPolicy::Default,
    };
    let parallel = cli
        .parallel
        .or_else(|| config.get_parallel(fleet_name))
        .unwrap_or(DEFAULT_PARALLEL);

    Ok(Fleet::new(hosts, parallel)
        .with_ssh_free_local(cli.direct_local)
        .with_timeout(timeout))
}
