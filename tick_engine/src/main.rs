use std::{collections::HashMap, env, fs, sync::Arc};

use anyhow::{Context, bail};
use comms::{HostCommand, HostReport, Router, RouterPort};
use futures::future;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::signal;

use tick_engine::{CoreConfig, Engine, ExitCode, run_core};

/// A multicast route between named cores.
#[derive(Debug, Deserialize)]
struct RouteEntry {
    key: u32,
    mask: u32,
    dests: Vec<String>,
}

/// A network of simulated cores and the routes connecting them.
#[derive(Debug, Deserialize)]
struct NetworkFile {
    cores: Vec<CoreConfig>,
    routes: Vec<RouteEntry>,
}

fn log_report(core: &str, report: &HostReport) {
    match report {
        HostReport::Info(info) => info!(
            core = core,
            outputs = info.num_outputs,
            total_ticks = info.total_ticks;
            "host info"
        ),
        HostReport::Outputs(out) if out.command == HostCommand::Final => {
            info!(core = core, epoch = out.epoch, tick = out.tick; "final outputs {:?}", out.pairs)
        }
        HostReport::Outputs(out) => debug!(
            core = core,
            epoch = out.epoch,
            example = out.example,
            event = out.event,
            tick = out.tick;
            "outputs {:?}", out.pairs
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .context("usage: tick-engine <network.json>")?;
    let json = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let file: NetworkFile = serde_json::from_str(&json).with_context(|| format!("parsing {path}"))?;

    let mut router = Router::new();
    let mut ids = HashMap::new();
    let mut mailboxes = Vec::with_capacity(file.cores.len());

    for core in &file.cores {
        let (id, rx) = router.mailbox();
        ids.insert(core.name.clone(), id);
        mailboxes.push(rx);
    }

    for route in &file.routes {
        let dests = route
            .dests
            .iter()
            .map(|d| ids.get(d).copied().with_context(|| format!("unknown core {d}")))
            .collect::<anyhow::Result<Vec<_>>>()?;
        router.route(route.key, route.mask, dests);
    }

    let names: Vec<String> = file.cores.iter().map(|c| c.name.clone()).collect();
    let mut host = router.host();
    let router = Arc::new(router);

    let monitor_names = names.clone();
    let monitor = tokio::spawn(async move {
        while let Some((id, report)) = host.recv().await {
            let core = monitor_names.get(id).map_or("?", String::as_str);
            log_report(core, &report);
        }
    });

    let mut handles = Vec::with_capacity(names.len());
    for (id, (core, mailbox)) in file.cores.into_iter().zip(mailboxes).enumerate() {
        let port = RouterPort::new(id, Arc::clone(&router));

        let handle = match core.validate().and_then(|cfg| Engine::new(cfg, port)) {
            Ok(engine) => tokio::spawn(run_core(engine, mailbox)),
            Err(e) => {
                warn!(core = names[id].as_str(); "{e}");
                let code = e.exit_code();
                tokio::spawn(async move { code })
            }
        };

        handles.push(handle);
    }
    drop(router);

    let run = async {
        let codes = future::try_join_all(handles).await?;

        let mut failed = 0;
        for (name, code) in names.iter().zip(codes) {
            println!("{name}: {code} ({})", code.code());

            if code != ExitCode::Success {
                failed += 1;
            }
        }

        anyhow::Ok(failed)
    };

    tokio::select! {
        failed = run => {
            let failed = failed?;
            monitor.await?;

            if failed > 0 {
                bail!("{failed} core(s) failed");
            }
            info!("all cores done");
        }
        _ = signal::ctrl_c() => {
            info!("interrupted");
        }
    }

    Ok(())
}
