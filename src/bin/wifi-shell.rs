//! Interactive WiFi connection manager shell.
//!
//! Runs the event loop and the connection state machine against the
//! simulated radio, which advertises a few demo networks:
//!
//! - `HomeNet` (WPA2, password `hunter2pass`) on two access points
//! - `Cafe` (open)
//! - `Office` (WPA2, password `correcthorse`)
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin wifi-shell
//! ```
//!
//! Type `help` for the command list. With `autoconn on` the last joined
//! network is stored and rejoined on the next start.

use log::{error, info, warn};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use wifi_connmgr::driver::Indication;
use wifi_connmgr::persistence::JoinedNetworkStore;
use wifi_connmgr::sim::{SimDriver, SimIpStack};
use wifi_connmgr::{build, EloopError, MgmtConfig, MgmtError, Netlink, ShellCommand};

/// Air time between a driver request and its indication.
const INDICATION_DELAY: Duration = Duration::from_millis(200);

/// DHCP lease handed out by the simulated IP stack.
const DEMO_LEASE: std::net::Ipv4Addr = std::net::Ipv4Addr::new(192, 168, 1, 42);

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(feature = "esp32")]
fn open_store() -> Arc<dyn JoinedNetworkStore> {
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use wifi_connmgr::persistence::NvsStore;

    match EspDefaultNvsPartition::take().and_then(NvsStore::open) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("NVS unavailable ({}), joined network will not persist", e);
            Arc::new(wifi_connmgr::MemoryStore::new(false))
        }
    }
}

#[cfg(not(feature = "esp32"))]
fn open_store() -> Arc<dyn JoinedNetworkStore> {
    use wifi_connmgr::persistence::FileStore;

    match FileStore::at_default_path() {
        Ok(store) => {
            info!("Joined network file: {}", store.path().display());
            Arc::new(store)
        }
        Err(e) => {
            warn!("No store path ({}), joined network will not persist", e);
            Arc::new(wifi_connmgr::MemoryStore::new(false))
        }
    }
}

fn demo_driver() -> (SimDriver, tokio::sync::mpsc::UnboundedReceiver<Indication>) {
    let (driver, rx) = SimDriver::new();
    driver.add_ap("HomeNet", [0x02, 0x11, 0x22, 0x33, 0x44, 0x01], -58, 6, "hunter2pass");
    driver.add_ap("HomeNet", [0x02, 0x11, 0x22, 0x33, 0x44, 0x02], -71, 11, "hunter2pass");
    driver.add_ap("Cafe", [0x02, 0xca, 0xfe, 0x00, 0x00, 0x01], -66, 1, "");
    driver.add_ap("Office", [0x02, 0x0f, 0xf1, 0xce, 0x00, 0x01], -80, 3, "correcthorse");
    (driver, rx)
}

/// Deliver driver indications to the bridge after a short delay.
///
/// Runs on its own thread, like a driver callback context: delivery may
/// sleep while the event loop queue is full.
fn pump_indications(
    netlink: Arc<Netlink>,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<Indication>,
) {
    while let Some(indication) = rx.blocking_recv() {
        std::thread::sleep(INDICATION_DELAY);
        netlink.deliver(indication);
    }
}

fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    platform_init();

    info!("=== WiFi connection manager starting ===");

    let (driver, rx) = demo_driver();
    let ip = Arc::new(SimIpStack::new(Some(DEMO_LEASE)));
    let system = match build(MgmtConfig::default(), Arc::new(driver), ip, open_store()) {
        Ok(system) => system,
        Err(e) => {
            error!("Failed to build connection manager: {}", e);
            std::process::exit(1);
        }
    };

    let control = system.control;
    let netlink = system.netlink;
    let mut eloop = system.eloop;
    let pump_netlink = netlink.clone();
    if let Err(e) = std::thread::Builder::new()
        .name("wifi-indications".into())
        .spawn(move || pump_indications(pump_netlink, rx))
    {
        error!("Failed to start indication thread: {}", e);
        std::process::exit(1);
    }
    let eloop_task = tokio::spawn(async move {
        let result = eloop.run().await;
        eloop.destroy();
        result
    });

    if let Err(e) = control.start() {
        error!("Failed to start state machine: {}", e);
        std::process::exit(1);
    }

    println!("Type 'help' for commands");
    print_prompt();

    let stdin_control = control.clone();
    let stdin_task = tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        let rt = tokio::runtime::Handle::current();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                print_prompt();
                continue;
            }
            match line.parse::<ShellCommand>() {
                Ok(cmd) => {
                    let quit = cmd == ShellCommand::Quit;
                    println!("{}", rt.block_on(stdin_control.execute(cmd)));
                    if quit {
                        break;
                    }
                }
                Err(e) => println!("error: {} (try 'help')", e),
            }
            print_prompt();
        }
    });

    #[cfg(not(target_os = "espidf"))]
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!();
            info!("Shutting down...");
        }
        result = stdin_task => {
            if let Err(e) = result {
                error!("Stdin task error: {}", e);
            }
        }
    }

    #[cfg(target_os = "espidf")]
    if let Err(e) = stdin_task.await {
        error!("Stdin task error: {}", e);
    }

    match control.terminate() {
        Ok(()) | Err(MgmtError::Eloop(EloopError::Terminating | EloopError::Closed)) => {}
        Err(e) => warn!("Terminate failed: {}", e),
    }
    match eloop_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Event loop stopped with error: {}", e),
        Err(e) => error!("Event loop task error: {}", e),
    }
    netlink.close();
    info!("Shutdown complete");
}
